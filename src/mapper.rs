//! Reconstruction of a volume from the frames of a DICOM series.
//!
//! The mapper orders the frames, infers the shape of the volume, picks the
//! storage [`Layout`] and builds the [`VolumeHeader`] along with a
//! [`DataHandler`] able to load the voxels.
//!
//! [`Layout`]: ../volume/enum.Layout.html
//! [`VolumeHeader`]: ../header/struct.VolumeHeader.html
//! [`DataHandler`]: ../volume/struct.DataHandler.html

use crate::affine::{get_rotation_and_translation, image_transform, mosaic_tiles, shift_mosaic_origin};
use crate::error::{DicomError, Result};
use crate::frame::{self, check_consistency, count, reorder, Frame};
use crate::header::{VolumeHeader, DW_SCHEME_KEY};
use crate::options::ReconstructOptions;
use crate::tree::{SeriesRef, Tree};
use crate::typedef::DataType;
use crate::util::{format_value, summarize};
use crate::volume::{DataHandler, InMemVolume, Layout};
use byteordered::Endianness;
use std::path::Path;
use tracing::{debug, info, warn};

/// A reconstructed series: the header of the volume and the handler which
/// loads its voxel data.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    /// the volume header
    pub header: VolumeHeader,
    /// the voxel data source
    pub handler: DataHandler,
}

impl Reconstruction {
    /// Load the voxel data into memory.
    pub fn load(&self) -> Result<InMemVolume> {
        self.handler.load()
    }
}

/// Reconstruct the given series.
pub fn reconstruct(series: SeriesRef, options: &ReconstructOptions) -> Result<Reconstruction> {
    let frames: Vec<Frame> = series.series.frames().cloned().collect();
    info!("reconstructing series {}", series.series.label());
    assemble(frames, &series.series.name, Some(series.comments()), options)
}

/// Scan the given files and reconstruct the single series they hold.
///
/// # Errors
///
/// - `DicomError::NoFrames` if no image data was found
/// - `DicomError::AmbiguousSeries` if the files hold several series
pub fn reconstruct_files<P>(paths: &[P], options: &ReconstructOptions) -> Result<Reconstruction>
where
    P: AsRef<Path> + Sync,
{
    let tree = Tree::read_files(paths, options);
    reconstruct(tree.single_series()?, options)
}

/// Reconstruct a volume from a list of frames in any order. `name` names
/// the volume and is used in diagnostics.
pub fn reconstruct_frames(
    frames: Vec<Frame>,
    name: &str,
    options: &ReconstructOptions,
) -> Result<Reconstruction> {
    assemble(frames, name, None, options)
}

fn assemble(
    frames: Vec<Frame>,
    name: &str,
    comments: Option<String>,
    options: &ReconstructOptions,
) -> Result<Reconstruction> {
    let total = frames.len();
    let mut frames: Vec<Frame> = if options.preserve_isotropic {
        frames
    } else {
        frames.into_iter().filter(|f| !f.is_isotropic_trailer()).collect()
    };
    if frames.len() != total {
        info!(
            "dropped {} isotropic image(s) from series \"{}\"",
            total - frames.len(),
            name
        );
    }
    if frames.is_empty() {
        return Err(DicomError::NoFrames);
    }
    if frames
        .iter()
        .any(|f| !f.transfer_syntax_supported || f.pixel_encapsulated)
    {
        return Err(DicomError::UnsupportedPixelEncoding(name.to_string()));
    }
    check_consistency(&frames, name)?;

    frames.sort_by(Frame::compare);
    let dims = count(&frames).ok_or_else(|| DicomError::DimensionMismatch(name.to_string()))?;
    debug!(
        "series \"{}\": {} slices, {} volumes, {} acquisitions",
        name, dims.slices, dims.volumes, dims.acquisitions
    );
    let frames = reorder(&frames, &dims);
    let first = &frames[0];

    let datatype = DataType::from_bits(first.bits_alloc, first.signed)
        .ok_or(DicomError::UnsupportedBitsAllocated(first.bits_alloc))?;

    let mut transform = image_transform(first);

    let mut mosaic = None;
    if first.images_in_mosaic > 0 {
        let tiles = mosaic_tiles(first.images_in_mosaic);
        let slice_dim = [first.dim[0] / tiles, first.dim[1] / tiles];
        if slice_dim != first.dim {
            if first.acq_dim != [0, 0] && first.acq_dim != slice_dim {
                warn!(
                    "acquisition matrix [ {} {} ] does not match mosaic slices [ {} {} ]",
                    first.acq_dim[0], first.acq_dim[1], slice_dim[0], slice_dim[1]
                );
            }
            if dims.slices != 1 {
                return Err(DicomError::DimensionMismatch(name.to_string()));
            }
            mosaic = Some((slice_dim, tiles));
        }
    }

    let variable_scaling = frames.iter().any(|f| !f.same_scaling(first));
    if variable_scaling && mosaic.is_some() {
        return Err(DicomError::MosaicWithVariableScaling);
    }

    let expected = first.dim[0] * first.dim[1] * datatype.size_of();
    let channels = if first.samples_per_pixel > 1 {
        first.samples_per_pixel as usize
    } else {
        match first.pixel.as_ref() {
            Some(p) if mosaic.is_none() && expected > 0 && p.len > expected && p.len % expected == 0 => {
                p.len / expected
            }
            _ => 1,
        }
    };

    let mut pixel_size = first.pixel_size;
    for p in &mut pixel_size {
        if !p.is_finite() {
            warn!("pixel spacing missing in series \"{}\", assuming 1 mm", name);
            *p = 1.0;
        }
    }
    let slice_sep = frame::slice_separation(
        &frames,
        dims.slices,
        options.slice_gap_tolerance,
        options.slice_separation_tolerance,
    );

    let mut dim = Vec::with_capacity(5);
    let mut spacing = Vec::with_capacity(5);
    if channels > 1 {
        dim.push(channels);
        spacing.push(1.0);
    }
    let layout = match mosaic {
        Some((slice_dim, tiles)) => {
            info!(
                "DICOM mosaic of {} images, {} x {} each",
                first.images_in_mosaic, slice_dim[0], slice_dim[1]
            );
            shift_mosaic_origin(&mut transform, pixel_size, first.dim, slice_dim);
            dim.extend_from_slice(&[slice_dim[0], slice_dim[1], first.images_in_mosaic]);
            Layout::Mosaic {
                slice_dim,
                tiles,
                images: first.images_in_mosaic,
            }
        }
        None => {
            dim.extend_from_slice(&[first.dim[0], first.dim[1], dims.slices]);
            if variable_scaling {
                info!("series \"{}\" has variable intensity scaling, converting to float", name);
                Layout::VariableScaling
            } else {
                Layout::Default
            }
        }
    };
    spacing.extend_from_slice(&[pixel_size[0], pixel_size[1], slice_sep]);
    if dims.total_volumes() > 1 {
        dim.push(dims.total_volumes());
        spacing.push(1.0);
    }

    let (datatype, endianness, offset, scale) = if layout == Layout::VariableScaling {
        (DataType::Float32, Endianness::native(), 0.0, 1.0)
    } else {
        (datatype, first.endianness, first.scale_intercept, first.scale_slope)
    };

    let mut header = VolumeHeader {
        name: name.to_string(),
        dim,
        spacing,
        strides: Vec::new(),
        transform,
        datatype,
        endianness,
        intensity_offset: offset,
        intensity_scale: scale,
        channels,
        ..VolumeHeader::default()
    };
    header.set_dense_strides();

    let nslices = dims.slices;
    set_diffusion_scheme(&mut header, &frames, nslices);
    set_phase_encoding(&mut header, &frames, nslices);
    set_slice_timing(&mut header, &frames, nslices, mosaic.is_some());
    set_summaries(&mut header, &frames, nslices);
    if let Some(comments) = comments {
        insert(&mut header, "comments", comments);
    }

    let handler = DataHandler::new(header.clone(), frames, layout)?;
    Ok(Reconstruction { header, handler })
}

fn insert(header: &mut VolumeHeader, key: &str, value: String) {
    let _ = header.keyval.insert(key.to_string(), value);
}

fn per_volume<F: Fn(&Frame) -> f64>(frames: &[Frame], nslices: usize, f: F) -> Vec<f64> {
    frames.iter().step_by(nslices.max(1)).map(f).collect()
}

fn set_diffusion_scheme(header: &mut VolumeHeader, frames: &[Frame], nslices: usize) {
    let (rotation, _) = get_rotation_and_translation(&header.transform);
    let scheme = frame::dw_scheme(frames, nslices, &rotation);
    if scheme.is_empty() {
        return;
    }
    let text = scheme
        .iter()
        .map(|row| {
            row.iter()
                .map(|v| format_value(*v))
                .collect::<Vec<_>>()
                .join(",")
        })
        .collect::<Vec<_>>()
        .join("\n");
    insert(header, DW_SCHEME_KEY, text);
}

fn set_phase_encoding(header: &mut VolumeHeader, frames: &[Frame], nslices: usize) {
    let scheme = frame::pe_scheme(frames, nslices);
    if scheme.is_empty() {
        return;
    }
    if scheme.iter().all(|row| *row == scheme[0]) {
        let row = &scheme[0];
        if let Some(axis) = row[..3].iter().position(|v| *v != 0.0) {
            let mut dir = ["i", "j", "k"][axis].to_string();
            if row[axis] < 0.0 {
                dir.push('-');
            }
            insert(header, "PhaseEncodingDirection", dir);
        }
        if row.len() == 4 {
            insert(header, "TotalReadoutTime", format_value(row[3]));
        }
    } else {
        let text = scheme
            .iter()
            .map(|row| {
                row.iter()
                    .map(|v| format_value(*v))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n");
        insert(header, "pe_scheme", text);
    }
}

fn round_us(t: f64) -> f64 {
    (t * 1e6).round() / 1e6
}

/// Slice acquisition times in seconds, relative to the first slice.
fn slice_times(frames: &[Frame], nslices: usize, mosaic: bool) -> Option<Vec<f64>> {
    let first = frames.first()?;
    if mosaic && !first.mosaic_slices_timing.is_empty() {
        return Some(
            first
                .mosaic_slices_timing
                .iter()
                .map(|t| (t * 1000.0).round() / 1e6)
                .collect(),
        );
    }
    let slices = &frames[..nslices.min(frames.len())];
    let normalise = |times: Vec<f64>| {
        let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
        times.into_iter().map(|t| round_us(t - min)).collect()
    };
    let after_start: Vec<f64> = slices.iter().map(|f| f.time_after_start).collect();
    if after_start.iter().all(|t| t.is_finite()) {
        return Some(normalise(after_start));
    }
    let acquisition: Vec<f64> = slices.iter().map(|f| f.acquisition_time).collect();
    if acquisition.iter().all(|t| t.is_finite()) {
        return Some(normalise(acquisition));
    }
    None
}

fn set_slice_timing(header: &mut VolumeHeader, frames: &[Frame], nslices: usize, mosaic: bool) {
    let times = match slice_times(frames, nslices, mosaic) {
        Some(t) => t,
        None => return,
    };
    if times.iter().all(|t| *t == 0.0) {
        debug!("slice timing information is all zero, omitted");
        return;
    }
    let min = times.iter().cloned().fold(f64::INFINITY, f64::min);
    let multiband = times.iter().filter(|t| **t == min).count();
    insert(
        header,
        "SliceTiming",
        times.iter().map(|t| format_value(*t)).collect::<Vec<_>>().join(","),
    );
    insert(header, "SliceEncodingDirection", "k".to_string());
    if multiband > 1 && times.len() % multiband == 0 {
        insert(header, "MultibandAccelerationFactor", multiband.to_string());
    }
}

fn set_summaries(header: &mut VolumeHeader, frames: &[Frame], nslices: usize) {
    let entries: [(&str, fn(&Frame) -> f64); 7] = [
        ("EchoTime", |f| f.echo_time / 1000.0),
        ("RepetitionTime", |f| f.repetition_time / 1000.0),
        ("InversionTime", |f| f.inversion_time / 1000.0),
        ("FlipAngle", nominal_flip_angle),
        ("PartialFourier", |f| f.partial_fourier),
        ("PixelBandwidth", |f| f.pixel_bandwidth),
        ("BandwidthPerPixelPhaseEncode", |f| f.bandwidth_per_pixel_phase_encode),
    ];
    for (key, f) in entries.iter() {
        if let Some(value) = summarize(&per_volume(frames, nslices, *f)) {
            insert(header, key, value);
        }
    }
    if let Some(scheme) = frames.first().and_then(|f| f.diffusion_scheme) {
        insert(header, "DiffusionScheme", scheme.to_string());
    }
    if let Some(mode) = frames.first().and_then(|f| f.readout_mode) {
        insert(header, "ReadoutMode", mode.to_string());
    }
}

/// The flip angle element, or the first flip angle of the scanner protocol
/// when the element is absent.
fn nominal_flip_angle(f: &Frame) -> f64 {
    if f.flip_angle.is_finite() {
        f.flip_angle
    } else {
        f.flip_angles.first().copied().unwrap_or(f64::NAN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelRef;
    use crate::typedef::ReadoutMode;
    use crate::util::Buffer;
    use nalgebra::Vector3;
    use std::sync::Arc;

    fn axial(z: f64, instance: usize) -> Frame {
        let mut f = Frame {
            series_num: 1,
            acq: 1,
            instance,
            dim: [4, 4],
            pixel_size: [2.0, 2.0],
            slice_thickness: 3.0,
            bits_alloc: 16,
            orientation_x: Vector3::new(1., 0., 0.),
            orientation_y: Vector3::new(0., 1., 0.),
            position_vector: Vector3::new(0., 0., z),
            pixel: Some(PixelRef {
                buffer: Arc::new(Buffer::from(vec![instance as u8; 32])),
                offset: 0,
                len: 32,
            }),
            ..Frame::default()
        };
        f.calc_distance();
        f
    }

    #[test]
    fn slices_are_stacked() {
        let frames = vec![axial(6., 3), axial(0., 1), axial(3., 2)];
        let recon = reconstruct_frames(frames, "test", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.dim, vec![4, 4, 3]);
        assert_eq!(recon.header.spacing, vec![2., 2., 3.]);
        assert_eq!(recon.header.strides, vec![1, 4, 16]);
        assert_eq!(recon.handler.layout(), Layout::Default);
        assert!(recon.header.get(DW_SCHEME_KEY).is_none());
    }

    #[test]
    fn volumes_axis_appended() {
        let mut frames = Vec::new();
        for v in 0..2 {
            for s in 0..3 {
                let mut f = axial(3. * s as f64, 1 + v * 3 + s);
                f.echo_time = 30.;
                f.repetition_time = if v == 0 { 2000. } else { 3000. };
                frames.push(f);
            }
        }
        let recon = reconstruct_frames(frames, "test", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.dim, vec![4, 4, 3, 2]);
        assert_eq!(recon.header.get("EchoTime"), Some("0.03"));
        assert_eq!(recon.header.get("RepetitionTime"), Some("2,3"));
    }

    #[test]
    fn protocol_flip_angle_and_readout_mode() {
        let mut frames = vec![axial(0., 1), axial(3., 2)];
        for f in &mut frames {
            f.flip_angles = vec![90., 180.];
            f.readout_mode = Some(ReadoutMode::Bipolar);
        }
        let recon = reconstruct_frames(frames.clone(), "test", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.get("FlipAngle"), Some("90"));
        assert_eq!(recon.header.get("ReadoutMode"), Some("Bipolar"));

        // the flip angle element takes precedence
        for f in &mut frames {
            f.flip_angle = 15.;
        }
        let recon = reconstruct_frames(frames, "test", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.get("FlipAngle"), Some("15"));
    }

    #[test]
    fn mosaic_with_variable_scaling_is_rejected() {
        let mut a = axial(0., 1);
        a.dim = [8, 8];
        a.images_in_mosaic = 4;
        let mut b = a.clone();
        b.instance = 2;
        b.scale_slope = 2.0;
        assert!(matches!(
            reconstruct_frames(vec![a, b], "test", &ReconstructOptions::new()),
            Err(DicomError::MosaicWithVariableScaling)
        ));
    }

    #[test]
    fn mosaic_timing_wins() {
        let mut f = axial(0., 1);
        f.dim = [8, 8];
        f.images_in_mosaic = 4;
        f.acquisition_time = 100.;
        f.mosaic_slices_timing = vec![0., 52.5, 0., 52.5];
        let recon = reconstruct_frames(vec![f], "test", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.dim, vec![4, 4, 4]);
        assert_eq!(recon.header.get("SliceTiming"), Some("0,0.0525,0,0.0525"));
        assert_eq!(recon.header.get("MultibandAccelerationFactor"), Some("2"));
        assert_eq!(recon.header.get("SliceEncodingDirection"), Some("k"));
    }

    #[test]
    fn isotropic_trailer_dropped() {
        let mut frames = vec![axial(0., 1), axial(0., 2)];
        for f in &mut frames {
            f.bvalue = 1000.;
            f.g = Vector3::new(0., 0., 1.);
        }
        frames[1].is_isotropic = true;
        let recon = reconstruct_frames(frames.clone(), "dwi", &ReconstructOptions::new()).unwrap();
        assert_eq!(recon.header.dim, vec![4, 4, 1]);
        let keep = ReconstructOptions::new().preserve_isotropic(true);
        let recon = reconstruct_frames(frames, "dwi", &keep).unwrap();
        assert_eq!(recon.header.dim, vec![4, 4, 1, 2]);
    }

    #[test]
    fn unsupported_bits_and_encoding() {
        let mut f = axial(0., 1);
        f.bits_alloc = 32;
        assert!(matches!(
            reconstruct_frames(vec![f], "test", &ReconstructOptions::new()),
            Err(DicomError::UnsupportedBitsAllocated(32))
        ));
        let mut f = axial(0., 1);
        f.pixel_encapsulated = true;
        assert!(matches!(
            reconstruct_frames(vec![f], "test", &ReconstructOptions::new()),
            Err(DicomError::UnsupportedPixelEncoding(_))
        ));
        assert!(matches!(
            reconstruct_frames(Vec::new(), "test", &ReconstructOptions::new()),
            Err(DicomError::NoFrames)
        ));
    }
}
