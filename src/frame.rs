//! This module defines the frame, the unit of reconstruction: one 2D slice
//! with the acquisition parameters that apply to it. Single-frame files
//! contribute one frame, multi-frame (enhanced) files contribute one frame
//! per item of their per-frame functional groups.
//!
//! The free functions of this module take a list of frames from a single
//! series and infer how they tile a volume: frame order, dimensions, slice
//! separation, diffusion and phase encoding schemes.

use crate::error::{DicomError, Result};
use crate::typedef::{DiffusionScheme, ReadoutMode};
use crate::util::Buffer;
use byteordered::Endianness;
use nalgebra::{Matrix3, Vector3};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default tolerance on the difference between slice separation and slice
/// thickness before a gap is reported.
pub const SLICE_GAP_TOLERANCE: f64 = 1e-4;
/// Default tolerance on the spread of slice separations across a volume.
pub const SLICE_SEPARATION_TOLERANCE: f64 = 2e-4;

/// Location of one frame's pixel bytes within a shared file buffer.
#[derive(Clone)]
pub struct PixelRef {
    /// the buffer holding the file's contents
    pub buffer: Arc<Buffer>,
    /// absolute offset of the frame's first byte
    pub offset: usize,
    /// number of bytes of the frame
    pub len: usize,
}

impl PixelRef {
    /// Obtain the frame's pixel bytes, or `None` if the buffer ends before
    /// the declared extent.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.buffer.get(self.offset..self.offset.checked_add(self.len)?)
    }
}

impl fmt::Debug for PixelRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PixelRef")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

fn nan3() -> Vector3<f64> {
    Vector3::repeat(f64::NAN)
}

/// A 2D image with the attributes needed to place it in a volume.
#[derive(Debug, Clone)]
pub struct Frame {
    /// series number
    pub series_num: usize,
    /// acquisition number
    pub acq: usize,
    /// instance number
    pub instance: usize,
    /// sequence index (trailing digits of the sequence name)
    pub sequence: usize,
    /// echo index
    pub echo_index: usize,
    /// dimension index values of enhanced multi-frame images
    pub index: Vec<u32>,
    /// whether the series number was read from a reference to another series
    pub ignore_series_num: bool,

    /// image dimensions (columns, rows)
    pub dim: [usize; 2],
    /// acquisition matrix (frequency x, phase y)
    pub acq_dim: [usize; 2],
    /// in-plane pixel size (x, y)
    pub pixel_size: [f64; 2],
    /// nominal slice thickness
    pub slice_thickness: f64,
    /// spacing between slices
    pub slice_spacing: f64,

    /// image position (LPS)
    pub position_vector: Vector3<f64>,
    /// direction of the rows (LPS)
    pub orientation_x: Vector3<f64>,
    /// direction of the columns (LPS)
    pub orientation_y: Vector3<f64>,
    /// slice normal, from the vendor header until `calc_distance` is called
    pub orientation_z: Vector3<f64>,
    /// position along the slice normal
    pub distance: f64,

    /// bits allocated per sample
    pub bits_alloc: u32,
    /// whether samples are signed
    pub signed: bool,
    /// samples per pixel
    pub samples_per_pixel: u32,
    /// byte order of the pixel data
    pub endianness: Endianness,
    /// rescale slope
    pub scale_slope: f64,
    /// rescale intercept
    pub scale_intercept: f64,
    /// whether the pixel data can be read as is
    pub transfer_syntax_supported: bool,
    /// whether the pixel data is encapsulated (compressed)
    pub pixel_encapsulated: bool,
    /// byte offset of this frame from the start of the pixel data
    pub frame_offset: usize,
    /// location of the pixel bytes, once resolved
    pub pixel: Option<PixelRef>,

    /// number of slices tiled in a mosaic, 0 if not a mosaic
    pub images_in_mosaic: usize,
    /// acquisition time of each mosaic slice (ms)
    pub mosaic_slices_timing: Vec<f64>,
    /// time after start of the acquisition (s)
    pub time_after_start: f64,
    /// acquisition time (s since midnight)
    pub acquisition_time: f64,

    /// diffusion weighting
    pub bvalue: f64,
    /// diffusion gradient direction
    pub g: Vector3<f64>,
    /// whether `g` is expressed in the image frame rather than the scanner's
    pub dw_scheme_wrt_image: bool,
    /// whether this is the isotropic (trace) image of a diffusion series
    pub is_isotropic: bool,
    /// diffusion encoding scheme
    pub diffusion_scheme: Option<DiffusionScheme>,

    /// in-plane phase encoding axis (0: x, 1: y)
    pub pe_axis: Option<usize>,
    /// phase encoding polarity (1, -1, or 0 if unknown)
    pub pe_sign: i32,
    /// pixel bandwidth (Hz)
    pub pixel_bandwidth: f64,
    /// bandwidth per pixel in the phase encoding direction (Hz)
    pub bandwidth_per_pixel_phase_encode: f64,
    /// fraction of k-space acquired along the phase direction
    pub partial_fourier: f64,
    /// readout gradient polarity mode
    pub readout_mode: Option<ReadoutMode>,

    /// echo time (ms)
    pub echo_time: f64,
    /// repetition time (ms)
    pub repetition_time: f64,
    /// inversion time (ms)
    pub inversion_time: f64,
    /// flip angle (degrees)
    pub flip_angle: f64,
    /// per-pulse flip angles from the vendor protocol (degrees)
    pub flip_angles: Vec<f64>,
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            series_num: usize::MAX,
            acq: usize::MAX,
            instance: usize::MAX,
            sequence: usize::MAX,
            echo_index: usize::MAX,
            index: Vec::new(),
            ignore_series_num: false,
            dim: [0, 0],
            acq_dim: [0, 0],
            pixel_size: [f64::NAN; 2],
            slice_thickness: f64::NAN,
            slice_spacing: f64::NAN,
            position_vector: nan3(),
            orientation_x: nan3(),
            orientation_y: nan3(),
            orientation_z: nan3(),
            distance: f64::NAN,
            bits_alloc: 0,
            signed: false,
            samples_per_pixel: 1,
            endianness: Endianness::Little,
            scale_slope: 1.0,
            scale_intercept: 0.0,
            transfer_syntax_supported: true,
            pixel_encapsulated: false,
            frame_offset: 0,
            pixel: None,
            images_in_mosaic: 0,
            mosaic_slices_timing: Vec::new(),
            time_after_start: f64::NAN,
            acquisition_time: f64::NAN,
            bvalue: f64::NAN,
            g: nan3(),
            dw_scheme_wrt_image: false,
            is_isotropic: false,
            diffusion_scheme: None,
            pe_axis: None,
            pe_sign: 0,
            pixel_bandwidth: f64::NAN,
            bandwidth_per_pixel_phase_encode: f64::NAN,
            partial_fourier: f64::NAN,
            readout_mode: None,
            echo_time: f64::NAN,
            repetition_time: f64::NAN,
            inversion_time: f64::NAN,
            flip_angle: f64::NAN,
            flip_angles: Vec::new(),
        }
    }
}

fn is_finite3(v: &Vector3<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

impl Frame {
    /// Derive the slice normal from the in-plane orientation and compute
    /// the frame's position along it. A normal given by the vendor header
    /// only decides the sign of the derived one.
    pub fn calc_distance(&mut self) {
        let normal = self.orientation_x.cross(&self.orientation_y);
        self.orientation_z = if is_finite3(&self.orientation_z) && normal.dot(&self.orientation_z) < 0.0
        {
            -normal
        } else {
            normal
        };
        let norm = self.orientation_z.norm();
        if norm > 0.0 {
            self.orientation_z /= norm;
        }
        self.distance = self.orientation_z.dot(&self.position_vector);
    }

    /// Number of bytes occupied by this frame's pixel data.
    pub fn data_size(&self) -> usize {
        self.dim[0] * self.dim[1] * (self.bits_alloc as usize / 8) * self.samples_per_pixel as usize
    }

    /// Whether this is the isotropic image appended to some diffusion
    /// series, which does not belong to the diffusion volume.
    pub fn is_isotropic_trailer(&self) -> bool {
        self.is_isotropic && self.bvalue.is_finite() && self.bvalue > 0.0
    }

    /// Whether both frames share the same intensity rescale.
    pub fn same_scaling(&self, other: &Frame) -> bool {
        self.scale_slope == other.scale_slope && self.scale_intercept == other.scale_intercept
    }

    /// Order frames by series, acquisition, slice position, dimension
    /// index, sequence, echo and finally instance number.
    pub fn compare(&self, other: &Frame) -> Ordering {
        let series = if self.ignore_series_num || other.ignore_series_num {
            Ordering::Equal
        } else {
            self.series_num.cmp(&other.series_num)
        };
        series
            .then(self.acq.cmp(&other.acq))
            .then(
                self.distance
                    .partial_cmp(&other.distance)
                    .unwrap_or(Ordering::Equal),
            )
            .then_with(|| self.index.cmp(&other.index))
            .then(self.sequence.cmp(&other.sequence))
            .then(self.echo_index.cmp(&other.echo_index))
            .then(self.instance.cmp(&other.instance))
    }

    fn starts_new_acquisition(&self, previous: &Frame) -> bool {
        let series_differs = !(self.ignore_series_num || previous.ignore_series_num)
            && self.series_num != previous.series_num;
        series_differs || self.acq != previous.acq
    }
}

/// How the frames of a series tile the output volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    /// number of slice positions
    pub slices: usize,
    /// number of volumes per acquisition
    pub volumes: usize,
    /// number of acquisitions
    pub acquisitions: usize,
}

impl Dimensions {
    /// Total number of frames.
    pub fn frames(&self) -> usize {
        self.slices * self.volumes * self.acquisitions
    }

    /// Number of volumes across all acquisitions.
    pub fn total_volumes(&self) -> usize {
        self.volumes * self.acquisitions
    }
}

fn update_count(num: usize, dim: &mut [usize; 3], index: &mut [usize; 3]) -> bool {
    for n in 0..num {
        if dim[n] != 0 && index[n] != dim[n] {
            return false;
        }
        dim[n] = index[n];
        index[n] = 1;
    }
    index[num] += 1;
    true
}

/// Infer the dimensions of a sorted list of frames. Consecutive frames at
/// the same position are volumes, changes of position are slices, and
/// changes of series or acquisition number are acquisitions. Returns `None`
/// if the frames do not form a regular grid.
pub fn count(frames: &[Frame]) -> Option<Dimensions> {
    let mut dim = [0usize; 3];
    let mut index = [1usize; 3];

    for pair in frames.windows(2) {
        let (previous, frame) = (&pair[0], &pair[1]);
        let level = if frame.starts_new_acquisition(previous) {
            2
        } else if frame.distance != previous.distance {
            1
        } else {
            0
        };
        if !update_count(level, &mut dim, &mut index) {
            return None;
        }
    }

    for n in 0..3 {
        if dim[n] != 0 && index[n] != dim[n] {
            return None;
        }
        dim[n] = index[n];
    }

    let dims = Dimensions {
        volumes: dim[0],
        slices: dim[1],
        acquisitions: dim[2],
    };
    if dims.frames() != frames.len() {
        return None;
    }
    Some(dims)
}

/// Reorder frames sorted with volumes varying fastest so that slices vary
/// fastest, then volumes, then acquisitions.
pub fn reorder<T: Clone>(frames: &[T], dims: &Dimensions) -> Vec<T> {
    let mut out = Vec::with_capacity(frames.len());
    for k in 0..dims.acquisitions {
        for i in 0..dims.volumes {
            for j in 0..dims.slices {
                out.push(frames[i + dims.volumes * (j + dims.slices * k)].clone());
            }
        }
    }
    out
}

/// Compute the separation between slices from the first `nslices` frames
/// (ordered slice-fastest). Inconsistent spacings or gaps between slices are
/// reported as warnings.
pub fn slice_separation(frames: &[Frame], nslices: usize, gap_tolerance: f64, separation_tolerance: f64) -> f64 {
    let nslices = nslices.min(frames.len());
    if nslices < 2 {
        let frame = match frames.first() {
            Some(f) => f,
            None => return 1.0,
        };
        return if frame.slice_spacing.is_finite() {
            frame.slice_spacing
        } else if frame.slice_thickness.is_finite() {
            frame.slice_thickness
        } else {
            1.0
        };
    }

    let seps: Vec<f64> = frames[..nslices]
        .windows(2)
        .map(|w| w[1].distance - w[0].distance)
        .collect();
    let mean = seps.iter().sum::<f64>() / seps.len() as f64;

    let thickness = frames[0].slice_thickness;
    if thickness.is_finite() && seps.iter().any(|s| (s - thickness).abs() > gap_tolerance) {
        warn!(
            "slice gap detected (slice thickness: {}, separation: {})",
            thickness, mean
        );
    }
    let (min, max) = seps
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| (lo.min(*s), hi.max(*s)));
    if max - min > separation_tolerance {
        warn!(
            "slice separation is not constant (min: {}, max: {}) - reconstructed geometry may be inaccurate",
            min, max
        );
    }
    mean
}

/// Rotate a gradient direction by the given rotation.
pub fn rotate_gradient(rotation: &Matrix3<f64>, g: &Vector3<f64>) -> Vector3<f64> {
    rotation * g
}

/// Build the diffusion encoding scheme, one row `[gx, gy, gz, b]` per
/// volume, in the scanner frame of the output image. `rotation` is the
/// rotation part of the image transform. Returns an empty scheme if the
/// frames carry no diffusion information.
pub fn dw_scheme(frames: &[Frame], nslices: usize, rotation: &Matrix3<f64>) -> Vec<[f64; 4]> {
    if frames.is_empty() || !frames[0].bvalue.is_finite() {
        debug!("no diffusion encoding information found in DICOM data");
        return Vec::new();
    }
    let nslices = nslices.max(1);
    let nvolumes = frames.len() / nslices;

    (0..nvolumes)
        .map(|n| {
            let frame = &frames[n * nslices];
            let b = if frame.bvalue.is_finite() { frame.bvalue } else { 0.0 };
            if b == 0.0 || !is_finite3(&frame.g) {
                return [0.0, 0.0, 0.0, b];
            }
            let g = if frame.dw_scheme_wrt_image {
                // third image axis runs against the scanner convention
                let flipped = Vector3::new(frame.g[0], frame.g[1], -frame.g[2]);
                rotate_gradient(rotation, &flipped)
            } else {
                Vector3::new(-frame.g[0], -frame.g[1], frame.g[2])
            };
            [g[0], g[1], g[2], b]
        })
        .collect()
}

/// Build the phase encoding scheme, one row per volume: the signed unit
/// vector along the phase encoding axis, followed by the total readout time
/// when it is known. Returns an empty scheme if the direction is unknown.
pub fn pe_scheme(frames: &[Frame], nslices: usize) -> Vec<Vec<f64>> {
    let nslices = nslices.max(1);
    let nvolumes = frames.len() / nslices;
    let mut scheme = Vec::with_capacity(nvolumes);

    for n in 0..nvolumes {
        let frame = &frames[n * nslices];
        let axis = match frame.pe_axis {
            Some(axis) if frame.pe_sign != 0 => axis,
            _ => {
                debug!("no phase encoding information found in DICOM data");
                return Vec::new();
            }
        };
        let mut row = vec![0.0; 4];
        row[axis] = f64::from(frame.pe_sign);
        let bw = frame.bandwidth_per_pixel_phase_encode;
        let acq = frame.acq_dim[axis];
        if bw.is_finite() && bw > 0.0 && acq > 0 {
            row[3] = (1.0 / (bw * acq as f64)) * (acq as f64 - 1.0);
        }
        scheme.push(row);
    }

    if scheme.iter().map(|row| row[3]).sum::<f64>() == 0.0 {
        for row in &mut scheme {
            row.truncate(3);
        }
    }
    scheme
}

/// Check that all frames share the in-plane geometry and pixel layout of
/// the first one.
pub fn check_consistency(frames: &[Frame], series: &str) -> Result<()> {
    let first = match frames.first() {
        Some(f) => f,
        None => return Err(DicomError::NoFrames),
    };
    let consistent = frames.iter().all(|f| {
        f.dim == first.dim
            && f.bits_alloc == first.bits_alloc
            && f.samples_per_pixel == first.samples_per_pixel
            && f.signed == first.signed
    });
    if consistent {
        Ok(())
    } else {
        Err(DicomError::InconsistentFrames(series.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_at(distance: f64, instance: usize) -> Frame {
        Frame {
            series_num: 1,
            acq: 1,
            instance,
            distance,
            ..Frame::default()
        }
    }

    #[test]
    fn distance_along_normal() {
        let mut f = Frame {
            orientation_x: Vector3::new(1., 0., 0.),
            orientation_y: Vector3::new(0., 1., 0.),
            position_vector: Vector3::new(10., 20., -4.5),
            ..Frame::default()
        };
        f.calc_distance();
        assert_eq!(f.orientation_z, Vector3::new(0., 0., 1.));
        assert_eq!(f.distance, -4.5);

        // a vendor normal pointing the other way flips the sign
        f.orientation_z = Vector3::new(0., 0., -1.);
        f.calc_distance();
        assert_eq!(f.orientation_z, Vector3::new(0., 0., -1.));
        assert_eq!(f.distance, 4.5);
    }

    #[test]
    fn count_slices_and_volumes() {
        // 3 slices, 2 volumes, sorted with volumes fastest
        let mut frames = Vec::new();
        for s in 0..3 {
            for v in 0..2 {
                frames.push(frame_at(s as f64, 1 + v * 3 + s));
            }
        }
        let dims = count(&frames).unwrap();
        assert_eq!(
            dims,
            Dimensions {
                slices: 3,
                volumes: 2,
                acquisitions: 1
            }
        );

        let ordered = reorder(&frames, &dims);
        let distances: Vec<f64> = ordered.iter().map(|f| f.distance).collect();
        assert_eq!(distances, vec![0., 1., 2., 0., 1., 2.]);
        let instances: Vec<usize> = ordered.iter().map(|f| f.instance).collect();
        assert_eq!(instances, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn count_acquisitions() {
        let mut frames = Vec::new();
        for acq in 1..=2 {
            for s in 0..4 {
                let mut f = frame_at(s as f64, s);
                f.acq = acq;
                frames.push(f);
            }
        }
        let dims = count(&frames).unwrap();
        assert_eq!(dims.slices, 4);
        assert_eq!(dims.volumes, 1);
        assert_eq!(dims.acquisitions, 2);
    }

    #[test]
    fn count_is_order_independent() {
        // 3 slices x 2 volumes x 2 acquisitions
        let mut frames = Vec::new();
        for acq in 1..=2 {
            for v in 0..2 {
                for s in 0..3 {
                    let mut f = frame_at(s as f64, 100 * acq + 10 * v + s);
                    f.acq = acq;
                    frames.push(f);
                }
            }
        }
        let expected = Dimensions {
            slices: 3,
            volumes: 2,
            acquisitions: 2,
        };
        for shift in 0..frames.len() {
            let mut shuffled = frames.clone();
            shuffled.rotate_left(shift);
            if shift % 2 == 1 {
                shuffled.reverse();
            }
            shuffled.sort_by(Frame::compare);
            assert_eq!(count(&shuffled), Some(expected));
            let ordered = reorder(&shuffled, &expected);
            let instances: Vec<usize> = ordered.iter().map(|f| f.instance).collect();
            assert_eq!(
                instances,
                vec![100, 101, 102, 110, 111, 112, 200, 201, 202, 210, 211, 212]
            );
        }
    }

    #[test]
    fn non_rectangular_is_rejected() {
        // slice 0 has 2 volumes, slice 1 has 1
        let frames = vec![frame_at(0., 1), frame_at(0., 2), frame_at(1., 3)];
        assert!(count(&frames).is_none());
    }

    #[test]
    fn sort_order() {
        let mut frames = vec![frame_at(2., 3), frame_at(0., 2), frame_at(1., 1)];
        frames[0].acq = 0;
        frames.sort_by(Frame::compare);
        let instances: Vec<usize> = frames.iter().map(|f| f.instance).collect();
        assert_eq!(instances, vec![3, 2, 1]);
    }

    #[test]
    fn separation_and_fallbacks() {
        let frames: Vec<Frame> = (0..4).map(|s| frame_at(2.5 * s as f64, s)).collect();
        assert_eq!(slice_separation(&frames, 4, SLICE_GAP_TOLERANCE, SLICE_SEPARATION_TOLERANCE), 2.5);

        let mut single = frame_at(0., 1);
        assert_eq!(slice_separation(&[single.clone()], 1, 1e-4, 2e-4), 1.0);
        single.slice_thickness = 3.0;
        assert_eq!(slice_separation(&[single.clone()], 1, 1e-4, 2e-4), 3.0);
        single.slice_spacing = 3.5;
        assert_eq!(slice_separation(&[single], 1, 1e-4, 2e-4), 3.5);
    }

    #[test]
    fn identity_rotation_preserves_gradient() {
        let g = Vector3::new(0.267, -0.535, 0.802);
        assert_eq!(rotate_gradient(&Matrix3::identity(), &g), g);
    }

    #[test]
    fn diffusion_scheme_conventions() {
        let mut b0 = frame_at(0., 1);
        b0.bvalue = 0.0;
        b0.g = Vector3::new(0.5, 0.5, 0.5);
        let mut dw = frame_at(0., 2);
        dw.bvalue = 1000.0;
        dw.g = Vector3::new(0.6, 0.0, 0.8);
        let scheme = dw_scheme(&[b0.clone(), dw.clone()], 1, &Matrix3::identity());
        assert_eq!(scheme, vec![[0., 0., 0., 0.], [-0.6, 0., 0.8, 1000.]]);

        dw.dw_scheme_wrt_image = true;
        let scheme = dw_scheme(&[dw], 1, &Matrix3::identity());
        assert_eq!(scheme, vec![[0.6, 0., -0.8, 1000.]]);

        assert!(dw_scheme(&[frame_at(0., 1)], 1, &Matrix3::identity()).is_empty());
    }

    #[test]
    fn phase_encoding_scheme() {
        let mut f = frame_at(0., 1);
        f.pe_axis = Some(1);
        f.pe_sign = -1;
        f.acq_dim = [96, 96];
        f.bandwidth_per_pixel_phase_encode = 20.0;
        let scheme = pe_scheme(&[f.clone(), f.clone()], 1);
        assert_eq!(scheme.len(), 2);
        assert_eq!(scheme[0][..3], [0., -1., 0.]);
        assert!((scheme[0][3] - 95.0 / 1920.0).abs() < 1e-12);

        f.bandwidth_per_pixel_phase_encode = f64::NAN;
        assert_eq!(pe_scheme(&[f.clone()], 1), vec![vec![0., -1., 0.]]);

        f.pe_axis = None;
        assert!(pe_scheme(&[f], 1).is_empty());
    }
}
