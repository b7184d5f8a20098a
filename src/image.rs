//! This module reads the content of one DICOM file into an [`Image`]: the
//! identification of the patient, study and series it belongs to, and the
//! list of frames it contributes.
//!
//! Elements are dispatched on their tag through a sorted static table,
//! so adding support for an attribute amounts to adding a row to the table
//! and an arm to [`Image`]'s handler.
//!
//! [`Image`]: ./struct.Image.html

use crate::dict::tag;
use crate::element::{Element, ElementReader, GROUP_SEQUENCE, ELEMENT_SEQUENCE_ITEM};
use crate::error::{DicomError, Result};
use crate::extension;
use crate::frame::{Frame, PixelRef};
use crate::util::{open_buffer, Buffer};
use nalgebra::Vector3;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    ImageType,
    StudyDate,
    SeriesDate,
    StudyTime,
    SeriesTime,
    AcquisitionTime,
    Modality,
    Manufacturer,
    StudyDescription,
    SeriesDescription,
    PatientName,
    PatientId,
    PatientBirthDate,
    SequenceName,
    SliceThickness,
    RepetitionTime,
    EchoTime,
    InversionTime,
    EchoIndex,
    SliceSpacing,
    PixelBandwidth,
    AcquisitionMatrix,
    PhaseEncodingDirection,
    FlipAngle,
    DiffusionDirectionality,
    DiffusionBValue,
    DiffusionGradient,
    ImagesInMosaic,
    SiemensBValue,
    SiemensGradient,
    BandwidthPerPixelPhaseEncode,
    MosaicTiming,
    GeGradient(usize),
    StudyUid,
    SeriesUid,
    StudyId,
    SeriesNumber,
    AcquisitionNumber,
    InstanceNumber,
    Position,
    Orientation,
    DimensionIndex,
    SamplesPerPixel,
    NumberOfFrames,
    Rows,
    Columns,
    PixelSpacing,
    BitsAllocated,
    PixelRepresentation,
    RescaleIntercept,
    RescaleSlope,
    CsaHeader,
    GeBValue,
    PhilipsBValue,
    PhilipsDirection,
    PhilipsGradient(usize),
    PixelData,
}

/// Recognized attributes, sorted by tag.
static ACTIONS: &[(u32, Action)] = &[
    (tag(0x0008, 0x0008), Action::ImageType),
    (tag(0x0008, 0x0020), Action::StudyDate),
    (tag(0x0008, 0x0021), Action::SeriesDate),
    (tag(0x0008, 0x0030), Action::StudyTime),
    (tag(0x0008, 0x0031), Action::SeriesTime),
    (tag(0x0008, 0x0032), Action::AcquisitionTime),
    (tag(0x0008, 0x0060), Action::Modality),
    (tag(0x0008, 0x0070), Action::Manufacturer),
    (tag(0x0008, 0x1030), Action::StudyDescription),
    (tag(0x0008, 0x103E), Action::SeriesDescription),
    (tag(0x0010, 0x0010), Action::PatientName),
    (tag(0x0010, 0x0020), Action::PatientId),
    (tag(0x0010, 0x0030), Action::PatientBirthDate),
    (tag(0x0018, 0x0024), Action::SequenceName),
    (tag(0x0018, 0x0050), Action::SliceThickness),
    (tag(0x0018, 0x0080), Action::RepetitionTime),
    (tag(0x0018, 0x0081), Action::EchoTime),
    (tag(0x0018, 0x0082), Action::InversionTime),
    (tag(0x0018, 0x0086), Action::EchoIndex),
    (tag(0x0018, 0x0088), Action::SliceSpacing),
    (tag(0x0018, 0x0095), Action::PixelBandwidth),
    (tag(0x0018, 0x1310), Action::AcquisitionMatrix),
    (tag(0x0018, 0x1312), Action::PhaseEncodingDirection),
    (tag(0x0018, 0x1314), Action::FlipAngle),
    (tag(0x0018, 0x9075), Action::DiffusionDirectionality),
    (tag(0x0018, 0x9087), Action::DiffusionBValue),
    (tag(0x0018, 0x9089), Action::DiffusionGradient),
    (tag(0x0019, 0x100A), Action::ImagesInMosaic),
    (tag(0x0019, 0x100C), Action::SiemensBValue),
    (tag(0x0019, 0x100E), Action::SiemensGradient),
    (tag(0x0019, 0x1028), Action::BandwidthPerPixelPhaseEncode),
    (tag(0x0019, 0x1029), Action::MosaicTiming),
    (tag(0x0019, 0x10BB), Action::GeGradient(0)),
    (tag(0x0019, 0x10BC), Action::GeGradient(1)),
    (tag(0x0019, 0x10BD), Action::GeGradient(2)),
    (tag(0x0020, 0x000D), Action::StudyUid),
    (tag(0x0020, 0x000E), Action::SeriesUid),
    (tag(0x0020, 0x0010), Action::StudyId),
    (tag(0x0020, 0x0011), Action::SeriesNumber),
    (tag(0x0020, 0x0012), Action::AcquisitionNumber),
    (tag(0x0020, 0x0013), Action::InstanceNumber),
    (tag(0x0020, 0x0032), Action::Position),
    (tag(0x0020, 0x0037), Action::Orientation),
    (tag(0x0020, 0x9157), Action::DimensionIndex),
    (tag(0x0028, 0x0002), Action::SamplesPerPixel),
    (tag(0x0028, 0x0008), Action::NumberOfFrames),
    (tag(0x0028, 0x0010), Action::Rows),
    (tag(0x0028, 0x0011), Action::Columns),
    (tag(0x0028, 0x0030), Action::PixelSpacing),
    (tag(0x0028, 0x0100), Action::BitsAllocated),
    (tag(0x0028, 0x0103), Action::PixelRepresentation),
    (tag(0x0028, 0x1052), Action::RescaleIntercept),
    (tag(0x0028, 0x1053), Action::RescaleSlope),
    (tag(0x0029, 0x1010), Action::CsaHeader),
    (tag(0x0029, 0x1020), Action::CsaHeader),
    (tag(0x0029, 0x1110), Action::CsaHeader),
    (tag(0x0029, 0x1120), Action::CsaHeader),
    (tag(0x0029, 0x1210), Action::CsaHeader),
    (tag(0x0029, 0x1220), Action::CsaHeader),
    (tag(0x0043, 0x1039), Action::GeBValue),
    (tag(0x2001, 0x1003), Action::PhilipsBValue),
    (tag(0x2001, 0x1004), Action::PhilipsDirection),
    (tag(0x2005, 0x10B0), Action::PhilipsGradient(0)),
    (tag(0x2005, 0x10B1), Action::PhilipsGradient(1)),
    (tag(0x2005, 0x10B2), Action::PhilipsGradient(2)),
    (tag(0x7FE0, 0x0010), Action::PixelData),
];

impl Action {
    /// Whether the element is private to Siemens equipment.
    fn is_siemens_private(self) -> bool {
        matches!(
            self,
            Action::ImagesInMosaic
                | Action::SiemensBValue
                | Action::SiemensGradient
                | Action::BandwidthPerPixelPhaseEncode
                | Action::MosaicTiming
        )
    }
}

fn action_for(group: u16, element: u16) -> Option<Action> {
    let t = tag(group, element);
    ACTIONS
        .binary_search_by_key(&t, |(k, _)| *k)
        .ok()
        .map(|i| ACTIONS[i].1)
}

/// Group and element of the per-frame functional groups sequence.
const PER_FRAME_SEQUENCE: (u16, u16) = (0x5200, 0x9230);

/// GE stores b-values with a large offset in some software versions.
const GE_BVALUE_OFFSET: i32 = 1_000_000_000;

/// The contents of one DICOM file.
#[derive(Debug, Clone, Default)]
pub struct Image {
    /// file name, for diagnostics
    pub filename: String,
    /// patient name
    pub patient_name: String,
    /// patient ID
    pub patient_id: String,
    /// patient date of birth
    pub patient_dob: String,
    /// study description
    pub study_description: String,
    /// study ID
    pub study_id: String,
    /// study instance UID
    pub study_uid: String,
    /// study date
    pub study_date: String,
    /// study time
    pub study_time: String,
    /// series description
    pub series_description: String,
    /// series instance UID
    pub series_uid: String,
    /// series date
    pub series_date: String,
    /// series time
    pub series_time: String,
    /// modality (e.g. "MR")
    pub modality: String,
    /// manufacturer of the equipment
    pub manufacturer: String,
    /// image type values
    pub image_type: Vec<String>,
    /// number of frames declared by a multi-frame image
    pub number_of_frames: usize,
    /// frames of this file, in file order
    pub frames: Vec<Frame>,
}

/// Parsing state for one file.
struct ImageParser {
    image: Image,
    current: Frame,
    in_frames: bool,
    frame_offset: usize,
    pixel_data: Option<(usize, usize)>,
}

impl Image {
    /// Read the file at the given path. See [`Image::read`].
    ///
    /// [`Image::read`]: #method.read
    pub fn open<P: AsRef<Path>>(path: P, force_read: bool) -> Result<Image> {
        let name = path.as_ref().to_string_lossy().into_owned();
        let buffer = open_buffer(&path)?;
        Image::read(buffer, name, force_read)
    }

    /// Read the elements of a DICOM file held in memory. Errors concerning
    /// individual elements are logged and do not interrupt the reading;
    /// errors in the structure of the file are returned.
    pub fn read<S: Into<String>>(buffer: Arc<Buffer>, name: S, force_read: bool) -> Result<Image> {
        let name = name.into();
        let mut reader = ElementReader::new(buffer.clone(), name.clone(), force_read)?;
        let mut parser = ImageParser {
            image: Image {
                filename: name,
                ..Image::default()
            },
            current: Frame::default(),
            in_frames: false,
            frame_offset: 0,
            pixel_data: None,
        };

        while reader.read()? {
            parser.parse_element(&reader.element());
        }

        parser.current.transfer_syntax_supported = reader.transfer_syntax_supported();
        Ok(parser.finish(&buffer))
    }

    /// Whether the image was acquired with the given manufacturer's
    /// equipment.
    pub fn is_manufacturer(&self, prefix: &str) -> bool {
        self.manufacturer
            .to_ascii_uppercase()
            .starts_with(&prefix.to_ascii_uppercase())
    }
}

impl ImageParser {
    fn parse_element(&mut self, e: &Element) {
        if e.ignore_when_parsing() {
            return;
        }
        if e.is_in_series_ref_sequence() {
            self.current.ignore_series_num = true;
            return;
        }

        if e.is(GROUP_SEQUENCE, ELEMENT_SEQUENCE_ITEM) {
            let per_frame = e
                .parent_sequence()
                .map(|s| (s.group, s.element) == PER_FRAME_SEQUENCE)
                .unwrap_or(false);
            if per_frame {
                if self.in_frames {
                    self.push_frame();
                } else {
                    self.in_frames = true;
                }
            }
            return;
        }

        let action = match action_for(e.group, e.element) {
            Some(action) => action,
            None => return,
        };
        if let Err(err) = self.apply(action, e) {
            warn!(
                "error reading DICOM element ({:04X},{:04X}) in file \"{}\": {}",
                e.group, e.element, self.image.filename, err
            );
        }
    }

    fn push_frame(&mut self) {
        self.current.calc_distance();
        let mut frame = self.current.clone();
        frame.frame_offset = self.frame_offset;
        self.frame_offset += self.current.data_size();
        self.image.frames.push(frame);
    }

    fn apply(&mut self, action: Action, e: &Element) -> Result<()> {
        let image = &mut self.image;
        let f = &mut self.current;
        if action.is_siemens_private() && !image.is_manufacturer("SIEMENS") {
            return Ok(());
        }
        match action {
            Action::ImageType => image.image_type = e.get_string()?,
            Action::StudyDate => image.study_date = e.first_string()?,
            Action::SeriesDate => image.series_date = e.first_string()?,
            Action::StudyTime => image.study_time = e.first_string()?,
            Action::SeriesTime => image.series_time = e.first_string()?,
            Action::AcquisitionTime => f.acquisition_time = e.get_time()?,
            Action::Modality => image.modality = e.first_string()?,
            Action::Manufacturer => image.manufacturer = e.first_string()?,
            Action::StudyDescription => image.study_description = e.first_string()?,
            Action::SeriesDescription => image.series_description = e.first_string()?,
            Action::PatientName => image.patient_name = e.first_string()?,
            Action::PatientId => image.patient_id = e.first_string()?,
            Action::PatientBirthDate => image.patient_dob = e.first_string()?,
            Action::SequenceName => {
                let name = e.first_string()?;
                let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
                if digits > 0 {
                    if let Ok(index) = name[name.len() - digits..].parse() {
                        f.sequence = index;
                    }
                }
            }
            Action::SliceThickness => f.slice_thickness = e.first_float()?,
            Action::RepetitionTime => f.repetition_time = e.first_float()?,
            Action::EchoTime => f.echo_time = e.first_float()?,
            Action::InversionTime => f.inversion_time = e.first_float()?,
            Action::EchoIndex => f.echo_index = e.first_uint()? as usize,
            Action::SliceSpacing => f.slice_spacing = e.first_float()?,
            Action::PixelBandwidth => f.pixel_bandwidth = e.first_float()?,
            Action::AcquisitionMatrix => {
                let v = e.get_uint()?;
                if v.len() < 4 {
                    return Err(DicomError::MissingValue(e.group, e.element, 4));
                }
                f.acq_dim = [(v[1] + v[3]) as usize, (v[0] + v[2]) as usize];
            }
            Action::PhaseEncodingDirection => {
                f.pe_axis = match e.first_string()?.as_str() {
                    "ROW" => Some(0),
                    "COL" => Some(1),
                    _ => None,
                }
            }
            Action::FlipAngle => f.flip_angle = e.first_float()?,
            Action::DiffusionDirectionality => {
                f.is_isotropic = e.first_string()? == "ISOTROPIC";
            }
            Action::DiffusionBValue | Action::SiemensBValue | Action::PhilipsBValue => {
                f.bvalue = e.first_float()?;
            }
            Action::DiffusionGradient | Action::SiemensGradient => {
                let g = e.floats(3)?;
                f.g = Vector3::new(g[0], g[1], g[2]);
            }
            Action::ImagesInMosaic => f.images_in_mosaic = e.first_uint()? as usize,
            Action::BandwidthPerPixelPhaseEncode => {
                f.bandwidth_per_pixel_phase_encode = e.first_float()?;
            }
            Action::MosaicTiming => f.mosaic_slices_timing = e.get_float()?,
            Action::GeGradient(axis) => {
                if image.is_manufacturer("GE") {
                    f.g[axis] = e.first_float()?;
                    f.dw_scheme_wrt_image = true;
                }
            }
            Action::GeBValue => {
                if image.is_manufacturer("GE") {
                    let b = e.get_int()?.first().copied().unwrap_or(0);
                    f.bvalue = f64::from(if b >= GE_BVALUE_OFFSET { b - GE_BVALUE_OFFSET } else { b });
                }
            }
            Action::StudyUid => image.study_uid = e.first_string()?,
            Action::SeriesUid => image.series_uid = e.first_string()?,
            Action::StudyId => image.study_id = e.first_string()?,
            Action::SeriesNumber => f.series_num = e.first_uint()? as usize,
            Action::AcquisitionNumber => f.acq = e.first_uint()? as usize,
            Action::InstanceNumber => f.instance = e.first_uint()? as usize,
            Action::Position => {
                let p = e.floats(3)?;
                f.position_vector = Vector3::new(p[0], p[1], p[2]);
            }
            Action::Orientation => {
                let v = e.floats(6)?;
                f.orientation_x = Vector3::new(v[0], v[1], v[2]).normalize();
                f.orientation_y = Vector3::new(v[3], v[4], v[5]).normalize();
            }
            Action::DimensionIndex => f.index = e.get_uint()?,
            Action::SamplesPerPixel => f.samples_per_pixel = e.first_uint()?,
            Action::NumberOfFrames => image.number_of_frames = e.first_uint()? as usize,
            Action::Rows => f.dim[1] = e.first_uint()? as usize,
            Action::Columns => f.dim[0] = e.first_uint()? as usize,
            Action::PixelSpacing => {
                let v = e.floats(2)?;
                f.pixel_size = [v[1], v[0]];
            }
            Action::BitsAllocated => f.bits_alloc = e.first_uint()?,
            Action::PixelRepresentation => f.signed = e.first_uint()? == 1,
            Action::RescaleIntercept => f.scale_intercept = e.first_float()?,
            Action::RescaleSlope => f.scale_slope = e.first_float()?,
            Action::CsaHeader => extension::decode_into(e.data, f)?,
            Action::PhilipsDirection => f.is_isotropic = e.first_string()? == "I",
            Action::PhilipsGradient(axis) => f.g[axis] = e.first_float()?,
            Action::PixelData => {
                // only the top-level pixel data belongs to this image
                if e.parents.is_empty() {
                    f.endianness = e.endianness;
                    f.pixel_encapsulated = e.is_encapsulated_pixel_data();
                    self.pixel_data = Some((e.offset, e.data.len()));
                }
            }
        }
        Ok(())
    }

    fn finish(mut self, buffer: &Arc<Buffer>) -> Image {
        if self.in_frames {
            self.push_frame();
        } else {
            self.current.calc_distance();
            self.image.frames.push(self.current.clone());
        }

        let (offset, size) = match self.pixel_data {
            Some(location) => location,
            None => {
                debug!("no pixel data found in file \"{}\"", self.image.filename);
                self.image.frames.clear();
                return self.image;
            }
        };

        if self.image.number_of_frames > 1 && self.image.frames.len() != self.image.number_of_frames {
            warn!(
                "number of frames in file \"{}\" does not match its per-frame information ({} vs {})",
                self.image.filename,
                self.image.number_of_frames,
                self.image.frames.len()
            );
        }

        // a single frame spans the whole element, which may hold more
        // samples than declared
        let whole_element = !self.in_frames;
        let current = &self.current;
        for frame in &mut self.image.frames {
            frame.endianness = current.endianness;
            frame.transfer_syntax_supported = current.transfer_syntax_supported;
            frame.pixel_encapsulated = current.pixel_encapsulated;
            let len = if frame.pixel_encapsulated || whole_element {
                size
            } else {
                frame.data_size()
            };
            frame.pixel = Some(PixelRef {
                buffer: buffer.clone(),
                offset: offset + frame.frame_offset,
                len,
            });
        }
        self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_table_is_sorted() {
        assert!(ACTIONS.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn action_lookup() {
        assert_eq!(action_for(0x0028, 0x0010), Some(Action::Rows));
        assert_eq!(action_for(0x0019, 0x10BC), Some(Action::GeGradient(1)));
        assert_eq!(action_for(0x0028, 0x0004), None);
    }
}
