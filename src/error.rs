//! Types for error handling go here.
use crate::typedef::Vr;
use quick_error::quick_error;
use std::io::Error as IOError;

quick_error! {
    /// Error type for all error variants originated by this crate.
    #[derive(Debug)]
    pub enum DicomError {
        /// The file is not a DICOM file, or it was not recognized as one.
        NotDicom(name: String) {
            display("file \"{}\" does not have the DICOM magic number or the .dcm extension", name)
        }
        /// The buffer is too small to hold a DICOM file.
        TooSmall(name: String) {
            display("file \"{}\" is too small to be a DICOM file", name)
        }
        /// An element declares more data than the buffer holds.
        Truncated(name: String, group: u16, element: u16) {
            display("file \"{}\" is too small to contain DICOM element ({:04X},{:04X})", name, group, element)
        }
        /// Byte-swapped group found while reading little endian data.
        InvalidGroup(name: String, group: u16) {
            display("invalid DICOM group ID {:04X} in file \"{}\"", group, name)
        }
        /// The transfer syntax cannot be parsed at all (e.g. deflated data sets).
        UnsupportedTransferSyntax(uid: String) {
            display("unsupported DICOM transfer syntax \"{}\"", uid)
        }
        /// The value representation cannot be interpreted as the requested type.
        UnexpectedVr(group: u16, element: u16, vr: Vr) {
            display("unexpected VR {} for DICOM element ({:04X},{:04X})", vr, group, element)
        }
        /// The element holds fewer values than required.
        MissingValue(group: u16, element: u16, expected: usize) {
            display("expected at least {} values in DICOM element ({:04X},{:04X})", expected, group, element)
        }
        /// A textual value could not be parsed as a number.
        InvalidNumber(text: String) {
            display("could not parse \"{}\" as a number", text)
        }
        /// A vendor extension block is malformed.
        InvalidExtension(reason: &'static str) {
            display("malformed vendor extension: {}", reason)
        }
        /// No usable frames were left for reconstruction.
        NoFrames {
            display("no DICOM frames available for reconstruction")
        }
        /// The frames do not form a rectangular grid.
        DimensionMismatch(series: String) {
            display("dimensions mismatch in DICOM series \"{}\"", series)
        }
        /// Frames disagree on their in-plane geometry.
        InconsistentFrames(series: String) {
            display("DICOM frames of series \"{}\" have inconsistent image dimensions", series)
        }
        /// Bit depth other than 8 or 16 bits.
        UnsupportedBitsAllocated(bits: u32) {
            display("unexpected number of allocated bits per pixel ({})", bits)
        }
        /// Mosaic and per-frame variable scaling at the same time.
        MosaicWithVariableScaling {
            display("unable to load series due to inconsistent data scaling between DICOM mosaic frames")
        }
        /// A retained frame uses a transfer syntax that cannot be read.
        UnsupportedPixelEncoding(series: String) {
            display("unsupported transfer syntax found in DICOM data for series \"{}\" (compressed data?)", series)
        }
        /// A frame's pixel data lies outside its file.
        MissingPixelData(name: String) {
            display("pixel data for file \"{}\" is missing or truncated", name)
        }
        /// More than one series was found where exactly one is needed.
        AmbiguousSeries(count: usize) {
            display("found {} DICOM series where exactly one is required", count)
        }
        /// Attempted to read a voxel outside the volume.
        OutOfBounds(coords: Vec<usize>) {
            display("out of bounds access to volume: {:?}", &coords[..])
        }
        /// Coordinates do not match the volume's number of dimensions.
        IncorrectVolumeDimensionality(expected: usize, got: usize) {
            display("unexpected volume dimensionality: expected {}, got {}", expected, got)
        }
        /// I/O Error
        Io(err: IOError) {
            from()
            source(err)
        }
    }
}

/// Alias type for results originated from this crate.
pub type Result<T> = ::std::result::Result<T, DicomError>;
