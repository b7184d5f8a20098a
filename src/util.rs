//! Private utility module
use crate::error::Result;
use byteordered::{ByteOrdered, Endianness};
use flate2::bufread::GzDecoder;
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

/// The raw contents of one input file. Frames refer into this buffer by
/// offset, and keep it alive through reference counting.
#[derive(Debug)]
pub enum Buffer {
    /// A read-only memory mapping of an uncompressed file.
    Mapped(Mmap),
    /// An owned buffer, from decompression or built in memory.
    Owned(Vec<u8>),
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Buffer::Mapped(m) => &m[..],
            Buffer::Owned(v) => &v[..],
        }
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Buffer::Owned(data)
    }
}

/// Open the file at the given path as a shared buffer. Files ending in
/// ".gz" are decoded in full, other files are memory-mapped.
pub fn open_buffer<P: AsRef<Path>>(path: P) -> Result<Arc<Buffer>> {
    let file = File::open(&path)?;
    if is_gz_file(&path) {
        let mut data = Vec::new();
        let _ = GzDecoder::new(BufReader::new(file)).read_to_end(&mut data)?;
        Ok(Arc::new(Buffer::Owned(data)))
    } else {
        // the mapping is read-only and the file is not expected to be
        // modified for the duration of the reconstruction
        let map = unsafe { Mmap::map(&file)? };
        Ok(Arc::new(Buffer::Mapped(map)))
    }
}

/// Check whether the file's path ends with ".gz".
pub fn is_gz_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .map(|a| a.to_string_lossy().ends_with(".gz"))
        .unwrap_or(false)
}

/// Check whether the file's name looks like a DICOM file (".dcm", possibly
/// followed by ".gz").
pub fn has_dicom_suffix(name: &str) -> bool {
    let name = name.strip_suffix(".gz").unwrap_or(name);
    name.to_ascii_lowercase().ends_with(".dcm")
}

/// Endianness from the big endian flag used by the element reader.
#[inline]
pub fn endianness_of(big_endian: bool) -> Endianness {
    if big_endian {
        Endianness::Big
    } else {
        Endianness::Little
    }
}

/// Fetch an unsigned 16-bit value at the given offset. Callers must have
/// checked the bounds.
#[inline]
pub fn fetch_u16(data: &[u8], offset: usize, endianness: Endianness) -> u16 {
    let bytes = [data[offset], data[offset + 1]];
    match endianness {
        Endianness::Little => u16::from_le_bytes(bytes),
        Endianness::Big => u16::from_be_bytes(bytes),
    }
}

/// Fetch an unsigned 32-bit value at the given offset. Callers must have
/// checked the bounds.
#[inline]
pub fn fetch_u32(data: &[u8], offset: usize, endianness: Endianness) -> u32 {
    let bytes = [
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ];
    match endianness {
        Endianness::Little => u32::from_le_bytes(bytes),
        Endianness::Big => u32::from_be_bytes(bytes),
    }
}

/// Read a sequence of values of fixed size from the given bytes, ignoring
/// a trailing incomplete value.
pub fn read_values<T, F>(data: &[u8], size: usize, endianness: Endianness, mut f: F) -> Vec<T>
where
    F: FnMut(&mut ByteOrdered<&[u8], Endianness>) -> std::io::Result<T>,
{
    let n = data.len() / size;
    let mut reader = ByteOrdered::runtime(data, endianness);
    (0..n).filter_map(|_| f(&mut reader).ok()).collect()
}

/// Format a floating point value for key/value metadata.
pub fn format_value(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Produce a single value if all entries agree, or a comma-separated list of
/// per-volume values otherwise. Returns `None` if no finite value is present.
pub fn summarize(values: &[f64]) -> Option<String> {
    if values.is_empty() || values.iter().all(|v| !v.is_finite()) {
        return None;
    }
    let first = values[0];
    if values.iter().all(|v| *v == first) {
        return Some(format_value(first));
    }
    Some(
        values
            .iter()
            .map(|v| format_value(*v))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Append a line to a multi-line text entry.
pub fn add_line(text: &mut String, line: &str) {
    if !text.is_empty() {
        text.push('\n');
    }
    text.push_str(line);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gz_and_dcm_suffixes() {
        assert!(is_gz_file("/path/to/image.dcm.gz"));
        assert!(!is_gz_file("/path/to/image.dcm"));
        assert!(!is_gz_file("/path/to/image_gz"));
        assert!(has_dicom_suffix("IM0001.DCM"));
        assert!(has_dicom_suffix("IM0001.dcm.gz"));
        assert!(!has_dicom_suffix("IM0001"));
    }

    #[test]
    fn fetch_with_endianness() {
        let data = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(fetch_u16(&data, 0, Endianness::Little), 0x0201);
        assert_eq!(fetch_u16(&data, 0, Endianness::Big), 0x0102);
        assert_eq!(fetch_u32(&data, 0, Endianness::Little), 0x0403_0201);
        assert_eq!(fetch_u32(&data, 0, Endianness::Big), 0x0102_0304);
    }

    #[test]
    fn read_u16_values() {
        let data = [0x01, 0x00, 0x02, 0x00, 0x03];
        let v = read_values(&data, 2, Endianness::Little, |r| r.read_u16());
        assert_eq!(v, vec![1, 2]);
    }

    #[test]
    fn summaries() {
        assert_eq!(summarize(&[30., 30., 30.]).unwrap(), "30");
        assert_eq!(summarize(&[0.5, 0.75]).unwrap(), "0.5,0.75");
        assert_eq!(summarize(&[f64::NAN, f64::NAN]), None);
        assert_eq!(summarize(&[]), None);
    }

    #[test]
    fn lines() {
        let mut text = String::new();
        add_line(&mut text, "a");
        add_line(&mut text, "b");
        assert_eq!(text, "a\nb");
    }
}
