//! This module defines the DICOM element reader, which turns the raw bytes
//! of one DICOM file into a forward-only stream of data elements.
//!
//! The reader works on a shared [`Buffer`] (usually a memory mapping of the
//! file) and never copies element values: each [`Element`] borrows its
//! bytes from the buffer and is only valid until the next call to
//! [`ElementReader::read`].
//!
//! # Example
//!
//! ```no_run
//! use dicom_recon::element::ElementReader;
//! use dicom_recon::util::open_buffer;
//! # use dicom_recon::Result;
//!
//! # fn run() -> Result<()> {
//! let buffer = open_buffer("IM0001.dcm")?;
//! let mut reader = ElementReader::new(buffer, "IM0001.dcm", false)?;
//! while reader.read()? {
//!     let e = reader.element();
//!     println!("({:04X},{:04X}) {} {}", e.group, e.element, e.vr, e.tag_name());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! [`Buffer`]: ../util/enum.Buffer.html
//! [`Element`]: ./struct.Element.html
//! [`ElementReader::read`]: ./struct.ElementReader.html#method.read

use crate::dict;
use crate::error::{DicomError, Result};
use crate::typedef::Vr;
use crate::util::{endianness_of, fetch_u16, fetch_u32, has_dicom_suffix, read_values, Buffer};
use byteordered::Endianness;
use std::sync::Arc;
use tracing::{debug, info};

/// Length value denoting a sequence or item delimited by an explicit tag.
pub const LENGTH_UNDEFINED: u32 = 0xFFFF_FFFF;

/// Group of the file meta information, always explicit little endian.
pub const GROUP_BYTE_ORDER: u16 = 0x0002;
/// Byte-swapped value of `GROUP_BYTE_ORDER`.
const GROUP_BYTE_ORDER_SWAPPED: u16 = 0x0200;
/// Group of item and delimitation tags.
pub const GROUP_SEQUENCE: u16 = 0xFFFE;
/// Item tag.
pub const ELEMENT_SEQUENCE_ITEM: u16 = 0xE000;
/// Item delimitation tag.
pub const ELEMENT_ITEM_DELIMITATION: u16 = 0xE00D;
/// Sequence delimitation tag.
pub const ELEMENT_SEQUENCE_DELIMITATION: u16 = 0xE0DD;
/// Group of the pixel data element.
pub const GROUP_DATA: u16 = 0x7FE0;
/// Element number of the pixel data element.
pub const ELEMENT_DATA: u16 = 0x0010;

const MAGIC_OFFSET: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const MIN_FILE_SIZE: usize = 256;

const TS_EXPLICIT_LE: &str = "1.2.840.10008.1.2.1";
const TS_EXPLICIT_BE: &str = "1.2.840.10008.1.2.2";
const TS_IMPLICIT_LE: &str = "1.2.840.10008.1.2";
const TS_DEFLATED_LE: &str = "1.2.840.10008.1.2.1.99";

/// An open sequence or item enclosing the current element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sequence {
    /// group number of the sequence (0xFFFE for items)
    pub group: u16,
    /// element number of the sequence
    pub element: u16,
    /// absolute offset where the sequence ends, or `None` for undefined
    /// length sequences terminated by a delimitation tag
    pub end: Option<usize>,
}

impl Sequence {
    fn is_item(&self) -> bool {
        self.group == GROUP_SEQUENCE
    }
}

/// A DICOM data element, as decoded by the element reader.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    /// group number
    pub group: u16,
    /// element number
    pub element: u16,
    /// value representation (UN when unknown)
    pub vr: Vr,
    /// declared length, possibly `LENGTH_UNDEFINED`
    pub size: u32,
    /// absolute offset of the value in the file
    pub offset: usize,
    /// the value bytes (empty for sequences of undefined length)
    pub data: &'a [u8],
    /// byte order of the value
    pub endianness: Endianness,
    /// open sequences and items enclosing this element, outermost first
    pub parents: &'a [Sequence],
}

impl<'a> Element<'a> {
    /// Whether this element is the given tag.
    #[inline]
    pub fn is(&self, group: u16, element: u16) -> bool {
        self.group == group && self.element == element
    }

    /// The attribute's name, or an empty string if not in the dictionary.
    pub fn tag_name(&self) -> &'static str {
        dict::lookup(self.group, self.element)
            .map(|e| e.name)
            .unwrap_or("")
    }

    /// Whether this element opens a new sequence.
    pub fn is_new_sequence(&self) -> bool {
        self.vr == Vr::SQ || self.is_encapsulated_pixel_data()
    }

    /// Whether this element is pixel data in encapsulated (compressed) form.
    pub fn is_encapsulated_pixel_data(&self) -> bool {
        self.is(GROUP_DATA, ELEMENT_DATA) && self.size == LENGTH_UNDEFINED
    }

    /// Whether this element should not be interpreted: it lives within a
    /// private sequence which is not known to carry relevant data.
    pub fn ignore_when_parsing(&self) -> bool {
        self.parents.iter().any(|seq| {
            seq.group & 1 == 1 && !dict::is_whitelisted_private_sequence(seq.group, seq.element)
        })
    }

    /// Whether this element lies within a sequence referring to another
    /// series.
    pub fn is_in_series_ref_sequence(&self) -> bool {
        self.parents
            .iter()
            .any(|seq| dict::is_series_reference_sequence(seq.group, seq.element))
    }

    /// The innermost enclosing sequence that is not an item.
    pub fn parent_sequence(&self) -> Option<&'a Sequence> {
        self.parents.iter().rev().find(|s| !s.is_item())
    }

    fn unexpected_vr(&self) -> DicomError {
        DicomError::UnexpectedVr(self.group, self.element, self.vr)
    }

    /// Interpret the value as a list of unsigned integers.
    pub fn get_uint(&self) -> Result<Vec<u32>> {
        let e = self.endianness;
        match self.vr {
            Vr::UL => Ok(read_values(self.data, 4, e, |r| r.read_u32())),
            Vr::US => Ok(read_values(self.data, 2, e, |r| r.read_u16().map(u32::from))),
            Vr::SL | Vr::SS | Vr::IS => self
                .get_int()?
                .into_iter()
                .map(|v| {
                    if v < 0 {
                        Err(DicomError::InvalidNumber(v.to_string()))
                    } else {
                        Ok(v as u32)
                    }
                })
                .collect(),
            _ => Err(self.unexpected_vr()),
        }
    }

    /// Interpret the value as a list of signed integers.
    pub fn get_int(&self) -> Result<Vec<i32>> {
        let e = self.endianness;
        match self.vr {
            Vr::SL => Ok(read_values(self.data, 4, e, |r| r.read_i32())),
            Vr::SS => Ok(read_values(self.data, 2, e, |r| r.read_i16().map(i32::from))),
            Vr::UL => Ok(read_values(self.data, 4, e, |r| r.read_u32().map(|v| v as i32))),
            Vr::US => Ok(read_values(self.data, 2, e, |r| r.read_u16().map(i32::from))),
            Vr::IS | Vr::DS => self
                .get_string()?
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| parse_int(s))
                .collect(),
            _ => Err(self.unexpected_vr()),
        }
    }

    /// Interpret the value as a list of floating point numbers.
    pub fn get_float(&self) -> Result<Vec<f64>> {
        let e = self.endianness;
        match self.vr {
            Vr::FD | Vr::OD => Ok(read_values(self.data, 8, e, |r| r.read_f64())),
            Vr::FL | Vr::OF => Ok(read_values(self.data, 4, e, |r| r.read_f32().map(f64::from))),
            Vr::DS | Vr::IS => self
                .get_string()?
                .iter()
                .filter(|s| !s.is_empty())
                .map(|s| parse_float(s))
                .collect(),
            Vr::SL | Vr::SS | Vr::UL | Vr::US => {
                Ok(self.get_int()?.into_iter().map(f64::from).collect())
            }
            _ => Err(self.unexpected_vr()),
        }
    }

    /// Interpret the value as a list of strings, split on the backslash
    /// delimiter and trimmed of padding.
    pub fn get_string(&self) -> Result<Vec<String>> {
        if !self.vr.is_text() && self.vr != Vr::UN && self.vr != Vr::OB {
            return Err(self.unexpected_vr());
        }
        let text = String::from_utf8_lossy(self.data);
        Ok(text
            .split('\\')
            .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
            .collect())
    }

    /// The first unsigned integer of the value.
    pub fn first_uint(&self) -> Result<u32> {
        self.get_uint()?
            .first()
            .copied()
            .ok_or(DicomError::MissingValue(self.group, self.element, 1))
    }

    /// The first floating point number of the value.
    pub fn first_float(&self) -> Result<f64> {
        self.get_float()?
            .first()
            .copied()
            .ok_or(DicomError::MissingValue(self.group, self.element, 1))
    }

    /// The first `n` floating point numbers of the value.
    pub fn floats(&self, n: usize) -> Result<Vec<f64>> {
        let v = self.get_float()?;
        if v.len() < n {
            return Err(DicomError::MissingValue(self.group, self.element, n));
        }
        Ok(v)
    }

    /// The first string of the value.
    pub fn first_string(&self) -> Result<String> {
        Ok(self.get_string()?.into_iter().next().unwrap_or_default())
    }

    /// Interpret a TM value as the number of seconds since midnight.
    pub fn get_time(&self) -> Result<f64> {
        parse_time(&self.first_string()?)
    }
}

fn parse_int(text: &str) -> Result<i32> {
    let t = text.trim_start_matches('+');
    t.parse::<i32>()
        .or_else(|_| t.parse::<f64>().map(|v| v.round() as i32))
        .map_err(|_| DicomError::InvalidNumber(text.to_string()))
}

fn parse_float(text: &str) -> Result<f64> {
    text.trim_start_matches('+')
        .parse::<f64>()
        .map_err(|_| DicomError::InvalidNumber(text.to_string()))
}

/// Parse a DICOM time (`HHMMSS.FFFFFF`, or the legacy `HH:MM:SS.FFFFFF`)
/// into seconds since midnight.
pub fn parse_time(text: &str) -> Result<f64> {
    let invalid = || DicomError::InvalidNumber(text.to_string());
    let compact: String = text.chars().filter(|c| *c != ':').collect();
    let (whole, fraction) = match compact.find('.') {
        Some(p) => (&compact[..p], &compact[p..]),
        None => (&compact[..], ""),
    };
    if whole.len() < 2 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let field = |range: std::ops::Range<usize>| -> Result<f64> {
        match whole.get(range) {
            Some(s) if !s.is_empty() => s.parse::<f64>().map_err(|_| invalid()),
            _ => Ok(0.0),
        }
    };
    let seconds = field(0..2)? * 3600.0 + field(2..4)? * 60.0 + field(4..6)?;
    let fraction = if fraction.len() > 1 {
        fraction.parse::<f64>().map_err(|_| invalid())?
    } else {
        0.0
    };
    Ok(seconds + fraction)
}

/// A forward-only reader of DICOM data elements over one file's bytes.
#[derive(Debug)]
pub struct ElementReader {
    buffer: Arc<Buffer>,
    name: String,
    next: usize,
    explicit: bool,
    transfer_syntax_be: bool,
    transfer_syntax_supported: bool,
    parents: Vec<Sequence>,
    // number of parents enclosing the current element
    depth: usize,
    // current element
    group: u16,
    element: u16,
    vr: Vr,
    size: u32,
    big_endian: bool,
    data_start: usize,
    data_end: usize,
}

impl ElementReader {
    /// Prepare to read the elements of a DICOM file held in `buffer`.
    /// `name` is used for diagnostics and for recognizing files without the
    /// DICOM preamble, which are only accepted when the name ends in ".dcm"
    /// or `force_read` is set.
    pub fn new<S: Into<String>>(buffer: Arc<Buffer>, name: S, force_read: bool) -> Result<Self> {
        let name = name.into();
        if buffer.len() < MIN_FILE_SIZE {
            return Err(DicomError::TooSmall(name));
        }

        let mut next = 0;
        if &buffer[MAGIC_OFFSET..MAGIC_OFFSET + 4] != MAGIC {
            debug!(
                "DICOM magic number not found in file \"{}\" - trying truncated format",
                name
            );
            if !force_read && !has_dicom_suffix(&name) {
                return Err(DicomError::NotDicom(name));
            }
        } else {
            next = MAGIC_OFFSET + 4;
        }

        // peek at the first element to determine VR explicitness
        let explicit = match buffer.get(next + 4..next + 6) {
            Some(code) => Vr::from_bytes([code[0], code[1]]).is_some(),
            None => return Err(DicomError::TooSmall(name)),
        };

        Ok(ElementReader {
            buffer,
            name,
            next,
            explicit,
            transfer_syntax_be: false,
            transfer_syntax_supported: true,
            parents: Vec::new(),
            depth: 0,
            group: 0,
            element: 0,
            vr: Vr::UN,
            size: 0,
            big_endian: false,
            data_start: 0,
            data_end: 0,
        })
    }

    /// The name of the file being read.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared buffer being read.
    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    /// Whether the transfer syntax of the file can be read by this crate.
    pub fn transfer_syntax_supported(&self) -> bool {
        self.transfer_syntax_supported
    }

    /// Whether the data set is encoded with explicit VR.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether the data set is encoded in big endian byte order.
    pub fn is_big_endian(&self) -> bool {
        self.transfer_syntax_be
    }

    /// The element most recently read.
    pub fn element(&self) -> Element<'_> {
        Element {
            group: self.group,
            element: self.element,
            vr: self.vr,
            size: self.size,
            offset: self.data_start,
            data: &self.buffer[self.data_start..self.data_end],
            endianness: endianness_of(self.big_endian),
            parents: &self.parents[..self.depth],
        }
    }

    /// Read the group and element numbers at the cursor. Returns `false`
    /// if the end of the buffer was reached.
    fn read_gr_el(&mut self, start: usize) -> Result<bool> {
        if start + 8 > self.buffer.len() {
            return Ok(false);
        }
        self.big_endian = self.transfer_syntax_be;
        let mut group = fetch_u16(&self.buffer, start, endianness_of(self.big_endian));
        if group == GROUP_BYTE_ORDER_SWAPPED {
            if !self.big_endian {
                return Err(DicomError::InvalidGroup(self.name.clone(), group));
            }
            self.big_endian = false;
            group = GROUP_BYTE_ORDER;
        }
        self.group = group;
        self.element = fetch_u16(&self.buffer, start + 2, endianness_of(self.big_endian));
        Ok(true)
    }

    /// Advance to the next element. Returns `Ok(false)` when there are no
    /// more elements in the file.
    pub fn read(&mut self) -> Result<bool> {
        let start = self.next;

        // close sequences and items whose extent has been fully traversed
        while let Some(end) = self.parents.last().and_then(|s| s.end) {
            if start >= end {
                let _ = self.parents.pop();
            } else {
                break;
            }
        }
        self.depth = self.parents.len();

        if !self.read_gr_el(start)? {
            return Ok(false);
        }
        let e = endianness_of(self.big_endian);

        let mut data = start + 4;
        if self.group == GROUP_SEQUENCE {
            self.vr = Vr::UN;
            self.size = fetch_u32(&self.buffer, start + 4, e);
            data += 4;
        } else if self.explicit || self.group == GROUP_BYTE_ORDER {
            let code = [self.buffer[start + 4], self.buffer[start + 5]];
            self.vr = Vr::from_bytes(code).unwrap_or(Vr::UN);
            if self.vr.has_long_length() {
                if start + 12 > self.buffer.len() {
                    return Ok(false);
                }
                self.size = fetch_u32(&self.buffer, start + 8, e);
                data += 8;
            } else {
                self.size = u32::from(fetch_u16(&self.buffer, start + 6, e));
                data += 4;
            }
        } else {
            self.vr = match dict::lookup(self.group, self.element) {
                Some(entry) => entry.vr,
                None => {
                    if self.group % 2 == 0 {
                        debug!(
                            "unknown DICOM tag ({:04X},{:04X}) with implicit encoding in file \"{}\"",
                            self.group, self.element, self.name
                        );
                    }
                    Vr::UN
                }
            };
            self.size = fetch_u32(&self.buffer, start + 4, e);
            data += 4;
        }

        self.data_start = data;
        let in_encapsulated_data = self
            .parents
            .last()
            .map(|s| s.group == GROUP_DATA && s.element == ELEMENT_DATA)
            .unwrap_or(false);
        let is_item = self.group == GROUP_SEQUENCE && self.element == ELEMENT_SEQUENCE_ITEM;

        if self.size == LENGTH_UNDEFINED {
            if self.vr != Vr::SQ && !is_item && !(self.group == GROUP_DATA && self.element == ELEMENT_DATA)
            {
                debug!(
                    "undefined length used for DICOM tag ({:04X},{:04X}) in file \"{}\" - assuming sequence",
                    self.group, self.element, self.name
                );
                self.vr = Vr::SQ;
            }
            self.data_end = data;
            self.next = data;
        } else {
            let end = data + self.size as usize;
            if end > self.buffer.len() {
                return Err(DicomError::Truncated(
                    self.name.clone(),
                    self.group,
                    self.element,
                ));
            }
            if self.size % 2 == 1 {
                debug!(
                    "odd length ({}) used for DICOM tag ({:04X},{:04X}) in file \"{}\"",
                    self.size, self.group, self.element, self.name
                );
            }
            self.data_end = end;
            let descend = self.vr == Vr::SQ || (is_item && !in_encapsulated_data);
            self.next = if descend { data } else { end };
        }

        // delimiters close the innermost open item or sequence
        if self.group == GROUP_SEQUENCE {
            match self.element {
                ELEMENT_ITEM_DELIMITATION => {
                    if self.parents.last().map(Sequence::is_item).unwrap_or(false) {
                        let _ = self.parents.pop();
                    }
                }
                ELEMENT_SEQUENCE_DELIMITATION => {
                    while let Some(seq) = self.parents.pop() {
                        if !seq.is_item() {
                            break;
                        }
                    }
                }
                _ => {}
            }
            self.depth = self.depth.min(self.parents.len());
        }

        let end = if self.size == LENGTH_UNDEFINED {
            None
        } else {
            Some(self.data_end)
        };
        let new_sequence = self.element().is_new_sequence();
        if new_sequence || (is_item && !in_encapsulated_data && !self.parents.is_empty()) {
            self.parents.push(Sequence {
                group: self.group,
                element: self.element,
                end,
            });
        }

        if self.group == GROUP_BYTE_ORDER && self.element == 0x0010 {
            self.set_transfer_syntax()?;
        }

        Ok(true)
    }

    fn set_transfer_syntax(&mut self) -> Result<()> {
        let uid = String::from_utf8_lossy(&self.buffer[self.data_start..self.data_end])
            .trim_matches(|c: char| c.is_whitespace() || c == '\0')
            .to_string();
        match uid.as_str() {
            TS_EXPLICIT_LE => {
                self.transfer_syntax_be = false;
                self.explicit = true;
            }
            TS_EXPLICIT_BE => {
                self.transfer_syntax_be = true;
                self.explicit = true;
            }
            TS_IMPLICIT_LE => {
                self.transfer_syntax_be = false;
                self.explicit = false;
            }
            TS_DEFLATED_LE => return Err(DicomError::UnsupportedTransferSyntax(uid)),
            _ => {
                // encapsulated transfer syntaxes keep an explicit little
                // endian data set, only the pixel data cannot be read
                self.transfer_syntax_be = false;
                self.explicit = true;
                self.transfer_syntax_supported = false;
                info!(
                    "unsupported DICOM transfer syntax: \"{}\" in file \"{}\"",
                    uid, self.name
                );
            }
        }
        Ok(())
    }
}
