//! This module contains the decoder for the Siemens CSA headers, private
//! binary blocks stored in elements (0029,xx10) and (0029,xx20) which carry
//! the diffusion encoding, mosaic layout and slice timing of an acquisition.
//! One of the CSA entries (`MrPhoenixProtocol`) embeds a textual dump of the
//! scanner protocol, which is decoded as well.
//!
//! Both the "SV10" layout and the older layout without the signature are
//! supported. All fields are little endian.

use crate::error::{DicomError, Result};
use crate::frame::Frame;
use crate::typedef::{DiffusionScheme, PartialFourier, ReadoutMode};
use byteordered::{ByteOrdered, Endianness};
use nalgebra::Vector3;
use num_traits::FromPrimitive;
use std::io::Read;
use tracing::{debug, warn};

const SIGNATURE_SV10: &[u8; 4] = b"SV10";
const NAME_LENGTH: usize = 64;
const MAX_ITEMS: i32 = 512;

const ASCCONV_BEGIN: &str = "### ASCCONV BEGIN";
const ASCCONV_END: &str = "### ASCCONV END";

/// One entry of a CSA header.
#[derive(Debug, Clone, PartialEq)]
pub struct CsaEntry {
    name: String,
    vr: String,
    items: Vec<String>,
}

impl CsaEntry {
    /// The entry's name (e.g. "B_value").
    pub fn key(&self) -> &str {
        &self.name
    }

    /// The value representation declared for this entry.
    pub fn vr(&self) -> &str {
        &self.vr
    }

    /// The number of items held by this entry, including empty ones.
    pub fn num_items(&self) -> usize {
        self.items.len()
    }

    /// The first item as text.
    pub fn get_string(&self) -> Option<&str> {
        self.items.first().map(String::as_str)
    }

    /// The first item as a floating point number.
    pub fn get_float(&self) -> Option<f64> {
        self.get_string().and_then(|s| s.parse().ok())
    }

    /// The first item as an integer.
    pub fn get_int(&self) -> Option<i64> {
        let s = self.get_string()?;
        s.parse::<i64>()
            .ok()
            .or_else(|| s.parse::<f64>().ok().map(|v| v.round() as i64))
    }

    /// All non-empty items as floating point numbers.
    pub fn get_floats(&self) -> Vec<f64> {
        self.items
            .iter()
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    }
}

/// A decoded CSA header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsaHeader {
    entries: Vec<CsaEntry>,
}

impl CsaHeader {
    /// Decode a CSA header from the bytes of a (0029,xx10) or (0029,xx20)
    /// element.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let csa2 = data.len() >= 8 && &data[0..4] == SIGNATURE_SV10;
        let body = if csa2 { &data[8..] } else { data };
        let total = body.len();
        let mut source = ByteOrdered::runtime(body, Endianness::Little);

        let n_tags = source.read_u32()?;
        let _unused = source.read_u32()?;
        if n_tags > 1024 {
            return Err(DicomError::InvalidExtension("implausible number of entries"));
        }

        let mut entries = Vec::with_capacity(n_tags as usize);
        let mut tag0_n_items = None;
        for _ in 0..n_tags {
            let mut name = [0u8; NAME_LENGTH];
            source.read_exact(&mut name)?;
            let _vm = source.read_i32()?;
            let mut vr = [0u8; 4];
            source.read_exact(&mut vr)?;
            let _syngodt = source.read_i32()?;
            let n_items = source.read_i32()?;
            let _xx = source.read_i32()?;
            if !(0..=MAX_ITEMS).contains(&n_items) {
                return Err(DicomError::InvalidExtension("implausible number of items"));
            }
            let tag0 = *tag0_n_items.get_or_insert(n_items);

            let mut items = Vec::with_capacity(n_items as usize);
            for _ in 0..n_items {
                let mut x = [0i32; 4];
                for v in x.iter_mut() {
                    *v = source.read_i32()?;
                }
                let length = if csa2 { x[1] } else { x[0] - tag0 };
                if length < 0 || length as usize > total {
                    return Err(DicomError::InvalidExtension("item length out of range"));
                }
                let length = length as usize;
                let mut item = vec![0u8; length];
                source.read_exact(&mut item)?;
                let padding = (4 - length % 4) % 4;
                let mut pad = [0u8; 4];
                source.read_exact(&mut pad[..padding])?;
                items.push(to_text(&item));
            }

            entries.push(CsaEntry {
                name: to_text(&name),
                vr: to_text(&vr),
                items,
            });
        }

        Ok(CsaHeader { entries })
    }

    /// Obtain an iterator to the entries.
    pub fn iter(&self) -> ::std::slice::Iter<CsaEntry> {
        self.entries.iter()
    }

    /// Find an entry by name.
    pub fn get(&self, key: &str) -> Option<&CsaEntry> {
        self.entries.iter().find(|e| e.key() == key)
    }

    /// Whether the header holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Store the recognized entries into the frame.
    pub fn decode_into(&self, frame: &mut Frame) {
        for entry in self.iter() {
            match entry.key() {
                "B_value" => {
                    if let Some(b) = entry.get_float() {
                        frame.bvalue = b;
                    }
                }
                "DiffusionGradientDirection" => {
                    let g = entry.get_floats();
                    if g.len() >= 3 {
                        frame.g = Vector3::new(g[0], g[1], g[2]);
                    }
                }
                "NumberOfImagesInMosaic" => {
                    if let Some(n) = entry.get_int() {
                        frame.images_in_mosaic = n.max(0) as usize;
                    }
                }
                "SliceNormalVector" => {
                    let n = entry.get_floats();
                    if n.len() >= 3 {
                        frame.orientation_z = Vector3::new(n[0], n[1], n[2]);
                    }
                }
                "PhaseEncodingDirectionPositive" => {
                    if let Some(v) = entry.get_int() {
                        frame.pe_sign = if v > 0 { 1 } else { -1 };
                    }
                }
                "BandwidthPerPixelPhaseEncode" => {
                    if let Some(v) = entry.get_float() {
                        frame.bandwidth_per_pixel_phase_encode = v;
                    }
                }
                "MosaicRefAcqTimes" => {
                    let times = entry.get_floats();
                    if !times.is_empty() {
                        frame.mosaic_slices_timing = times;
                    }
                }
                "TimeAfterStart" => {
                    if let Some(v) = entry.get_float() {
                        frame.time_after_start = v;
                    }
                }
                "MrPhoenixProtocol" => {
                    if let Some(text) = entry.get_string() {
                        decode_protocol(text, frame);
                    }
                }
                _ => {}
            }
        }
        check_diffusion_encoding(frame);
    }
}

impl<'a> IntoIterator for &'a CsaHeader {
    type Item = &'a CsaEntry;
    type IntoIter = ::std::slice::Iter<'a, CsaEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Decode a CSA block and store its recognized entries into the frame.
pub fn decode_into(data: &[u8], frame: &mut Frame) -> Result<()> {
    let header = CsaHeader::parse(data)?;
    if header.is_empty() {
        debug!("CSA header without entries");
    }
    header.decode_into(frame);
    Ok(())
}

/// Some scanner software versions store garbage gradients (all components
/// larger than one in magnitude) alongside a non-zero b-value. Both are
/// discarded, leaving a b=0 frame.
fn check_diffusion_encoding(frame: &mut Frame) {
    if frame.bvalue.is_finite()
        && frame.bvalue != 0.0
        && frame.g.iter().all(|g| g.is_finite() && g.abs() > 1.0)
    {
        warn!(
            "invalid diffusion gradient {:?} with b = {} in CSA header - assuming b = 0",
            frame.g.as_slice(),
            frame.bvalue
        );
        frame.bvalue = 0.0;
        frame.g = Vector3::zeros();
    }
}

fn to_text(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Iterate over the `key = value` pairs of the ASCCONV section of a
/// Siemens protocol dump.
pub fn ascii_protocol(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines()
        .skip_while(|line| !line.starts_with(ASCCONV_BEGIN))
        .skip(1)
        .take_while(|line| !line.starts_with(ASCCONV_END))
        .filter_map(|line| {
            let p = line.find('=')?;
            Some((line[..p].trim(), line[p + 1..].trim()))
        })
}

/// Parse an integer as written in the protocol dump, either decimal or
/// hexadecimal with a "0x" prefix.
fn parse_protocol_int(value: &str) -> Option<i64> {
    let value = value.split_whitespace().next()?;
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else {
        value.parse().ok()
    }
}

/// Store the recognized protocol parameters into the frame.
pub fn decode_protocol(text: &str, frame: &mut Frame) {
    for (key, value) in ascii_protocol(text) {
        if key == "sDiffusion.dsScheme" {
            frame.diffusion_scheme = parse_protocol_int(value).and_then(DiffusionScheme::from_i64);
            if frame.diffusion_scheme.is_none() {
                debug!("unknown diffusion scheme \"{}\" in protocol", value);
            }
        } else if key == "sKSpace.ucPhasePartialFourier" {
            match parse_protocol_int(value).and_then(PartialFourier::from_i64) {
                Some(pf) => frame.partial_fourier = pf.fraction(),
                None => debug!("unknown partial Fourier code \"{}\" in protocol", value),
            }
        } else if key.ends_with("ucReadOutMode") {
            frame.readout_mode = parse_protocol_int(value).and_then(ReadoutMode::from_i64);
        } else if key.starts_with("adFlipAngleDegree[") {
            if let Ok(angle) = value.parse::<f64>() {
                frame.flip_angles.push(angle);
            }
        }
    }
}
