//! This module contains multiple types defined by the DICOM standard or by
//! the vendor conventions decoded by this crate. Coded vendor values can be
//! converted from their primitive representation through `FromPrimitive`.

use num_derive::FromPrimitive;
use std::fmt;

/// A DICOM value representation: the two-letter code declaring the
/// primitive type of a data element.
#[allow(missing_docs)]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum Vr {
    AE,
    AS,
    AT,
    CS,
    DA,
    DS,
    DT,
    FD,
    FL,
    IS,
    LO,
    LT,
    OB,
    OD,
    OF,
    OL,
    OV,
    OW,
    PN,
    SH,
    SL,
    SQ,
    SS,
    ST,
    SV,
    TM,
    UC,
    UI,
    UL,
    UN,
    UR,
    US,
    UT,
    UV,
}

impl Vr {
    /// Recognize a value representation from its two characters.
    pub fn from_bytes(code: [u8; 2]) -> Option<Vr> {
        use self::Vr::*;
        let vr = match &code {
            b"AE" => AE,
            b"AS" => AS,
            b"AT" => AT,
            b"CS" => CS,
            b"DA" => DA,
            b"DS" => DS,
            b"DT" => DT,
            b"FD" => FD,
            b"FL" => FL,
            b"IS" => IS,
            b"LO" => LO,
            b"LT" => LT,
            b"OB" => OB,
            b"OD" => OD,
            b"OF" => OF,
            b"OL" => OL,
            b"OV" => OV,
            b"OW" => OW,
            b"PN" => PN,
            b"SH" => SH,
            b"SL" => SL,
            b"SQ" => SQ,
            b"SS" => SS,
            b"ST" => ST,
            b"SV" => SV,
            b"TM" => TM,
            b"UC" => UC,
            b"UI" => UI,
            b"UL" => UL,
            b"UN" => UN,
            b"UR" => UR,
            b"US" => US,
            b"UT" => UT,
            b"UV" => UV,
            _ => return None,
        };
        Some(vr)
    }

    /// The two-letter code of this value representation.
    pub fn as_str(self) -> &'static str {
        use self::Vr::*;
        match self {
            AE => "AE",
            AS => "AS",
            AT => "AT",
            CS => "CS",
            DA => "DA",
            DS => "DS",
            DT => "DT",
            FD => "FD",
            FL => "FL",
            IS => "IS",
            LO => "LO",
            LT => "LT",
            OB => "OB",
            OD => "OD",
            OF => "OF",
            OL => "OL",
            OV => "OV",
            OW => "OW",
            PN => "PN",
            SH => "SH",
            SL => "SL",
            SQ => "SQ",
            SS => "SS",
            ST => "ST",
            SV => "SV",
            TM => "TM",
            UC => "UC",
            UI => "UI",
            UL => "UL",
            UN => "UN",
            UR => "UR",
            US => "US",
            UT => "UT",
            UV => "UV",
        }
    }

    /// Whether elements of this VR carry a 4-byte length field in explicit
    /// VR encoding (preceded by two reserved bytes).
    pub fn has_long_length(self) -> bool {
        use self::Vr::*;
        matches!(self, OB | OD | OF | OL | OV | OW | SQ | SV | UC | UN | UR | UT | UV)
    }

    /// Whether values of this VR are character strings.
    pub fn is_text(self) -> bool {
        use self::Vr::*;
        matches!(
            self,
            AE | AS | CS | DA | DS | DT | IS | LO | LT | PN | SH | ST | TM | UC | UI | UR | UT
        )
    }
}

impl fmt::Display for Vr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data type of the voxel values of a reconstructed volume.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum DataType {
    /// unsigned char.
    Uint8,
    /// signed char.
    Int8,
    /// unsigned short.
    Uint16,
    /// signed short.
    Int16,
    /// 32 bit float.
    Float32,
}

impl DataType {
    /// Retrieve the size of an element of this data type, in bytes.
    pub fn size_of(self) -> usize {
        use self::DataType::*;
        match self {
            Int8 | Uint8 => 1,
            Int16 | Uint16 => 2,
            Float32 => 4,
        }
    }

    /// Select the integer data type matching the stored pixel layout.
    pub fn from_bits(bits_allocated: u32, signed: bool) -> Option<DataType> {
        match (bits_allocated, signed) {
            (8, false) => Some(DataType::Uint8),
            (8, true) => Some(DataType::Int8),
            (16, false) => Some(DataType::Uint16),
            (16, true) => Some(DataType::Int16),
            _ => None,
        }
    }
}

/// Partial Fourier factor of the phase encoding, as coded in the Siemens
/// ASCII protocol (`sKSpace.ucPhasePartialFourier`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum PartialFourier {
    /// 4/8
    Half = 1,
    /// 5/8
    FiveEighths = 2,
    /// 6/8
    SixEighths = 4,
    /// 7/8
    SevenEighths = 8,
    /// full k-space
    Off = 16,
}

impl PartialFourier {
    /// The fraction of k-space that was acquired.
    pub fn fraction(self) -> f64 {
        match self {
            PartialFourier::Half => 0.5,
            PartialFourier::FiveEighths => 0.675,
            PartialFourier::SixEighths => 0.75,
            PartialFourier::SevenEighths => 0.875,
            PartialFourier::Off => 1.0,
        }
    }
}

/// Diffusion encoding scheme, as coded in the Siemens ASCII protocol
/// (`sDiffusion.dsScheme`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum DiffusionScheme {
    /// twice-refocused spin echo
    Bipolar = 1,
    /// Stejskal-Tanner
    Monopolar = 2,
}

impl fmt::Display for DiffusionScheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiffusionScheme::Bipolar => f.write_str("Bipolar"),
            DiffusionScheme::Monopolar => f.write_str("Monopolar"),
        }
    }
}

/// Readout gradient polarity mode (`ucReadOutMode`).
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, FromPrimitive)]
pub enum ReadoutMode {
    /// single polarity readout
    Monopolar = 1,
    /// alternating polarity readout
    Bipolar = 2,
}

impl fmt::Display for ReadoutMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReadoutMode::Monopolar => f.write_str("Monopolar"),
            ReadoutMode::Bipolar => f.write_str("Bipolar"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_traits::FromPrimitive;

    #[test]
    fn vr_codes() {
        assert_eq!(Vr::from_bytes(*b"SQ"), Some(Vr::SQ));
        assert_eq!(Vr::from_bytes(*b"ZZ"), None);
        assert_eq!(Vr::from_bytes(*b"\x08\x00"), None);
        assert!(Vr::OB.has_long_length());
        assert!(!Vr::US.has_long_length());
        assert_eq!(Vr::DS.to_string(), "DS");
    }

    #[test]
    fn partial_fourier_codes() {
        let pf = PartialFourier::from_u32(4).unwrap();
        assert_eq!(pf.fraction(), 0.75);
        assert!(PartialFourier::from_u32(3).is_none());
        assert_eq!(DiffusionScheme::from_i64(1), Some(DiffusionScheme::Bipolar));
    }

    #[test]
    fn data_type_from_bits() {
        assert_eq!(DataType::from_bits(16, false), Some(DataType::Uint16));
        assert_eq!(DataType::from_bits(8, true), Some(DataType::Int8));
        assert_eq!(DataType::from_bits(12, false), None);
        assert_eq!(DataType::Float32.size_of(), 4);
    }
}
