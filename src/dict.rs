//! Static DICOM data dictionary.
//!
//! Only the attributes that matter for volume reconstruction (or that are
//! commonly found around them) are listed. The table is used to resolve the
//! value representation of elements in implicit VR data sets and to give
//! elements a name in diagnostics.

use crate::typedef::Vr;

/// Combine a group and element number into a single tag value.
#[inline]
pub const fn tag(group: u16, element: u16) -> u32 {
    ((group as u32) << 16) | element as u32
}

/// One entry of the data dictionary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DictEntry {
    /// the attribute tag, `group << 16 | element`
    pub tag: u32,
    /// the value representation
    pub vr: Vr,
    /// the attribute keyword
    pub name: &'static str,
}

macro_rules! dict {
    ($(($g:expr, $e:expr, $vr:ident, $name:expr)),* $(,)?) => {
        &[$(DictEntry { tag: tag($g, $e), vr: Vr::$vr, name: $name }),*]
    };
}

/// Entries sorted by tag.
static DICTIONARY: &[DictEntry] = dict![
    (0x0002, 0x0000, UL, "FileMetaInformationGroupLength"),
    (0x0002, 0x0001, OB, "FileMetaInformationVersion"),
    (0x0002, 0x0002, UI, "MediaStorageSOPClassUID"),
    (0x0002, 0x0003, UI, "MediaStorageSOPInstanceUID"),
    (0x0002, 0x0010, UI, "TransferSyntaxUID"),
    (0x0002, 0x0012, UI, "ImplementationClassUID"),
    (0x0002, 0x0013, SH, "ImplementationVersionName"),
    (0x0008, 0x0005, CS, "SpecificCharacterSet"),
    (0x0008, 0x0008, CS, "ImageType"),
    (0x0008, 0x0012, DA, "InstanceCreationDate"),
    (0x0008, 0x0016, UI, "SOPClassUID"),
    (0x0008, 0x0018, UI, "SOPInstanceUID"),
    (0x0008, 0x0020, DA, "StudyDate"),
    (0x0008, 0x0021, DA, "SeriesDate"),
    (0x0008, 0x0022, DA, "AcquisitionDate"),
    (0x0008, 0x0030, TM, "StudyTime"),
    (0x0008, 0x0031, TM, "SeriesTime"),
    (0x0008, 0x0032, TM, "AcquisitionTime"),
    (0x0008, 0x0033, TM, "ContentTime"),
    (0x0008, 0x0050, SH, "AccessionNumber"),
    (0x0008, 0x0060, CS, "Modality"),
    (0x0008, 0x0070, LO, "Manufacturer"),
    (0x0008, 0x0080, LO, "InstitutionName"),
    (0x0008, 0x1030, LO, "StudyDescription"),
    (0x0008, 0x103E, LO, "SeriesDescription"),
    (0x0008, 0x1090, LO, "ManufacturerModelName"),
    (0x0008, 0x1115, SQ, "ReferencedSeriesSequence"),
    (0x0008, 0x1140, SQ, "ReferencedImageSequence"),
    (0x0008, 0x1250, SQ, "RelatedSeriesSequence"),
    (0x0010, 0x0010, PN, "PatientName"),
    (0x0010, 0x0020, LO, "PatientID"),
    (0x0010, 0x0030, DA, "PatientBirthDate"),
    (0x0010, 0x0040, CS, "PatientSex"),
    (0x0018, 0x0020, CS, "ScanningSequence"),
    (0x0018, 0x0023, CS, "MRAcquisitionType"),
    (0x0018, 0x0024, SH, "SequenceName"),
    (0x0018, 0x0050, DS, "SliceThickness"),
    (0x0018, 0x0080, DS, "RepetitionTime"),
    (0x0018, 0x0081, DS, "EchoTime"),
    (0x0018, 0x0082, DS, "InversionTime"),
    (0x0018, 0x0086, IS, "EchoNumbers"),
    (0x0018, 0x0087, DS, "MagneticFieldStrength"),
    (0x0018, 0x0088, DS, "SpacingBetweenSlices"),
    (0x0018, 0x0091, IS, "EchoTrainLength"),
    (0x0018, 0x0095, DS, "PixelBandwidth"),
    (0x0018, 0x1020, LO, "SoftwareVersions"),
    (0x0018, 0x1030, LO, "ProtocolName"),
    (0x0018, 0x1310, US, "AcquisitionMatrix"),
    (0x0018, 0x1312, CS, "InPlanePhaseEncodingDirection"),
    (0x0018, 0x1314, DS, "FlipAngle"),
    (0x0018, 0x5100, CS, "PatientPosition"),
    (0x0018, 0x9005, SH, "PulseSequenceName"),
    (0x0018, 0x9073, FD, "AcquisitionDuration"),
    (0x0018, 0x9075, CS, "DiffusionDirectionality"),
    (0x0018, 0x9076, SQ, "DiffusionGradientDirectionSequence"),
    (0x0018, 0x9081, CS, "PartialFourier"),
    (0x0018, 0x9082, FD, "EffectiveEchoTime"),
    (0x0018, 0x9087, FD, "DiffusionBValue"),
    (0x0018, 0x9089, FD, "DiffusionGradientOrientation"),
    (0x0018, 0x9114, SQ, "MREchoSequence"),
    (0x0018, 0x9117, SQ, "MRDiffusionSequence"),
    (0x0018, 0x9226, SQ, "MRImageFrameTypeSequence"),
    (0x0019, 0x100A, US, "NumberOfImagesInMosaic"),
    (0x0019, 0x100C, IS, "B_value"),
    (0x0019, 0x100E, FD, "DiffusionGradientDirection"),
    (0x0019, 0x1028, FD, "BandwidthPerPixelPhaseEncode"),
    (0x0019, 0x1029, FD, "MosaicRefAcqTimes"),
    (0x0019, 0x10BB, DS, "UserData20"),
    (0x0019, 0x10BC, DS, "UserData21"),
    (0x0019, 0x10BD, DS, "UserData22"),
    (0x0020, 0x000D, UI, "StudyInstanceUID"),
    (0x0020, 0x000E, UI, "SeriesInstanceUID"),
    (0x0020, 0x0010, SH, "StudyID"),
    (0x0020, 0x0011, IS, "SeriesNumber"),
    (0x0020, 0x0012, IS, "AcquisitionNumber"),
    (0x0020, 0x0013, IS, "InstanceNumber"),
    (0x0020, 0x0032, DS, "ImagePositionPatient"),
    (0x0020, 0x0037, DS, "ImageOrientationPatient"),
    (0x0020, 0x0052, UI, "FrameOfReferenceUID"),
    (0x0020, 0x1041, DS, "SliceLocation"),
    (0x0020, 0x9111, SQ, "FrameContentSequence"),
    (0x0020, 0x9113, SQ, "PlanePositionSequence"),
    (0x0020, 0x9116, SQ, "PlaneOrientationSequence"),
    (0x0020, 0x9157, UL, "DimensionIndexValues"),
    (0x0028, 0x0002, US, "SamplesPerPixel"),
    (0x0028, 0x0004, CS, "PhotometricInterpretation"),
    (0x0028, 0x0006, US, "PlanarConfiguration"),
    (0x0028, 0x0008, IS, "NumberOfFrames"),
    (0x0028, 0x0010, US, "Rows"),
    (0x0028, 0x0011, US, "Columns"),
    (0x0028, 0x0030, DS, "PixelSpacing"),
    (0x0028, 0x0100, US, "BitsAllocated"),
    (0x0028, 0x0101, US, "BitsStored"),
    (0x0028, 0x0102, US, "HighBit"),
    (0x0028, 0x0103, US, "PixelRepresentation"),
    (0x0028, 0x1050, DS, "WindowCenter"),
    (0x0028, 0x1051, DS, "WindowWidth"),
    (0x0028, 0x1052, DS, "RescaleIntercept"),
    (0x0028, 0x1053, DS, "RescaleSlope"),
    (0x0028, 0x9110, SQ, "PixelMeasuresSequence"),
    (0x0028, 0x9145, SQ, "PixelValueTransformationSequence"),
    (0x0029, 0x1008, CS, "CSAImageHeaderType"),
    (0x0029, 0x1009, LO, "CSAImageHeaderVersion"),
    (0x0029, 0x1010, OB, "CSAImageHeaderInfo"),
    (0x0029, 0x1018, CS, "CSASeriesHeaderType"),
    (0x0029, 0x1019, LO, "CSASeriesHeaderVersion"),
    (0x0029, 0x1020, OB, "CSASeriesHeaderInfo"),
    (0x0029, 0x1110, OB, "CSAImageHeaderInfo"),
    (0x0029, 0x1120, OB, "CSASeriesHeaderInfo"),
    (0x0029, 0x1210, OB, "CSAImageHeaderInfo"),
    (0x0029, 0x1220, OB, "CSASeriesHeaderInfo"),
    (0x0043, 0x1039, IS, "SlopInteger6To9"),
    (0x2001, 0x1003, FL, "DiffusionBFactor"),
    (0x2001, 0x1004, CS, "DiffusionDirection"),
    (0x2005, 0x10B0, FL, "DiffusionDirectionRL"),
    (0x2005, 0x10B1, FL, "DiffusionDirectionAP"),
    (0x2005, 0x10B2, FL, "DiffusionDirectionFH"),
    (0x2005, 0x140F, SQ, "PrivatePixelSequence"),
    (0x5200, 0x9229, SQ, "SharedFunctionalGroupsSequence"),
    (0x5200, 0x9230, SQ, "PerFrameFunctionalGroupsSequence"),
    (0x7FE0, 0x0010, OW, "PixelData"),
];

/// Look up an attribute in the dictionary.
pub fn lookup(group: u16, element: u16) -> Option<&'static DictEntry> {
    let t = tag(group, element);
    DICTIONARY
        .binary_search_by_key(&t, |e| e.tag)
        .ok()
        .map(|i| &DICTIONARY[i])
}

/// Private sequences whose contents are read through despite their odd group
/// number, because they carry per-frame data needed for reconstruction.
static PRIVATE_SEQUENCE_WHITELIST: &[u32] = &[tag(0x2005, 0x140F)];

/// Whether the given private sequence is known to carry required data.
pub fn is_whitelisted_private_sequence(group: u16, element: u16) -> bool {
    PRIVATE_SEQUENCE_WHITELIST.contains(&tag(group, element))
}

/// Sequences whose contents refer to other series.
static SERIES_REFERENCE_SEQUENCES: &[u32] = &[tag(0x0008, 0x1115), tag(0x0008, 0x1250)];

/// Whether elements within this sequence describe a cross-referenced series.
pub fn is_series_reference_sequence(group: u16, element: u16) -> bool {
    SERIES_REFERENCE_SEQUENCES.contains(&tag(group, element))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dictionary_is_sorted() {
        assert!(DICTIONARY.windows(2).all(|w| w[0].tag < w[1].tag));
    }

    #[test]
    fn lookup_known_and_unknown() {
        let e = lookup(0x0020, 0x0032).unwrap();
        assert_eq!(e.vr, Vr::DS);
        assert_eq!(e.name, "ImagePositionPatient");
        assert_eq!(lookup(0x7FE0, 0x0010).unwrap().vr, Vr::OW);
        assert!(lookup(0x0009, 0x0001).is_none());
    }

    #[test]
    fn whitelist() {
        assert!(is_whitelisted_private_sequence(0x2005, 0x140F));
        assert!(!is_whitelisted_private_sequence(0x0029, 0x1010));
        assert!(is_series_reference_sequence(0x0008, 0x1115));
    }
}
