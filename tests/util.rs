//! Synthetic DICOM files for the integration tests.
#![allow(dead_code)]

pub const EXPLICIT_LE: &str = "1.2.840.10008.1.2.1";
pub const IMPLICIT_LE: &str = "1.2.840.10008.1.2";
pub const EXPLICIT_BE: &str = "1.2.840.10008.1.2.2";
pub const JPEG_BASELINE: &str = "1.2.840.10008.1.2.4.50";

fn long_length(vr: &[u8; 2]) -> bool {
    matches!(vr, b"OB" | b"OW" | b"OF" | b"SQ" | b"UT" | b"UN")
}

/// Builder of a DICOM file with a preamble and an explicit VR little endian
/// data set, unless another transfer syntax is given. The file meta group
/// is always explicit little endian.
#[derive(Debug, Clone)]
pub struct DicomBuilder {
    data: Vec<u8>,
    implicit: bool,
    big_endian: bool,
}

impl DicomBuilder {
    pub fn new() -> Self {
        DicomBuilder::with_transfer_syntax(EXPLICIT_LE)
    }

    pub fn with_transfer_syntax(uid: &str) -> Self {
        let mut data = vec![0u8; 128];
        data.extend_from_slice(b"DICM");
        let builder = DicomBuilder {
            data,
            implicit: false,
            big_endian: false,
        };
        let mut b = builder.string(0x0002, 0x0010, b"UI", uid);
        b.implicit = uid == IMPLICIT_LE;
        b.big_endian = uid == EXPLICIT_BE;
        b
    }

    /// Append an element, padding its value to an even length.
    pub fn element(mut self, group: u16, element: u16, vr: &[u8; 2], value: &[u8]) -> Self {
        let mut value = value.to_vec();
        if value.len() % 2 == 1 {
            value.push(if vr == b"UI" || vr == b"OB" { 0 } else { b' ' });
        }
        let be = self.big_endian && group != 0x0002;
        let u16_bytes = |v: u16| if be { v.to_be_bytes() } else { v.to_le_bytes() };
        let u32_bytes = |v: u32| if be { v.to_be_bytes() } else { v.to_le_bytes() };
        self.data.extend_from_slice(&u16_bytes(group));
        self.data.extend_from_slice(&u16_bytes(element));
        if self.implicit && group != 0x0002 {
            self.data.extend_from_slice(&u32_bytes(value.len() as u32));
        } else if long_length(vr) {
            self.data.extend_from_slice(vr);
            self.data.extend_from_slice(&[0, 0]);
            self.data.extend_from_slice(&u32_bytes(value.len() as u32));
        } else {
            self.data.extend_from_slice(vr);
            self.data.extend_from_slice(&u16_bytes(value.len() as u16));
        }
        self.data.extend_from_slice(&value);
        self
    }

    pub fn string(self, group: u16, element: u16, vr: &[u8; 2], value: &str) -> Self {
        self.element(group, element, vr, value.as_bytes())
    }

    fn word(&self, value: u16) -> [u8; 2] {
        if self.big_endian {
            value.to_be_bytes()
        } else {
            value.to_le_bytes()
        }
    }

    pub fn us(self, group: u16, element: u16, value: u16) -> Self {
        let bytes = self.word(value);
        self.element(group, element, b"US", &bytes)
    }

    pub fn pixel_data(self, pixels: &[u16]) -> Self {
        let bytes: Vec<u8> = pixels.iter().flat_map(|p| self.word(*p).to_vec()).collect();
        self.element(0x7FE0, 0x0010, b"OW", &bytes)
    }

    /// Append raw bytes, such as a hand-encoded sequence.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }
}

/// Description of one axial slice of a synthetic series.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    pub series_uid: String,
    pub series_description: String,
    pub series_number: u32,
    pub instance: u32,
    pub z: f64,
    pub rows: u16,
    pub columns: u16,
    pub spacing: f64,
    pub thickness: f64,
    pub acquisition_time: Option<String>,
}

impl SliceSpec {
    pub fn new(instance: u32, z: f64) -> Self {
        SliceSpec {
            series_uid: "1.2.3.4.5".to_string(),
            series_description: "t1_axial".to_string(),
            series_number: 3,
            instance,
            z,
            rows: 64,
            columns: 64,
            spacing: 2.0,
            thickness: 2.0,
            acquisition_time: None,
        }
    }

    /// Pixel value at column `x`, row `y`: unique across slices.
    pub fn value(&self, x: usize, y: usize) -> u16 {
        (self.instance as usize * 1000 + y * 10 + x % 10) as u16
    }

    pub fn build(&self) -> Vec<u8> {
        let pixels: Vec<u16> = (0..self.rows as usize)
            .flat_map(|y| (0..self.columns as usize).map(move |x| (x, y)))
            .map(|(x, y)| self.value(x, y))
            .collect();
        let mut b = DicomBuilder::new()
            .string(0x0008, 0x0060, b"CS", "MR")
            .string(0x0008, 0x0070, b"LO", "SIEMENS");
        if let Some(t) = &self.acquisition_time {
            b = b.string(0x0008, 0x0032, b"TM", t);
        }
        b.string(0x0008, 0x103E, b"LO", &self.series_description)
            .string(0x0010, 0x0010, b"PN", "Doe^Jane")
            .string(0x0010, 0x0020, b"LO", "12345")
            .string(0x0018, 0x0050, b"DS", &self.thickness.to_string())
            .string(0x0018, 0x0081, b"DS", "30")
            .string(0x0020, 0x000D, b"UI", "1.2.3.4")
            .string(0x0020, 0x000E, b"UI", &self.series_uid)
            .string(0x0020, 0x0011, b"IS", &self.series_number.to_string())
            .string(0x0020, 0x0012, b"IS", "1")
            .string(0x0020, 0x0013, b"IS", &self.instance.to_string())
            .string(0x0020, 0x0032, b"DS", &format!("-64\\-64\\{}", self.z))
            .string(0x0020, 0x0037, b"DS", "1\\0\\0\\0\\1\\0")
            .us(0x0028, 0x0002, 1)
            .us(0x0028, 0x0010, self.rows)
            .us(0x0028, 0x0011, self.columns)
            .string(0x0028, 0x0030, b"DS", &format!("{}\\{}", self.spacing, self.spacing))
            .us(0x0028, 0x0100, 16)
            .us(0x0028, 0x0103, 0)
            .pixel_data(&pixels)
            .build()
    }
}

/// Route log output through the test harness.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
