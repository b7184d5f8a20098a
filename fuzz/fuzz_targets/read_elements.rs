#![no_main]
use dicom_recon::element::ElementReader;
use dicom_recon::util::Buffer;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let buffer = Arc::new(Buffer::from(data.to_vec()));
    if let Ok(mut reader) = ElementReader::new(buffer, "fuzz.dcm", true) {
        while let Ok(true) = reader.read() {
            let e = reader.element();
            let _ = e.tag_name();
            let _ = e.get_string();
            let _ = e.get_float();
            let _ = e.get_uint();
        }
    }
});
