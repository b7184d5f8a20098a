#![no_main]
use dicom_recon::extension::CsaHeader;
use dicom_recon::Frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(csa) = CsaHeader::parse(data) {
        let mut frame = Frame::default();
        csa.decode_into(&mut frame);
    }
});
