#![no_main]
use dicom_recon::image::Image;
use dicom_recon::util::Buffer;
use dicom_recon::{reconstruct_frames, ReconstructOptions};
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let buffer = Arc::new(Buffer::from(data.to_vec()));
    if let Ok(image) = Image::read(buffer, "fuzz.dcm", true) {
        if let Ok(recon) = reconstruct_frames(image.frames, "fuzz", &ReconstructOptions::new()) {
            let _ = recon.load();
        }
    }
});
