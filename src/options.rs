//! Options controlling how DICOM series are scanned and reconstructed.

use crate::frame::{SLICE_GAP_TOLERANCE, SLICE_SEPARATION_TOLERANCE};
use std::env;

/// Environment variable enabling `preserve_isotropic` in [`from_env`].
///
/// [`from_env`]: ./struct.ReconstructOptions.html#method.from_env
pub const PRESERVE_ISOTROPIC_VAR: &str = "MRTRIX_PRESERVE_PHILIPS_ISO";

/// Options for reading and reconstructing DICOM data.
///
/// ```
/// use dicom_recon::ReconstructOptions;
///
/// let options = ReconstructOptions::new()
///     .force_read(true)
///     .preserve_isotropic(true);
/// assert!(options.force_read);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconstructOptions {
    /// Read files without the DICOM preamble regardless of their name.
    pub force_read: bool,
    /// Keep the isotropic image appended to some diffusion series.
    pub preserve_isotropic: bool,
    /// Tolerance between slice separation and thickness before reporting
    /// a slice gap.
    pub slice_gap_tolerance: f64,
    /// Tolerance on the spread of slice separations.
    pub slice_separation_tolerance: f64,
}

impl Default for ReconstructOptions {
    fn default() -> Self {
        ReconstructOptions {
            force_read: false,
            preserve_isotropic: false,
            slice_gap_tolerance: SLICE_GAP_TOLERANCE,
            slice_separation_tolerance: SLICE_SEPARATION_TOLERANCE,
        }
    }
}

impl ReconstructOptions {
    /// Create the default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Default options, with `preserve_isotropic` enabled if the
    /// `MRTRIX_PRESERVE_PHILIPS_ISO` environment variable holds a non-zero
    /// number or "true".
    pub fn from_env() -> Self {
        let preserve = env::var(PRESERVE_ISOTROPIC_VAR)
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        Self::default().preserve_isotropic(preserve)
    }

    /// Set whether to read files without the DICOM preamble.
    pub fn force_read(mut self, force_read: bool) -> Self {
        self.force_read = force_read;
        self
    }

    /// Set whether to keep isotropic trailer images.
    pub fn preserve_isotropic(mut self, preserve: bool) -> Self {
        self.preserve_isotropic = preserve;
        self
    }

    /// Set the tolerances used when validating slice positions.
    pub fn slice_tolerances(mut self, gap: f64, separation: f64) -> Self {
        self.slice_gap_tolerance = gap;
        self.slice_separation_tolerance = separation;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    match value.parse::<i64>() {
        Ok(v) => v != 0,
        Err(_) => value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" true"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("no"));
    }

    #[test]
    fn builder() {
        let o = ReconstructOptions::new().slice_tolerances(1e-3, 1e-2);
        assert_eq!(o.slice_gap_tolerance, 1e-3);
        assert_eq!(o.slice_separation_tolerance, 1e-2);
        assert!(!o.preserve_isotropic);
    }
}
