//! Miscellaneous volume-related functions
use crate::error::{DicomError, Result};

/// Convert voxel coordinates into the index of the voxel in a dense buffer
/// with the first axis varying fastest.
pub fn coords_to_index(coords: &[usize], dim: &[usize]) -> Result<usize> {
    if coords.len() != dim.len() || coords.is_empty() {
        return Err(DicomError::IncorrectVolumeDimensionality(
            dim.len(),
            coords.len(),
        ));
    }

    if !coords.iter().zip(dim).all(|(i, d)| i < d) {
        return Err(DicomError::OutOfBounds(Vec::from(coords)));
    }

    let index = coords
        .iter()
        .zip(dim)
        .rev()
        .fold(0, |a, (c, d)| a * d + c);

    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::coords_to_index;

    #[test]
    fn test_coords_to_index() {
        assert!(coords_to_index(&[0, 0], &[10, 10, 5]).is_err());
        assert!(coords_to_index(&[0, 0, 0, 0], &[10, 10, 5]).is_err());
        assert_eq!(coords_to_index(&[0, 0, 0], &[10, 10, 5]).unwrap(), 0);

        assert_eq!(coords_to_index(&[1, 0, 0], &[16, 16, 3]).unwrap(), 1);
        assert_eq!(coords_to_index(&[0, 1, 0], &[16, 16, 3]).unwrap(), 16);
        assert_eq!(coords_to_index(&[0, 0, 1], &[16, 16, 3]).unwrap(), 256);
        assert_eq!(coords_to_index(&[1, 1, 1], &[16, 16, 3]).unwrap(), 273);

        assert_eq!(
            coords_to_index(&[15, 15, 2], &[16, 16, 3]).unwrap(),
            16 * 16 * 3 - 1
        );

        assert!(coords_to_index(&[16, 15, 2], &[16, 16, 3]).is_err());
    }
}
