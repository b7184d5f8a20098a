//! Geometry helpers: construction of the image transform from frame
//! orientation, and the adjustments required by mosaic images.

use crate::frame::Frame;
use nalgebra::{Matrix3, Matrix4, Vector3, Vector4};

/// Build the image-to-scanner transform (RAS) of a frame, without the voxel
/// spacing. The columns hold the row direction, the column direction, the
/// slice normal and the position of the first voxel.
pub fn image_transform(frame: &Frame) -> Matrix4<f64> {
    let mut m = Matrix4::identity();
    for i in 0..3 {
        m[(i, 0)] = frame.orientation_x[i];
        m[(i, 1)] = frame.orientation_y[i];
        m[(i, 2)] = frame.orientation_z[i];
        m[(i, 3)] = frame.position_vector[i];
    }
    // LPS to RAS
    for j in 0..4 {
        m[(0, j)] = -m[(0, j)];
        m[(1, j)] = -m[(1, j)];
    }
    m
}

/// Separate a 4x4 transform into its 3x3 linear part and translation.
pub fn get_rotation_and_translation(transform: &Matrix4<f64>) -> (Matrix3<f64>, Vector3<f64>) {
    let rotation = transform.fixed_view::<3, 3>(0, 0).into_owned();
    let translation = Vector3::new(transform[(0, 3)], transform[(1, 3)], transform[(2, 3)]);
    (rotation, translation)
}

/// Transform from voxel indices to scanner coordinates.
pub fn voxel_to_scanner(transform: &Matrix4<f64>, spacing: [f64; 3]) -> Matrix4<f64> {
    transform * Matrix4::from_diagonal(&Vector4::new(spacing[0], spacing[1], spacing[2], 1.0))
}

/// Number of tiles along each side of a mosaic holding `images` slices.
pub fn mosaic_tiles(images: usize) -> usize {
    (images as f64).sqrt().ceil() as usize
}

/// Move the origin from the corner of a mosaic to the corner of its first
/// tile: the position recorded by the scanner refers to the whole mosaic.
pub fn shift_mosaic_origin(
    transform: &mut Matrix4<f64>,
    pixel_size: [f64; 2],
    mosaic_dim: [usize; 2],
    slice_dim: [usize; 2],
) {
    let xinc = pixel_size[0] * (mosaic_dim[0] - slice_dim[0]) as f64 / 2.0;
    let yinc = pixel_size[1] * (mosaic_dim[1] - slice_dim[1]) as f64 / 2.0;
    for i in 0..3 {
        transform[(i, 3)] += xinc * transform[(i, 0)] + yinc * transform[(i, 1)];
    }
}
