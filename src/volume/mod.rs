//! This module defines the voxel volume API, as well as the data handler
//! which loads the voxels of a reconstructed series into memory.
//! An integration with `ndarray` allows for more elegant and
//! efficient approaches, and should be preferred when possible.
//! In order to do so, you must add the `ndarray_volumes` feature
//! to this crate.

pub mod element;
pub mod handler;
pub mod inmem;
pub use self::handler::{DataHandler, Layout};
pub use self::inmem::*;
mod util;

#[cfg(feature = "ndarray_volumes")]
pub mod ndarray;

use crate::error::Result;
use crate::typedef::DataType;

/// Public API for volume data, exposed as a multi-dimensional voxel array.
pub trait Volume {
    /// Get the dimensions of the volume.
    fn dim(&self) -> &[usize];

    /// Get the volume's number of dimensions.
    fn dimensionality(&self) -> usize {
        self.dim().len()
    }

    /// Fetch a single voxel's value in the given voxel index coordinates
    /// as a double precision floating point value.
    /// All necessary conversions and transformations are made
    /// when reading the voxel, including scaling. Note that using this
    /// function continuously to traverse the volume is inefficient.
    /// Prefer the `ndarray` API for volume traversal.
    ///
    /// # Errors
    ///
    /// - `DicomError::OutOfBounds` if the given coordinates surpass this
    /// volume's boundaries.
    fn get_f64(&self, coords: &[usize]) -> Result<f64>;

    /// Get this volume's data type.
    fn data_type(&self) -> DataType;

    /// Fetch a single voxel's value in the given voxel index coordinates
    /// as a single precision floating point value.
    ///
    /// # Errors
    ///
    /// - `DicomError::OutOfBounds` if the given coordinates surpass this
    /// volume's boundaries.
    fn get_f32(&self, coords: &[usize]) -> Result<f32> {
        let v = self.get_f64(coords)?;
        Ok(v as f32)
    }
}
