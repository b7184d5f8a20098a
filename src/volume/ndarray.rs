//! Interfaces and implementations specific to integration with `ndarray`.
//!
//! This module introduces the trait [`IntoNdArray`], which is implemented for
//! in-memory volumes and enables their mapping into an [`Array`] with a
//! dynamic number of dimensions and an arbitrary element type. The intensity
//! scaling of the volume is also considered in this transformation.
//!
//! #### Note on memory order
//!
//! Reconstructed volumes are laid out with the first axis varying fastest
//! (column major order, also called Fortran order). The array resulting from
//! this operation will also be in this memory order, rather than the usual
//! row major order (AKA C ordering).
//!
//! [`IntoNdArray`]: ./trait.IntoNdArray.html
//! [`Array`]: ../../../ndarray/type.Array.html
//!
use super::element::DataElement;
use super::inmem::InMemVolume;
use super::Volume;
use crate::error::Result;
use crate::typedef::DataType;
use ndarray::{Array, IxDyn, ShapeBuilder};
use num_traits::AsPrimitive;

/// Trait for volumes which can be converted to an ndarray.
///
/// Please see the [module-level documentation](index.html) for more details.
pub trait IntoNdArray {
    /// Consume the volume into an ndarray with the same number of dimensions
    /// and the given target element type `T`.
    fn into_ndarray<T>(self) -> Result<Array<T, IxDyn>>
    where
        T: DataElement,
        f64: AsPrimitive<T>;
}

fn convert_bytes_and_cast_to<I, O>(volume: &InMemVolume) -> Result<Array<O, IxDyn>>
where
    I: DataElement,
    O: DataElement,
    f64: AsPrimitive<O>,
{
    let (slope, inter) = volume.scaling();
    let values: Vec<O> = I::from_raw_vec(volume.raw_data(), volume.endianness())?
        .into_iter()
        .take(volume.dim().iter().product())
        .map(|v| AsPrimitive::<O>::as_(v.linear_transform(slope, inter)))
        .collect();
    let shape = IxDyn(volume.dim()).f();
    Ok(Array::from_shape_vec(shape, values)
        .map_err(|e| ::std::io::Error::new(::std::io::ErrorKind::InvalidData, e))?)
}

impl IntoNdArray for InMemVolume {
    fn into_ndarray<T>(self) -> Result<Array<T, IxDyn>>
    where
        T: DataElement,
        f64: AsPrimitive<T>,
    {
        (&self).into_ndarray()
    }
}

impl<'a> IntoNdArray for &'a InMemVolume {
    fn into_ndarray<T>(self) -> Result<Array<T, IxDyn>>
    where
        T: DataElement,
        f64: AsPrimitive<T>,
    {
        match self.data_type() {
            DataType::Uint8 => convert_bytes_and_cast_to::<u8, T>(self),
            DataType::Int8 => convert_bytes_and_cast_to::<i8, T>(self),
            DataType::Uint16 => convert_bytes_and_cast_to::<u16, T>(self),
            DataType::Int16 => convert_bytes_and_cast_to::<i16, T>(self),
            DataType::Float32 => convert_bytes_and_cast_to::<f32, T>(self),
        }
    }
}
