//! This module defines the data element API, which enables volume
//! implementations to read and convert voxel values.
use crate::error::Result;
use byteordered::{ByteOrdered, Endianness};
use num_traits::cast::AsPrimitive;
use std::io::Read;

/// Trait type for characterizing a data element, implemented for
/// primitive numeric types which are used by the crate to represent voxel
/// values.
pub trait DataElement: 'static + Sized + Copy + AsPrimitive<f32> + AsPrimitive<f64> {
    /// Read a single element from the given byte source.
    fn from_raw<R: Read>(src: R, endianness: Endianness) -> Result<Self>;

    /// Transform the given raw bytes into a vector of data elements. A
    /// trailing incomplete element is ignored.
    fn from_raw_vec(bytes: &[u8], endianness: Endianness) -> Result<Vec<Self>> {
        let size = ::std::mem::size_of::<Self>();
        let n = bytes.len() / size;
        let mut src = &bytes[..n * size];
        (0..n).map(|_| Self::from_raw(&mut src, endianness)).collect()
    }

    /// Apply a linear transformation, computed in double precision.
    fn linear_transform(self, slope: f64, intercept: f64) -> f64 {
        let v = AsPrimitive::<f64>::as_(self);
        if slope == 0. {
            v
        } else {
            v * slope + intercept
        }
    }
}

macro_rules! data_element {
    ($t:ty, $read:ident) => {
        impl DataElement for $t {
            fn from_raw<R: Read>(src: R, endianness: Endianness) -> Result<Self> {
                Ok(ByteOrdered::runtime(src, endianness).$read()?)
            }
        }
    };
}

data_element!(u8, read_u8);
data_element!(i8, read_i8);
data_element!(u16, read_u16);
data_element!(i16, read_i16);
data_element!(u32, read_u32);
data_element!(i32, read_i32);
data_element!(f32, read_f32);
data_element!(f64, read_f64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_elements() {
        let bytes = [0x01, 0x02, 0xFF, 0xFF, 0x03];
        assert_eq!(
            u16::from_raw_vec(&bytes, Endianness::Little).unwrap(),
            vec![0x0201, 0xFFFF]
        );
        assert_eq!(
            i16::from_raw_vec(&bytes, Endianness::Big).unwrap(),
            vec![0x0102, -1]
        );
        assert_eq!(u8::from_raw(&bytes[4..], Endianness::Big).unwrap(), 3);
    }

    #[test]
    fn transform() {
        assert_eq!(200u8.linear_transform(0.5, -10.), 90.);
        assert_eq!(7i16.linear_transform(0., 3.), 7.);
    }
}
