//! Module holding an in-memory implementation of a reconstructed volume.

use super::element::DataElement;
use super::util::coords_to_index;
use super::Volume;
use crate::error::{DicomError, Result};
use crate::header::VolumeHeader;
use crate::typedef::DataType;
use byteordered::Endianness;

/// A data type for a volume contained in memory.
/// Objects of this type contain raw voxel data laid out densely with the
/// first axis varying fastest, which is converted automatically when using
/// reading methods or converting it to an `ndarray` (with the
/// `ndarray_volumes` feature).
#[derive(Debug, PartialEq, Clone)]
pub struct InMemVolume {
    dim: Vec<usize>,
    datatype: DataType,
    scl_slope: f64,
    scl_inter: f64,
    raw_data: Vec<u8>,
    endianness: Endianness,
}

impl InMemVolume {
    /// Create a volume from raw data. The data type, byte order and
    /// scaling are taken from the header.
    ///
    /// # Errors
    ///
    /// - `DicomError::MissingPixelData` if the data is smaller than the
    /// volume declared by the header.
    pub fn from_raw_data(header: &VolumeHeader, raw_data: Vec<u8>) -> Result<Self> {
        let expected = header.num_voxels() * header.datatype.size_of();
        if raw_data.len() < expected {
            return Err(DicomError::MissingPixelData(header.name.clone()));
        }
        Ok(InMemVolume {
            dim: header.dim.clone(),
            datatype: header.datatype,
            scl_slope: header.intensity_scale,
            scl_inter: header.intensity_offset,
            raw_data,
            endianness: header.endianness,
        })
    }

    /// Retrieve the raw data, consuming the volume.
    pub fn into_raw_data(self) -> Vec<u8> {
        self.raw_data
    }

    /// Retrieve a reference to the raw data.
    pub fn raw_data(&self) -> &[u8] {
        &self.raw_data
    }

    /// Byte order of the raw data.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Scaling slope and intercept applied when reading values.
    pub fn scaling(&self) -> (f64, f64) {
        (self.scl_slope, self.scl_inter)
    }

    fn get_prim<T: DataElement>(&self, index: usize) -> Result<f64> {
        let size = self.datatype.size_of();
        let range = &self.raw_data[index * size..(index + 1) * size];
        let v = T::from_raw(range, self.endianness)?;
        Ok(v.linear_transform(self.scl_slope, self.scl_inter))
    }
}

impl Volume for InMemVolume {
    fn dim(&self) -> &[usize] {
        &self.dim
    }

    fn data_type(&self) -> DataType {
        self.datatype
    }

    fn get_f64(&self, coords: &[usize]) -> Result<f64> {
        let index = coords_to_index(coords, self.dim())?;
        match self.datatype {
            DataType::Uint8 => self.get_prim::<u8>(index),
            DataType::Int8 => self.get_prim::<i8>(index),
            DataType::Uint16 => self.get_prim::<u16>(index),
            DataType::Int16 => self.get_prim::<i16>(index),
            DataType::Float32 => self.get_prim::<f32>(index),
        }
    }
}

impl<'a> Volume for &'a InMemVolume {
    fn dim(&self) -> &[usize] {
        (**self).dim()
    }

    fn dimensionality(&self) -> usize {
        (**self).dimensionality()
    }

    fn data_type(&self) -> DataType {
        (**self).data_type()
    }

    fn get_f32(&self, coords: &[usize]) -> Result<f32> {
        (**self).get_f32(coords)
    }

    fn get_f64(&self, coords: &[usize]) -> Result<f64> {
        (**self).get_f64(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(dim: Vec<usize>, datatype: DataType) -> VolumeHeader {
        VolumeHeader {
            dim,
            datatype,
            intensity_offset: -5.,
            intensity_scale: 1.,
            ..VolumeHeader::default()
        }
    }

    #[test]
    fn test_u8_inmem_volume() {
        let data: Vec<u8> = (0..64).map(|x| x * 2).collect();
        let vol = InMemVolume::from_raw_data(&header(vec![4, 4, 4], DataType::Uint8), data).unwrap();

        let v = vol.get_f32(&[3, 1, 0]).unwrap();
        assert_eq!(v, 9.);

        let v = vol.get_f32(&[3, 3, 3]).unwrap();
        assert_eq!(v, 121.);

        let v = vol.get_f32(&[2, 1, 1]).unwrap();
        assert_eq!(v, 39.);

        assert!(vol.get_f32(&[4, 0, 0]).is_err());
    }

    #[test]
    fn test_i16_big_endian_volume() {
        let mut h = header(vec![2, 2], DataType::Int16);
        h.endianness = Endianness::Big;
        h.intensity_scale = 2.;
        h.intensity_offset = 0.;
        let data = vec![0x00, 0x01, 0xFF, 0xFE, 0x00, 0x00, 0x7F, 0xFF];
        let vol = InMemVolume::from_raw_data(&h, data).unwrap();
        assert_eq!(vol.get_f64(&[0, 0]).unwrap(), 2.);
        assert_eq!(vol.get_f64(&[1, 0]).unwrap(), -4.);
        assert_eq!(vol.get_f64(&[1, 1]).unwrap(), 65534.);
    }

    #[test]
    fn test_short_data() {
        let h = header(vec![4, 4], DataType::Uint16);
        assert!(matches!(
            InMemVolume::from_raw_data(&h, vec![0; 31]),
            Err(DicomError::MissingPixelData(_))
        ));
    }
}
