//! This module defines the `VolumeHeader` struct, which describes a
//! reconstructed volume: its shape, geometry, voxel data type and the
//! acquisition metadata gathered from the DICOM series.

use crate::affine;
use crate::typedef::DataType;
use byteordered::Endianness;
use nalgebra::Matrix4;
use std::collections::BTreeMap;

/// The header of a reconstructed volume.
///
/// The axes are laid out as: an optional leading channel axis (for
/// multi-sample pixels), then x (columns), y (rows) and slice, then an
/// optional trailing volume axis.
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// Name of the volume (the series description)
    pub name: String,
    /// Size of each axis
    pub dim: Vec<usize>,
    /// Voxel size of each axis (1 for non-spatial axes)
    pub spacing: Vec<f64>,
    /// Distance between consecutive voxels along each axis, in voxels
    pub strides: Vec<usize>,
    /// Image to scanner transform (RAS, millimeters), without the spacing
    pub transform: Matrix4<f64>,
    /// Voxel data type
    pub datatype: DataType,
    /// Byte order of the voxel data
    pub endianness: Endianness,
    /// Data scaling: offset
    pub intensity_offset: f64,
    /// Data scaling: slope
    pub intensity_scale: f64,
    /// Number of samples per voxel, stored along the leading axis if more
    /// than one
    pub channels: usize,
    /// Metadata
    pub keyval: BTreeMap<String, String>,
}

impl Default for VolumeHeader {
    fn default() -> VolumeHeader {
        VolumeHeader {
            name: String::new(),
            dim: vec![1, 1, 1],
            spacing: vec![1., 1., 1.],
            strides: vec![1, 1, 1],
            transform: Matrix4::identity(),
            datatype: DataType::Uint16,
            endianness: Endianness::Little,
            intensity_offset: 0.,
            intensity_scale: 1.,
            channels: 1,
            keyval: BTreeMap::new(),
        }
    }
}

impl VolumeHeader {
    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.dim.len()
    }

    /// Index of the x axis: 1 when a channel axis leads, 0 otherwise.
    pub fn spatial_axis(&self) -> usize {
        if self.channels > 1 {
            1
        } else {
            0
        }
    }

    /// Voxel size along x, y and slice.
    pub fn voxel_size(&self) -> [f64; 3] {
        let a = self.spatial_axis();
        [self.spacing[a], self.spacing[a + 1], self.spacing[a + 2]]
    }

    /// Transform from voxel indices (x, y, slice) to scanner coordinates.
    pub fn voxel_to_scanner(&self) -> Matrix4<f64> {
        affine::voxel_to_scanner(&self.transform, self.voxel_size())
    }

    /// Total number of voxels.
    pub fn num_voxels(&self) -> usize {
        self.dim.iter().product()
    }

    /// Fill in dense strides following the axis order.
    pub fn set_dense_strides(&mut self) {
        let mut stride = 1;
        self.strides = self
            .dim
            .iter()
            .map(|d| {
                let s = stride;
                stride *= d;
                s
            })
            .collect();
    }

    /// Retrieve a metadata entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keyval.get(key).map(String::as_str)
    }

    /// Parse the diffusion encoding scheme from the metadata, one row
    /// `[gx, gy, gz, b]` per volume.
    pub fn dw_scheme(&self) -> Option<Vec<[f64; 4]>> {
        self.get(DW_SCHEME_KEY)?
            .lines()
            .map(|line| {
                let v: Vec<f64> = line
                    .split(',')
                    .map(|x| x.trim().parse::<f64>())
                    .collect::<::std::result::Result<_, _>>()
                    .ok()?;
                if v.len() == 4 {
                    Some([v[0], v[1], v[2], v[3]])
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Key of the diffusion encoding scheme entry.
pub const DW_SCHEME_KEY: &str = "dw_scheme";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strides_and_voxels() {
        let mut h = VolumeHeader {
            dim: vec![64, 64, 3, 2],
            spacing: vec![2., 2., 3., 1.],
            ..VolumeHeader::default()
        };
        h.set_dense_strides();
        assert_eq!(h.strides, vec![1, 64, 4096, 12288]);
        assert_eq!(h.num_voxels(), 64 * 64 * 6);
        assert_eq!(h.voxel_size(), [2., 2., 3.]);
    }

    #[test]
    fn channel_axis_leads() {
        let h = VolumeHeader {
            dim: vec![3, 64, 64, 1],
            spacing: vec![1., 0.5, 0.5, 4.],
            channels: 3,
            ..VolumeHeader::default()
        };
        assert_eq!(h.spatial_axis(), 1);
        assert_eq!(h.voxel_size(), [0.5, 0.5, 4.]);
    }

    #[test]
    fn parse_dw_scheme() {
        let mut h = VolumeHeader::default();
        let _ = h
            .keyval
            .insert(DW_SCHEME_KEY.to_string(), "0,0,0,0\n-0.6,0,0.8,1000".to_string());
        assert_eq!(
            h.dw_scheme().unwrap(),
            vec![[0., 0., 0., 0.], [-0.6, 0., 0.8, 1000.]]
        );
        assert!(VolumeHeader::default().dw_scheme().is_none());
    }
}
