//! Loading of the voxel data of a reconstructed series.
//!
//! The frames of the series are gathered into a single dense buffer laid
//! out as described by the volume header. How the bytes of each frame map
//! into that buffer depends on the storage [`Layout`].
//!
//! [`Layout`]: ./enum.Layout.html

use super::element::DataElement;
use super::inmem::InMemVolume;
use crate::error::{DicomError, Result};
use crate::frame::Frame;
use crate::header::VolumeHeader;
use crate::typedef::DataType;
use byteordered::Endianness;
use tracing::debug;

/// How the pixel data of the frames is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// One frame per slice, copied as is.
    Default,
    /// Each frame is a mosaic tiling all the slices of a volume.
    Mosaic {
        /// dimensions of each slice (x, y)
        slice_dim: [usize; 2],
        /// number of tiles along each side of the mosaic
        tiles: usize,
        /// number of slices in the mosaic
        images: usize,
    },
    /// Frames with individual intensity scaling, converted to floating point.
    VariableScaling,
}

/// The source of a reconstructed volume's voxels.
#[derive(Debug, Clone)]
pub struct DataHandler {
    header: VolumeHeader,
    frames: Vec<Frame>,
    layout: Layout,
    datatype: DataType,
    endianness: Endianness,
}

impl DataHandler {
    /// Create a handler for the given frames, ordered with slices varying
    /// fastest. `header` describes the output volume.
    pub fn new(header: VolumeHeader, frames: Vec<Frame>, layout: Layout) -> Result<Self> {
        let first = frames.first().ok_or(DicomError::NoFrames)?;
        let datatype = DataType::from_bits(first.bits_alloc, first.signed)
            .ok_or(DicomError::UnsupportedBitsAllocated(first.bits_alloc))?;
        let endianness = first.endianness;
        Ok(DataHandler {
            header,
            frames,
            layout,
            datatype,
            endianness,
        })
    }

    /// The storage layout.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// The header of the volume to be loaded.
    pub fn header(&self) -> &VolumeHeader {
        &self.header
    }

    /// Number of bytes of a single frame (channels included).
    fn frame_bytes(&self) -> usize {
        let f = &self.frames[0];
        f.dim[0] * f.dim[1] * self.datatype.size_of() * self.header.channels
    }

    fn frame_data<'a>(&self, frame: &'a Frame) -> Result<&'a [u8]> {
        let len = self.frame_bytes();
        frame
            .pixel
            .as_ref()
            .and_then(|p| p.bytes())
            .and_then(|b| b.get(..len))
            .ok_or_else(|| DicomError::MissingPixelData(self.header.name.clone()))
    }

    /// Load the voxel data into memory.
    pub fn load(&self) -> Result<InMemVolume> {
        debug!(
            "loading {} DICOM frames with {:?} layout",
            self.frames.len(),
            self.layout
        );
        let data = match self.layout {
            Layout::Default => self.load_default()?,
            Layout::Mosaic {
                slice_dim,
                tiles,
                images,
            } => self.load_mosaic(slice_dim, tiles, images)?,
            Layout::VariableScaling => match self.datatype {
                DataType::Uint8 => self.load_scaled::<u8>()?,
                DataType::Int8 => self.load_scaled::<i8>()?,
                DataType::Uint16 => self.load_scaled::<u16>()?,
                DataType::Int16 => self.load_scaled::<i16>()?,
                DataType::Float32 => self.load_scaled::<f32>()?,
            },
        };
        InMemVolume::from_raw_data(&self.header, data)
    }

    fn load_default(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.frame_bytes() * self.frames.len());
        for frame in &self.frames {
            data.extend_from_slice(self.frame_data(frame)?);
        }
        Ok(data)
    }

    fn load_mosaic(&self, slice_dim: [usize; 2], tiles: usize, images: usize) -> Result<Vec<u8>> {
        let voxel = self.datatype.size_of() * self.header.channels;
        let mosaic_width = self.frames[0].dim[0];
        let row = slice_dim[0] * voxel;
        let mut data = Vec::with_capacity(row * slice_dim[1] * images * self.frames.len());
        for frame in &self.frames {
            let src = self.frame_data(frame)?;
            for s in 0..images {
                let (tx, ty) = (s % tiles, s / tiles);
                for y in 0..slice_dim[1] {
                    let start = ((ty * slice_dim[1] + y) * mosaic_width + tx * slice_dim[0]) * voxel;
                    data.extend_from_slice(&src[start..start + row]);
                }
            }
        }
        Ok(data)
    }

    fn load_scaled<T: DataElement>(&self) -> Result<Vec<u8>> {
        let mut values: Vec<f32> = Vec::new();
        for frame in &self.frames {
            let raw = T::from_raw_vec(self.frame_data(frame)?, self.endianness)?;
            values.extend(
                raw.into_iter()
                    .map(|v| v.linear_transform(frame.scale_slope, frame.scale_intercept) as f32),
            );
        }
        Ok(bytemuck::cast_slice::<f32, u8>(values.as_slice()).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelRef;
    use crate::util::Buffer;
    use crate::volume::Volume;
    use std::sync::Arc;

    fn frame_with_data(dim: [usize; 2], data: Vec<u8>, slope: f64) -> Frame {
        let len = data.len();
        Frame {
            dim,
            bits_alloc: 8,
            scale_slope: slope,
            pixel: Some(PixelRef {
                buffer: Arc::new(Buffer::from(data)),
                offset: 0,
                len,
            }),
            ..Frame::default()
        }
    }

    fn header(dim: Vec<usize>, datatype: DataType) -> VolumeHeader {
        VolumeHeader {
            dim,
            datatype,
            ..VolumeHeader::default()
        }
    }

    #[test]
    fn default_layout_concatenates() {
        let frames = vec![
            frame_with_data([2, 2], vec![1, 2, 3, 4], 1.),
            frame_with_data([2, 2], vec![5, 6, 7, 8], 1.),
        ];
        let h = header(vec![2, 2, 2], DataType::Uint8);
        let vol = DataHandler::new(h, frames, Layout::Default).unwrap().load().unwrap();
        assert_eq!(vol.raw_data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(vol.get_f64(&[1, 1, 1]).unwrap(), 8.);
    }

    #[test]
    fn mosaic_unpacking() {
        // 4x4 mosaic of 2x2 tiles holding 3 slices
        #[rustfmt::skip]
        let mosaic = vec![
            1, 1, 2, 2,
            1, 1, 2, 2,
            3, 3, 0, 0,
            3, 3, 0, 0,
        ];
        let frames = vec![frame_with_data([4, 4], mosaic, 1.)];
        let layout = Layout::Mosaic {
            slice_dim: [2, 2],
            tiles: 2,
            images: 3,
        };
        let h = header(vec![2, 2, 3], DataType::Uint8);
        let vol = DataHandler::new(h, frames, layout).unwrap().load().unwrap();
        assert_eq!(vol.raw_data(), &[1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn variable_scaling_to_float() {
        let frames = vec![
            frame_with_data([1, 2], vec![1, 2], 1.),
            frame_with_data([1, 2], vec![1, 2], 0.5),
        ];
        let h = VolumeHeader {
            endianness: Endianness::native(),
            ..header(vec![1, 2, 2], DataType::Float32)
        };
        let vol = DataHandler::new(h, frames, Layout::VariableScaling)
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(vol.get_f32(&[0, 1, 0]).unwrap(), 2.);
        assert_eq!(vol.get_f32(&[0, 1, 1]).unwrap(), 1.);
    }

    #[test]
    fn missing_pixel_data() {
        let mut frame = frame_with_data([4, 4], vec![0; 8], 1.);
        let h = header(vec![4, 4, 1], DataType::Uint8);
        let handler = DataHandler::new(h.clone(), vec![frame.clone()], Layout::Default).unwrap();
        assert!(matches!(handler.load(), Err(DicomError::MissingPixelData(_))));
        frame.pixel = None;
        let handler = DataHandler::new(h, vec![frame], Layout::Default).unwrap();
        assert!(handler.load().is_err());
    }
}
