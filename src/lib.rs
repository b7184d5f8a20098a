//! Reconstruction of image volumes from DICOM series.
//!
//! DICOM files are scanned into [`Image`]s, one [`Frame`] per 2D slice,
//! and grouped into a [`Tree`] of patients, studies and series. A series
//! is then reconstructed into a [`VolumeHeader`] describing the volume
//! (shape, geometry, acquisition metadata) and a handler which loads its
//! voxel data into an [`InMemVolume`].
//!
//! ```no_run
//! use dicom_recon::{reconstruct, ReconstructOptions, Tree, Volume};
//!
//! # fn run() -> dicom_recon::Result<()> {
//! let options = ReconstructOptions::from_env();
//! let tree = Tree::read_dir("/path/to/dicom", &options)?;
//! let recon = reconstruct(tree.single_series()?, &options)?;
//! println!("{:?}", recon.header.dim);
//! let volume = recon.load()?;
//! let value = volume.get_f32(&[0, 0, 0])?;
//! # let _ = value;
//! # Ok(())
//! # }
//! ```
//!
//! [`Image`]: ./image/struct.Image.html
//! [`Frame`]: ./frame/struct.Frame.html
//! [`Tree`]: ./tree/struct.Tree.html
//! [`VolumeHeader`]: ./header/struct.VolumeHeader.html
//! [`InMemVolume`]: ./volume/struct.InMemVolume.html
#![deny(missing_debug_implementations)]
#![warn(missing_docs, unused_extern_crates, trivial_casts, unused_results)]

pub mod affine;
pub mod dict;
pub mod element;
pub mod error;
pub mod extension;
pub mod frame;
pub mod header;
pub mod image;
pub mod mapper;
pub mod options;
pub mod tree;
pub mod typedef;
pub mod util;
pub mod volume;

pub use crate::error::{DicomError, Result};
pub use crate::frame::Frame;
pub use crate::header::VolumeHeader;
pub use crate::image::Image;
pub use crate::mapper::{reconstruct, reconstruct_files, reconstruct_frames, Reconstruction};
pub use crate::options::ReconstructOptions;
pub use crate::tree::{SeriesRef, Tree};
pub use crate::typedef::DataType;
pub use crate::volume::{DataHandler, InMemVolume, Layout, Volume};
pub use byteordered::Endianness;
