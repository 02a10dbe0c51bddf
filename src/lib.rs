//! # DICOM-MPR library
//!
//! This crate reconstructs a voxel volume from a series of 2-D DICOM slices
//! and derives axial, coronal and sagittal views of it, together with the
//! annotated region (ROI) outlines that cross each view.
//!
//! The pieces, leaf first:
//!  - [`enums::Plane`]: which axis is depth for each of the three planes
//!  - [`volume::Volume`]: the immutable voxel array with spacing, origin and
//!    orientation, plus trilinear sampling and slice extraction
//!  - [`coordinates::CoordinateAuthority`]: every conversion between
//!    millimeters, voxels, normalized coordinates and screen pixels, and the
//!    current navigation position
//!  - [`region`]: regions, contours and the slice intersection/projection
//!    used for overlays
//!
//! Slices are assembled superior to inferior by default and each sample is
//! calibrated with its slice's rescale slope and intercept. Building is
//! all-or-nothing: a failed or cancelled build never yields a volume.
//!
//! # Examples
//!
//! ## Reading a DICOM directory and extracting the central coronal plane
//!
//! ```no_run
//! # use dicom_mpr::{VolumeLoader, CoordinateAuthority, Plane, SortBy, WindowLevel};
//! # use dicom_mpr::dicom_source::load_slices_from_directory;
//! # use std::sync::Arc;
//! let slices = load_slices_from_directory("dicom").expect("should have read the directory");
//! let volume = VolumeLoader::build(&slices, SortBy::ImagePositionPatient)
//!     .expect("should have built the volume");
//!
//! let mut coordinates = CoordinateAuthority::default();
//! coordinates.load_volume(Arc::new(volume));
//!
//! let volume = coordinates.volume().expect("volume is loaded");
//! let slice = volume.extract_slice(Plane::Coronal, coordinates.voxel_position(Plane::Coronal));
//! let image = slice
//!     .to_image(WindowLevel::new(40.0, 400.0))
//!     .expect("should have converted the slice");
//! image.save("coronal.png").expect("should have written the image");
//! ```

pub mod config;
pub mod coordinates;
pub mod dicom_source;
pub mod enums;
pub mod geometry;
mod interpolator;
pub mod region;
pub mod volume;
pub mod volume_loader;

pub use config::MprConfig;
pub use coordinates::{CoordinateAuthority, VolumeGeometry};
pub use enums::{Axis, Interpolation, Plane, SliceIndexPolicy, SortBy};
pub use geometry::{Mat3, Point2, Rect, Size, Vec3};
pub use region::{Color, Contour, OverlayState, Region, RegionDisplay, RegionId};
pub use volume::{Slice, Volume, WindowLevel};
pub use volume_loader::{CancellationFlag, PixelBuffer, SliceInput, VolumeError, VolumeLoader};
