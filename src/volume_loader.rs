use crate::{
    enums::SortBy,
    geometry::{Mat3, Vec3},
    volume::Volume,
};

use ndarray::Array3;
use rayon::prelude::*;
use std::{
    cmp::Ordering,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering as AtomicOrdering},
    },
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("No slices supplied")]
    EmptyInput,

    #[error("First slice has no row/column count")]
    MissingDimensions,

    #[error("Slice {0} has no pixel data")]
    MissingPixelData(usize),

    #[error("Slice {index} has {found} samples, expected {expected}")]
    InconsistentDimensions {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("Volume construction was cancelled")]
    Cancelled,

    #[error("Volume construction task failed: {0}")]
    Task(String),

    #[error("Invalid volume shape: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Raw stored samples of one slice, before rescaling.
#[derive(Clone, Debug, PartialEq)]
pub enum PixelBuffer {
    U8(Vec<u8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
}

impl PixelBuffer {
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::U8(v) => v.len(),
            PixelBuffer::U16(v) => v.len(),
            PixelBuffer::I16(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply `value * slope + intercept` to every sample, saturating to `i16`.
    fn rescale(&self, slope: f64, intercept: f64) -> Vec<i16> {
        #[inline]
        fn calibrate(raw: f64, slope: f64, intercept: f64) -> i16 {
            raw.mul_add(slope, intercept)
                .round()
                .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
        }

        match self {
            PixelBuffer::U8(v) => v
                .iter()
                .map(|&p| calibrate(f64::from(p), slope, intercept))
                .collect(),
            PixelBuffer::U16(v) => v
                .iter()
                .map(|&p| calibrate(f64::from(p), slope, intercept))
                .collect(),
            PixelBuffer::I16(v) => v
                .iter()
                .map(|&p| calibrate(f64::from(p), slope, intercept))
                .collect(),
        }
    }
}

/// Per-slice metadata and pixels as supplied by the parsing layer.
#[derive(Clone, Debug, Default)]
pub struct SliceInput {
    /// Patient-space position of the first transmitted pixel (mm).
    pub position: Option<Vec3>,
    /// Row direction cosines followed by column direction cosines.
    pub orientation: Option<[f64; 6]>,
    /// (row spacing, column spacing) in mm: distance between rows, then between columns.
    pub pixel_spacing: Option<(f64, f64)>,
    pub slice_thickness: Option<f64>,
    pub rescale_slope: Option<f64>,
    pub rescale_intercept: Option<f64>,
    pub instance_number: Option<i32>,
    pub rows: Option<usize>,
    pub columns: Option<usize>,
    pub pixels: Option<PixelBuffer>,
}

impl SliceInput {
    pub fn new(rows: usize, columns: usize, pixels: PixelBuffer) -> Self {
        Self {
            rows: Some(rows),
            columns: Some(columns),
            pixels: Some(pixels),
            ..Default::default()
        }
    }

    pub fn with_position(mut self, position: Vec3) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_pixel_spacing(mut self, row: f64, column: f64) -> Self {
        self.pixel_spacing = Some((row, column));
        self
    }

    pub fn with_slice_thickness(mut self, thickness: f64) -> Self {
        self.slice_thickness = Some(thickness);
        self
    }

    pub fn with_rescale(mut self, slope: f64, intercept: f64) -> Self {
        self.rescale_slope = Some(slope);
        self.rescale_intercept = Some(intercept);
        self
    }

    pub fn with_orientation(mut self, cosines: [f64; 6]) -> Self {
        self.orientation = Some(cosines);
        self
    }

    pub fn with_instance_number(mut self, number: i32) -> Self {
        self.instance_number = Some(number);
        self
    }
}

/// Shared flag checked between slices while a volume is being built.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, AtomicOrdering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(AtomicOrdering::Acquire)
    }
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Build a volume from a slice series.
    ///
    /// # Arguments
    ///
    /// * `slices` - Per-slice metadata and pixel buffers, in any order
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no slices are supplied, the first slice lacks its
    /// row/column count, or any slice lacks pixel data. Slice indices in
    /// errors refer to positions in `slices`.
    pub fn build(slices: &[SliceInput], sort_by: SortBy) -> Result<Volume, VolumeError> {
        Self::build_cancellable(slices, sort_by, &CancellationFlag::new())
    }

    /// Same as [`VolumeLoader::build`], checking `cancel` between slices.
    ///
    /// A cancelled build returns [`VolumeError::Cancelled`] and no volume.
    pub fn build_cancellable(
        slices: &[SliceInput],
        sort_by: SortBy,
        cancel: &CancellationFlag,
    ) -> Result<Volume, VolumeError> {
        if slices.is_empty() {
            return Err(VolumeError::EmptyInput);
        }

        let order = Self::sort_order(slices, sort_by);
        let first = &slices[order[0]];
        let last = &slices[order[order.len() - 1]];

        let (height, width) = match (first.rows, first.columns) {
            (Some(rows), Some(columns)) if rows > 0 && columns > 0 => (rows, columns),
            _ => return Err(VolumeError::MissingDimensions),
        };

        Self::validate_pixels(slices, &order, width * height)?;

        let planes: Option<Vec<Vec<i16>>> = order
            .par_iter()
            .map(|&index| {
                if cancel.is_cancelled() {
                    return None;
                }
                let slice = &slices[index];
                let pixels = slice.pixels.as_ref()?;
                Some(pixels.rescale(
                    slice.rescale_slope.unwrap_or(1.0),
                    slice.rescale_intercept.unwrap_or(0.0),
                ))
            })
            .collect();

        let Some(planes) = planes else {
            warn!(slices = slices.len(), "volume construction cancelled");
            return Err(VolumeError::Cancelled);
        };
        if cancel.is_cancelled() {
            warn!(slices = slices.len(), "volume construction cancelled");
            return Err(VolumeError::Cancelled);
        }

        let depth = planes.len();
        let voxels: Vec<i16> = planes.into_iter().flatten().collect();
        let data = Array3::from_shape_vec((depth, height, width), voxels)?;

        let spacing = Self::get_spacing(first, last, depth);
        let origin = first.position.unwrap_or(Vec3::ZERO);
        let orientation = Self::get_orientation(first, last, depth);

        info!(
            width,
            height,
            depth,
            spacing = ?spacing,
            origin = ?origin,
            "built volume"
        );

        Ok(Volume::new(data, spacing, origin, orientation))
    }

    /// Build on the blocking pool so the caller's runtime stays responsive.
    ///
    /// Nothing is published until the whole volume exists; the returned
    /// `Arc` can be handed straight to a
    /// [`CoordinateAuthority`](crate::coordinates::CoordinateAuthority).
    pub async fn build_in_background(
        slices: Vec<SliceInput>,
        sort_by: SortBy,
        cancel: CancellationFlag,
    ) -> Result<Arc<Volume>, VolumeError> {
        let handle = tokio::task::spawn_blocking(move || {
            Self::build_cancellable(&slices, sort_by, &cancel).map(Arc::new)
        });
        handle
            .await
            .map_err(|err| VolumeError::Task(err.to_string()))?
    }

    /// Indices into `slices`, in assembly order. Stable, so ties keep input order.
    fn sort_order(slices: &[SliceInput], sort_by: SortBy) -> Vec<usize> {
        let mut order: Vec<usize> = (0..slices.len()).collect();

        match sort_by {
            // descending Z: compare negated keys so missing positions stay last
            SortBy::ImagePositionPatient => order.sort_by(|&a, &b| {
                Self::keyed_cmp(
                    slices[a].position.map(|p| -p.z),
                    slices[b].position.map(|p| -p.z),
                )
            }),
            SortBy::InstanceNumber => order.sort_by(|&a, &b| {
                Self::keyed_cmp(
                    slices[a].instance_number.map(f64::from),
                    slices[b].instance_number.map(f64::from),
                )
            }),
            SortBy::None => {}
        }

        order
    }

    /// Ascending comparison; slices without a key sort after those with one.
    fn keyed_cmp(a: Option<f64>, b: Option<f64>) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn validate_pixels(
        slices: &[SliceInput],
        order: &[usize],
        expected: usize,
    ) -> Result<(), VolumeError> {
        for &index in order {
            let pixels = slices[index]
                .pixels
                .as_ref()
                .ok_or(VolumeError::MissingPixelData(index))?;
            if pixels.len() != expected {
                return Err(VolumeError::InconsistentDimensions {
                    index,
                    expected,
                    found: pixels.len(),
                });
            }
        }
        Ok(())
    }

    /// Spacing is always finite and positive; unusable values fall back to 1 mm.
    fn get_spacing(first: &SliceInput, last: &SliceInput, depth: usize) -> Vec3 {
        let usable = |mm: f64| mm.is_finite() && mm > f64::EPSILON;
        let (row_spacing, column_spacing) = match first.pixel_spacing {
            Some((row, column)) if usable(row) && usable(column) => (row, column),
            Some(spacing) => {
                warn!(?spacing, "unusable pixel spacing, assuming 1 mm");
                (1.0, 1.0)
            }
            None => {
                warn!("first slice has no pixel spacing, assuming 1 mm");
                (1.0, 1.0)
            }
        };
        let thickness = first.slice_thickness.filter(|t| usable(*t));

        let stacked = match (first.position, last.position) {
            (Some(a), Some(b)) if depth > 1 => {
                Some(a.distance(b) / (depth - 1) as f64).filter(|d| usable(*d))
            }
            _ => None,
        };

        let z_spacing = stacked.or(thickness).unwrap_or_else(|| {
            debug!("no slice positions or thickness, assuming 1 mm between slices");
            1.0
        });

        // columns advance along X, rows along Y
        Vec3::new(column_spacing, row_spacing, z_spacing)
    }

    /// Columns are row direction, column direction, slice normal. The normal
    /// points from the first assembled slice towards the last.
    fn get_orientation(first: &SliceInput, last: &SliceInput, depth: usize) -> Mat3 {
        let (row_dir, col_dir) = match first.orientation {
            Some(c) => {
                let row = Vec3::new(c[0], c[1], c[2]).normalized();
                let col = Vec3::new(c[3], c[4], c[5]).normalized();
                match (row, col) {
                    (Some(row), Some(col)) => (row, col),
                    _ => (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
                }
            }
            None => (Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)),
        };

        let mut normal = row_dir.cross(col_dir);
        if let (Some(a), Some(b)) = (first.position, last.position)
            && depth > 1
            && normal.dot(b - a) < 0.0
        {
            normal = normal * -1.0;
        }

        Mat3::from_columns(row_dir, col_dir, normal)
    }
}
