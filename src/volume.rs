use crate::enums::{Axis, Interpolation, Plane};
use crate::geometry::{Mat3, Vec3};
use crate::interpolator::Interpolator;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::ArrayView3;
use ndarray::Axis as ArrayAxis;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Immutable voxel volume with its physical placement.
///
/// Samples are stored z-major as `(depth, height, width)`, so the flat index of
/// `(x, y, z)` is `z*W*H + y*W + x`.
#[derive(Debug, Clone)]
pub struct Volume {
    data: Array3<i16>,
    spacing: Vec3,
    origin: Vec3,
    orientation: Mat3,
    inverse_orientation: Mat3,
}

/// Display window used when converting samples to 8-bit grey.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindowLevel {
    pub center: f64,
    pub width: f64,
}

impl WindowLevel {
    pub fn new(center: f64, width: f64) -> Self {
        Self { center, width }
    }

    /// Window spanning `min..=max`.
    pub fn from_range(min: i16, max: i16) -> Self {
        let (min, max) = (f64::from(min), f64::from(max));
        Self {
            center: (min + max) / 2.0,
            width: (max - min).max(1.0),
        }
    }

    #[inline]
    fn to_u8(self, value: i16) -> u8 {
        let low = self.center - self.width / 2.0;
        ((f64::from(value) - low) / self.width * 255.0).clamp(0.0, 255.0) as u8
    }
}

/// One extracted 2-D plane, row-major `(height, width)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Slice {
    pub plane: Plane,
    /// Voxel coordinate along the plane's slice axis.
    pub position: f64,
    pub data: Array2<i16>,
}

impl Slice {
    pub fn width(&self) -> usize {
        self.data.dim().1
    }

    pub fn height(&self) -> usize {
        self.data.dim().0
    }

    pub fn get(&self, x: usize, y: usize) -> Option<i16> {
        self.data.get((y, x)).copied()
    }

    /// Samples in row-major order.
    pub fn to_vec(&self) -> Vec<i16> {
        self.data.iter().copied().collect()
    }

    pub fn to_image(&self, window: WindowLevel) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let pixel_data: Vec<u8> = self
            .data
            .as_slice()?
            .par_iter()
            .map(|&v| window.to_u8(v))
            .collect();
        ImageBuffer::from_raw(self.width() as u32, self.height() as u32, pixel_data)
    }
}

impl Volume {
    /// `orientation` holds the row direction, column direction and slice
    /// normal as columns; a singular matrix falls back to identity.
    pub fn new(data: Array3<i16>, spacing: Vec3, origin: Vec3, orientation: Mat3) -> Self {
        let (orientation, inverse_orientation) = match orientation.inverse() {
            Some(inverse) => (orientation, inverse),
            None => (Mat3::identity(), Mat3::identity()),
        };
        // standard layout keeps the flat z-major index valid
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Self {
            data,
            spacing,
            origin,
            orientation,
            inverse_orientation,
        }
    }

    /// Dimensions as (width, height, depth).
    pub fn dimensions(&self) -> (usize, usize, usize) {
        let (depth, height, width) = self.data.dim();
        (width, height, depth)
    }

    pub fn dimension_along(&self, axis: Axis) -> usize {
        let (width, height, depth) = self.dimensions();
        match axis {
            Axis::X => width,
            Axis::Y => height,
            Axis::Z => depth,
        }
    }

    /// Flat z-major sample buffer.
    pub fn voxels(&self) -> &[i16] {
        self.data.as_slice().unwrap_or_default()
    }

    pub fn spacing(&self) -> Vec3 {
        self.spacing
    }

    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    pub fn orientation(&self) -> Mat3 {
        self.orientation
    }

    /// Extent in millimeters, `dimensions * spacing` per axis.
    pub fn physical_size(&self) -> Vec3 {
        let (width, height, depth) = self.dimensions();
        Vec3::new(width as f64, height as f64, depth as f64).scale(self.spacing)
    }

    /// Smallest and largest sample.
    pub fn value_range(&self) -> (i16, i16) {
        self.data
            .par_iter()
            .fold(
                || (i16::MAX, i16::MIN),
                |(lo, hi), &v| (lo.min(v), hi.max(v)),
            )
            .reduce(
                || (i16::MAX, i16::MIN),
                |a, b| (a.0.min(b.0), a.1.max(b.1)),
            )
    }

    /// Lattice sample, or `None` outside the volume.
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> Option<i16> {
        self.data.get((z, y, x)).copied()
    }

    /// Trilinear sample at a fractional voxel coordinate. Neighbours outside
    /// the lattice count as 0.
    pub fn interpolated_voxel(&self, x: f64, y: f64, z: f64) -> f32 {
        Interpolator::trilinear_interpolate(&self.data.view(), x, y, z)
    }

    pub fn sample(&self, interpolation: Interpolation, x: f64, y: f64, z: f64) -> f32 {
        let view = self.data.view();
        match interpolation {
            Interpolation::Nearest => Interpolator::nearest(&view, x, y, z),
            Interpolation::Trilinear => Interpolator::trilinear_interpolate(&view, x, y, z),
        }
    }

    /// Plane output size as (width, height).
    pub fn plane_size(&self, plane: Plane) -> (usize, usize) {
        let (u, v) = plane.in_plane_axes();
        (self.dimension_along(u), self.dimension_along(v))
    }

    /// Trilinear slice through `plane` at voxel coordinate `position` along
    /// the plane's slice axis, one output pixel per voxel.
    pub fn extract_slice(&self, plane: Plane, position: f64) -> Slice {
        self.extract_slice_with(plane, position, Interpolation::Trilinear)
    }

    pub fn extract_slice_with(
        &self,
        plane: Plane,
        position: f64,
        interpolation: Interpolation,
    ) -> Slice {
        let (width, height) = self.plane_size(plane);
        self.resample_plane(plane, position, interpolation, width, height)
    }

    /// Slice resampled so one output pixel covers the smallest voxel spacing
    /// on both plane axes, preserving physical aspect ratio.
    pub fn extract_slice_isotropic(&self, plane: Plane, position: f64) -> Slice {
        let (depth, height, width) =
            Interpolator::get_isotropic_dimensions(self.spacing, self.data.dim());
        let along = |axis: Axis| match axis {
            Axis::X => width,
            Axis::Y => height,
            Axis::Z => depth,
        };
        let (u, v) = plane.in_plane_axes();
        self.resample_plane(
            plane,
            position,
            Interpolation::Trilinear,
            along(u),
            along(v),
        )
    }

    fn resample_plane(
        &self,
        plane: Plane,
        position: f64,
        interpolation: Interpolation,
        out_width: usize,
        out_height: usize,
    ) -> Slice {
        let (u_axis, v_axis) = plane.in_plane_axes();
        let slice_axis = plane.slice_axis();
        let step = |out: usize, source: usize| {
            if out > 1 {
                source.saturating_sub(1) as f64 / (out - 1) as f64
            } else {
                0.0
            }
        };
        let u_step = step(out_width, self.dimension_along(u_axis));
        let v_step = step(out_height, self.dimension_along(v_axis));
        let view: ArrayView3<i16> = self.data.view();

        let mut data = Array2::<i16>::zeros((out_height, out_width));
        data.axis_iter_mut(ArrayAxis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(row, mut pixels)| {
                for (col, pixel) in pixels.iter_mut().enumerate() {
                    let p = Vec3::ZERO
                        .with(u_axis, col as f64 * u_step)
                        .with(v_axis, row as f64 * v_step)
                        .with(slice_axis, position);
                    let value = match interpolation {
                        Interpolation::Nearest => Interpolator::nearest(&view, p.x, p.y, p.z),
                        Interpolation::Trilinear => {
                            Interpolator::trilinear_interpolate(&view, p.x, p.y, p.z)
                        }
                    };
                    *pixel = value
                        .round()
                        .clamp(f32::from(i16::MIN), f32::from(i16::MAX))
                        as i16;
                }
            });

        Slice {
            plane,
            position,
            data,
        }
    }

    /// `(p - origin) · inverse(orientation) / spacing`
    pub fn patient_to_voxel(&self, p: Vec3) -> Vec3 {
        self.inverse_orientation
            .apply(p - self.origin)
            .div(self.spacing)
    }

    pub fn voxel_to_patient(&self, v: Vec3) -> Vec3 {
        self.origin + self.orientation.apply(v.scale(self.spacing))
    }
}
