use ndarray::ArrayView3;

use crate::geometry::Vec3;

pub(crate) struct Interpolator;

impl Interpolator {
    /// Output size (depth, height, width) after resampling every axis to the
    /// smallest spacing.
    pub(crate) fn get_isotropic_dimensions(
        spacing: Vec3,
        original_dim: (usize, usize, usize),
    ) -> (usize, usize, usize) {
        let min_spacing = spacing.x.min(spacing.y).min(spacing.z);
        if !(min_spacing > 0.0) {
            return original_dim;
        }
        let inv_min_spacing = 1.0 / min_spacing; // Multiply instead of divide

        // original_dim is (depth, height, width) corresponding to (z, y, x)
        let new_x = (original_dim.2 as f64 * spacing.x * inv_min_spacing) as usize;
        let new_y = (original_dim.1 as f64 * spacing.y * inv_min_spacing) as usize;
        let new_z = (original_dim.0 as f64 * spacing.z * inv_min_spacing) as usize;

        (new_z.max(1), new_y.max(1), new_x.max(1))
    }

    /// Lattice lookup with an open boundary: anything outside reads as 0.
    #[inline]
    fn sample_or_zero(data: &ArrayView3<i16>, x: i64, y: i64, z: i64) -> f64 {
        if x < 0 || y < 0 || z < 0 {
            return 0.0;
        }
        data.get((z as usize, y as usize, x as usize))
            .map_or(0.0, |&v| f64::from(v))
    }

    #[inline]
    pub(crate) fn nearest(data: &ArrayView3<i16>, x: f64, y: f64, z: f64) -> f32 {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return 0.0;
        }
        Self::sample_or_zero(data, x.round() as i64, y.round() as i64, z.round() as i64) as f32
    }

    /// Weighted blend of the 8 lattice samples around `(x, y, z)`.
    ///
    /// At integer coordinates every weight but one is zero, so the result is
    /// the lattice sample itself.
    #[inline]
    pub(crate) fn trilinear_interpolate(data: &ArrayView3<i16>, x: f64, y: f64, z: f64) -> f32 {
        if !(x.is_finite() && y.is_finite() && z.is_finite()) {
            return 0.0;
        }

        let x0 = x.floor();
        let y0 = y.floor();
        let z0 = z.floor();

        let dx = x - x0;
        let dy = y - y0;
        let dz = z - z0;
        let one_minus_dx = 1.0 - dx;
        let one_minus_dy = 1.0 - dy;
        let one_minus_dz = 1.0 - dz;

        let (x0, y0, z0) = (x0 as i64, y0 as i64, z0 as i64);
        let v = |ox: i64, oy: i64, oz: i64| Self::sample_or_zero(data, x0 + ox, y0 + oy, z0 + oz);

        let c00 = v(0, 0, 0).mul_add(one_minus_dx, v(1, 0, 0) * dx);
        let c10 = v(0, 1, 0).mul_add(one_minus_dx, v(1, 1, 0) * dx);
        let c01 = v(0, 0, 1).mul_add(one_minus_dx, v(1, 0, 1) * dx);
        let c11 = v(0, 1, 1).mul_add(one_minus_dx, v(1, 1, 1) * dx);

        let c0 = c00.mul_add(one_minus_dy, c10 * dy);
        let c1 = c01.mul_add(one_minus_dy, c11 * dy);

        c0.mul_add(one_minus_dz, c1 * dz) as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn ramp() -> Array3<i16> {
        // value = 100*z + 10*y + x
        Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (100 * z + 10 * y + x) as i16)
    }

    #[test]
    fn trilinear_hits_lattice_exactly() {
        let data = ramp();
        let view = data.view();
        for ((z, y, x), &v) in data.indexed_iter() {
            let got = Interpolator::trilinear_interpolate(&view, x as f64, y as f64, z as f64);
            assert_eq!(got, f32::from(v));
        }
    }

    #[test]
    fn trilinear_is_linear_inside_cell() {
        let data = ramp();
        let got = Interpolator::trilinear_interpolate(&data.view(), 0.5, 0.5, 0.5);
        assert!((got - 55.5).abs() < 1e-4, "got {got}");
    }

    #[test]
    fn outside_neighbours_read_as_zero() {
        let data = Array3::from_elem((1, 1, 1), 80i16);
        let got = Interpolator::trilinear_interpolate(&data.view(), 0.5, 0.0, 0.0);
        assert!((got - 40.0).abs() < 1e-4);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), -3.0, 0.0, 0.0), 0.0);
        assert_eq!(Interpolator::trilinear_interpolate(&data.view(), f64::NAN, 0.0, 0.0), 0.0);
    }

    #[test]
    fn nearest_rounds_to_lattice() {
        let data = ramp();
        assert_eq!(Interpolator::nearest(&data.view(), 0.6, 0.4, 1.0), 101.0);
    }

    #[test]
    fn isotropic_dimensions_stretch_coarse_axis() {
        let dims = Interpolator::get_isotropic_dimensions(Vec3::new(0.5, 0.5, 2.0), (10, 64, 64));
        assert_eq!(dims, (40, 64, 64));
    }
}
