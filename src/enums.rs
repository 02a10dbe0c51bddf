use serde::{Deserialize, Serialize};

use crate::geometry::Vec3;

/// Patient-space axis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::new(1.0, 0.0, 0.0),
            Axis::Y => Vec3::new(0.0, 1.0, 0.0),
            Axis::Z => Vec3::new(0.0, 0.0, 1.0),
        }
    }
}

/// The three orthogonal reconstruction planes.
///
/// Every component resolves "which axis is depth" through this table:
///
/// | plane    | slice axis | width axis | height axis |
/// |----------|------------|------------|-------------|
/// | Axial    | Z          | X          | Y           |
/// | Coronal  | Y          | X          | Z           |
/// | Sagittal | X          | Y          | Z           |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Plane {
    Axial,
    Coronal,
    Sagittal,
}

impl Plane {
    pub const ALL: [Plane; 3] = [Plane::Axial, Plane::Coronal, Plane::Sagittal];

    /// Axis perpendicular to the plane.
    #[inline]
    pub fn slice_axis(self) -> Axis {
        match self {
            Plane::Axial => Axis::Z,
            Plane::Coronal => Axis::Y,
            Plane::Sagittal => Axis::X,
        }
    }

    /// Axes spanning the plane as (width, height).
    #[inline]
    pub fn in_plane_axes(self) -> (Axis, Axis) {
        match self {
            // Looking down Z-axis: X is width, Y is height
            Plane::Axial => (Axis::X, Axis::Y),
            // Looking down Y-axis: X is width, Z is height
            Plane::Coronal => (Axis::X, Axis::Z),
            // Looking down X-axis: Y is width, Z is height
            Plane::Sagittal => (Axis::Y, Axis::Z),
        }
    }

    pub fn normal(self) -> Vec3 {
        self.slice_axis().unit()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Interpolation {
    Nearest,
    #[default]
    Trilinear,
}

/// Ordering applied to the slice series before assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortBy {
    /// Superior to inferior: descending Z of the slice position.
    #[default]
    ImagePositionPatient,
    InstanceNumber,
    None,
}

/// How slice indices are derived for a plane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum SliceIndexPolicy {
    /// One slice per voxel along the plane's slice axis.
    #[default]
    Voxel,
    /// Reformatted planes (coronal, sagittal) step at a fixed physical
    /// interval; axial keeps acquisition spacing.
    FixedInterval { mm: f64 },
}

impl SliceIndexPolicy {
    /// Step in millimeters for `plane`, or `None` when the voxel spacing applies.
    pub fn interval_for(self, plane: Plane) -> Option<f64> {
        match self {
            SliceIndexPolicy::Voxel => None,
            SliceIndexPolicy::FixedInterval { mm } => {
                (plane != Plane::Axial && mm > 0.0).then_some(mm)
            }
        }
    }
}
