//! Annotated regions (ROIs) and their intersection with displayed slices.
//!
//! Region geometry is immutable once loaded. Contours live behind an `Arc` so
//! a region can be shown on several planes at once, and display attributes
//! (visibility, opacity, selection) are kept apart in an [`OverlayState`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coordinates::VolumeGeometry;
use crate::enums::{Axis, Plane};
use crate::geometry::{Point2, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// One closed outline on one source slice, in patient-space millimeters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    /// Position of the source slice along Z (mm).
    pub slice_position: f64,
    /// Closed sequence; the last point connects back to the first.
    pub points: Vec<Vec3>,
}

impl Contour {
    pub fn new(slice_position: f64, points: Vec<Vec3>) -> Self {
        Self {
            slice_position,
            points,
        }
    }

    /// Contour lying on the slice of its first point.
    pub fn from_points(points: Vec<Vec3>) -> Option<Self> {
        let slice_position = points.first()?.z;
        Some(Self::new(slice_position, points))
    }

    /// Per-axis (min, max) corners of the outline.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.points.first()?;
        Some(self.points.iter().skip(1).fold((first, first), |(lo, hi), p| {
            (
                Vec3::new(lo.x.min(p.x), lo.y.min(p.y), lo.z.min(p.z)),
                Vec3::new(hi.x.max(p.x), hi.y.max(p.y), hi.z.max(p.z)),
            )
        }))
    }

    /// Mean of the outline's points.
    pub fn centroid(&self) -> Option<Vec3> {
        if self.points.is_empty() {
            return None;
        }
        let sum = self.points.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
        Some(sum * (1.0 / self.points.len() as f64))
    }

    /// Distance (mm) from the contour to `position` along `axis`.
    ///
    /// Along Z this compares the contour's slice position. Along X or Y an
    /// axial contour spans a range, and the distance is zero anywhere inside
    /// it. An empty contour has no extent off the Z axis.
    pub fn distance_along(&self, axis: Axis, position: f64) -> Option<f64> {
        if axis == Axis::Z {
            return Some((self.slice_position - position).abs());
        }
        let (lo, hi) = self.bounds()?;
        let (lo, hi) = (lo[axis], hi[axis]);
        Some(if position < lo {
            lo - position
        } else if position > hi {
            position - hi
        } else {
            0.0
        })
    }
}

/// A named, colored structure made of per-slice contours.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub color: Color,
    contours: Arc<[Contour]>,
}

impl Region {
    pub fn new(id: RegionId, name: impl Into<String>, color: Color, contours: Vec<Contour>) -> Self {
        Self {
            id,
            name: name.into(),
            color,
            contours: contours.into(),
        }
    }

    pub fn contours(&self) -> &[Contour] {
        &self.contours
    }

    /// Copy with a new name; contour storage is shared.
    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// Copy with a new color; contour storage is shared.
    pub fn with_color(&self, color: Color) -> Self {
        Self {
            color,
            ..self.clone()
        }
    }

    pub fn shares_geometry_with(&self, other: &Region) -> bool {
        Arc::ptr_eq(&self.contours, &other.contours)
    }

    pub fn contours_for_slice(
        &self,
        slice_position: f64,
        plane: Plane,
        tolerance: f64,
    ) -> impl Iterator<Item = &Contour> + '_ {
        self.contours
            .iter()
            .filter(move |c| intersects_slice(c, slice_position, plane, tolerance))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionDisplay {
    pub visible: bool,
    pub opacity: f32,
    pub selected: bool,
}

impl Default for RegionDisplay {
    fn default() -> Self {
        Self {
            visible: true,
            opacity: 1.0,
            selected: false,
        }
    }
}

/// Mutable display attributes keyed by region; regions without an entry use
/// [`RegionDisplay::default`].
#[derive(Clone, Debug, Default)]
pub struct OverlayState {
    display: HashMap<RegionId, RegionDisplay>,
}

impl OverlayState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn display(&self, id: RegionId) -> RegionDisplay {
        self.display.get(&id).copied().unwrap_or_default()
    }

    pub fn is_visible(&self, id: RegionId) -> bool {
        self.display(id).visible
    }

    pub fn set_visible(&mut self, id: RegionId, visible: bool) {
        self.display.entry(id).or_default().visible = visible;
    }

    pub fn toggle_visible(&mut self, id: RegionId) -> bool {
        let entry = self.display.entry(id).or_default();
        entry.visible = !entry.visible;
        entry.visible
    }

    pub fn set_opacity(&mut self, id: RegionId, opacity: f32) {
        self.display.entry(id).or_default().opacity = opacity.clamp(0.0, 1.0);
    }

    /// Select `id`, deselecting any other region.
    pub fn select(&mut self, id: RegionId) {
        self.clear_selection();
        self.display.entry(id).or_default().selected = true;
    }

    pub fn clear_selection(&mut self) {
        for display in self.display.values_mut() {
            display.selected = false;
        }
    }

    pub fn selected(&self) -> Option<RegionId> {
        self.display
            .iter()
            .find_map(|(id, display)| display.selected.then_some(*id))
    }
}

/// Matching tolerance of one in-plane voxel.
pub fn default_tolerance(spacing: Vec3) -> f64 {
    spacing.x.min(spacing.y)
}

/// Whether `contour` lies within `tolerance` mm of `slice_position` along the
/// slice axis of `plane`.
pub fn intersects_slice(contour: &Contour, slice_position: f64, plane: Plane, tolerance: f64) -> bool {
    contour
        .distance_along(plane.slice_axis(), slice_position)
        .is_some_and(|d| d <= tolerance)
}

/// Plane-pixel coordinates of every contour point: `(coord - origin) / spacing`
/// on the plane's two axes, dropping the slice-axis component.
pub fn project_to_plane(contour: &Contour, plane: Plane, origin: Vec3, spacing: Vec3) -> Vec<Point2> {
    let (u, v) = plane.in_plane_axes();
    contour
        .points
        .iter()
        .map(|p| {
            Point2::new(
                (p[u] - origin[u]) / spacing[u],
                (p[v] - origin[v]) / spacing[v],
            )
        })
        .collect()
}

/// Plane-pixel coordinates through the volume's oriented mapping, so rows
/// and columns match [`Volume::extract_slice`](crate::volume::Volume::extract_slice)
/// output. Equal to [`project_to_plane`] for identity orientation.
pub fn project_to_volume_plane(points: &[Vec3], plane: Plane, geometry: &VolumeGeometry) -> Vec<Point2> {
    let (u, v) = plane.in_plane_axes();
    points
        .iter()
        .map(|p| {
            let voxel = geometry.world_to_voxel(*p);
            Point2::new(voxel[u], voxel[v])
        })
        .collect()
}

/// Points where the closed outline crosses the plane `axis == position` of a
/// reformatted view, in outline order.
pub fn cross_section(contour: &Contour, plane: Plane, position: f64) -> Vec<Vec3> {
    let axis = plane.slice_axis();
    let points = &contour.points;
    let mut crossings = Vec::new();
    for (i, &a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        let da = a[axis] - position;
        let db = b[axis] - position;
        if da == 0.0 {
            crossings.push(a);
        } else if da * db < 0.0 {
            let t = da / (da - db);
            crossings.push(a + (b - a) * t);
        }
    }
    crossings
}

/// Visible regions with at least one contour on the queried slice.
pub fn regions_for_slice<'a>(
    regions: &'a [Region],
    overlay: &OverlayState,
    slice_position: f64,
    plane: Plane,
    tolerance: f64,
) -> Vec<&'a Region> {
    regions
        .iter()
        .filter(|region| overlay.is_visible(region.id))
        .filter(|region| {
            region
                .contours_for_slice(slice_position, plane, tolerance)
                .next()
                .is_some()
        })
        .collect()
}

/// Drawable outlines of one region on one slice.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionOutline {
    pub id: RegionId,
    pub color: Color,
    pub opacity: f32,
    pub selected: bool,
    /// One plane-pixel point sequence per intersecting contour.
    pub outlines: Vec<Vec<Point2>>,
}

/// Outlines for every visible region on the queried slice, in the pixel
/// space of the volume described by `geometry`. On the axial plane whole
/// contours are projected; on reformatted planes only their crossing points
/// with the slice are.
pub fn outlines_for_slice(
    regions: &[Region],
    overlay: &OverlayState,
    slice_position: f64,
    plane: Plane,
    tolerance: f64,
    geometry: &VolumeGeometry,
) -> Vec<RegionOutline> {
    regions_for_slice(regions, overlay, slice_position, plane, tolerance)
        .into_iter()
        .map(|region| {
            let outlines = region
                .contours_for_slice(slice_position, plane, tolerance)
                .map(|contour| match plane {
                    Plane::Axial => project_to_volume_plane(&contour.points, plane, geometry),
                    Plane::Coronal | Plane::Sagittal => project_to_volume_plane(
                        &cross_section(contour, plane, slice_position),
                        plane,
                        geometry,
                    ),
                })
                .filter(|outline| !outline.is_empty())
                .collect();
            let display = overlay.display(region.id);
            RegionOutline {
                id: region.id,
                color: region.color,
                opacity: display.opacity,
                selected: display.selected,
                outlines,
            }
        })
        .collect()
}
