//! Coordinate authority
//!
//! One owned object answers every spatial conversion between patient-space
//! millimeters, voxel indices, normalized `[0, 1]` coordinates and screen
//! pixels, and holds the current navigation position. All mutation goes
//! through [`CoordinateAuthority::update_world_position`], which clamps to the
//! volume and drops sub-threshold changes; the position is a single [`Vec3`]
//! replaced under `&mut self`, so readers never see a partial update.
//!
//! World space is patient space: voxel `v` sits at
//! `origin + orientation * (v * spacing)`, the same mapping as
//! [`Volume::voxel_to_patient`]. With identity orientation this reduces to
//! `origin + v * spacing`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace};
use web_time::Instant;

use crate::config::MprConfig;
use crate::enums::{Axis, Plane, SliceIndexPolicy};
use crate::geometry::{Mat3, Point2, Rect, Size, Vec3};
use crate::volume::Volume;

/// Placement of the active volume, or a unit placeholder before one loads.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeGeometry {
    /// (width, height, depth)
    pub dimensions: (usize, usize, usize),
    pub spacing: Vec3,
    pub origin: Vec3,
    /// Row direction, column direction and slice normal as columns.
    pub orientation: Mat3,
    inverse_orientation: Mat3,
}

impl Default for VolumeGeometry {
    fn default() -> Self {
        Self::new((1, 1, 1), Vec3::ONE, Vec3::ZERO, Mat3::identity())
    }
}

impl VolumeGeometry {
    /// A singular `orientation` falls back to identity.
    pub fn new(dimensions: (usize, usize, usize), spacing: Vec3, origin: Vec3, orientation: Mat3) -> Self {
        let (orientation, inverse_orientation) = match orientation.inverse() {
            Some(inverse) => (orientation, inverse),
            None => (Mat3::identity(), Mat3::identity()),
        };
        Self {
            dimensions,
            spacing,
            origin,
            orientation,
            inverse_orientation,
        }
    }

    pub fn from_volume(volume: &Volume) -> Self {
        Self::new(
            volume.dimensions(),
            volume.spacing(),
            volume.origin(),
            volume.orientation(),
        )
    }

    pub fn dimension(&self, axis: Axis) -> usize {
        match axis {
            Axis::X => self.dimensions.0,
            Axis::Y => self.dimensions.1,
            Axis::Z => self.dimensions.2,
        }
    }

    /// Dimensions as a voxel-space vector.
    pub fn size(&self) -> Vec3 {
        let (w, h, d) = self.dimensions;
        Vec3::new(w as f64, h as f64, d as f64)
    }

    /// `dimensions * spacing`, measured along the volume's own axes.
    pub fn extent(&self) -> Vec3 {
        self.size().scale(self.spacing)
    }

    pub fn center(&self) -> Vec3 {
        self.voxel_to_world(self.size() * 0.5)
    }

    pub fn world_to_voxel(&self, world: Vec3) -> Vec3 {
        self.inverse_orientation
            .apply(world - self.origin)
            .div(self.spacing)
    }

    pub fn voxel_to_world(&self, voxel: Vec3) -> Vec3 {
        self.origin + self.orientation.apply(voxel.scale(self.spacing))
    }

    /// Limit a voxel coordinate to the physical box `0..=dimensions`.
    pub fn clamp_voxel(&self, voxel: Vec3) -> Vec3 {
        voxel.clamp(Vec3::ZERO, self.size())
    }
}

/// Smoothed slices-per-second estimate fed by scroll events.
#[derive(Clone, Debug)]
struct ScrollTracker {
    last: Option<(Instant, Plane, usize)>,
    velocity: f64,
    idle_timeout: Duration,
    smoothing: f64,
}

impl ScrollTracker {
    fn new(idle_timeout: Duration, smoothing: f64) -> Self {
        Self {
            last: None,
            velocity: 0.0,
            idle_timeout,
            smoothing: smoothing.clamp(0.0, 1.0),
        }
    }

    fn record(&mut self, plane: Plane, index: usize, now: Instant) {
        if let Some((at, last_plane, last_index)) = self.last {
            let elapsed = now.saturating_duration_since(at);
            if last_plane != plane || elapsed > self.idle_timeout {
                self.velocity = 0.0;
            } else if !elapsed.is_zero() {
                let moved = index.abs_diff(last_index) as f64;
                let instant = moved / elapsed.as_secs_f64();
                self.velocity =
                    self.smoothing * self.velocity + (1.0 - self.smoothing) * instant;
            }
        }
        self.last = Some((now, plane, index));
    }

    fn velocity_at(&self, now: Instant) -> f64 {
        match self.last {
            Some((at, _, _)) if now.saturating_duration_since(at) <= self.idle_timeout => {
                self.velocity
            }
            _ => 0.0,
        }
    }

    fn reset(&mut self) {
        self.last = None;
        self.velocity = 0.0;
    }
}

pub struct CoordinateAuthority {
    volume: Option<Arc<Volume>>,
    geometry: VolumeGeometry,
    position: Vec3,
    policy: SliceIndexPolicy,
    hysteresis_mm: f64,
    scroll: ScrollTracker,
}

impl Default for CoordinateAuthority {
    fn default() -> Self {
        Self::new(&MprConfig::default())
    }
}

impl CoordinateAuthority {
    pub fn new(config: &MprConfig) -> Self {
        Self {
            volume: None,
            geometry: VolumeGeometry::default(),
            position: Vec3::ZERO,
            policy: config.slice_index_policy,
            hysteresis_mm: config.hysteresis_mm.max(0.0),
            scroll: ScrollTracker::new(config.scroll_idle_timeout, config.scroll_smoothing),
        }
    }

    /// Publish a fully built volume and recenter on it.
    pub fn load_volume(&mut self, volume: Arc<Volume>) {
        self.geometry = VolumeGeometry::from_volume(&volume);
        self.volume = Some(volume);
        self.position = self.geometry.center();
        self.scroll.reset();
        info!(
            dimensions = ?self.geometry.dimensions,
            spacing = ?self.geometry.spacing,
            center = ?self.position,
            "volume loaded"
        );
    }

    /// Drop the active volume; queries fall back to the unit defaults.
    pub fn unload(&mut self) {
        self.volume = None;
        self.geometry = VolumeGeometry::default();
        self.position = Vec3::ZERO;
        self.scroll.reset();
    }

    pub fn volume(&self) -> Option<&Arc<Volume>> {
        self.volume.as_ref()
    }

    pub fn has_volume(&self) -> bool {
        self.volume.is_some()
    }

    pub fn geometry(&self) -> &VolumeGeometry {
        &self.geometry
    }

    pub fn current_world_position(&self) -> Vec3 {
        self.position
    }

    pub fn slice_index_policy(&self) -> SliceIndexPolicy {
        self.policy
    }

    pub fn set_slice_index_policy(&mut self, policy: SliceIndexPolicy) {
        if policy != self.policy {
            debug!(?policy, "slice index policy changed");
            self.policy = policy;
        }
    }

    pub fn world_to_voxel(&self, world: Vec3) -> Vec3 {
        self.geometry.world_to_voxel(world)
    }

    pub fn voxel_to_world(&self, voxel: Vec3) -> Vec3 {
        self.geometry.voxel_to_world(voxel)
    }

    /// Index 0 maps to 0.0 and the last index to 1.0 on every axis.
    pub fn world_to_normalized(&self, world: Vec3) -> Vec3 {
        let voxel = self.world_to_voxel(world);
        let mut out = Vec3::ZERO;
        for axis in Axis::ALL {
            let span = self.geometry.dimension(axis).saturating_sub(1);
            out[axis] = if span == 0 {
                0.0
            } else {
                voxel[axis] / span as f64
            };
        }
        out
    }

    pub fn normalized_to_world(&self, normalized: Vec3) -> Vec3 {
        let mut voxel = Vec3::ZERO;
        for axis in Axis::ALL {
            let span = self.geometry.dimension(axis).saturating_sub(1);
            voxel[axis] = normalized[axis] * span as f64;
        }
        self.voxel_to_world(voxel)
    }

    /// Distance between consecutive slices of `plane` in millimeters.
    pub fn slice_step(&self, plane: Plane) -> f64 {
        self.policy
            .interval_for(plane)
            .unwrap_or(self.geometry.spacing[plane.slice_axis()])
    }

    /// Number of slices available for `plane`; at least 1.
    pub fn max_slices(&self, plane: Plane) -> usize {
        let axis = plane.slice_axis();
        let count = match self.policy.interval_for(plane) {
            Some(interval) => (self.geometry.extent()[axis] / interval).floor() as usize,
            None => self.geometry.dimension(axis),
        };
        count.max(1)
    }

    /// Current slice of `plane`, rounded and clamped to `0..max_slices`.
    pub fn slice_index(&self, plane: Plane) -> usize {
        let axis = plane.slice_axis();
        let offset = self.world_to_voxel(self.position)[axis] * self.geometry.spacing[axis];
        let step = self.slice_step(plane);
        let raw = if step > 0.0 { offset / step } else { 0.0 };
        let last = (self.max_slices(plane) - 1) as f64;
        raw.round().clamp(0.0, last) as usize
    }

    /// World coordinate (mm) along the slice axis of `plane` for slice `index`.
    pub fn world_from_slice_index(&self, index: usize, plane: Plane) -> f64 {
        self.world_at_slice(index, plane)[plane.slice_axis()]
    }

    /// Current position moved onto slice `index` of `plane`; the in-plane
    /// voxel coordinates are kept.
    pub fn world_at_slice(&self, index: usize, plane: Plane) -> Vec3 {
        let axis = plane.slice_axis();
        let along = index as f64 * self.slice_step(plane) / self.geometry.spacing[axis];
        self.voxel_to_world(self.world_to_voxel(self.position).with(axis, along))
    }

    /// (current index, slice count) for navigation controls.
    pub fn slice_position(&self, plane: Plane) -> (usize, usize) {
        (self.slice_index(plane), self.max_slices(plane))
    }

    /// Fractional voxel coordinate along the slice axis of `plane` at the
    /// current position, suitable for [`Volume::extract_slice`].
    pub fn voxel_position(&self, plane: Plane) -> f64 {
        self.world_to_voxel(self.position)[plane.slice_axis()]
    }

    /// Largest rectangle with the plane's physical aspect ratio that fits
    /// `view`, centered on the padded axis.
    ///
    /// The rectangle spans `dimensions * spacing`, while screen mapping goes
    /// through normalized coordinates: the first voxel center lands on the
    /// left/top edge and the last on the right/bottom edge. A renderer that
    /// draws one texel per voxel stretches texel centers across the bounds.
    pub fn image_bounds(&self, plane: Plane, view: Size) -> Rect {
        let (u, v) = plane.in_plane_axes();
        let extent = self.geometry.extent();
        let (phys_w, phys_h) = (extent[u], extent[v]);
        if !(phys_w > 0.0 && phys_h > 0.0 && view.width > 0.0 && view.height > 0.0) {
            return Rect::new(0.0, 0.0, view.width.max(0.0), view.height.max(0.0));
        }
        let scale = (view.width / phys_w).min(view.height / phys_h);
        let (width, height) = (phys_w * scale, phys_h * scale);
        Rect::new(
            (view.width - width) / 2.0,
            (view.height - height) / 2.0,
            width,
            height,
        )
    }

    pub fn world_to_screen(
        &self,
        plane: Plane,
        world: Vec3,
        view: Size,
        bounds: Option<Rect>,
    ) -> Point2 {
        let bounds = bounds.unwrap_or_else(|| self.image_bounds(plane, view));
        let (u, v) = plane.in_plane_axes();
        let n = self.world_to_normalized(world);
        Point2::new(
            bounds.x + n[u] * bounds.width,
            bounds.y + n[v] * bounds.height,
        )
    }

    /// World position under `point`; the slice-axis component comes from the
    /// current position. Points outside the image return the current
    /// position unchanged.
    pub fn screen_to_world(
        &self,
        plane: Plane,
        point: Point2,
        view: Size,
        bounds: Option<Rect>,
    ) -> Vec3 {
        let bounds = bounds.unwrap_or_else(|| self.image_bounds(plane, view));
        if !bounds.contains(point) || bounds.width <= 0.0 || bounds.height <= 0.0 {
            return self.position;
        }
        let (u, v) = plane.in_plane_axes();
        let n = self
            .world_to_normalized(self.position)
            .with(u, (point.x - bounds.x) / bounds.width)
            .with(v, (point.y - bounds.y) / bounds.height);
        self.normalized_to_world(n)
    }

    /// Clamp `candidate` into the volume and apply it unless it moves less
    /// than the hysteresis threshold. Non-finite candidates are ignored.
    /// Returns whether the position changed.
    pub fn update_world_position(&mut self, candidate: Vec3) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        let voxel = self.geometry.clamp_voxel(self.world_to_voxel(candidate));
        let clamped = self.voxel_to_world(voxel);
        if !clamped.is_finite() {
            return false;
        }
        if clamped.distance(self.position) < self.hysteresis_mm {
            trace!(?clamped, "position change below hysteresis");
            return false;
        }
        self.position = clamped;
        true
    }

    pub fn update_from_slice_scroll(&mut self, plane: Plane, index: usize) -> bool {
        self.update_from_slice_scroll_at(plane, index, Instant::now())
    }

    /// Move to slice `index` of `plane`, keeping the other two axes.
    pub fn update_from_slice_scroll_at(&mut self, plane: Plane, index: usize, now: Instant) -> bool {
        self.scroll.record(plane, index, now);
        let target = self.world_at_slice(index, plane);
        self.update_world_position(target)
    }

    /// Smoothed scroll speed in slices per second; 0 once scrolling has idled.
    pub fn scroll_velocity(&self) -> f64 {
        self.scroll.velocity_at(Instant::now())
    }

    pub fn scroll_velocity_at(&self, now: Instant) -> f64 {
        self.scroll.velocity_at(now)
    }
}
