use std::sync::Arc;

use dicom_mpr::{
    Axis, CoordinateAuthority, Mat3, MprConfig, PixelBuffer, Plane, SliceIndexPolicy, SliceInput,
    SortBy, Vec3, Volume, VolumeLoader,
};
use ndarray::Array3;

fn load(dims: (usize, usize, usize), spacing: Vec3, origin: Vec3) -> CoordinateAuthority {
    load_oriented(dims, spacing, origin, Mat3::identity())
}

fn load_oriented(dims: (usize, usize, usize), spacing: Vec3, origin: Vec3, orientation: Mat3) -> CoordinateAuthority {
    let (w, h, d) = dims;
    let volume = Volume::new(Array3::zeros((d, h, w)), spacing, origin, orientation);
    let mut authority = CoordinateAuthority::new(&MprConfig::default());
    authority.load_volume(Arc::new(volume));
    authority
}

fn scans() -> Vec<CoordinateAuthority> {
    vec![
        load((512, 512, 53), Vec3::new(0.7, 0.7, 3.0), Vec3::ZERO),
        load((256, 192, 120), Vec3::new(0.9765625, 0.9765625, 1.25), Vec3::new(-125.0, -93.7, -310.5)),
        load((7, 3, 1), Vec3::new(2.0, 0.3, 5.0), Vec3::new(11.0, -4.0, 60.0)),
        load_oriented(
            (64, 48, 30),
            Vec3::new(0.8, 0.8, 2.5),
            Vec3::new(-25.6, -19.2, 40.0),
            Mat3::from_columns(Axis::X.unit(), Axis::Y.unit(), Axis::Z.unit() * -1.0),
        ),
    ]
}

#[test]
fn initial_position_is_volume_center() {
    let authority = load((512, 512, 53), Vec3::new(0.7, 0.7, 3.0), Vec3::ZERO);
    let p = authority.current_world_position();
    assert!((p.x - 179.2).abs() < 1e-9);
    assert!((p.y - 179.2).abs() < 1e-9);
    assert!((p.z - 79.5).abs() < 1e-9);
}

#[test]
fn slice_index_round_trips_through_world() {
    for mut authority in scans() {
        for plane in Plane::ALL {
            for index in 0..authority.max_slices(plane) {
                let axis = plane.slice_axis();
                let world = authority
                    .current_world_position()
                    .with(axis, authority.world_from_slice_index(index, plane));
                authority.update_world_position(world);
                assert_eq!(authority.slice_index(plane), index, "{plane:?}");
            }
        }
    }
}

#[test]
fn slice_index_round_trips_under_fixed_interval() {
    let mut authority = load((300, 300, 40), Vec3::new(0.6, 0.6, 2.5), Vec3::new(-90.0, -90.0, 0.0));
    authority.set_slice_index_policy(SliceIndexPolicy::FixedInterval { mm: 2.0 });
    for plane in [Plane::Coronal, Plane::Sagittal] {
        for index in 0..authority.max_slices(plane) {
            authority.update_from_slice_scroll(plane, index);
            assert_eq!(authority.slice_index(plane), index);
        }
    }
}

#[test]
fn world_voxel_round_trip_is_scan_agnostic() {
    for authority in scans() {
        for v in [
            Vec3::ZERO,
            Vec3::new(1.5, 2.25, 0.5),
            Vec3::new(511.0, 17.0, 52.0),
            Vec3::new(-3.0, 1000.0, 0.125),
        ] {
            let back = authority.world_to_voxel(authority.voxel_to_world(v));
            assert!(back.distance(v) < 1e-9, "{v:?} -> {back:?}");
        }
    }
}

#[test]
fn updates_never_leave_the_volume() {
    for mut authority in scans() {
        let geometry = *authority.geometry();
        let far = geometry.voxel_to_world(geometry.size());
        for candidate in [
            Vec3::new(-1e9, -1e9, -1e9),
            Vec3::new(1e9, 1e9, 1e9),
            Vec3::new(1e9, -1e9, 0.0),
            geometry.origin,
            far,
            Vec3::new(f64::INFINITY, 0.0, f64::NEG_INFINITY),
        ] {
            authority.update_world_position(candidate);
            let v = authority.world_to_voxel(authority.current_world_position());
            for axis in Axis::ALL {
                let limit = geometry.dimension(axis) as f64;
                assert!(v[axis] >= -1e-9 && v[axis] <= limit + 1e-9, "{v:?}");
            }
        }
    }
}

#[test]
fn unloaded_authority_answers_defaults() {
    let mut authority = load((10, 10, 10), Vec3::ONE, Vec3::new(5.0, 5.0, 5.0));
    authority.unload();
    assert!(authority.volume().is_none());
    assert_eq!(authority.current_world_position(), Vec3::ZERO);
    for plane in Plane::ALL {
        assert_eq!(authority.max_slices(plane), 1);
        assert_eq!(authority.slice_index(plane), 0);
    }
}

#[test]
fn world_frame_matches_volume_patient_mapping() {
    let c = std::f64::consts::FRAC_1_SQRT_2;
    let orientation = Mat3::from_columns(
        Vec3::new(c, c, 0.0),
        Vec3::new(-c, c, 0.0),
        Vec3::new(0.0, 0.0, -1.0),
    );
    let volume = Arc::new(Volume::new(
        Array3::zeros((5, 8, 8)),
        Vec3::new(0.7, 0.7, 3.0),
        Vec3::new(-120.0, 35.5, 80.0),
        orientation,
    ));
    let mut authority = CoordinateAuthority::default();
    authority.load_volume(Arc::clone(&volume));

    for v in [Vec3::ZERO, Vec3::new(3.25, 7.0, 2.5), Vec3::new(8.0, 8.0, 5.0)] {
        assert!(authority.voxel_to_world(v).distance(volume.voxel_to_patient(v)) < 1e-9);
        let p = volume.voxel_to_patient(v);
        assert!(authority.world_to_voxel(p).distance(volume.patient_to_voxel(p)) < 1e-9);
    }
}

#[test]
fn default_order_slice_positions_are_patient_positions() {
    let slices: Vec<SliceInput> = (0..4)
        .map(|z| {
            SliceInput::new(2, 2, PixelBuffer::I16(vec![0; 4]))
                .with_pixel_spacing(1.0, 1.0)
                .with_position(Vec3::new(0.0, 0.0, z as f64))
        })
        .collect();
    let volume = VolumeLoader::build(&slices, SortBy::ImagePositionPatient).expect("valid series");
    let mut authority = CoordinateAuthority::default();
    authority.load_volume(Arc::new(volume));

    assert_eq!(authority.current_world_position(), Vec3::new(1.0, 1.0, 1.0));
    for (index, z) in [(0, 3.0), (1, 2.0), (2, 1.0), (3, 0.0)] {
        assert_eq!(authority.world_from_slice_index(index, Plane::Axial), z);
        authority.update_from_slice_scroll(Plane::Axial, index);
        assert_eq!(authority.current_world_position().z, z);
    }
}

#[test]
fn negative_pixel_spacing_keeps_navigation_running() {
    let slice = SliceInput::new(2, 2, PixelBuffer::I16(vec![0; 4])).with_pixel_spacing(-0.5, 0.5);
    let volume = VolumeLoader::build(&[slice], SortBy::default()).expect("valid series");
    let mut authority = CoordinateAuthority::default();
    authority.load_volume(Arc::new(volume));

    authority.update_world_position(Vec3::new(0.1, 0.1, 0.1));
    let p = authority.current_world_position();
    assert!(p.is_finite());
    assert!(p.distance(Vec3::new(0.1, 0.1, 0.1)) < 1e-9, "{p:?}");
}
