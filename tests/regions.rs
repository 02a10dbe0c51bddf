use std::sync::Arc;

use dicom_mpr::{
    Color, Contour, CoordinateAuthority, Mat3, OverlayState, PixelBuffer, Plane, Region, RegionId,
    SliceInput, SortBy, Vec3, VolumeGeometry, VolumeLoader,
    region::{default_tolerance, intersects_slice, outlines_for_slice, regions_for_slice},
};

fn square_region() -> Region {
    let z = 10.0;
    let contour = Contour::new(
        z,
        vec![
            Vec3::new(0.0, 0.0, z),
            Vec3::new(4.0, 0.0, z),
            Vec3::new(4.0, 4.0, z),
            Vec3::new(0.0, 4.0, z),
        ],
    );
    Region::new(RegionId(1), "Target", Color::new(255, 0, 0), vec![contour])
}

#[test]
fn region_found_only_on_its_slice() {
    let regions = vec![square_region()];
    let overlay = OverlayState::new();

    let hits = regions_for_slice(&regions, &overlay, 10.0, Plane::Axial, 0.01);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, RegionId(1));

    assert!(regions_for_slice(&regions, &overlay, 50.0, Plane::Axial, 0.01).is_empty());
}

#[test]
fn exact_position_matches_for_any_non_negative_tolerance() {
    let region = square_region();
    for tolerance in [0.0, 0.01, 1.0, 100.0] {
        for contour in region.contours() {
            assert!(intersects_slice(contour, contour.slice_position, Plane::Axial, tolerance));
        }
    }
}

#[test]
fn outlines_follow_overlay_state() {
    let regions = vec![square_region()];
    let mut overlay = OverlayState::new();
    overlay.set_opacity(RegionId(1), 0.25);
    overlay.select(RegionId(1));
    let fine = VolumeGeometry::new((8, 8, 1), Vec3::new(0.5, 0.5, 2.0), Vec3::ZERO, Mat3::identity());

    let outlines = outlines_for_slice(
        &regions,
        &overlay,
        10.0,
        Plane::Axial,
        0.01,
        &fine,
    );
    assert_eq!(outlines.len(), 1);
    assert_eq!(outlines[0].opacity, 0.25);
    assert!(outlines[0].selected);
    assert_eq!(outlines[0].outlines[0].len(), 4);
    assert_eq!(outlines[0].outlines[0][2].x, 8.0);

    let sagittal = outlines_for_slice(
        &regions,
        &overlay,
        2.0,
        Plane::Sagittal,
        0.01,
        &fine,
    );
    assert_eq!(sagittal[0].outlines[0].len(), 2);

    overlay.set_visible(RegionId(1), false);
    let hidden = outlines_for_slice(
        &regions,
        &overlay,
        10.0,
        Plane::Axial,
        0.01,
        &VolumeGeometry::default(),
    );
    assert!(hidden.is_empty());
}

/// Four 4x4 slices at patient z = 0..3, passed in acquisition order.
fn ascending_series() -> Vec<SliceInput> {
    (0..4)
        .map(|z| {
            SliceInput::new(4, 4, PixelBuffer::I16(vec![z as i16; 16]))
                .with_pixel_spacing(1.0, 1.0)
                .with_position(Vec3::new(0.0, 0.0, z as f64))
        })
        .collect()
}

#[test]
fn scrolled_axial_slice_finds_contour_on_its_source_slice() {
    let volume = VolumeLoader::build(&ascending_series(), SortBy::ImagePositionPatient).expect("valid series");
    let mut coordinates = CoordinateAuthority::default();
    coordinates.load_volume(Arc::new(volume));

    let z = 2.0;
    let contour = Contour::new(
        z,
        vec![
            Vec3::new(0.0, 0.0, z),
            Vec3::new(3.0, 0.0, z),
            Vec3::new(3.0, 3.0, z),
            Vec3::new(0.0, 3.0, z),
        ],
    );
    let regions = vec![Region::new(RegionId(4), "Lesion", Color::new(0, 255, 255), vec![contour])];
    let overlay = OverlayState::new();
    let geometry = *coordinates.geometry();
    let tolerance = default_tolerance(geometry.spacing);

    // superior slice first, so index 1 is the slice acquired at z = 2
    coordinates.update_from_slice_scroll(Plane::Axial, 1);
    let position = coordinates.current_world_position();
    assert_eq!(position.z, z);
    assert_eq!(coordinates.slice_index(Plane::Axial), 1);

    let hits = regions_for_slice(&regions, &overlay, position.z, Plane::Axial, tolerance);
    assert_eq!(hits.len(), 1);

    let volume = coordinates.volume().expect("volume is loaded");
    let slice = volume.extract_slice(Plane::Axial, coordinates.voxel_position(Plane::Axial));
    assert_eq!(slice.get(0, 0), Some(2));

    // reformatted rows count voxel planes, so the contour sits on row 1
    let coronal = outlines_for_slice(&regions, &overlay, position.y, Plane::Coronal, tolerance, &geometry);
    assert_eq!(coronal.len(), 1);
    for point in &coronal[0].outlines[0] {
        assert!((point.y - 1.0).abs() < 1e-9, "{point:?}");
        assert!((0.0..=3.0).contains(&point.x), "{point:?}");
    }
}
