use std::{path::PathBuf, sync::Arc};

use dicom::object::open_file;
use dicom_mpr::{
    CancellationFlag, CoordinateAuthority, MprConfig, OverlayState, Plane, VolumeLoader,
    WindowLevel,
    dicom_source::{load_slices_from_directory, regions_from_rtstruct},
    region::{default_tolerance, outlines_for_slice},
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Usage: `dicom-mpr [SERIES_DIR] [RTSTRUCT_FILE]`
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dicom_mpr=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = MprConfig::from_env();
    let mut args = std::env::args().skip(1);
    let series_dir = args.next().map(PathBuf::from).unwrap_or_else(|| "dicom".into());
    let rtstruct = args.next().map(PathBuf::from);

    let slices = load_slices_from_directory(&series_dir)?;
    info!(slices = slices.len(), dir = ?series_dir, "read series");

    let volume =
        VolumeLoader::build_in_background(slices, config.sort_by, CancellationFlag::new()).await?;
    let (min, max) = volume.value_range();
    info!(min, max, size_mm = ?volume.physical_size(), "volume ready");

    let mut coordinates = CoordinateAuthority::new(&config);
    coordinates.load_volume(Arc::clone(&volume));

    let regions = match rtstruct {
        Some(path) => {
            let structure_set = open_file(&path)?;
            regions_from_rtstruct(&structure_set)
        }
        None => Vec::new(),
    };
    let overlay = OverlayState::new();
    let geometry = *coordinates.geometry();
    let tolerance = config
        .contour_tolerance_mm
        .unwrap_or_else(|| default_tolerance(geometry.spacing));

    for plane in Plane::ALL {
        let (index, count) = coordinates.slice_position(plane);
        let slice = volume.extract_slice_with(
            plane,
            coordinates.voxel_position(plane),
            config.interpolation,
        );
        let name = format!("{plane:?}").to_lowercase();
        match slice.to_image(WindowLevel::from_range(min, max)) {
            Some(image) => image.save(format!("{name}.png"))?,
            None => warn!(plane = %name, "slice is not contiguous, skipped"),
        }

        let position = coordinates.current_world_position()[plane.slice_axis()];
        let outlines = outlines_for_slice(
            &regions,
            &overlay,
            position,
            plane,
            tolerance,
            &geometry,
        );
        info!(
            plane = %name,
            index,
            count,
            width = slice.width(),
            height = slice.height(),
            regions = outlines.len(),
            "wrote {name}.png"
        );
    }

    Ok(())
}
