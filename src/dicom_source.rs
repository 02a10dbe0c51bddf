//! Adapter from parsed DICOM datasets to the slice and region inputs.
//!
//! File parsing and pixel decoding are done by `dicom`; this module only
//! picks the attributes the volume and region model need.

use std::{collections::HashMap, fs, path::Path};

use dicom::{
    core::Tag,
    object::{FileDicomObject, InMemDicomObject, open_file},
    pixeldata::{ConvertOptions, ModalityLutOption, PixelDecoder},
};
use dicom_dictionary_std::tags;
use ndarray::s;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    geometry::Vec3,
    region::{Color, Contour, Region, RegionId},
    volume_loader::{PixelBuffer, SliceInput, VolumeError},
};

fn float(obj: &InMemDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag).ok()?.to_float64().ok()
}

fn floats(obj: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    obj.element(tag).ok()?.to_multi_float64().ok()
}

fn int(obj: &InMemDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag).ok()?.to_int::<i32>().ok()
}

fn uint(obj: &InMemDicomObject, tag: Tag) -> Option<u32> {
    obj.element(tag).ok()?.to_int::<u32>().ok()
}

fn items(obj: &InMemDicomObject, tag: Tag) -> &[InMemDicomObject] {
    obj.element(tag)
        .ok()
        .and_then(|element| element.items())
        .unwrap_or_default()
}

impl SliceInput {
    /// Slice metadata without pixels.
    pub fn metadata_from_dicom(obj: &InMemDicomObject) -> SliceInput {
        SliceInput {
            position: floats(obj, tags::IMAGE_POSITION_PATIENT)
                .filter(|v| v.len() >= 3)
                .map(|v| Vec3::new(v[0], v[1], v[2])),
            orientation: floats(obj, tags::IMAGE_ORIENTATION_PATIENT)
                .filter(|v| v.len() >= 6)
                .map(|v| [v[0], v[1], v[2], v[3], v[4], v[5]]),
            pixel_spacing: floats(obj, tags::PIXEL_SPACING)
                .filter(|v| v.len() >= 2)
                .map(|v| (v[0], v[1])),
            slice_thickness: float(obj, tags::SLICE_THICKNESS),
            rescale_slope: float(obj, tags::RESCALE_SLOPE),
            rescale_intercept: float(obj, tags::RESCALE_INTERCEPT),
            instance_number: int(obj, tags::INSTANCE_NUMBER),
            rows: uint(obj, tags::ROWS).map(|v| v as usize),
            columns: uint(obj, tags::COLUMNS).map(|v| v as usize),
            pixels: None,
        }
    }

    /// Metadata plus stored pixel values of the first frame. Pixels that
    /// cannot be decoded are left out, so assembly reports the slice.
    pub fn from_dicom(obj: &FileDicomObject<InMemDicomObject>) -> SliceInput {
        SliceInput {
            pixels: decode_pixels(obj),
            ..Self::metadata_from_dicom(obj)
        }
    }
}

/// Stored values without the modality LUT; rescaling happens during assembly.
fn decode_pixels(obj: &FileDicomObject<InMemDicomObject>) -> Option<PixelBuffer> {
    let pixel_data = obj.decode_pixel_data().ok()?;
    let options = ConvertOptions::new().with_modality_lut(ModalityLutOption::None);
    let bits_allocated = uint(obj, tags::BITS_ALLOCATED).unwrap_or(16);
    let signed = uint(obj, tags::PIXEL_REPRESENTATION) == Some(1);

    match (bits_allocated, signed) {
        (8, _) => pixel_data
            .to_ndarray_with_options::<u8>(&options)
            .ok()
            .map(|arr| PixelBuffer::U8(arr.slice_move(s![0, .., .., 0]).iter().copied().collect())),
        (_, true) => pixel_data
            .to_ndarray_with_options::<i16>(&options)
            .ok()
            .map(|arr| PixelBuffer::I16(arr.slice_move(s![0, .., .., 0]).iter().copied().collect())),
        (_, false) => pixel_data
            .to_ndarray_with_options::<u16>(&options)
            .ok()
            .map(|arr| PixelBuffer::U16(arr.slice_move(s![0, .., .., 0]).iter().copied().collect())),
    }
}

/// Open files in parallel and convert each to a [`SliceInput`].
pub fn load_slices_from_file_paths(
    paths: &[impl AsRef<Path> + Sync],
) -> Result<Vec<SliceInput>, VolumeError> {
    paths
        .par_iter()
        .map(|path| {
            let obj = open_file(path.as_ref())?;
            let slice = SliceInput::from_dicom(&obj);
            if slice.pixels.is_none() {
                warn!(path = ?path.as_ref(), "could not decode pixel data");
            }
            Ok(slice)
        })
        .collect()
}

/// Load every `.dcm` file of a directory.
pub fn load_slices_from_directory(path: impl AsRef<Path>) -> Result<Vec<SliceInput>, VolumeError> {
    let paths: Vec<_> = fs::read_dir(path.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|s| s.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
        })
        .collect();

    if paths.is_empty() {
        return Err(VolumeError::EmptyInput);
    }
    debug!(files = paths.len(), dir = ?path.as_ref(), "reading slice series");

    load_slices_from_file_paths(&paths)
}

/// Regions of an RT structure set, one per ROI contour entry.
pub fn regions_from_rtstruct(obj: &InMemDicomObject) -> Vec<Region> {
    let names: HashMap<u32, String> = items(obj, tags::STRUCTURE_SET_ROI_SEQUENCE)
        .iter()
        .filter_map(|roi| {
            let number = uint(roi, tags::ROI_NUMBER)?;
            let name = roi.element(tags::ROI_NAME).ok()?.to_str().ok()?;
            Some((number, name.trim().to_string()))
        })
        .collect();

    items(obj, tags::ROI_CONTOUR_SEQUENCE)
        .iter()
        .filter_map(|roi_contour| {
            let Some(number) = uint(roi_contour, tags::REFERENCED_ROI_NUMBER) else {
                warn!("ROI contour without a referenced ROI number");
                return None;
            };
            let color = roi_contour
                .element(tags::ROI_DISPLAY_COLOR)
                .ok()
                .and_then(|e| e.to_multi_int::<i32>().ok())
                .filter(|c| c.len() >= 3)
                .map(|c| {
                    let channel = |v: i32| v.clamp(0, 255) as u8;
                    Color::new(channel(c[0]), channel(c[1]), channel(c[2]))
                })
                .unwrap_or(Color::new(255, 255, 0));

            let contours: Vec<Contour> = items(roi_contour, tags::CONTOUR_SEQUENCE)
                .iter()
                .filter_map(|item| floats(item, tags::CONTOUR_DATA))
                .filter_map(|data| {
                    let points = data
                        .chunks_exact(3)
                        .map(|p| Vec3::new(p[0], p[1], p[2]))
                        .collect();
                    Contour::from_points(points)
                })
                .collect();

            let name = names
                .get(&number)
                .cloned()
                .unwrap_or_else(|| format!("ROI {number}"));
            debug!(number, name = %name, contours = contours.len(), "read region");
            Some(Region::new(RegionId(number), name, color, contours))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, VR, dicom_value, value::DataSetSequence};

    fn object(elements: Vec<DataElement<InMemDicomObject>>) -> InMemDicomObject {
        InMemDicomObject::from_element_iter(elements)
    }

    #[test]
    fn reads_slice_metadata() {
        let obj = object(vec![
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                dicom_value!(F64, [-120.0, -95.5, 42.0]),
            ),
            DataElement::new(tags::PIXEL_SPACING, VR::DS, dicom_value!(F64, [0.6, 0.7])),
            DataElement::new(tags::RESCALE_INTERCEPT, VR::DS, dicom_value!(F64, [-1024.0])),
            DataElement::new(tags::ROWS, VR::US, dicom_value!(U16, [512])),
            DataElement::new(tags::COLUMNS, VR::US, dicom_value!(U16, [256])),
            DataElement::new(tags::INSTANCE_NUMBER, VR::IS, dicom_value!(I32, [7])),
        ]);
        let slice = SliceInput::metadata_from_dicom(&obj);
        assert_eq!(slice.position, Some(Vec3::new(-120.0, -95.5, 42.0)));
        assert_eq!(slice.pixel_spacing, Some((0.6, 0.7)));
        assert_eq!(slice.rescale_intercept, Some(-1024.0));
        assert_eq!(slice.rescale_slope, None);
        assert_eq!((slice.rows, slice.columns), (Some(512), Some(256)));
        assert_eq!(slice.instance_number, Some(7));
        assert!(slice.pixels.is_none());
    }

    #[test]
    fn reads_rtstruct_regions() {
        let roi = object(vec![
            DataElement::new(tags::ROI_NUMBER, VR::IS, dicom_value!(I32, [3])),
            DataElement::new(tags::ROI_NAME, VR::LO, dicom_value!(Strs, ["Liver "])),
        ]);
        let contour = object(vec![DataElement::new(
            tags::CONTOUR_DATA,
            VR::DS,
            dicom_value!(F64, [0.0, 0.0, 10.0, 5.0, 0.0, 10.0, 5.0, 5.0, 10.0]),
        )]);
        let roi_contour = object(vec![
            DataElement::new(tags::REFERENCED_ROI_NUMBER, VR::IS, dicom_value!(I32, [3])),
            DataElement::new(tags::ROI_DISPLAY_COLOR, VR::IS, dicom_value!(I32, [255, 128, 0])),
            DataElement::new(
                tags::CONTOUR_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![contour]),
            ),
        ]);
        let rtstruct = object(vec![
            DataElement::new(
                tags::STRUCTURE_SET_ROI_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![roi]),
            ),
            DataElement::new(
                tags::ROI_CONTOUR_SEQUENCE,
                VR::SQ,
                DataSetSequence::from(vec![roi_contour]),
            ),
        ]);

        let regions = regions_from_rtstruct(&rtstruct);
        assert_eq!(regions.len(), 1);
        let region = &regions[0];
        assert_eq!(region.id, RegionId(3));
        assert_eq!(region.name, "Liver");
        assert_eq!(region.color, Color::new(255, 128, 0));
        assert_eq!(region.contours().len(), 1);
        assert_eq!(region.contours()[0].slice_position, 10.0);
        assert_eq!(region.contours()[0].points.len(), 3);
    }
}
