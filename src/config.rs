//! Reconstruction configuration
//!
//! Defaults suit interactive CT viewing. `from_env` overrides individual
//! fields from `MPR_*` environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::enums::{Interpolation, SliceIndexPolicy, SortBy};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MprConfig {
    /// Slice ordering applied before assembly
    pub sort_by: SortBy,
    /// How per-plane slice indices are derived
    pub slice_index_policy: SliceIndexPolicy,
    /// Position changes shorter than this (mm) are ignored
    pub hysteresis_mm: f64,
    /// Scroll velocity drops to zero after this long without a scroll event
    pub scroll_idle_timeout: Duration,
    /// Weight of the previous estimate when smoothing scroll velocity (0..1)
    pub scroll_smoothing: f64,
    /// Contour/slice matching tolerance in mm; `None` means one in-plane voxel
    pub contour_tolerance_mm: Option<f64>,
    /// Sampling used for rendered planes
    pub interpolation: Interpolation,
}

impl Default for MprConfig {
    fn default() -> Self {
        Self {
            sort_by: SortBy::ImagePositionPatient,
            slice_index_policy: SliceIndexPolicy::Voxel,
            hysteresis_mm: 0.01,
            scroll_idle_timeout: Duration::from_millis(250),
            scroll_smoothing: 0.6,
            contour_tolerance_mm: None,
            interpolation: Interpolation::Trilinear,
        }
    }
}

impl MprConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Same as [`MprConfig::from_env`], reading variables through `lookup`.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(val) = lookup("MPR_SORT_BY") {
            match val.to_lowercase().as_str() {
                "position" | "image_position_patient" => {
                    config.sort_by = SortBy::ImagePositionPatient
                }
                "instance" | "instance_number" => config.sort_by = SortBy::InstanceNumber,
                "none" => config.sort_by = SortBy::None,
                _ => {}
            }
        }
        if let Some(val) = lookup("MPR_SLICE_INTERVAL_MM")
            && let Ok(mm) = val.parse::<f64>()
            && mm > 0.0
        {
            config.slice_index_policy = SliceIndexPolicy::FixedInterval { mm };
        }
        if let Some(val) = lookup("MPR_HYSTERESIS_MM")
            && let Ok(mm) = val.parse::<f64>()
            && mm >= 0.0
        {
            config.hysteresis_mm = mm;
        }
        if let Some(val) = lookup("MPR_SCROLL_IDLE_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.scroll_idle_timeout = Duration::from_millis(ms);
        }
        if let Some(val) = lookup("MPR_SCROLL_SMOOTHING")
            && let Ok(w) = val.parse::<f64>()
        {
            config.scroll_smoothing = w.clamp(0.0, 1.0);
        }
        if let Some(val) = lookup("MPR_CONTOUR_TOLERANCE_MM")
            && let Ok(mm) = val.parse::<f64>()
            && mm >= 0.0
        {
            config.contour_tolerance_mm = Some(mm);
        }
        if let Some(val) = lookup("MPR_INTERPOLATION") {
            match val.to_lowercase().as_str() {
                "nearest" => config.interpolation = Interpolation::Nearest,
                "trilinear" | "linear" => config.interpolation = Interpolation::Trilinear,
                _ => {}
            }
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = MprConfig::default();
        assert_eq!(config.sort_by, SortBy::ImagePositionPatient);
        assert_eq!(config.slice_index_policy, SliceIndexPolicy::Voxel);
        assert_eq!(config.contour_tolerance_mm, None);
        assert!(config.hysteresis_mm > 0.0);
    }

    fn config_from(vars: &[(&str, &str)]) -> MprConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MprConfig::from_env_with(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_config_from_env() {
        let config = config_from(&[
            ("MPR_SLICE_INTERVAL_MM", "2"),
            ("MPR_INTERPOLATION", "nearest"),
            ("MPR_SORT_BY", "instance"),
        ]);

        assert_eq!(
            config.slice_index_policy,
            SliceIndexPolicy::FixedInterval { mm: 2.0 }
        );
        assert_eq!(config.interpolation, Interpolation::Nearest);
        assert_eq!(config.sort_by, SortBy::InstanceNumber);
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = config_from(&[
            ("MPR_SLICE_INTERVAL_MM", "-3"),
            ("MPR_HYSTERESIS_MM", "abc"),
            ("MPR_SCROLL_SMOOTHING", "4"),
            ("MPR_CONTOUR_TOLERANCE_MM", "0.5"),
        ]);
        assert_eq!(config.slice_index_policy, SliceIndexPolicy::Voxel);
        assert_eq!(config.hysteresis_mm, MprConfig::default().hysteresis_mm);
        assert_eq!(config.scroll_smoothing, 1.0);
        assert_eq!(config.contour_tolerance_mm, Some(0.5));
    }
}
