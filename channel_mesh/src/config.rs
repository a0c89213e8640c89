//! Per-invocation configuration of the meshing pipeline.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MeshError, Result};

/// How the number of elements across a cross-line is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElementCountMethod {
    /// Fixed table keyed by cross-line length.
    Fix,
    /// Length classes derived from the surveyed cross-sections.
    Variable,
}

/// Candidate pool for assigning surveyed elevations to profile points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeightAssignmentMethod {
    NearAll,
    NearInsideWlb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InterpolationMethod {
    Linear,
}

/// Spacing policy for intermediate cross-lines.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CrossLinePolicy {
    /// Nominal distance between cross-lines along the longer bank.
    Distance(f64),
    /// Distance derived from the element count of the current cross-line.
    Count {
        method: ElementCountMethod,
        remain_percentage: u32,
    },
}

/// Replacement for the process-wide "overwrite output" toggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSettings {
    pub overwrite: bool,
}

impl OutputSettings {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Name to write a dataset under. An existing dataset is kept when
    /// overwriting is disabled; the new output gets a timestamp suffix instead.
    pub fn resolve_name(&self, name: &str, exists: bool) -> String {
        if !exists || self.overwrite {
            return name.to_string();
        }
        let renamed = format!("{name}_{}", timestamp());
        log::warn!("{name} already exists. Output name changed to {renamed}.");
        renamed
    }

    /// File variant of [`resolve_name`](Self::resolve_name); the suffix goes
    /// before the extension.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if !path.exists() || self.overwrite {
            return path.to_path_buf();
        }
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = match path.extension() {
            Some(ext) => format!("{stem}_{}.{}", timestamp(), ext.to_string_lossy()),
            None => format!("{stem}_{}", timestamp()),
        };
        let renamed = path.with_file_name(file_name);
        log::warn!(
            "{} already exists. Output changed to {}.",
            path.display(),
            renamed.display()
        );
        renamed
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%d%m%y_%H%M%S").to_string()
}

/// Settings recognised by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    pub element_count_method: ElementCountMethod,
    /// Distance between cross-lines in metres. `None` derives the distance
    /// from the element count.
    pub cross_line_spacing: Option<f64>,
    /// Share of the full spacing the remaining distance at the end of a span
    /// must reach for one more, half-spaced cross-line.
    pub remain_percentage: u32,
    /// Number of longitudinal profiles, banks included.
    pub profile_count: usize,
    pub height_assignment_method: HeightAssignmentMethod,
    pub interpolation_method: InterpolationMethod,
    pub check_angles: bool,
    pub check_areas: bool,
    /// Degrees.
    pub min_angle: f64,
    /// Degrees.
    pub max_angle: f64,
    pub area_factor: f64,
    /// Keep only foreshore points within this distance of the stream polygon.
    pub dtmw_buffer: Option<f64>,
    pub output: OutputSettings,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            element_count_method: ElementCountMethod::Fix,
            cross_line_spacing: None,
            remain_percentage: 50,
            profile_count: 11,
            height_assignment_method: HeightAssignmentMethod::NearInsideWlb,
            interpolation_method: InterpolationMethod::Linear,
            check_angles: true,
            check_areas: true,
            min_angle: 30.0,
            max_angle: 120.0,
            area_factor: 2.0,
            dtmw_buffer: None,
            output: OutputSettings::default(),
        }
    }
}

impl MeshConfig {
    /// Loads a configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: MeshConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves this configuration to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Rejects out-of-range or inconsistent settings.
    pub fn validate(&self) -> Result<()> {
        if ![30, 40, 50].contains(&self.remain_percentage) {
            return Err(MeshError::configuration(
                "remain_percentage",
                format!("{} is not one of 30, 40, 50", self.remain_percentage),
            ));
        }
        if ![20.0, 25.0, 30.0].contains(&self.min_angle) {
            return Err(MeshError::configuration(
                "min_angle",
                format!("{} is not one of 20, 25, 30", self.min_angle),
            ));
        }
        if !(110.0..=130.0).contains(&self.max_angle) {
            return Err(MeshError::configuration(
                "max_angle",
                format!("{} is outside 110..130", self.max_angle),
            ));
        }
        if self.min_angle >= self.max_angle {
            return Err(MeshError::configuration(
                "min_angle",
                format!("{} is not below max_angle {}", self.min_angle, self.max_angle),
            ));
        }
        if !(2.0..=5.0).contains(&self.area_factor) {
            return Err(MeshError::configuration(
                "area_factor",
                format!("{} is outside 2..5", self.area_factor),
            ));
        }
        if !(3..=50).contains(&self.profile_count) {
            return Err(MeshError::configuration(
                "profile_count",
                format!("{} is outside 3..50", self.profile_count),
            ));
        }
        if let Some(spacing) = self.cross_line_spacing {
            if !(1.0..=50.0).contains(&spacing) {
                return Err(MeshError::configuration(
                    "cross_line_spacing",
                    format!("{spacing} m is outside 1..50 m"),
                ));
            }
        }
        if let Some(buffer) = self.dtmw_buffer {
            if !(buffer > 0.0) {
                return Err(MeshError::configuration(
                    "dtmw_buffer",
                    format!("{buffer} must be positive"),
                ));
            }
        }
        Ok(())
    }

    pub fn cross_line_policy(&self) -> CrossLinePolicy {
        match self.cross_line_spacing {
            Some(distance) => CrossLinePolicy::Distance(distance),
            None => CrossLinePolicy::Count {
                method: self.element_count_method,
                remain_percentage: self.remain_percentage,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(MeshConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_angles() {
        let config = MeshConfig {
            min_angle: 30.0,
            max_angle: 110.0,
            ..MeshConfig::default()
        };
        assert!(config.validate().is_ok());
        let config = MeshConfig {
            max_angle: 100.0,
            ..MeshConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(MeshError::Configuration { parameter: "max_angle", .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            MeshConfig { remain_percentage: 35, ..MeshConfig::default() },
            MeshConfig { area_factor: 6.0, ..MeshConfig::default() },
            MeshConfig { profile_count: 2, ..MeshConfig::default() },
            MeshConfig { cross_line_spacing: Some(0.5), ..MeshConfig::default() },
            MeshConfig { min_angle: 22.0, ..MeshConfig::default() },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }

    #[test]
    fn spacing_selects_policy() {
        let config = MeshConfig {
            cross_line_spacing: Some(10.0),
            ..MeshConfig::default()
        };
        assert_eq!(config.cross_line_policy(), CrossLinePolicy::Distance(10.0));
        assert!(matches!(
            MeshConfig::default().cross_line_policy(),
            CrossLinePolicy::Count { method: ElementCountMethod::Fix, remain_percentage: 50 }
        ));
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = MeshConfig {
            element_count_method: ElementCountMethod::Variable,
            height_assignment_method: HeightAssignmentMethod::NearAll,
            ..MeshConfig::default()
        };
        config.save(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"VARIABLE\""));
        assert!(text.contains("\"NEAR_ALL\""));
        assert_eq!(MeshConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: MeshConfig = serde_json::from_str(r#"{"profile_count": 5}"#).unwrap();
        assert_eq!(config.profile_count, 5);
        assert_eq!(config.max_angle, 120.0);
    }

    #[test]
    fn existing_output_gets_timestamp_suffix() {
        let keep = OutputSettings::new(false);
        assert_eq!(keep.resolve_name("vertices", false), "vertices");
        let renamed = keep.resolve_name("vertices", true);
        assert!(renamed.starts_with("vertices_"));
        assert_eq!(renamed.len(), "vertices_".len() + 13);
        assert_eq!(OutputSettings::new(true).resolve_name("vertices", true), "vertices");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.txt");
        std::fs::write(&path, "old").unwrap();
        let new_path = keep.resolve_path(&path);
        assert_ne!(new_path, path);
        assert_eq!(new_path.extension().unwrap(), "txt");
    }
}
