//! Configuration types for the digitization pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::processors::separation::LandmarkAssignment;

/// Acceptance tolerances for the derived head frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToleranceConfig {
    /// Maximum deviation from 90 degrees between any two frame axes
    #[serde(default = "default_angle_tol")]
    pub angle_tol_deg: f64,

    /// Maximum change of the preauricular distance, in input length units
    #[serde(default = "default_distance_tol")]
    pub distance_tol: f64,

    /// Reject frames with a non-positive determinant
    #[serde(default = "default_true")]
    pub check_determinant: bool,
}

fn default_angle_tol() -> f64 {
    2.0
}

fn default_distance_tol() -> f64 {
    0.2
}

fn default_true() -> bool {
    true
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            angle_tol_deg: default_angle_tol(),
            distance_tol: default_distance_tol(),
            check_determinant: true,
        }
    }
}

/// Landmark separation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Where the operator confirmed the landmarks sit in the marking order
    #[serde(default)]
    pub landmarks: LandmarkAssignment,
}

/// Montage reference table location and default montage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MontageConfig {
    /// Path to the montage table YAML
    #[serde(default)]
    pub table: Option<PathBuf>,

    /// Montage used when none is given on the command line
    #[serde(default)]
    pub default: Option<String>,
}

/// Advisory label-consistency check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QcConfig {
    /// Run the nearest-template check after transforming
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Scale subject and template to unit mean radius before matching
    #[serde(default = "default_true")]
    pub normalize: bool,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize: true,
        }
    }
}

/// Result export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Write the full subject result as JSON next to the CSV export
    #[serde(default = "default_true")]
    pub write_json: bool,

    /// Write the transformed electrodes and landmarks as a PLY file
    #[serde(default)]
    pub write_ply: bool,

    /// Decimal places for coordinates in CSV exports
    #[serde(default = "default_precision")]
    pub precision: usize,
}

fn default_precision() -> usize {
    6
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            write_json: true,
            write_ply: false,
            precision: default_precision(),
        }
    }
}

/// Top-view plot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlotConfig {
    #[serde(default = "default_plot_width")]
    pub width: u32,

    #[serde(default = "default_plot_height")]
    pub height: u32,

    /// Marker radius in pixels
    #[serde(default = "default_point_radius")]
    pub point_radius: u32,
}

fn default_plot_width() -> u32 {
    1024
}

fn default_plot_height() -> u32 {
    1024
}

fn default_point_radius() -> u32 {
    6
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: default_plot_width(),
            height: default_plot_height(),
            point_radius: default_point_radius(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub tolerances: ToleranceConfig,

    #[serde(default)]
    pub separation: SeparationConfig,

    #[serde(default)]
    pub montages: MontageConfig,

    #[serde(default)]
    pub qc: QcConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub plot: PlotConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tolerances() {
        let config = ToleranceConfig::default();
        assert_eq!(config.angle_tol_deg, 2.0);
        assert_eq!(config.distance_tol, 0.2);
        assert!(config.check_determinant);
    }

    #[test]
    fn test_default_pipeline_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.separation.landmarks, LandmarkAssignment::First);
        assert!(config.montages.table.is_none());
        assert!(config.qc.enabled);
        assert_eq!(config.output.precision, 6);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "tolerances:\n  angle_tol_deg: 3.5\nseparation:\n  landmarks: last\n";
        let config: PipelineConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.tolerances.angle_tol_deg, 3.5);
        assert_eq!(config.tolerances.distance_tol, 0.2);
        assert_eq!(config.separation.landmarks, LandmarkAssignment::Last);
        assert_eq!(config.plot.width, 1024);
    }

    #[test]
    fn test_yaml_round_trip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = PipelineConfig::default();
        config.montages.default = Some("dukeZ3".to_string());
        config.to_yaml(&path).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.montages.default.as_deref(), Some("dukeZ3"));
    }
}
