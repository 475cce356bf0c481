//! FastScan EEG digitization pipeline.
//!
//! This crate provides tools for:
//! - Separating anatomical landmarks from marked electrodes
//! - Deriving and validating a head-centered coordinate frame per montage
//! - Rigidly transforming electrodes and landmarks into that frame
//! - Reconciling marking order with a montage's canonical channel labels
//! - Batch validation sweeps over many subjects (parallelized)
//!
//! # Example
//!
//! ```no_run
//! use fastscan_pipeline::core::montage::MontageTable;
//! use fastscan_pipeline::processors::pipeline::{load_subject, process_subject, SubjectFiles};
//! use fastscan_pipeline::{LandmarkAssignment, PipelineConfig};
//!
//! let table = MontageTable::from_yaml("montages.yaml").unwrap();
//! let files = SubjectFiles {
//!     subject: "s01".to_string(),
//!     markers: "s01_markers.csv".into(),
//!     surface: None,
//! };
//! let input = load_subject(&files).unwrap();
//! let result = process_subject(
//!     &input,
//!     table.get("dukeZ3").unwrap(),
//!     LandmarkAssignment::First,
//!     &PipelineConfig::default(),
//! )
//! .unwrap();
//! println!("max deviation: {:.3} deg", result.diagnostics.max_deviation_deg);
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;
pub mod visualization;

pub use config::{
    MontageConfig, OutputConfig, PipelineConfig, PlotConfig, QcConfig, SeparationConfig,
    ToleranceConfig,
};
pub use core::geometry::Vec3;
pub use core::montage::{MontageSpec, MontageTable, VertexDef};
pub use core::points::{Landmarks, PointSet};
pub use processors::separation::LandmarkAssignment;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
