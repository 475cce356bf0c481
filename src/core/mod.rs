//! Core data types and I/O operations.

pub mod geometry;
pub mod loaders;
pub mod montage;
pub mod points;
pub mod writers;

pub use geometry::Vec3;
pub use loaders::{load_points_csv, load_surface, LoaderError};
pub use montage::{MontageError, MontageSpec, MontageTable, TemplateElectrode, VertexDef};
pub use points::{Landmarks, PointSet, LANDMARK_LABELS};
pub use writers::{write_batch_summary, write_electrodes_csv, write_json, write_ply, WriteError};
