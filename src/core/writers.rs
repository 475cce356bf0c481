//! Data writers for subject results.
//!
//! This module provides functions for writing digitization results:
//! - Electrode/landmark CSV with native and head-frame coordinates
//! - Canonical-order electrode CSV (template order, template labels)
//! - JSON dump of any serializable result structure
//! - ASCII PLY of a point set with landmarks highlighted
//! - Batch summary CSV, one row per subject

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geometry::Vec3;
use super::points::PointSet;

/// Color for electrodes in PLY exports (light gray).
const ELECTRODE_COLOR: [u8; 3] = [180, 180, 180];

/// Color for landmarks in PLY exports.
const LANDMARK_COLOR: [u8; 3] = [228, 26, 28];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// JSON serialization error.
    #[error("JSON write error for '{path}': {source}")]
    JsonError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Whether a CSV row describes a landmark or an electrode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    Landmark,
    Electrode,
}

/// One row of the per-subject coordinate export.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectrodeRow {
    pub kind: PointKind,
    /// 1-based position within its kind, in marking order.
    pub index: usize,
    pub label: String,
    /// 1-based template index, electrodes only.
    pub template_index: Option<usize>,
    pub native: Vec3,
    pub transformed: Vec3,
}

/// One row of the batch validation summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub subject: String,
    pub status: String,
    pub error_kind: Option<String>,
    pub max_deviation_deg: Option<f64>,
    pub determinant: Option<f64>,
    pub pa_distance_native: Option<f64>,
    pub pa_distance_transformed: Option<f64>,
    pub qc_findings: Option<usize>,
    pub message: String,
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    ensure_parent_dirs(path)?;
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn fmt_coord(v: f64, precision: usize) -> String {
    format!("{:.*}", precision, v)
}

/// Write landmarks and electrodes with native and transformed coordinates.
///
/// Columns: `kind,index,label,template_index,native_x,native_y,native_z,x,y,z`.
/// `template_index` is empty for landmarks.
pub fn write_electrodes_csv(path: &Path, rows: &[ElectrodeRow], precision: usize) -> Result<()> {
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer
        .write_record([
            "kind",
            "index",
            "label",
            "template_index",
            "native_x",
            "native_y",
            "native_z",
            "x",
            "y",
            "z",
        ])
        .map_err(csv_err)?;

    for row in rows {
        let kind = match row.kind {
            PointKind::Landmark => "landmark",
            PointKind::Electrode => "electrode",
        };
        csv_writer
            .write_record(&[
                kind.to_string(),
                row.index.to_string(),
                row.label.clone(),
                row.template_index.map(|i| i.to_string()).unwrap_or_default(),
                fmt_coord(row.native.x, precision),
                fmt_coord(row.native.y, precision),
                fmt_coord(row.native.z, precision),
                fmt_coord(row.transformed.x, precision),
                fmt_coord(row.transformed.y, precision),
                fmt_coord(row.transformed.z, precision),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Write a labeled point set as `label,x,y,z`.
///
/// Unlabeled sets get 1-based position numbers as labels.
pub fn write_labeled_points_csv(path: &Path, points: &PointSet, precision: usize) -> Result<()> {
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer.write_record(["label", "x", "y", "z"]).map_err(csv_err)?;

    for (i, p) in points.points.iter().enumerate() {
        let label = points
            .label(i)
            .map(str::to_string)
            .unwrap_or_else(|| (i + 1).to_string());
        csv_writer
            .write_record(&[
                label,
                fmt_coord(p.x, precision),
                fmt_coord(p.y, precision),
                fmt_coord(p.z, precision),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Serialize `value` as pretty-printed JSON.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| WriteError::JsonError {
        path: path_str.clone(),
        source: e,
    })?;

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write electrodes and landmarks to an ASCII PLY file with RGB colors.
///
/// Electrodes are light gray, landmarks red, so the three anatomical points
/// stand out in a point-cloud viewer.
pub fn write_ply(path: &Path, electrodes: &PointSet, landmarks: &[Vec3]) -> Result<()> {
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let io_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    let num_points = electrodes.len() + landmarks.len();

    writeln!(writer, "ply").map_err(io_err)?;
    writeln!(writer, "format ascii 1.0").map_err(io_err)?;
    writeln!(writer, "element vertex {}", num_points).map_err(io_err)?;
    for prop in ["float x", "float y", "float z", "uchar red", "uchar green", "uchar blue"] {
        writeln!(writer, "property {}", prop).map_err(io_err)?;
    }
    writeln!(writer, "end_header").map_err(io_err)?;

    let colored = electrodes
        .points
        .iter()
        .map(|p| (p, ELECTRODE_COLOR))
        .chain(landmarks.iter().map(|p| (p, LANDMARK_COLOR)));

    for (p, [r, g, b]) in colored {
        writeln!(writer, "{:.6} {:.6} {:.6} {} {} {}", p.x, p.y, p.z, r, g, b).map_err(io_err)?;
    }

    writer.flush().map_err(io_err)?;

    Ok(())
}

/// Write the batch validation summary, one row per subject.
pub fn write_batch_summary(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    let buf_writer = create_buffered_writer(path)?;
    let mut csv_writer = csv::Writer::from_writer(buf_writer);
    let path_str = path.display().to_string();

    for row in rows {
        csv_writer.serialize(row).map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}
