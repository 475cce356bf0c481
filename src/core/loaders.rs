//! Thin input adapters for digitization exports.
//!
//! This module provides parsers for:
//! - Marked-point CSV files (optional `label` column plus `x`, `y`, `z`)
//! - Head-surface point clouds as CSV or ASCII PLY
//!
//! Coordinates that fail to parse are errors rather than zeros: a silently
//! zeroed electrode would move the derived head frame.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use super::geometry::Vec3;
use super::points::PointSet;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error in {path} at row {row}: {message}")]
    ParseError {
        path: PathBuf,
        row: usize,
        message: String,
    },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

fn parse_coord(value: Option<&str>, axis: &str, path: &Path, row: usize) -> Result<f64> {
    let raw = value.map(str::trim).unwrap_or("");
    let invalid = || LoaderError::ParseError {
        path: path.to_path_buf(),
        row,
        message: format!("invalid {} value '{}'", axis, raw),
    };

    // `f64::from_str` accepts "NaN" and "inf"; neither is a coordinate.
    let value: f64 = raw.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}

/// Load an ordered set of marked points from a CSV file.
///
/// The header must name `x`, `y` and `z` columns (case-insensitive). A
/// `label` column is optional; when present every row's label is kept.
/// Row order is preserved as marking order.
///
/// # Errors
///
/// Returns an error if the file cannot be read, lacks coordinate columns,
/// contains an unparsable coordinate, or has no data rows.
pub fn load_points_csv<P: AsRef<Path>>(path: P) -> Result<PointSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let missing: Vec<&str> = ["x", "y", "z"]
        .into_iter()
        .filter(|c| !col_map.contains_key(*c))
        .collect();
    if !missing.is_empty() {
        return Err(LoaderError::MissingColumns(missing.join(", ")));
    }

    let x_idx = col_map["x"];
    let y_idx = col_map["y"];
    let z_idx = col_map["z"];
    let label_idx = col_map.get("label").copied();

    let mut points = Vec::new();
    let mut labels = Vec::new();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        // Header is row 1
        let row = i + 2;

        if record.iter().all(|f| f.is_empty()) {
            continue;
        }

        let x = parse_coord(record.get(x_idx), "x", path, row)?;
        let y = parse_coord(record.get(y_idx), "y", path, row)?;
        let z = parse_coord(record.get(z_idx), "z", path, row)?;
        points.push(Vec3::new(x, y, z));

        if let Some(idx) = label_idx {
            labels.push(record.get(idx).unwrap_or("").to_string());
        }
    }

    if points.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(match label_idx {
        Some(_) => PointSet::with_labels(points, labels),
        None => PointSet::from_points(points),
    })
}

/// Load head-surface points from an ASCII PLY file.
///
/// Only the `x`, `y`, `z` vertex properties are read; any other properties
/// (colors, normals) are skipped.
pub fn load_surface_ply<P: AsRef<Path>>(path: P) -> Result<PointSet> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))??;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex_element = false;
    let mut header_done = false;
    // The `ply` magic line is line 1.
    let mut header_lines = 1;

    for line in &mut lines {
        let line = line?;
        header_lines += 1;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::InvalidPly(format!(
                "only ASCII PLY is supported, got '{}'",
                stripped
            )));
        } else if stripped.starts_with("element") {
            in_vertex_element = stripped.starts_with("element vertex");
            if in_vertex_element {
                num_vertices = stripped
                    .split_whitespace()
                    .last()
                    .and_then(|s| s.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex_element {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<&str, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();

    let axis_index = |axis: &str| {
        prop_idx
            .get(axis)
            .copied()
            .ok_or_else(|| LoaderError::MissingColumns(axis.to_string()))
    };
    let x_idx = axis_index("x")?;
    let y_idx = axis_index("y")?;
    let z_idx = axis_index("z")?;

    let mut points = Vec::with_capacity(num_vertices);

    for (i, line) in lines.enumerate() {
        if points.len() >= num_vertices {
            break;
        }

        let line = line?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let row = header_lines + i + 1;
        let x = parse_coord(values.get(x_idx).copied(), "x", path, row)?;
        let y = parse_coord(values.get(y_idx).copied(), "y", path, row)?;
        let z = parse_coord(values.get(z_idx).copied(), "z", path, row)?;
        points.push(Vec3::new(x, y, z));
    }

    if points.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            points.len()
        )));
    }

    Ok(PointSet::from_points(points))
}

/// Load head-surface points, choosing the parser from the file extension.
///
/// `.ply` files go through [`load_surface_ply`]; everything else is read as
/// a coordinate CSV.
pub fn load_surface<P: AsRef<Path>>(path: P) -> Result<PointSet> {
    let path = path.as_ref();
    let is_ply = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("ply"))
        .unwrap_or(false);

    if is_ply {
        load_surface_ply(path)
    } else {
        load_points_csv(path)
    }
}
