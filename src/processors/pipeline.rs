//! Per-subject processing and the batch validation sweep.
//!
//! One subject flows through: landmark separation, channel reconciliation,
//! frame derivation and validation, transform, and the advisory label check.
//! Subjects share nothing but the read-only montage, so the batch sweep runs
//! them in parallel with rayon.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::config::{OutputConfig, PipelineConfig};
use crate::core::loaders::{load_points_csv, load_surface};
use crate::core::montage::{MontageError, MontageSpec};
use crate::core::points::{Landmarks, PointSet, LANDMARK_LABELS};
use crate::core::writers::{
    write_electrodes_csv, write_json, write_labeled_points_csv, write_ply, ElectrodeRow,
    PointKind, SummaryRow,
};
use crate::processors::channels::{reconcile_channels, ChannelError, LabeledChannelLayout};
use crate::processors::frame::{apply_frame, build_frame, Frame, FrameDiagnostics, FrameError};
use crate::processors::qc::{check_label_consistency, QcReport};
use crate::processors::separation::{separate_landmarks, LandmarkAssignment, SeparationError};

/// Any data-quality failure that halts processing of a subject.
#[derive(Debug, Error)]
pub enum DigitizationError {
    #[error(transparent)]
    Montage(#[from] MontageError),

    #[error(transparent)]
    Separation(#[from] SeparationError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl DigitizationError {
    /// Short machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            DigitizationError::Montage(MontageError::UnknownMontage { .. }) => "unknown_montage",
            DigitizationError::Montage(_) => "montage",
            DigitizationError::Separation(SeparationError::LandmarkOrdering { .. }) => {
                "landmark_ordering"
            }
            DigitizationError::Separation(_) => "separation",
            DigitizationError::Channel(ChannelError::ChannelCountMismatch { .. }) => {
                "channel_count_mismatch"
            }
            DigitizationError::Channel(ChannelError::LabelMapping { .. }) => "label_mapping",
            DigitizationError::Frame(FrameError::Orthogonality { .. }) => "orthogonality",
            DigitizationError::Frame(FrameError::DistancePreservation { .. }) => {
                "distance_preservation"
            }
            DigitizationError::Frame(FrameError::Reflection { .. }) => "reflection",
            DigitizationError::Frame(FrameError::DegenerateAxis { .. }) => "degenerate_axis",
            DigitizationError::Frame(FrameError::AnchorOutOfRange { .. }) => "anchor_out_of_range",
        }
    }
}

/// Raw digitization of one subject.
#[derive(Debug, Clone)]
pub struct SubjectInput {
    pub subject: String,
    /// Marked landmarks and electrodes in marking order.
    pub marked: PointSet,
    /// Head-surface points, carried through unmodified.
    pub surface: Option<PointSet>,
}

/// Everything produced for one subject.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectResult {
    pub subject: String,
    pub montage: String,
    pub landmark_assignment: LandmarkAssignment,
    pub frame: Frame,
    pub diagnostics: FrameDiagnostics,
    pub native_landmarks: Landmarks,
    pub native_electrodes: PointSet,
    /// Landmarks in head-frame coordinates.
    pub landmarks: Landmarks,
    /// Electrodes in head-frame coordinates, marking order, template labels.
    pub electrodes: PointSet,
    /// Electrodes in head-frame coordinates, template order.
    pub canonical_electrodes: PointSet,
    pub layout: LabeledChannelLayout,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qc: Option<QcReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface: Option<PointSet>,
}

impl SubjectResult {
    /// Rows for the coordinate CSV export: landmarks first, then electrodes.
    pub fn electrode_rows(&self) -> Vec<ElectrodeRow> {
        let landmark_rows = self
            .native_landmarks
            .to_array()
            .into_iter()
            .zip(self.landmarks.to_array())
            .zip(LANDMARK_LABELS)
            .enumerate()
            .map(|(i, ((native, transformed), label))| ElectrodeRow {
                kind: PointKind::Landmark,
                index: i + 1,
                label: label.to_string(),
                template_index: None,
                native,
                transformed,
            });

        let electrode_rows = self
            .layout
            .entries
            .iter()
            .zip(self.native_electrodes.points.iter())
            .zip(self.electrodes.points.iter())
            .map(|((entry, native), transformed)| ElectrodeRow {
                kind: PointKind::Electrode,
                index: entry.acquisition_index,
                label: entry.label.clone(),
                template_index: Some(entry.template_index),
                native: *native,
                transformed: *transformed,
            });

        landmark_rows.chain(electrode_rows).collect()
    }
}

/// Run the full transform for one subject.
///
/// Halts at the first failed gate; nothing is guessed or repaired.
pub fn process_subject(
    input: &SubjectInput,
    montage: &MontageSpec,
    assignment: LandmarkAssignment,
    config: &PipelineConfig,
) -> std::result::Result<SubjectResult, DigitizationError> {
    let separated = separate_landmarks(&input.marked, assignment)?;

    // Count check first: a short digitization would otherwise surface as an
    // anchor error.
    let layout = reconcile_channels(separated.electrodes.len(), montage)?;

    let frame = build_frame(&separated.electrodes, montage, &config.tolerances)?;
    let transformed = apply_frame(
        &frame,
        &separated.landmarks,
        &separated.electrodes,
        &config.tolerances,
    )?;

    let electrodes = layout.label_points(&transformed.electrodes)?;
    let canonical_electrodes = layout.to_canonical(&transformed.electrodes)?;

    let qc = config.qc.enabled.then(|| {
        check_label_consistency(&electrodes, &layout, montage, config.qc.normalize)
    });

    info!(
        "{}: {} electrodes transformed with montage {} \
         (max deviation {:.3} deg, PA {:.3} -> {:.3})",
        input.subject,
        electrodes.len(),
        montage.name,
        transformed.diagnostics.max_deviation_deg,
        transformed.diagnostics.pa_distance_native,
        transformed.diagnostics.pa_distance_transformed
    );

    Ok(SubjectResult {
        subject: input.subject.clone(),
        montage: montage.name.clone(),
        landmark_assignment: assignment,
        frame,
        diagnostics: transformed.diagnostics,
        native_landmarks: separated.landmarks,
        native_electrodes: separated.electrodes,
        landmarks: transformed.landmarks,
        electrodes,
        canonical_electrodes,
        layout,
        qc,
        surface: input.surface.clone(),
    })
}

/// Input files for one subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectFiles {
    pub subject: String,
    pub markers: PathBuf,
    pub surface: Option<PathBuf>,
}

/// Load a subject's marked points and optional surface points.
pub fn load_subject(files: &SubjectFiles) -> Result<SubjectInput> {
    let marked = load_points_csv(&files.markers)
        .with_context(|| format!("Failed to load markers: {}", files.markers.display()))?;

    let surface = files
        .surface
        .as_ref()
        .map(|path| {
            load_surface(path)
                .with_context(|| format!("Failed to load surface points: {}", path.display()))
        })
        .transpose()?;

    Ok(SubjectInput {
        subject: files.subject.clone(),
        marked,
        surface,
    })
}

/// Find `<subject>_markers.csv` files in a directory.
///
/// A matching `<subject>_surface.csv` or `<subject>_surface.ply` is attached
/// when present. Results are sorted by subject id.
pub fn discover_subjects(dir: &Path) -> Result<Vec<SubjectFiles>> {
    let markers_re = Regex::new(r"(?i)^(?P<subject>.+)_markers\.csv$")?;
    let surface_re = Regex::new(r"(?i)^(?P<subject>.+)_surface\.(csv|ply)$")?;

    let mut markers: BTreeMap<String, PathBuf> = BTreeMap::new();
    let mut surfaces: BTreeMap<String, PathBuf> = BTreeMap::new();

    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };

        if let Some(caps) = markers_re.captures(name) {
            markers.insert(caps["subject"].to_string(), path.clone());
        } else if let Some(caps) = surface_re.captures(name) {
            surfaces.insert(caps["subject"].to_string(), path.clone());
        }
    }

    Ok(markers
        .into_iter()
        .map(|(subject, markers)| {
            let surface = surfaces.remove(&subject);
            SubjectFiles {
                subject,
                markers,
                surface,
            }
        })
        .collect())
}

/// Write a subject's exports into `output_dir`.
///
/// Always writes `<subject>_electrodes.csv` and `<subject>_canonical.csv`;
/// JSON and PLY follow the output config. Returns the written paths.
pub fn export_subject(
    result: &SubjectResult,
    output_dir: &Path,
    config: &OutputConfig,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let electrodes_csv = output_dir.join(format!("{}_electrodes.csv", result.subject));
    write_electrodes_csv(&electrodes_csv, &result.electrode_rows(), config.precision)?;
    written.push(electrodes_csv);

    let canonical_csv = output_dir.join(format!("{}_canonical.csv", result.subject));
    write_labeled_points_csv(&canonical_csv, &result.canonical_electrodes, config.precision)?;
    written.push(canonical_csv);

    if config.write_json {
        let json = output_dir.join(format!("{}_result.json", result.subject));
        write_json(&json, result)?;
        written.push(json);
    }

    if config.write_ply {
        let ply = output_dir.join(format!("{}_head.ply", result.subject));
        write_ply(&ply, &result.electrodes, &result.landmarks.to_array())?;
        written.push(ply);
    }

    Ok(written)
}

/// Summary row for one subject's outcome.
///
/// Failed subjects still report whatever diagnostic numbers their error carries.
pub fn summary_row(subject: &str, outcome: &Result<SubjectResult>) -> SummaryRow {
    match outcome {
        Ok(result) => SummaryRow {
            subject: subject.to_string(),
            status: "ok".to_string(),
            error_kind: None,
            max_deviation_deg: Some(result.diagnostics.max_deviation_deg),
            determinant: Some(result.diagnostics.determinant),
            pa_distance_native: Some(result.diagnostics.pa_distance_native),
            pa_distance_transformed: Some(result.diagnostics.pa_distance_transformed),
            qc_findings: result.qc.as_ref().map(|q| q.findings.len()),
            message: String::new(),
        },
        Err(err) => {
            let digitization = err.downcast_ref::<DigitizationError>();
            let mut row = SummaryRow {
                subject: subject.to_string(),
                status: "failed".to_string(),
                error_kind: Some(digitization.map_or("input", |e| e.kind()).to_string()),
                max_deviation_deg: None,
                determinant: None,
                pa_distance_native: None,
                pa_distance_transformed: None,
                qc_findings: None,
                message: format!("{:#}", err),
            };

            match digitization {
                Some(DigitizationError::Frame(FrameError::Orthogonality {
                    max_deviation_deg,
                    ..
                })) => row.max_deviation_deg = Some(*max_deviation_deg),
                Some(DigitizationError::Frame(FrameError::Reflection { determinant })) => {
                    row.determinant = Some(*determinant)
                }
                Some(DigitizationError::Frame(FrameError::DistancePreservation {
                    before,
                    after,
                    ..
                })) => {
                    row.pa_distance_native = Some(*before);
                    row.pa_distance_transformed = Some(*after);
                }
                _ => {}
            }

            row
        }
    }
}

/// Load, transform and optionally export a single subject.
pub fn run_subject(
    files: &SubjectFiles,
    montage: &MontageSpec,
    assignment: LandmarkAssignment,
    config: &PipelineConfig,
    output_dir: Option<&Path>,
) -> Result<SubjectResult> {
    let input = load_subject(files)?;
    let result = process_subject(&input, montage, assignment, config)?;

    if let Some(dir) = output_dir {
        export_subject(&result, dir, &config.output)
            .with_context(|| format!("Failed to export subject {}", files.subject))?;
    }

    Ok(result)
}

/// Process every subject in parallel and collect one summary row each.
///
/// A failing subject is logged and reported in its row; it never stops the
/// others. Rows come back in the order of `subjects`.
pub fn run_batch(
    subjects: &[SubjectFiles],
    montage: &MontageSpec,
    assignment: LandmarkAssignment,
    config: &PipelineConfig,
    output_dir: Option<&Path>,
    show_progress: bool,
) -> Vec<SummaryRow> {
    let pb = if show_progress {
        let pb = ProgressBar::new(subjects.len() as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{bar:40.green/black} {pos}/{len} {msg}")
        {
            pb.set_style(style);
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let rows: Vec<SummaryRow> = subjects
        .par_iter()
        .map(|files| {
            let outcome = run_subject(files, montage, assignment, config, output_dir);
            if let Err(e) = &outcome {
                warn!("{}: {:#}", files.subject, e);
            }
            pb.inc(1);
            summary_row(&files.subject, &outcome)
        })
        .collect();

    pb.finish_and_clear();
    rows
}
