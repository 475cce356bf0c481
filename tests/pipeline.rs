//! End-to-end subject flow: montage YAML and marker CSV on disk, through
//! discovery, transform, export and the batch summary.

use std::fs;
use std::io::Write;
use std::path::Path;

use fastscan_pipeline::core::geometry::distance;
use fastscan_pipeline::core::loaders::load_points_csv;
use fastscan_pipeline::core::writers::write_batch_summary;
use fastscan_pipeline::processors::pipeline::{
    discover_subjects, load_subject, process_subject, run_batch, DigitizationError,
};
use fastscan_pipeline::{LandmarkAssignment, MontageTable, PipelineConfig, Vec3};
use nalgebra::Rotation3;
use tempfile::TempDir;

const MONTAGE_YAML: &str = r#"
- name: ring8
  left_anchors: [2, 3]
  right_anchors: [6, 7]
  vertex: 8
  template:
    - { label: Fpz, position: [90.0, 0.0, 20.0] }
    - { label: T7a, position: [15.0, 75.0, 0.0] }
    - { label: T7p, position: [-15.0, 75.0, 0.0] }
    - { label: Oz, position: [-90.0, 0.0, 20.0] }
    - { label: Fz, position: [50.0, 0.0, 80.0] }
    - { label: T8a, position: [15.0, -75.0, 0.0] }
    - { label: T8p, position: [-15.0, -75.0, 0.0] }
    - { label: Cz, position: [0.0, 0.0, 100.0] }
  acquisition_order: [1, 2, 3, 4, 5, 6, 7, 8]
- name: dukeZ3
  left_anchors: [1]
  right_anchors: [2]
  vertex: [3, 4]
  template:
    - { label: A, position: [0.0, 1.0, 0.0] }
    - { label: B, position: [0.0, -1.0, 0.0] }
    - { label: C, position: [1.0, 0.0, 1.0] }
    - { label: D, position: [-1.0, 0.0, 1.0] }
  acquisition_order: [1, 2, 3, 4]
"#;

/// Head-frame electrode positions matching the ring8 template.
fn head_electrodes() -> Vec<Vec3> {
    vec![
        Vec3::new(92.0, 1.0, 18.0),
        Vec3::new(15.0, 74.0, 0.0),
        Vec3::new(-15.0, 74.0, 0.0),
        Vec3::new(-91.0, -1.0, 22.0),
        Vec3::new(48.0, 0.5, 81.0),
        Vec3::new(15.0, -74.0, 0.0),
        Vec3::new(-15.0, -74.0, 0.0),
        Vec3::new(0.0, 0.0, 102.0),
    ]
}

fn head_landmarks() -> [Vec3; 3] {
    [
        Vec3::new(0.0, -70.0, -35.0),
        Vec3::new(98.0, 0.0, -25.0),
        Vec3::new(0.0, 70.0, -35.0),
    ]
}

fn to_scanner(p: &Vec3) -> Vec3 {
    Rotation3::from_euler_angles(-0.4, 0.25, 2.2) * p + Vec3::new(-120.0, 40.0, 310.0)
}

fn write_csv(path: &Path, points: &[Vec3]) {
    let mut file = fs::File::create(path).unwrap();
    writeln!(file, "x,y,z").unwrap();
    for p in points {
        writeln!(file, "{:.9},{:.9},{:.9}", p.x, p.y, p.z).unwrap();
    }
}

fn marked_scanner_points() -> Vec<Vec3> {
    head_landmarks()
        .iter()
        .chain(head_electrodes().iter())
        .map(to_scanner)
        .collect()
}

#[test]
fn test_single_subject_recovers_head_frame() {
    let dir = TempDir::new().unwrap();
    let table_path = dir.path().join("montages.yaml");
    fs::write(&table_path, MONTAGE_YAML).unwrap();
    write_csv(&dir.path().join("s01_markers.csv"), &marked_scanner_points());

    let table = MontageTable::from_yaml(&table_path).unwrap();
    assert_eq!(table.names(), vec!["ring8", "dukeZ3"]);

    let subjects = discover_subjects(dir.path()).unwrap();
    assert_eq!(subjects.len(), 1);

    let input = load_subject(&subjects[0]).unwrap();
    let config = PipelineConfig::default();
    let result = process_subject(
        &input,
        table.get("ring8").unwrap(),
        LandmarkAssignment::First,
        &config,
    )
    .unwrap();

    // Anchors are symmetric about the head frame, so the transform recovers
    // the head-frame coordinates exactly.
    for (got, want) in result.electrodes.points.iter().zip(head_electrodes()) {
        assert!((got - want).norm() < 1e-6, "{} vs {}", got, want);
    }
    assert!((result.landmarks.nasion - head_landmarks()[1]).norm() < 1e-6);
    assert!(result.diagnostics.max_deviation_deg < 1e-6);
    assert!((result.diagnostics.determinant - 1.0).abs() < 1e-9);
    assert!((result.diagnostics.pa_distance_native - 140.0).abs() < 1e-6);

    assert_eq!(result.electrodes.label(7), Some("Cz"));
    assert!(result.qc.as_ref().unwrap().is_clean());

    // Every pairwise distance survives the transform.
    let native = &result.native_electrodes.points;
    let moved = &result.electrodes.points;
    for i in 0..native.len() {
        for j in (i + 1)..native.len() {
            let before = distance(&native[i], &native[j]);
            let after = distance(&moved[i], &moved[j]);
            assert!((before - after).abs() < 1e-9);
        }
    }
}

#[test]
fn test_batch_sweep_reports_each_subject() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("out");
    let table = {
        let path = dir.path().join("montages.yaml");
        fs::write(&path, MONTAGE_YAML).unwrap();
        MontageTable::from_yaml(&path).unwrap()
    };

    write_csv(&dir.path().join("a_markers.csv"), &marked_scanner_points());

    // Subject b is missing two electrodes.
    let mut short = marked_scanner_points();
    short.truncate(9);
    write_csv(&dir.path().join("b_markers.csv"), &short);

    // Subject c has a left anchor pushed far above the ear line, tilting y/z.
    let mut tilted = head_electrodes();
    tilted[1] = Vec3::new(15.0, 74.0, 40.0);
    let tilted: Vec<Vec3> = head_landmarks()
        .iter()
        .chain(tilted.iter())
        .map(to_scanner)
        .collect();
    write_csv(&dir.path().join("c_markers.csv"), &tilted);

    let subjects = discover_subjects(dir.path()).unwrap();
    let rows = run_batch(
        &subjects,
        table.get("ring8").unwrap(),
        LandmarkAssignment::First,
        &PipelineConfig::default(),
        Some(out.as_path()),
        false,
    );

    let status: Vec<(&str, &str, Option<&str>)> = rows
        .iter()
        .map(|r| (r.subject.as_str(), r.status.as_str(), r.error_kind.as_deref()))
        .collect();
    assert_eq!(
        status,
        vec![
            ("a", "ok", None),
            ("b", "failed", Some("channel_count_mismatch")),
            ("c", "failed", Some("orthogonality")),
        ]
    );
    assert!(rows[2].max_deviation_deg.unwrap() > 2.0);

    let exported = load_points_csv(out.join("a_canonical.csv")).unwrap();
    assert_eq!(exported.len(), 8);
    assert_eq!(exported.label(0), Some("Fpz"));

    let summary = out.join("batch_summary.csv");
    write_batch_summary(&summary, &rows).unwrap();
    let text = fs::read_to_string(&summary).unwrap();
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn test_unknown_montage_lists_known_names() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("montages.yaml");
    fs::write(&path, MONTAGE_YAML).unwrap();
    let table = MontageTable::from_yaml(&path).unwrap();

    let err: DigitizationError = table.get("waveguard128").unwrap_err().into();
    assert_eq!(err.kind(), "unknown_montage");
    assert!(err.to_string().contains("ring8, dukeZ3"));
}

#[test]
fn test_demo_montage_table_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/montages.yaml");
    let table = MontageTable::from_yaml(&path).unwrap();

    assert_eq!(table.names(), vec!["ring8", "ring8-reversed"]);
    for montage in table.iter() {
        assert_eq!(montage.expected_count(), 8);
    }

    let config_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/fastscan.yaml");
    let config = PipelineConfig::from_yaml(&config_path).unwrap();
    assert_eq!(config.montages.default.as_deref(), Some("ring8"));
}
