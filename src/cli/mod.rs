//! Command-line interface for the digitization pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::montage::{MontageSpec, MontageTable};
use crate::core::writers::write_batch_summary;
use crate::processors::pipeline::{self, SubjectFiles};
use crate::processors::separation::LandmarkAssignment;
use crate::visualization;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "fastscan-pipeline")]
#[command(about = "EEG FastScan digitization pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every command that runs the transform.
#[derive(clap::Args, Clone)]
struct TransformArgs {
    /// Montage name (defaults to montages.default in the config)
    #[arg(short, long)]
    montage: Option<String>,
    /// Montage table YAML (defaults to montages.table in the config)
    #[arg(long)]
    montage_table: Option<PathBuf>,
    /// Where the three landmarks sit in the marking sequence
    #[arg(long, value_enum)]
    landmarks: Option<LandmarkAssignment>,
    /// Maximum allowed deviation from 90 degrees between frame axes
    #[arg(long)]
    angle_tol: Option<f64>,
    /// Maximum allowed change of the preauricular distance
    #[arg(long)]
    distance_tol: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Transform one subject's marked points into the head frame
    Transform {
        /// Marked points CSV (landmarks and electrodes in marking order)
        markers: PathBuf,
        /// Optional head-surface points (CSV or PLY), passed through unmodified
        #[arg(long)]
        surface: Option<PathBuf>,
        /// Subject id (defaults to the markers file stem)
        #[arg(long)]
        subject: Option<String>,
        /// Output directory for exports
        #[arg(short, long, default_value = "output")]
        output_dir: PathBuf,
        #[command(flatten)]
        args: TransformArgs,
    },

    /// Validate and transform every subject in a directory
    Batch {
        /// Directory containing <subject>_markers.csv files
        input_dir: PathBuf,
        /// Output directory for per-subject exports and the summary
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        /// Only validate, do not write per-subject exports
        #[arg(long)]
        validate_only: bool,
        #[command(flatten)]
        args: TransformArgs,
    },

    /// List the montages in a montage table
    Montages {
        /// Montage table YAML (defaults to montages.table in the config)
        #[arg(long)]
        montage_table: Option<PathBuf>,
    },

    /// Transform one subject and plot it from above (PNG)
    Plot {
        /// Marked points CSV
        markers: PathBuf,
        /// Output PNG file path (defaults to same name as input with .png extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        args: TransformArgs,
    },

    /// Write the default configuration to a YAML file
    InitConfig {
        /// Output YAML path
        #[arg(default_value = "fastscan.yaml")]
        output: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!("Failed to load config from {}: {}, using defaults", path.display(), e);
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    // Dispatch to subcommands
    match cli.command {
        Commands::Transform { markers, surface, subject, output_dir, args } => {
            cmd_transform(&markers, surface, subject, &output_dir, &args, &config);
        }
        Commands::Batch { input_dir, output_dir, validate_only, args } => {
            cmd_batch(&input_dir, output_dir, validate_only, &args, &config);
        }
        Commands::Montages { montage_table } => {
            cmd_montages(montage_table, &config);
        }
        Commands::Plot { markers, output, args } => {
            cmd_plot(&markers, output, &args, &config);
        }
        Commands::InitConfig { output } => {
            cmd_init_config(&output, &config);
        }
    }
}

/// Apply command-line overrides on top of the loaded config.
fn effective_config(args: &TransformArgs, config: &PipelineConfig) -> PipelineConfig {
    let mut effective = config.clone();
    if let Some(tol) = args.angle_tol {
        effective.tolerances.angle_tol_deg = tol;
    }
    if let Some(tol) = args.distance_tol {
        effective.tolerances.distance_tol = tol;
    }
    if let Some(assignment) = args.landmarks {
        effective.separation.landmarks = assignment;
    }
    if let Some(table) = &args.montage_table {
        effective.montages.table = Some(table.clone());
    }
    if let Some(name) = &args.montage {
        effective.montages.default = Some(name.clone());
    }
    effective
}

fn load_table(table: Option<&Path>) -> MontageTable {
    let Some(path) = table else {
        error!("No montage table given: pass --montage-table or set montages.table in the config");
        std::process::exit(1);
    };

    match MontageTable::from_yaml(path) {
        Ok(table) => {
            info!("Loaded {} montages from: {}", table.len(), path.display());
            table
        }
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

fn select_montage<'a>(table: &'a MontageTable, config: &PipelineConfig) -> &'a MontageSpec {
    let Some(name) = config.montages.default.as_deref() else {
        error!(
            "No montage selected: pass --montage (available: {})",
            table.names().join(", ")
        );
        std::process::exit(1);
    };

    match table.get(name) {
        Ok(montage) => montage,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Subject id from a markers file name: `s01_markers.csv` -> `s01`.
fn subject_from_path(markers: &Path) -> String {
    let stem = markers
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "subject".to_string());
    stem.strip_suffix("_markers").unwrap_or(&stem).to_string()
}

fn cmd_transform(
    markers: &Path,
    surface: Option<PathBuf>,
    subject: Option<String>,
    output_dir: &Path,
    args: &TransformArgs,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let config = effective_config(args, config);
    let table = load_table(config.montages.table.as_deref());
    let montage = select_montage(&table, &config);

    let files = SubjectFiles {
        subject: subject.unwrap_or_else(|| subject_from_path(markers)),
        markers: markers.to_path_buf(),
        surface,
    };

    println!("Transforming subject {}...", files.subject);
    println!("Markers: {}", markers.display());
    println!("Montage: {}", montage.name);
    println!("Landmarks: {:?}", config.separation.landmarks);

    let spinner = create_spinner("Deriving head frame...");

    match pipeline::run_subject(
        &files,
        montage,
        config.separation.landmarks,
        &config,
        Some(output_dir),
    ) {
        Ok(result) => {
            spinner.finish_and_clear();

            let d = &result.diagnostics;
            let qc = result
                .qc
                .as_ref()
                .map_or("disabled".to_string(), |q| format!("{} findings", q.findings.len()));

            print_summary(
                "Transform Complete",
                &[
                    ("Subject", result.subject.clone()),
                    ("Montage", result.montage.clone()),
                    ("Electrodes", result.electrodes.len().to_string()),
                    ("Max deviation (deg)", format!("{:.4}", d.max_deviation_deg)),
                    ("Determinant", format!("{:.6}", d.determinant)),
                    (
                        "PA distance",
                        format!("{:.4} -> {:.4}", d.pa_distance_native, d.pa_distance_transformed),
                    ),
                    ("Label QC", qc),
                    ("Output directory", output_dir.display().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Transform failed for {}: {:#}", files.subject, e);
            std::process::exit(1);
        }
    }
}

fn cmd_batch(
    input_dir: &Path,
    output_dir: Option<PathBuf>,
    validate_only: bool,
    args: &TransformArgs,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let config = effective_config(args, config);
    let table = load_table(config.montages.table.as_deref());
    let montage = select_montage(&table, &config);

    let output_dir = output_dir.unwrap_or_else(|| input_dir.join("fastscan_output"));

    let subjects = match pipeline::discover_subjects(input_dir) {
        Ok(s) => s,
        Err(e) => {
            error!("Failed to scan {}: {:#}", input_dir.display(), e);
            std::process::exit(1);
        }
    };

    if subjects.is_empty() {
        warn!("No *_markers.csv files found in {}", input_dir.display());
        return;
    }

    println!("Processing {} subjects...", subjects.len());
    println!("Input directory: {}", input_dir.display());
    println!("Output directory: {}", output_dir.display());
    println!("Montage: {}", montage.name);
    if validate_only {
        println!("VALIDATE ONLY: No per-subject files will be written");
    }

    let export_dir = (!validate_only).then_some(output_dir.as_path());
    let rows = pipeline::run_batch(
        &subjects,
        montage,
        config.separation.landmarks,
        &config,
        export_dir,
        true,
    );

    let summary_path = output_dir.join("batch_summary.csv");
    if let Err(e) = write_batch_summary(&summary_path, &rows) {
        error!("Failed to write batch summary: {}", e);
        std::process::exit(1);
    }

    let failed = rows.iter().filter(|r| r.status != "ok").count();
    let worst = rows
        .iter()
        .filter_map(|r| r.max_deviation_deg)
        .fold(0.0_f64, f64::max);

    print_summary(
        "Batch Complete",
        &[
            ("Input directory", input_dir.display().to_string()),
            ("Montage", montage.name.clone()),
            ("Subjects", rows.len().to_string()),
            ("Passed", (rows.len() - failed).to_string()),
            ("Failed", failed.to_string()),
            ("Worst deviation", format!("{:.4} deg", worst)),
            ("Summary CSV", summary_path.display().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn cmd_montages(montage_table: Option<PathBuf>, config: &PipelineConfig) {
    let path = montage_table.or_else(|| config.montages.table.clone());
    let table = load_table(path.as_deref());

    let items: Vec<(&str, String)> = table
        .iter()
        .map(|m| {
            (
                m.name.as_str(),
                format!(
                    "{} electrodes, vertex {:?}",
                    m.expected_count(),
                    m.vertex.numbers()
                ),
            )
        })
        .collect();

    print_summary("Montages", &items);
}

fn cmd_plot(
    markers: &Path,
    output: Option<PathBuf>,
    args: &TransformArgs,
    config: &PipelineConfig,
) {
    let start = Instant::now();
    let config = effective_config(args, config);
    let table = load_table(config.montages.table.as_deref());
    let montage = select_montage(&table, &config);

    // Determine output path (default to same name as input with .png extension)
    let output_path = output.unwrap_or_else(|| {
        let mut path = markers.to_path_buf();
        path.set_extension("png");
        path
    });

    let files = SubjectFiles {
        subject: subject_from_path(markers),
        markers: markers.to_path_buf(),
        surface: None,
    };

    let spinner = create_spinner("Transforming markers...");

    let assignment = config.separation.landmarks;
    let result = match pipeline::run_subject(&files, montage, assignment, &config, None) {
        Ok(r) => r,
        Err(e) => {
            spinner.finish_and_clear();
            error!("Transform failed for {}: {:#}", files.subject, e);
            std::process::exit(1);
        }
    };

    spinner.set_message("Generating plot...");

    let plotted = visualization::plot_top_view(
        &output_path,
        &result.electrodes,
        &result.landmarks,
        &config.plot,
    );

    match plotted {
        Ok(()) => {
            spinner.finish_and_clear();

            print_summary(
                "Visualization Complete",
                &[
                    ("Input file", markers.display().to_string()),
                    ("Output PNG", output_path.display().to_string()),
                    ("Electrodes", result.electrodes.len().to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            error!("Visualization failed: {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_init_config(output: &Path, config: &PipelineConfig) {
    match config.to_yaml(output) {
        Ok(()) => println!("Wrote config to {}", output.display()),
        Err(e) => {
            error!("Failed to write config: {}", e);
            std::process::exit(1);
        }
    }
}
