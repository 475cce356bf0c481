//! Data processing modules.

pub mod channels;
pub mod frame;
pub mod pipeline;
pub mod qc;
pub mod separation;

// Re-export key types for convenience
pub use channels::{reconcile_channels, ChannelEntry, ChannelError, LabeledChannelLayout};
pub use frame::{
    apply_frame, build_frame, derive_frame, validate_orthogonality, Frame, FrameDiagnostics,
    FrameError, Transformed,
};
pub use pipeline::{
    discover_subjects, export_subject, process_subject, run_batch, DigitizationError,
    SubjectFiles, SubjectInput, SubjectResult,
};
pub use qc::{check_label_consistency, QcFinding, QcReport};
pub use separation::{separate_landmarks, LandmarkAssignment, SeparationError, Separated};
