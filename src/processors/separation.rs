//! Landmark/electrode separation.
//!
//! The digitizer protocol marks the three anatomical landmarks either before
//! or after the electrodes. Which one applies is an operator decision; this
//! module only performs the index bookkeeping for the chosen assignment and
//! refuses to guess when the operator rejects both.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::points::{Landmarks, PointSet};

/// Number of anatomical landmarks in a marker set.
pub const LANDMARK_COUNT: usize = 3;

/// Errors that can occur during landmark separation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeparationError {
    #[error("need at least 3 marked points to separate landmarks, got {found}")]
    TooFewPoints { found: usize },

    #[error(
        "landmark ordering rejected: neither the first nor the last 3 of {total} \
         marked points are the landmarks; re-mark or relabel before processing"
    )]
    LandmarkOrdering { total: usize },
}

/// Result type for separation operations.
pub type Result<T> = std::result::Result<T, SeparationError>;

/// Where the landmarks sit in the marking sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkAssignment {
    /// The first three marked points are rpa, nasion, lpa.
    #[default]
    First,
    /// The last three marked points are rpa, nasion, lpa.
    Last,
    /// Neither position holds the landmarks.
    Neither,
}

/// Landmarks split from the electrode points.
#[derive(Debug, Clone, PartialEq)]
pub struct Separated {
    pub landmarks: Landmarks,
    /// Electrodes in their original marking order.
    pub electrodes: PointSet,
}

/// Partition marked points into landmarks and electrodes.
///
/// The landmarks keep their fixed rpa, nasion, lpa order and the electrodes
/// keep the marking order of the remaining points.
///
/// # Errors
///
/// - `TooFewPoints` if fewer than three points were marked.
/// - `LandmarkOrdering` if the assignment is `Neither`.
pub fn separate_landmarks(marked: &PointSet, assignment: LandmarkAssignment) -> Result<Separated> {
    let n = marked.len();
    if n < LANDMARK_COUNT {
        return Err(SeparationError::TooFewPoints { found: n });
    }

    let (landmark_range, electrode_range) = match assignment {
        LandmarkAssignment::First => (0..LANDMARK_COUNT, LANDMARK_COUNT..n),
        LandmarkAssignment::Last => (n - LANDMARK_COUNT..n, 0..n - LANDMARK_COUNT),
        LandmarkAssignment::Neither => {
            return Err(SeparationError::LandmarkOrdering { total: n });
        }
    };

    let lm = &marked.points[landmark_range];
    let landmarks = Landmarks::from_ordered([lm[0], lm[1], lm[2]]);

    Ok(Separated {
        landmarks,
        electrodes: marked.slice(electrode_range),
    })
}

/// Partition marked points using a caller-supplied decision.
///
/// `decide` stands in for the operator's visual confirmation: it sees the
/// full marker set and returns the assignment to apply. It is called once.
pub fn separate_with<F>(marked: &PointSet, decide: F) -> Result<Separated>
where
    F: FnOnce(&PointSet) -> LandmarkAssignment,
{
    if marked.len() < LANDMARK_COUNT {
        return Err(SeparationError::TooFewPoints {
            found: marked.len(),
        });
    }

    let assignment = decide(marked);
    debug!("landmark assignment for {} marked points: {:?}", marked.len(), assignment);
    separate_landmarks(marked, assignment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::Vec3;

    fn marked(n: usize) -> PointSet {
        let points = (0..n).map(|i| Vec3::new(i as f64, 0.0, 0.0)).collect();
        let labels = (0..n).map(|i| format!("p{}", i)).collect();
        PointSet::with_labels(points, labels)
    }

    #[test]
    fn test_separate_first() {
        let set = marked(8);
        let sep = separate_landmarks(&set, LandmarkAssignment::First).unwrap();

        assert_eq!(sep.landmarks.rpa.x, 0.0);
        assert_eq!(sep.landmarks.nasion.x, 1.0);
        assert_eq!(sep.landmarks.lpa.x, 2.0);
        assert_eq!(sep.electrodes.len(), 5);
        assert_eq!(sep.electrodes.label(0), Some("p3"));
        assert_eq!(sep.electrodes.label(4), Some("p7"));
    }

    #[test]
    fn test_separate_last() {
        let set = marked(8);
        let sep = separate_landmarks(&set, LandmarkAssignment::Last).unwrap();

        assert_eq!(sep.landmarks.rpa.x, 5.0);
        assert_eq!(sep.landmarks.nasion.x, 6.0);
        assert_eq!(sep.landmarks.lpa.x, 7.0);
        assert_eq!(sep.electrodes.len(), 5);
        assert_eq!(sep.electrodes.label(0), Some("p0"));
        assert_eq!(sep.electrodes.label(4), Some("p4"));
    }

    #[test]
    fn test_separate_exactly_three() {
        let sep = separate_landmarks(&marked(3), LandmarkAssignment::Last).unwrap();
        assert!(sep.electrodes.is_empty());
        assert_eq!(sep.landmarks.lpa.x, 2.0);
    }

    #[test]
    fn test_separate_neither_is_error() {
        let err = separate_landmarks(&marked(10), LandmarkAssignment::Neither).unwrap_err();
        assert_eq!(err, SeparationError::LandmarkOrdering { total: 10 });
    }

    #[test]
    fn test_separate_too_few() {
        let err = separate_landmarks(&marked(2), LandmarkAssignment::First).unwrap_err();
        assert_eq!(err, SeparationError::TooFewPoints { found: 2 });
    }

    #[test]
    fn test_separate_with_decision() {
        let set = marked(6);
        let mut calls = 0;
        let sep = separate_with(&set, |s| {
            calls += 1;
            assert_eq!(s.len(), 6);
            LandmarkAssignment::Last
        })
        .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(sep.landmarks.rpa.x, 3.0);
    }

    #[test]
    fn test_separate_is_deterministic() {
        let set = marked(12);
        let a = separate_landmarks(&set, LandmarkAssignment::First).unwrap();
        let b = separate_landmarks(&set, LandmarkAssignment::First).unwrap();
        assert_eq!(a, b);
    }
}
