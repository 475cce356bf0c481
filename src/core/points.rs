//! Ordered point containers for digitized markers.

use serde::{Deserialize, Serialize};

use super::geometry::{distance, Vec3};

/// Fixed semantic order of the anatomical landmarks.
pub const LANDMARK_LABELS: [&str; 3] = ["rpa", "nasion", "lpa"];

/// Ordered sequence of 3D points.
///
/// Insertion order is the marking order and is significant: montage anchor
/// numbers refer to positions in this sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PointSet {
    /// Point coordinates in marking order.
    pub points: Vec<Vec3>,
    /// Optional per-point labels, same length as `points` when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
}

impl PointSet {
    /// Creates an empty point set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an unlabeled point set.
    pub fn from_points(points: Vec<Vec3>) -> Self {
        Self {
            points,
            labels: None,
        }
    }

    /// Creates a labeled point set.
    ///
    /// Labels are dropped if their count does not match the point count.
    pub fn with_labels(points: Vec<Vec3>, labels: Vec<String>) -> Self {
        let labels = (labels.len() == points.len()).then_some(labels);
        Self { points, labels }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point at a 0-based position.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Vec3> {
        self.points.get(idx)
    }

    /// Label at a 0-based position, if labels are present.
    pub fn label(&self, idx: usize) -> Option<&str> {
        self.labels
            .as_ref()
            .and_then(|l| l.get(idx))
            .map(String::as_str)
    }

    /// Copy of the points in `range`, keeping labels aligned.
    pub fn slice(&self, range: std::ops::Range<usize>) -> PointSet {
        PointSet {
            points: self.points[range.clone()].to_vec(),
            labels: self.labels.as_ref().map(|l| l[range].to_vec()),
        }
    }

    /// Applies `f` to every point, keeping labels.
    pub fn map_points<F>(&self, f: F) -> PointSet
    where
        F: Fn(&Vec3) -> Vec3,
    {
        PointSet {
            points: self.points.iter().map(f).collect(),
            labels: self.labels.clone(),
        }
    }
}

/// The three anatomical landmarks in their fixed semantic order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmarks {
    /// Right preauricular point.
    pub rpa: Vec3,
    /// Nasion.
    pub nasion: Vec3,
    /// Left preauricular point.
    pub lpa: Vec3,
}

impl Landmarks {
    /// Builds landmarks from three points given in rpa, nasion, lpa order.
    pub fn from_ordered(points: [Vec3; 3]) -> Self {
        let [rpa, nasion, lpa] = points;
        Self { rpa, nasion, lpa }
    }

    /// Landmarks in rpa, nasion, lpa order.
    pub fn to_array(&self) -> [Vec3; 3] {
        [self.rpa, self.nasion, self.lpa]
    }

    /// Distance between the two preauricular points.
    pub fn preauricular_distance(&self) -> f64 {
        distance(&self.rpa, &self.lpa)
    }

    /// Applies `f` to each landmark.
    pub fn map<F>(&self, f: F) -> Landmarks
    where
        F: Fn(&Vec3) -> Vec3,
    {
        Landmarks {
            rpa: f(&self.rpa),
            nasion: f(&self.nasion),
            lpa: f(&self.lpa),
        }
    }
}
