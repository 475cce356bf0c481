//! Head-frame derivation and rigid transform.
//!
//! The frame is built from montage anchor electrodes:
//!
//! 1. `Lmid`/`Rmid` are the centroids of the left and right anchors.
//! 2. The origin is their midpoint and `unit_y` points toward `Lmid`.
//! 3. `unit_z` points from the origin toward the vertex point.
//! 4. `unit_x` points toward the front, along `(Lmid - o) x (vertex - o)`.
//!
//! `unit_x` is orthogonal to the other two by construction, but `unit_z` is
//! not forced orthogonal to `unit_y`: a misidentified anchor shows up as a
//! y/z angle away from 90 degrees, which validation rejects.

use log::{debug, error};
use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ToleranceConfig;
use crate::core::geometry::{
    angle_between_deg, centroid, midpoint, orthogonality_deviation_deg, Vec3, NORM_EPSILON,
};
use crate::core::montage::{MontageSpec, VertexDef};
use crate::core::points::{Landmarks, PointSet};

/// Divisor applied to the cross product when placing the nose point.
///
/// Keeps the nose point at a magnitude comparable to the input units; it
/// has no effect on the normalized axis.
const NOSE_POINT_SCALE: f64 = 100.0;

/// Errors raised while deriving or applying the head frame.
#[derive(Debug, Error, PartialEq)]
pub enum FrameError {
    #[error("anchor electrode {number} does not exist: only {count} electrodes were digitized")]
    AnchorOutOfRange { number: usize, count: usize },

    #[error("cannot derive {axis} axis: direction vector has norm {norm:.3e}")]
    DegenerateAxis { axis: &'static str, norm: f64 },

    #[error(
        "frame axes not orthogonal: x/y {xy_deg:.3} deg, x/z {xz_deg:.3} deg, y/z {yz_deg:.3} deg \
         (max deviation {max_deviation_deg:.3} deg, tolerance {tolerance_deg} deg); \
         check the anchor electrode identification"
    )]
    Orthogonality {
        xy_deg: f64,
        xz_deg: f64,
        yz_deg: f64,
        max_deviation_deg: f64,
        tolerance_deg: f64,
    },

    #[error("frame is not right-handed: det[x|y|z] = {determinant:.6}")]
    Reflection { determinant: f64 },

    #[error(
        "preauricular distance changed from {before:.4} to {after:.4} \
         (difference {difference:.4}, tolerance {tolerance})"
    )]
    DistancePreservation {
        before: f64,
        after: f64,
        difference: f64,
        tolerance: f64,
    },
}

/// Result type for frame operations.
pub type Result<T> = std::result::Result<T, FrameError>;

/// Head-centered coordinate frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub origin: Vec3,
    /// Toward the front of the head.
    pub unit_x: Vec3,
    /// Toward the left side.
    pub unit_y: Vec3,
    /// Toward the vertex.
    pub unit_z: Vec3,
}

impl Frame {
    /// 3x3 matrix whose columns are the unit axes.
    pub fn rotation(&self) -> Matrix3<f64> {
        Matrix3::from_columns(&[self.unit_x, self.unit_y, self.unit_z])
    }

    /// Determinant of [x|y|z]; +1 for a proper rotation.
    pub fn determinant(&self) -> f64 {
        self.rotation().determinant()
    }

    /// Pairwise angles between the axes.
    pub fn axis_angles(&self) -> AxisAngles {
        AxisAngles {
            xy_deg: angle_between_deg(&self.unit_x, &self.unit_y),
            xz_deg: angle_between_deg(&self.unit_x, &self.unit_z),
            yz_deg: angle_between_deg(&self.unit_y, &self.unit_z),
        }
    }

    /// Express a native point in frame coordinates.
    ///
    /// Projects `p - origin` onto the three axes, i.e. right-multiplies the
    /// row vector by [x|y|z].
    #[inline]
    pub fn to_frame(&self, p: &Vec3) -> Vec3 {
        let d = p - self.origin;
        Vec3::new(d.dot(&self.unit_x), d.dot(&self.unit_y), d.dot(&self.unit_z))
    }

    /// Map frame coordinates back to native space.
    ///
    /// Uses the transpose as the inverse rotation, which is exact only for an
    /// orthonormal frame.
    #[inline]
    pub fn to_native(&self, q: &Vec3) -> Vec3 {
        self.origin + self.rotation() * q
    }

    pub fn transform_points(&self, set: &PointSet) -> PointSet {
        set.map_points(|p| self.to_frame(p))
    }

    pub fn transform_landmarks(&self, landmarks: &Landmarks) -> Landmarks {
        landmarks.map(|p| self.to_frame(p))
    }
}

/// Pairwise angles between frame axes, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisAngles {
    pub xy_deg: f64,
    pub xz_deg: f64,
    pub yz_deg: f64,
}

impl AxisAngles {
    /// Largest absolute deviation from 90 degrees.
    pub fn max_deviation_deg(&self) -> f64 {
        [self.xy_deg, self.xz_deg, self.yz_deg]
            .iter()
            .map(|a| (90.0 - a).abs())
            // NaN must survive into diagnostics; f64::max would drop it.
            .fold(0.0, |acc: f64, d| if d.is_nan() { d } else { acc.max(d) })
    }
}

/// Intermediate points used to derive a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoints {
    pub lmid: Vec3,
    pub rmid: Vec3,
    pub vertex: Vec3,
    pub nose: Vec3,
}

/// Numbers reported alongside every transform, pass or fail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameDiagnostics {
    pub angles: AxisAngles,
    pub max_deviation_deg: f64,
    pub determinant: f64,
    pub pa_distance_native: f64,
    pub pa_distance_transformed: f64,
}

/// Electrodes and landmarks re-expressed in the head frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformed {
    pub electrodes: PointSet,
    pub landmarks: Landmarks,
    pub diagnostics: FrameDiagnostics,
}

fn anchor(electrodes: &PointSet, number: usize) -> Result<Vec3> {
    number
        .checked_sub(1)
        .and_then(|idx| electrodes.get(idx))
        .copied()
        .ok_or(FrameError::AnchorOutOfRange {
            number,
            count: electrodes.len(),
        })
}

fn anchor_centroid(electrodes: &PointSet, numbers: &[usize], side: &'static str) -> Result<Vec3> {
    let points = numbers
        .iter()
        .map(|&n| anchor(electrodes, n))
        .collect::<Result<Vec<_>>>()?;

    centroid(&points).ok_or(FrameError::DegenerateAxis {
        axis: side,
        norm: 0.0,
    })
}

fn unit(v: &Vec3, axis: &'static str) -> Result<Vec3> {
    let norm = v.norm();
    // `try_normalize` lets a NaN norm through.
    if !norm.is_finite() {
        return Err(FrameError::DegenerateAxis { axis, norm });
    }
    v.try_normalize(NORM_EPSILON).ok_or(FrameError::DegenerateAxis { axis, norm })
}

/// Derive the head frame from montage anchors, without validating it.
///
/// Returns the frame together with the anchor points it was built from.
///
/// # Errors
///
/// - `AnchorOutOfRange` if an anchor number exceeds the electrode count.
/// - `DegenerateAxis` if the anchors coincide or are collinear with the
///   origin so that an axis has no direction.
pub fn derive_frame(
    electrodes: &PointSet,
    montage: &MontageSpec,
) -> Result<(Frame, AnchorPoints)> {
    let lmid = anchor_centroid(electrodes, &montage.left_anchors, "y")?;
    let rmid = anchor_centroid(electrodes, &montage.right_anchors, "y")?;
    let origin = midpoint(&lmid, &rmid);

    let to_left = lmid - origin;
    let unit_y = unit(&to_left, "y")?;

    let vertex = match montage.vertex {
        VertexDef::Single(n) => anchor(electrodes, n)?,
        VertexDef::Pair([a, b]) => midpoint(&anchor(electrodes, a)?, &anchor(electrodes, b)?),
    };
    let to_vertex = vertex - origin;
    let unit_z = unit(&to_vertex, "z")?;

    let nose = origin + to_left.cross(&to_vertex) / NOSE_POINT_SCALE;
    let unit_x = unit(&(nose - origin), "x")?;

    let frame = Frame {
        origin,
        unit_x,
        unit_y,
        unit_z,
    };

    Ok((
        frame,
        AnchorPoints {
            lmid,
            rmid,
            vertex,
            nose,
        },
    ))
}

/// Reject frames whose axes deviate from orthogonal by `tolerance_deg` or more.
pub fn validate_orthogonality(frame: &Frame, tolerance_deg: f64) -> Result<AxisAngles> {
    let angles = frame.axis_angles();
    let deviations = [
        orthogonality_deviation_deg(&frame.unit_x, &frame.unit_y),
        orthogonality_deviation_deg(&frame.unit_x, &frame.unit_z),
        orthogonality_deviation_deg(&frame.unit_y, &frame.unit_z),
    ];

    if deviations.iter().any(|&d| d.is_nan() || d >= tolerance_deg) {
        return Err(FrameError::Orthogonality {
            xy_deg: angles.xy_deg,
            xz_deg: angles.xz_deg,
            yz_deg: angles.yz_deg,
            max_deviation_deg: angles.max_deviation_deg(),
            tolerance_deg,
        });
    }

    Ok(angles)
}

/// Reject improper (reflecting) frames. Returns the determinant.
pub fn validate_handedness(frame: &Frame) -> Result<f64> {
    let determinant = frame.determinant();
    if !determinant.is_finite() || determinant <= 0.0 {
        return Err(FrameError::Reflection { determinant });
    }
    Ok(determinant)
}

/// Compare a rigid distance before and after the transform.
///
/// Returns the absolute difference when it is within `tolerance`.
pub fn check_distance_preservation(before: f64, after: f64, tolerance: f64) -> Result<f64> {
    let difference = (after - before).abs();
    if !difference.is_finite() || difference > tolerance {
        return Err(FrameError::DistancePreservation {
            before,
            after,
            difference,
            tolerance,
        });
    }
    Ok(difference)
}

/// Derive and validate the head frame for one subject.
pub fn build_frame(
    electrodes: &PointSet,
    montage: &MontageSpec,
    tolerances: &ToleranceConfig,
) -> Result<Frame> {
    let (frame, anchors) = derive_frame(electrodes, montage)?;
    debug!(
        "montage {}: Lmid {:?}, Rmid {:?}, vertex {:?}",
        montage.name,
        anchors.lmid.as_slice(),
        anchors.rmid.as_slice(),
        anchors.vertex.as_slice()
    );

    let angles = validate_orthogonality(&frame, tolerances.angle_tol_deg).inspect_err(|e| {
        error!("montage {}: {}", montage.name, e);
    })?;

    if tolerances.check_determinant {
        validate_handedness(&frame).inspect_err(|e| error!("montage {}: {}", montage.name, e))?;
    }

    debug!(
        "frame angles x/y {:.4}, x/z {:.4}, y/z {:.4}, det {:.6}",
        angles.xy_deg,
        angles.xz_deg,
        angles.yz_deg,
        frame.determinant()
    );

    Ok(frame)
}

/// Re-express electrodes and landmarks in `frame` and gate on the
/// preauricular distance.
pub fn apply_frame(
    frame: &Frame,
    landmarks: &Landmarks,
    electrodes: &PointSet,
    tolerances: &ToleranceConfig,
) -> Result<Transformed> {
    let new_landmarks = frame.transform_landmarks(landmarks);
    let new_electrodes = frame.transform_points(electrodes);

    let before = landmarks.preauricular_distance();
    let after = new_landmarks.preauricular_distance();
    check_distance_preservation(before, after, tolerances.distance_tol)
        .inspect_err(|e| error!("{}", e))?;

    let angles = frame.axis_angles();
    let diagnostics = FrameDiagnostics {
        angles,
        max_deviation_deg: angles.max_deviation_deg(),
        determinant: frame.determinant(),
        pa_distance_native: before,
        pa_distance_transformed: after,
    };
    debug!(
        "preauricular distance {:.4} -> {:.4}",
        diagnostics.pa_distance_native, diagnostics.pa_distance_transformed
    );

    Ok(Transformed {
        electrodes: new_electrodes,
        landmarks: new_landmarks,
        diagnostics,
    })
}
