//! Vector helpers shared by the frame builder and the QC checks.
//!
//! Points and directions are both represented as nalgebra `Vector3<f64>`;
//! the distinction is carried by naming, not by type.

use nalgebra::Vector3;

/// A 3D point or direction in scanner length units.
pub type Vec3 = Vector3<f64>;

/// Norms below this are treated as zero when normalizing axes.
pub const NORM_EPSILON: f64 = 1e-12;

/// Build a `Vec3` from an `[x, y, z]` triple.
#[inline]
pub fn vec3(p: [f64; 3]) -> Vec3 {
    Vec3::new(p[0], p[1], p[2])
}

/// Convert a `Vec3` back into an `[x, y, z]` triple.
#[inline]
pub fn to_array(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

/// Arithmetic mean of a set of points.
///
/// Returns `None` for an empty slice.
pub fn centroid(points: &[Vec3]) -> Option<Vec3> {
    if points.is_empty() {
        return None;
    }

    let sum = points.iter().fold(Vec3::zeros(), |acc, p| acc + p);
    Some(sum / points.len() as f64)
}

/// Midpoint of the segment `a`-`b`.
#[inline]
pub fn midpoint(a: &Vec3, b: &Vec3) -> Vec3 {
    (a + b) * 0.5
}

/// Euclidean distance between two points.
#[inline]
pub fn distance(a: &Vec3, b: &Vec3) -> f64 {
    (a - b).norm()
}

/// Angle between two vectors in degrees, in `[0, 180]`.
///
/// Uses `atan2(|u x v|, u . v)`, which stays accurate near 0 and 180 degrees
/// where the `acos` of a normalized dot product loses precision.
pub fn angle_between_deg(u: &Vec3, v: &Vec3) -> f64 {
    u.cross(v).norm().atan2(u.dot(v)).to_degrees()
}

/// Absolute deviation from a right angle, in degrees.
#[inline]
pub fn orthogonality_deviation_deg(u: &Vec3, v: &Vec3) -> f64 {
    (90.0 - angle_between_deg(u, v)).abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centroid_basic() {
        let pts = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0),
            Vec3::new(1.0, 3.0, 0.0),
        ];

        let c = centroid(&pts).unwrap();
        assert!((c - Vec3::new(1.0, 1.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn test_centroid_empty() {
        assert!(centroid(&[]).is_none());
    }

    #[test]
    fn test_angle_between_right_angle() {
        let u = Vec3::x();
        let v = Vec3::y();
        assert!((angle_between_deg(&u, &v) - 90.0).abs() < 1e-12);
        assert!(orthogonality_deviation_deg(&u, &v) < 1e-12);
    }

    #[test]
    fn test_angle_between_full_range() {
        let u = Vec3::x();
        assert!(angle_between_deg(&u, &u).abs() < 1e-12);
        assert!((angle_between_deg(&u, &(-u)) - 180.0).abs() < 1e-12);

        let tilted = Vec3::new(1.0, 1.0, 0.0);
        assert!((angle_between_deg(&u, &tilted) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_between_ignores_magnitude() {
        let u = Vec3::new(0.0, 0.0, 250.0);
        let v = Vec3::new(0.0, 0.01, 0.01);
        assert!((angle_between_deg(&u, &v) - 45.0).abs() < 1e-9);
    }

    #[test]
    fn test_midpoint_and_distance() {
        let a = Vec3::new(-70.0, 0.0, 0.0);
        let b = Vec3::new(70.0, 0.0, 0.0);
        assert_eq!(midpoint(&a, &b), Vec3::zeros());
        assert!((distance(&a, &b) - 140.0).abs() < 1e-12);
    }
}
