//! Advisory label-consistency check.
//!
//! After the transform, subject electrodes and template electrodes share the
//! same head frame up to head size. Scaling both to unit mean radius and
//! looking up each electrode's nearest template electrode gives a cheap
//! signal for swapped or mislabeled electrodes. Findings are warnings only:
//! relabeling stays an operator decision.

use kiddo::{ImmutableKdTree, SquaredEuclidean};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::geometry::{to_array, vec3, Vec3};
use crate::core::montage::MontageSpec;
use crate::core::points::PointSet;
use crate::processors::channels::LabeledChannelLayout;

/// An electrode whose nearest template electrode is not its assigned one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcFinding {
    /// 1-based marking position.
    pub acquisition_index: usize,
    pub assigned_label: String,
    pub nearest_label: String,
    /// Distance to the assigned template electrode (normalized units when enabled).
    pub assigned_distance: f64,
    /// Distance to the nearest template electrode.
    pub nearest_distance: f64,
}

/// Summary of the label-consistency check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcReport {
    pub checked: usize,
    /// Mean distance between each electrode and its assigned template electrode.
    pub mean_residual: f64,
    pub findings: Vec<QcFinding>,
}

impl QcReport {
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

fn mean_radius(points: &[Vec3]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.norm()).sum::<f64>() / points.len() as f64
}

fn scaled(points: Vec<Vec3>, normalize: bool) -> Vec<Vec3> {
    let r = mean_radius(&points);
    if !normalize || r <= f64::EPSILON {
        return points;
    }
    points.into_iter().map(|p| p / r).collect()
}

/// Compare transformed electrodes against the montage template.
///
/// `electrodes` must be in marking order and already expressed in the head
/// frame; `layout` supplies each electrode's assigned template index.
pub fn check_label_consistency(
    electrodes: &PointSet,
    layout: &LabeledChannelLayout,
    montage: &MontageSpec,
    normalize: bool,
) -> QcReport {
    if electrodes.is_empty() || montage.template.is_empty() || electrodes.len() != layout.len() {
        return QcReport::default();
    }

    let subject = scaled(electrodes.points.clone(), normalize);
    let template = scaled(
        montage.template.iter().map(|t| vec3(t.position)).collect(),
        normalize,
    );

    let coords: Vec<[f64; 3]> = template.iter().map(to_array).collect();
    let tree: ImmutableKdTree<f64, 3> = ImmutableKdTree::new_from_slice(&coords);

    let mut findings = Vec::new();
    let mut residual_sum = 0.0;

    for (entry, point) in layout.entries.iter().zip(&subject) {
        let assigned = entry.template_index - 1;
        let assigned_distance = (point - template[assigned]).norm();
        residual_sum += assigned_distance;

        let nn = tree.nearest_one::<SquaredEuclidean>(&to_array(point));
        let nearest = nn.item as usize;

        if nearest != assigned {
            let finding = QcFinding {
                acquisition_index: entry.acquisition_index,
                assigned_label: entry.label.clone(),
                nearest_label: montage.template[nearest].label.clone(),
                assigned_distance,
                nearest_distance: nn.distance.sqrt(),
            };
            warn!(
                "{}: electrode {} labeled {} lies nearest template electrode {} ({:.3} vs {:.3})",
                montage.name,
                finding.acquisition_index,
                finding.assigned_label,
                finding.nearest_label,
                finding.nearest_distance,
                finding.assigned_distance
            );
            findings.push(finding);
        }
    }

    QcReport {
        checked: subject.len(),
        mean_residual: residual_sum / subject.len() as f64,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::montage::{TemplateElectrode, VertexDef};
    use crate::processors::channels::reconcile_channels;

    fn cross_montage() -> MontageSpec {
        let positions = [
            ("Front", [1.0, 0.0, 0.0]),
            ("Left", [0.0, 1.0, 0.0]),
            ("Back", [-1.0, 0.0, 0.0]),
            ("Right", [0.0, -1.0, 0.0]),
            ("Top", [0.0, 0.0, 1.0]),
        ];
        MontageSpec {
            name: "cross".to_string(),
            left_anchors: vec![2],
            right_anchors: vec![4],
            vertex: VertexDef::Single(5),
            template: positions
                .iter()
                .map(|(label, p)| TemplateElectrode {
                    label: label.to_string(),
                    position: *p,
                })
                .collect(),
            acquisition_order: vec![1, 2, 3, 4, 5],
        }
    }

    fn subject_points(scale: f64) -> PointSet {
        PointSet::from_points(
            [
                [1.0, 0.0, 0.05],
                [0.0, 1.0, 0.0],
                [-1.0, 0.05, 0.0],
                [0.0, -1.0, 0.0],
                [0.05, 0.0, 1.0],
            ]
            .iter()
            .map(|p| vec3(*p) * scale)
            .collect(),
        )
    }

    #[test]
    fn test_consistent_labels_are_clean() {
        let montage = cross_montage();
        let layout = reconcile_channels(5, &montage).unwrap();

        // Subject head is 90x larger than the unit template.
        let report = check_label_consistency(&subject_points(90.0), &layout, &montage, true);
        assert_eq!(report.checked, 5);
        assert!(report.is_clean());
        assert!(report.mean_residual < 0.1);
    }

    #[test]
    fn test_swapped_electrodes_reported() {
        let mut montage = cross_montage();
        // Marking positions 1 and 3 swapped in the table.
        montage.acquisition_order = vec![3, 2, 1, 4, 5];
        let layout = reconcile_channels(5, &montage).unwrap();

        let report = check_label_consistency(&subject_points(90.0), &layout, &montage, true);
        assert_eq!(report.findings.len(), 2);
        assert_eq!(report.findings[0].acquisition_index, 1);
        assert_eq!(report.findings[0].assigned_label, "Back");
        assert_eq!(report.findings[0].nearest_label, "Front");
    }

    #[test]
    fn test_without_normalization_scale_matters() {
        let montage = cross_montage();
        let layout = reconcile_channels(5, &montage).unwrap();

        let report = check_label_consistency(&subject_points(90.0), &layout, &montage, false);
        assert!(report.mean_residual > 10.0);
    }

    #[test]
    fn test_count_mismatch_skips_check() {
        let montage = cross_montage();
        let layout = reconcile_channels(5, &montage).unwrap();
        let short = PointSet::from_points(vec![Vec3::x(); 3]);

        assert_eq!(
            check_label_consistency(&short, &layout, &montage, true),
            QcReport::default()
        );
    }
}
