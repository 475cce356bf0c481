//! Channel label reconciliation.
//!
//! Associates each digitized electrode (marking order) with its canonical
//! template index and label, and builds the permutation that re-sorts
//! subject coordinates into template order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::montage::MontageSpec;
use crate::core::points::PointSet;

/// Errors that can occur while reconciling channel labels.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("montage {montage} expects {expected} electrodes but {found} were digitized")]
    ChannelCountMismatch {
        montage: String,
        expected: usize,
        found: usize,
    },

    #[error("montage {montage}: {reason}")]
    LabelMapping { montage: String, reason: String },
}

/// Result type for channel operations.
pub type Result<T> = std::result::Result<T, ChannelError>;

/// One electrode's identity in both orders. Indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub acquisition_index: usize,
    pub template_index: usize,
    pub label: String,
}

/// Read-only association between marking order and template order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledChannelLayout {
    pub montage: String,
    /// Entries in marking order.
    pub entries: Vec<ChannelEntry>,
    /// For each template position (0-based), the 0-based marking position.
    pub canonical_order: Vec<usize>,
}

impl LabeledChannelLayout {
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Labels in marking order.
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }

    /// Label of the electrode at a 0-based marking position.
    pub fn label_at(&self, acquisition_pos: usize) -> Option<&str> {
        self.entries.get(acquisition_pos).map(|e| e.label.as_str())
    }

    /// Attach template labels to a marking-order point set.
    pub fn label_points(&self, electrodes: &PointSet) -> Result<PointSet> {
        self.check_count(electrodes.len())?;
        Ok(PointSet::with_labels(electrodes.points.clone(), self.labels()))
    }

    /// Re-sort a marking-order point set into canonical template order,
    /// labeled with the template labels.
    pub fn to_canonical(&self, electrodes: &PointSet) -> Result<PointSet> {
        self.check_count(electrodes.len())?;

        let mut points = Vec::with_capacity(self.canonical_order.len());
        let mut labels = Vec::with_capacity(self.canonical_order.len());
        for &pos in &self.canonical_order {
            points.push(electrodes.points[pos]);
            labels.push(self.entries[pos].label.clone());
        }

        Ok(PointSet::with_labels(points, labels))
    }

    fn check_count(&self, found: usize) -> Result<()> {
        if found != self.entries.len() {
            return Err(ChannelError::ChannelCountMismatch {
                montage: self.montage.clone(),
                expected: self.entries.len(),
                found,
            });
        }
        Ok(())
    }
}

/// Build the channel layout for `electrode_count` digitized electrodes.
///
/// # Errors
///
/// - `ChannelCountMismatch` if the count differs from the montage's expected count.
/// - `LabelMapping` if a template index is outside `1..=template_count`, is
///   used more than once, if a template label is duplicated, or if the
///   mapping does not cover every template electrode.
pub fn reconcile_channels(
    electrode_count: usize,
    montage: &MontageSpec,
) -> Result<LabeledChannelLayout> {
    let expected = montage.expected_count();
    if electrode_count != expected {
        return Err(ChannelError::ChannelCountMismatch {
            montage: montage.name.clone(),
            expected,
            found: electrode_count,
        });
    }

    let mapping_error = |reason: String| ChannelError::LabelMapping {
        montage: montage.name.clone(),
        reason,
    };

    let template_count = montage.template_count();
    if expected != template_count {
        return Err(mapping_error(format!(
            "{} digitized electrodes cannot map one-to-one onto {} template electrodes",
            expected, template_count
        )));
    }

    let mut label_seen: HashMap<&str, usize> = HashMap::with_capacity(template_count);
    for (i, electrode) in montage.template.iter().enumerate() {
        if let Some(first) = label_seen.insert(electrode.label.as_str(), i + 1) {
            return Err(mapping_error(format!(
                "label '{}' appears at template indices {} and {}",
                electrode.label,
                first,
                i + 1
            )));
        }
    }

    let mut canonical_order: Vec<Option<usize>> = vec![None; template_count];
    let mut entries = Vec::with_capacity(expected);

    for (pos, &template_index) in montage.acquisition_order.iter().enumerate() {
        if template_index == 0 || template_index > template_count {
            return Err(mapping_error(format!(
                "electrode {} maps to template index {} outside 1..={}",
                pos + 1,
                template_index,
                template_count
            )));
        }

        let slot = &mut canonical_order[template_index - 1];
        if let Some(prev) = *slot {
            return Err(mapping_error(format!(
                "template index {} ('{}') assigned to electrodes {} and {}",
                template_index,
                montage.template[template_index - 1].label,
                prev + 1,
                pos + 1
            )));
        }
        *slot = Some(pos);

        entries.push(ChannelEntry {
            acquisition_index: pos + 1,
            template_index,
            label: montage.template[template_index - 1].label.clone(),
        });
    }

    // Equal lengths and no duplicates leave no empty slot.
    let canonical_order = canonical_order.into_iter().flatten().collect();

    Ok(LabeledChannelLayout {
        montage: montage.name.clone(),
        entries,
        canonical_order,
    })
}
