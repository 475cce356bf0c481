//! Montage reference table.
//!
//! A montage names an electrode-cap layout and supplies everything the
//! generic frame builder needs for it: which electrodes define the left and
//! right centroids and the vertex, the canonical template electrodes, and the
//! mapping from marking order to template order. Adding a montage is a data
//! entry in the table file.
//!
//! All electrode and template numbers in a `MontageSpec` are 1-based, matching
//! how they are written on montage sheets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or querying montages.
#[derive(Error, Debug)]
pub enum MontageError {
    #[error("failed to read montage table '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse montage table '{path}': {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown montage '{name}' (known: {})", known.join(", "))]
    UnknownMontage { name: String, known: Vec<String> },

    #[error("invalid montage '{name}': {reason}")]
    InvalidSpec { name: String, reason: String },
}

/// Result type for montage operations.
pub type Result<T> = std::result::Result<T, MontageError>;

/// How the vertex point is derived from the electrodes.
///
/// Written in a table as `n`, `[n]` or `[a, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged, from = "VertexRepr")]
pub enum VertexDef {
    /// A single electrode sits on the vertex.
    Single(usize),
    /// The vertex is the midpoint of two vertex-adjacent electrodes.
    Pair([usize; 2]),
}

/// Accepted table spellings of a vertex definition.
#[derive(Deserialize)]
#[serde(untagged)]
enum VertexRepr {
    Scalar(usize),
    One([usize; 1]),
    Two([usize; 2]),
}

impl From<VertexRepr> for VertexDef {
    fn from(repr: VertexRepr) -> Self {
        match repr {
            VertexRepr::Scalar(n) | VertexRepr::One([n]) => VertexDef::Single(n),
            VertexRepr::Two(pair) => VertexDef::Pair(pair),
        }
    }
}

impl VertexDef {
    /// Electrode numbers referenced by this definition.
    pub fn numbers(&self) -> Vec<usize> {
        match *self {
            VertexDef::Single(n) => vec![n],
            VertexDef::Pair([a, b]) => vec![a, b],
        }
    }
}

/// One electrode of the canonical template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateElectrode {
    pub label: String,
    /// Position in canonical Waveguard space.
    pub position: [f64; 3],
}

/// Immutable per-montage configuration record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MontageSpec {
    pub name: String,

    /// Electrode numbers averaged into the left centroid (Lmid).
    pub left_anchors: Vec<usize>,

    /// Electrode numbers averaged into the right centroid (Rmid).
    pub right_anchors: Vec<usize>,

    pub vertex: VertexDef,

    /// Template electrodes in canonical order.
    pub template: Vec<TemplateElectrode>,

    /// For each marking position, the 1-based template index of that electrode.
    pub acquisition_order: Vec<usize>,
}

impl MontageSpec {
    /// Number of electrodes a digitization of this montage must contain.
    #[inline]
    pub fn expected_count(&self) -> usize {
        self.acquisition_order.len()
    }

    /// Number of template electrodes.
    #[inline]
    pub fn template_count(&self) -> usize {
        self.template.len()
    }

    /// Every electrode number used to derive the frame.
    pub fn anchor_numbers(&self) -> Vec<usize> {
        self.left_anchors
            .iter()
            .chain(self.right_anchors.iter())
            .copied()
            .chain(self.vertex.numbers())
            .collect()
    }

    /// Checks the structural consistency of the record.
    ///
    /// Label-mapping problems (duplicates, out-of-range template indices) are
    /// left to channel reconciliation, which reports them per subject.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: String| MontageError::InvalidSpec {
            name: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("empty montage name".to_string()));
        }
        if self.left_anchors.is_empty() || self.right_anchors.is_empty() {
            return Err(invalid("left and right anchor lists must be non-empty".to_string()));
        }
        if self.template.is_empty() {
            return Err(invalid("template has no electrodes".to_string()));
        }
        if self.acquisition_order.len() != self.template.len() {
            return Err(invalid(format!(
                "acquisition order has {} entries but template has {} electrodes",
                self.acquisition_order.len(),
                self.template.len()
            )));
        }
        if let Some(&bad) = self
            .anchor_numbers()
            .iter()
            .find(|&&n| n == 0 || n > self.expected_count())
        {
            return Err(invalid(format!(
                "anchor electrode {} outside 1..={}",
                bad,
                self.expected_count()
            )));
        }

        Ok(())
    }
}

/// Read-only lookup table of montages, loaded once and shared.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MontageTable {
    montages: Vec<MontageSpec>,
}

impl MontageTable {
    /// Builds a table from montage records, validating each one.
    pub fn new(montages: Vec<MontageSpec>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(montages.len());
        for spec in &montages {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(MontageError::InvalidSpec {
                    name: spec.name.clone(),
                    reason: "duplicate montage name in table".to_string(),
                });
            }
        }

        Ok(Self { montages })
    }

    /// Load a montage table from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| MontageError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let montages: Vec<MontageSpec> =
            serde_yaml::from_str(&content).map_err(|e| MontageError::Yaml {
                path: path.to_path_buf(),
                source: e,
            })?;

        Self::new(montages)
    }

    /// Look up a montage by name.
    pub fn get(&self, name: &str) -> Result<&MontageSpec> {
        self.montages
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| MontageError::UnknownMontage {
                name: name.to_string(),
                known: self.names().into_iter().map(str::to_string).collect(),
            })
    }

    /// Montage names in table order.
    pub fn names(&self) -> Vec<&str> {
        self.montages.iter().map(|m| m.name.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MontageSpec> {
        self.montages.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.montages.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.montages.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Small montage used across the crate's tests: 6 electrodes, left
    /// anchors 1-2, right anchors 3-4, vertex pair 5-6, template order
    /// reversed relative to marking order.
    pub(crate) fn six_channel_montage() -> MontageSpec {
        MontageSpec {
            name: "test6".to_string(),
            left_anchors: vec![1, 2],
            right_anchors: vec![3, 4],
            vertex: VertexDef::Pair([5, 6]),
            template: (1..=6)
                .map(|i| TemplateElectrode {
                    label: format!("E{}", i),
                    position: [0.0, 0.0, i as f64],
                })
                .collect(),
            acquisition_order: vec![6, 5, 4, 3, 2, 1],
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(six_channel_montage().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_anchor_out_of_range() {
        let mut spec = six_channel_montage();
        spec.vertex = VertexDef::Single(7);
        let err = spec.validate().unwrap_err();
        assert!(matches!(err, MontageError::InvalidSpec { .. }));
        assert!(err.to_string().contains("anchor electrode 7"));
    }

    #[test]
    fn test_validate_rejects_order_length() {
        let mut spec = six_channel_montage();
        spec.acquisition_order.pop();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_table_lookup_unknown() {
        let table = MontageTable::new(vec![six_channel_montage()]).unwrap();
        assert_eq!(table.get("test6").unwrap().expected_count(), 6);

        let err = table.get("dukeZ3").unwrap_err();
        assert!(matches!(err, MontageError::UnknownMontage { .. }));
        assert!(err.to_string().contains("test6"));
    }

    #[test]
    fn test_table_rejects_duplicate_names() {
        let result = MontageTable::new(vec![six_channel_montage(), six_channel_montage()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_from_yaml_single_and_pair_vertex() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
- name: single
  left_anchors: [1]
  right_anchors: [2]
  vertex: 3
  template:
    - {{ label: A, position: [0.0, 1.0, 0.0] }}
    - {{ label: B, position: [0.0, -1.0, 0.0] }}
    - {{ label: C, position: [0.0, 0.0, 1.0] }}
  acquisition_order: [1, 2, 3]
- name: pair
  left_anchors: [1]
  right_anchors: [2]
  vertex: [3, 3]
  template:
    - {{ label: A, position: [0.0, 1.0, 0.0] }}
    - {{ label: B, position: [0.0, -1.0, 0.0] }}
    - {{ label: C, position: [0.0, 0.0, 1.0] }}
  acquisition_order: [1, 2, 3]
"#
        )
        .unwrap();

        let table = MontageTable::from_yaml(file.path()).unwrap();
        assert_eq!(table.names(), vec!["single", "pair"]);
        assert_eq!(table.get("single").unwrap().vertex, VertexDef::Single(3));
        assert_eq!(table.get("pair").unwrap().vertex, VertexDef::Pair([3, 3]));
    }

    #[test]
    fn test_from_yaml_one_element_vertex_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
- name: listed
  left_anchors: [1]
  right_anchors: [2]
  vertex: [3]
  template:
    - {{ label: A, position: [0.0, 1.0, 0.0] }}
    - {{ label: B, position: [0.0, -1.0, 0.0] }}
    - {{ label: C, position: [0.0, 0.0, 1.0] }}
  acquisition_order: [1, 2, 3]
"#
        )
        .unwrap();

        let table = MontageTable::from_yaml(file.path()).unwrap();
        assert_eq!(table.get("listed").unwrap().vertex, VertexDef::Single(3));
    }

    #[test]
    fn test_vertex_rejects_three_electrodes() {
        let parsed: std::result::Result<VertexDef, _> = serde_yaml::from_str("[1, 2, 3]");
        assert!(parsed.is_err());
    }
}
