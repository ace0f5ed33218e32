//! Class mapping tables

use crate::{MappingError, Task};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Disease label that denotes a healthy leaf
pub const DEFAULT_HEALTHY_LABEL: &str = "normal";

/// Immutable index-to-label table for one classification task.
///
/// Indices form the dense range `0..len()`; any other index is rejected
/// by [`ClassMapping::label_for`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    task: Task,
    labels: Vec<String>,
}

impl ClassMapping {
    /// Build a mapping from labels ordered by class index
    pub fn new(task: Task, labels: Vec<String>) -> Result<Self, MappingError> {
        if !task.is_classification() {
            return Err(MappingError::NotClassification { task });
        }
        if labels.is_empty() {
            return Err(MappingError::Empty { task });
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for (index, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(MappingError::EmptyLabel { task, index });
            }
            if !seen.insert(label.as_str()) {
                return Err(MappingError::DuplicateLabel {
                    task,
                    label: label.clone(),
                });
            }
        }

        Ok(Self { task, labels })
    }

    /// Parse the `{"0": "label", "1": "label"}` JSON shape
    pub fn from_json_str(task: Task, json: &str) -> Result<Self, MappingError> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).map_err(|source| MappingError::Parse { task, source })?;

        let mut by_index = BTreeMap::new();
        for (key, label) in raw {
            let index = parse_index(&key).ok_or_else(|| MappingError::InvalidKey {
                task,
                key: key.clone(),
            })?;
            by_index.insert(index, label);
        }

        let len = by_index.len();
        let mut labels = Vec::with_capacity(len);
        for (expected, (index, label)) in by_index.into_iter().enumerate() {
            if index != expected {
                return Err(MappingError::NotDense {
                    task,
                    missing: expected,
                    len,
                });
            }
            labels.push(label);
        }

        Self::new(task, labels)
    }

    /// Load a mapping from a JSON file
    pub fn load(task: Task, path: impl AsRef<Path>) -> Result<Self, MappingError> {
        let path = path.as_ref();
        debug!("Loading {} mapping from {}", task, path.display());

        let json = std::fs::read_to_string(path).map_err(|source| MappingError::Io {
            task,
            path: path.to_path_buf(),
            source,
        })?;
        let mapping = Self::from_json_str(task, &json)?;

        info!("Loaded {} mapping with {} classes", task, mapping.len());
        Ok(mapping)
    }

    /// Look up the label for a predicted class index
    pub fn label_for(&self, index: usize) -> Result<&str, MappingError> {
        self.labels
            .get(index)
            .map(String::as_str)
            .ok_or(MappingError::UnknownIndex {
                task: self.task,
                index,
                len: self.labels.len(),
            })
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false for a constructed mapping
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels ordered by class index
    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Keys must be canonical decimal integers ("7", not "07" or "+7")
fn parse_index(key: &str) -> Option<usize> {
    let index: usize = key.parse().ok()?;
    (index.to_string() == key).then_some(index)
}

/// The disease and variety mappings plus the healthy sentinel label
#[derive(Debug, Clone)]
pub struct ClassMappings {
    disease: ClassMapping,
    variety: ClassMapping,
    healthy_label: String,
}

impl ClassMappings {
    /// Combine the two mappings; the healthy label must be a disease class
    pub fn new(
        disease: ClassMapping,
        variety: ClassMapping,
        healthy_label: impl Into<String>,
    ) -> Result<Self, MappingError> {
        let healthy_label = healthy_label.into();
        if !disease.labels().iter().any(|l| *l == healthy_label) {
            return Err(MappingError::MissingHealthyLabel {
                label: healthy_label,
            });
        }

        Ok(Self {
            disease,
            variety,
            healthy_label,
        })
    }

    /// Load both mappings from JSON files
    pub fn load(
        disease_path: impl AsRef<Path>,
        variety_path: impl AsRef<Path>,
        healthy_label: impl Into<String>,
    ) -> Result<Self, MappingError> {
        let disease = ClassMapping::load(Task::Disease, disease_path)?;
        let variety = ClassMapping::load(Task::Variety, variety_path)?;
        Self::new(disease, variety, healthy_label)
    }

    /// Mapping for a classification task
    pub fn get(&self, task: Task) -> Result<&ClassMapping, MappingError> {
        match task {
            Task::Disease => Ok(&self.disease),
            Task::Variety => Ok(&self.variety),
            Task::Age => Err(MappingError::NotClassification { task }),
        }
    }

    /// Look up a label for a task's predicted index
    pub fn label_for(&self, task: Task, index: usize) -> Result<&str, MappingError> {
        self.get(task)?.label_for(index)
    }

    /// Whether a disease label denotes a healthy leaf
    pub fn is_healthy(&self, disease_label: &str) -> bool {
        disease_label == self.healthy_label
    }

    /// The configured healthy sentinel
    pub fn healthy_label(&self) -> &str {
        &self.healthy_label
    }

    pub fn disease(&self) -> &ClassMapping {
        &self.disease
    }

    pub fn variety(&self) -> &ClassMapping {
        &self.variety
    }
}
