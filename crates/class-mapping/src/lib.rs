//! Class Mapping Store
//!
//! Immutable index-to-label tables for the two classification tasks
//! (disease and variety), loaded once at startup from JSON resources.

mod mapping;

pub use mapping::{ClassMapping, ClassMappings, DEFAULT_HEALTHY_LABEL};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Prediction task served by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Task {
    /// Disease classification (with a healthy sentinel label)
    Disease,
    /// Variety classification
    Variety,
    /// Age regression in days
    Age,
}

impl Task {
    /// All tasks, in registry load order
    pub const ALL: [Task; 3] = [Task::Disease, Task::Variety, Task::Age];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Disease => "disease",
            Task::Variety => "variety",
            Task::Age => "age",
        }
    }

    /// Human-readable name used in response messages
    pub fn title(&self) -> &'static str {
        match self {
            Task::Disease => "Disease",
            Task::Variety => "Variety",
            Task::Age => "Age",
        }
    }

    /// Whether the task decodes its output through a class mapping
    pub fn is_classification(&self) -> bool {
        !matches!(self, Task::Age)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors while loading or querying a class mapping
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("Failed to read {task} mapping from {path}: {source}")]
    Io {
        task: Task,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {task} mapping: {source}")]
    Parse {
        task: Task,
        #[source]
        source: serde_json::Error,
    },

    #[error("{task} mapping key {key:?} is not a non-negative integer")]
    InvalidKey { task: Task, key: String },

    #[error("{task} mapping is not dense: missing index {missing} (expected 0..{len})")]
    NotDense { task: Task, missing: usize, len: usize },

    #[error("{task} mapping is empty")]
    Empty { task: Task },

    #[error("{task} mapping has an empty label at index {index}")]
    EmptyLabel { task: Task, index: usize },

    #[error("{task} mapping label {label:?} appears more than once")]
    DuplicateLabel { task: Task, label: String },

    #[error("{task} has no class mapping")]
    NotClassification { task: Task },

    #[error("Healthy label {label:?} is not a disease class")]
    MissingHealthyLabel { label: String },

    #[error("{task} model predicted index {index}, but the mapping only has {len} labels")]
    UnknownIndex { task: Task, index: usize, len: usize },
}
