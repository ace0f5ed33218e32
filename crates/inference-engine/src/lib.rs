//! Paddy Inference Engine
//!
//! Loads the disease, variety and age models once at startup and turns
//! uploaded leaf images into structured predictions using tract-onnx.

mod engine;
mod predictor;
mod registry;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use engine::{InferenceModel, OnnxModel};
pub use predictor::{AgePrediction, DiseasePrediction, Predictor, VarietyPrediction};
pub use registry::{ModelConfig, ModelRegistry};

pub use class_mapping::{ClassMapping, ClassMappings, MappingError, Task};
pub use image_preprocess::{ImageTensor, PreprocessConfig, PreprocessError, Preprocessor};

use std::path::PathBuf;
use thiserror::Error;

/// Errors from a model backend
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Model file not found: {0}")]
    NotFound(PathBuf),
    #[error("Model load failed for {path}: {reason}")]
    ModelLoadError { path: PathBuf, reason: String },
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
}

/// Fatal errors while initializing the registry; the service must not start
#[derive(Debug, Error)]
pub enum InitError {
    #[error("Failed to load {task} model: {source}")]
    Model {
        task: Task,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error("{task} model warm-up failed: {reason}")]
    WarmUp { task: Task, reason: String },
}

/// Cause of a failed prediction
#[derive(Debug, Error)]
pub enum PredictErrorKind {
    /// Bytes are not a decodable image
    #[error("decode error: {0}")]
    Decode(String),
    /// Image cannot be normalized to the model input shape
    #[error("shape error: {0}")]
    Shape(String),
    /// The model invocation failed or produced unusable output
    #[error("inference error: {0}")]
    Inference(String),
    /// Predicted index has no label (model/mapping version skew)
    #[error("mapping error: {0}")]
    Mapping(#[source] MappingError),
}

impl From<PreprocessError> for PredictErrorKind {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::Decode(reason) => PredictErrorKind::Decode(reason),
            PreprocessError::Shape(reason) => PredictErrorKind::Shape(reason),
        }
    }
}

impl From<ModelError> for PredictErrorKind {
    fn from(err: ModelError) -> Self {
        PredictErrorKind::Inference(err.to_string())
    }
}

impl From<MappingError> for PredictErrorKind {
    fn from(err: MappingError) -> Self {
        PredictErrorKind::Mapping(err)
    }
}

/// Uniform prediction failure returned by every predict operation
#[derive(Debug, Error)]
#[error("{task} prediction failed: {kind}")]
pub struct PredictError {
    /// Task that failed
    pub task: Task,
    /// Underlying cause
    #[source]
    pub kind: PredictErrorKind,
}
