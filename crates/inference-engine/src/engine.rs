//! Model backends

use crate::{ModelError, Task};
use image_preprocess::{ImageTensor, INPUT_SHAPE};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// A loaded model bound to one task.
///
/// Implementations are immutable after load and shared by all requests,
/// so `forward` must be safe to call concurrently.
pub trait InferenceModel: Send + Sync {
    /// Run one forward pass, returning the flattened output values
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError>;
}

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX model executed with tract on the CPU
pub struct OnnxModel {
    task: Task,
    path: PathBuf,
    plan: Plan,
}

impl OnnxModel {
    /// Load, pin the input to `f32 [1, 224, 224, 3]` and optimize an ONNX graph
    pub fn load(task: Task, path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        info!("Loading {} model from {}", task, path.display());

        if !path.is_file() {
            return Err(ModelError::NotFound(path.to_path_buf()));
        }

        let load_error = |e: TractError| ModelError::ModelLoadError {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        };

        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(load_error)?
            .with_input_fact(0, f32::fact(INPUT_SHAPE).into())
            .map_err(load_error)?
            .into_optimized()
            .map_err(load_error)?
            .into_runnable()
            .map_err(load_error)?;

        debug!("{} model optimized and ready", task);

        Ok(Self {
            task,
            path: path.to_path_buf(),
            plan,
        })
    }

    pub fn task(&self) -> Task {
        self.task
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InferenceModel for OnnxModel {
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        if input.shape() != INPUT_SHAPE {
            return Err(ModelError::InvalidInputShape {
                expected: format!("{:?}", INPUT_SHAPE),
                actual: format!("{:?}", input.shape()),
            });
        }

        let tensor = Tensor::from_shape(&INPUT_SHAPE, input.as_slice())
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| ModelError::InferenceFailed(format!("{:#}", e)))?;

        let output = outputs
            .first()
            .ok_or_else(|| ModelError::InferenceFailed("model produced no outputs".to_string()))?;
        let values = output
            .to_array_view::<f32>()
            .map_err(|e| ModelError::InferenceFailed(e.to_string()))?;

        Ok(values.iter().copied().collect())
    }
}
