//! Stub models and fixtures for tests

use crate::engine::InferenceModel;
use crate::ModelError;
use class_mapping::{ClassMapping, ClassMappings, Task, DEFAULT_HEALTHY_LABEL};
use image_preprocess::ImageTensor;
use std::sync::atomic::{AtomicUsize, Ordering};

type ForwardFn = dyn Fn(&ImageTensor) -> Result<Vec<f32>, ModelError> + Send + Sync;

/// Model whose output is computed by a closure; counts invocations
pub struct StubModel {
    forward: Box<ForwardFn>,
    calls: AtomicUsize,
}

impl StubModel {
    /// Output computed from the input tensor
    pub fn from_fn<F>(forward: F) -> Self
    where
        F: Fn(&ImageTensor) -> Result<Vec<f32>, ModelError> + Send + Sync + 'static,
    {
        Self {
            forward: Box::new(forward),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns the same output
    pub fn fixed(output: Vec<f32>) -> Self {
        Self::from_fn(move |_| Ok(output.clone()))
    }

    /// Always fails with an inference error
    pub fn failing(reason: &str) -> Self {
        let reason = reason.to_string();
        Self::from_fn(move |_| Err(ModelError::InferenceFailed(reason.clone())))
    }

    /// Number of forward passes so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InferenceModel for StubModel {
    fn forward(&self, input: &ImageTensor) -> Result<Vec<f32>, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.forward)(input)
    }
}

/// Build mappings from label lists; the disease list must contain "normal"
pub fn mappings(disease: &[&str], variety: &[&str]) -> ClassMappings {
    let owned = |labels: &[&str]| labels.iter().map(|l| l.to_string()).collect::<Vec<_>>();
    let disease = ClassMapping::new(Task::Disease, owned(disease)).expect("valid disease labels");
    let variety = ClassMapping::new(Task::Variety, owned(variety)).expect("valid variety labels");
    ClassMappings::new(disease, variety, DEFAULT_HEALTHY_LABEL).expect("disease labels include normal")
}
