//! Inference Orchestrator

use crate::registry::ModelRegistry;
use crate::{PredictError, PredictErrorKind, Task};
use class_mapping::ClassMappings;
use image_preprocess::Preprocessor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

/// Disease classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiseasePrediction {
    /// Disease label
    pub disease: String,
    /// Probability of the selected class (0.0 to 1.0)
    pub confidence: f32,
    /// Whether the label is the healthy sentinel
    pub is_healthy: bool,
}

/// Variety classification result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarietyPrediction {
    /// Variety label
    pub variety: String,
    /// Probability of the selected class (0.0 to 1.0)
    pub confidence: f32,
}

/// Age regression result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgePrediction {
    /// Raw regression output, neither clamped nor rounded
    pub age_days: f32,
}

/// Runs the three prediction operations.
///
/// Every call is a pure function of its input bytes and the immutable
/// models and mappings, so one `Predictor` serves concurrent requests.
#[derive(Clone)]
pub struct Predictor {
    registry: Arc<ModelRegistry>,
    mappings: Arc<ClassMappings>,
    preprocessor: Preprocessor,
}

impl Predictor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        mappings: Arc<ClassMappings>,
        preprocessor: Preprocessor,
    ) -> Self {
        Self {
            registry,
            mappings,
            preprocessor,
        }
    }

    /// Classify the disease shown on a leaf image
    pub fn predict_disease(&self, raw_bytes: &[u8]) -> Result<DiseasePrediction, PredictError> {
        self.run(Task::Disease, raw_bytes, |output| {
            let (index, confidence) = select_class(output)?;
            let disease = self.mappings.label_for(Task::Disease, index)?;

            Ok(DiseasePrediction {
                is_healthy: self.mappings.is_healthy(disease),
                disease: disease.to_string(),
                confidence,
            })
        })
    }

    /// Classify the paddy variety
    pub fn predict_variety(&self, raw_bytes: &[u8]) -> Result<VarietyPrediction, PredictError> {
        self.run(Task::Variety, raw_bytes, |output| {
            let (index, confidence) = select_class(output)?;
            let variety = self.mappings.label_for(Task::Variety, index)?;

            Ok(VarietyPrediction {
                variety: variety.to_string(),
                confidence,
            })
        })
    }

    /// Estimate plant age in days
    pub fn predict_age(&self, raw_bytes: &[u8]) -> Result<AgePrediction, PredictError> {
        self.run(Task::Age, raw_bytes, |output| match output {
            [age_days] => Ok(AgePrediction {
                age_days: *age_days,
            }),
            _ => Err(PredictErrorKind::Inference(format!(
                "age model produced {} values, expected a single scalar",
                output.len()
            ))),
        })
    }

    /// Preprocess, invoke the task's model and decode its output.
    /// Any failure is logged with the task and returned whole.
    fn run<T, F>(&self, task: Task, raw_bytes: &[u8], decode: F) -> Result<T, PredictError>
    where
        F: FnOnce(&[f32]) -> Result<T, PredictErrorKind>,
    {
        let start = Instant::now();

        let result = self
            .preprocessor
            .preprocess(raw_bytes)
            .map_err(PredictErrorKind::from)
            .and_then(|tensor| {
                self.registry
                    .model(task)
                    .forward(&tensor)
                    .map_err(PredictErrorKind::from)
            })
            .and_then(|output| decode(output.as_slice()));

        match result {
            Ok(prediction) => {
                debug!(
                    task = %task,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Prediction completed"
                );
                Ok(prediction)
            }
            Err(kind) => {
                error!(task = %task, error = %kind, "Prediction failed");
                Err(PredictError { task, kind })
            }
        }
    }
}

/// Index and value of the largest output; the first index wins ties.
///
/// The selected value must be a probability, it is never clamped.
fn select_class(output: &[f32]) -> Result<(usize, f32), PredictErrorKind> {
    if output.is_empty() {
        return Err(PredictErrorKind::Inference(
            "classifier produced an empty output".to_string(),
        ));
    }
    if let Some(index) = output.iter().position(|v| v.is_nan()) {
        return Err(PredictErrorKind::Inference(format!(
            "classifier output at index {} is NaN",
            index
        )));
    }

    let mut best = 0;
    for (index, &value) in output.iter().enumerate().skip(1) {
        if value > output[best] {
            best = index;
        }
    }

    let confidence = output[best];
    if !(0.0..=1.0).contains(&confidence) {
        return Err(PredictErrorKind::Inference(format!(
            "selected confidence {} is not a probability",
            confidence
        )));
    }

    Ok((best, confidence))
}
