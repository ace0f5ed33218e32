//! Model Registry

use crate::engine::{InferenceModel, OnnxModel};
use crate::{InitError, Task};
use class_mapping::ClassMappings;
use image_preprocess::ImageTensor;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Model artifact locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Disease classifier (ONNX)
    pub disease_model_path: PathBuf,
    /// Variety classifier (ONNX)
    pub variety_model_path: PathBuf,
    /// Age regressor (ONNX)
    pub age_model_path: PathBuf,
    /// Run every model once at startup and check output sizes
    pub warm_up: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            disease_model_path: PathBuf::from("model/task1_disease.onnx"),
            variety_model_path: PathBuf::from("model/task2_variety.onnx"),
            age_model_path: PathBuf::from("model/task3_age.onnx"),
            warm_up: true,
        }
    }
}

impl ModelConfig {
    /// Configured path for a task's model
    pub fn path_for(&self, task: Task) -> &PathBuf {
        match task {
            Task::Disease => &self.disease_model_path,
            Task::Variety => &self.variety_model_path,
            Task::Age => &self.age_model_path,
        }
    }
}

/// The three loaded models, shared read-only for the process lifetime
#[derive(Clone)]
pub struct ModelRegistry {
    disease: Arc<dyn InferenceModel>,
    variety: Arc<dyn InferenceModel>,
    age: Arc<dyn InferenceModel>,
}

impl ModelRegistry {
    /// Load all three models, failing on the first artifact that cannot be loaded.
    ///
    /// Models run on the CPU through tract, which allocates scratch memory
    /// per call and reserves nothing up front.
    pub fn initialize(config: &ModelConfig, mappings: &ClassMappings) -> Result<Self, InitError> {
        info!("Loading models (execution device: cpu)");

        let load = |task: Task| -> Result<Arc<dyn InferenceModel>, InitError> {
            let model = OnnxModel::load(task, config.path_for(task))
                .map_err(|source| InitError::Model { task, source })?;
            debug!("{} model ready ({})", model.task(), model.path().display());
            let model: Arc<dyn InferenceModel> = Arc::new(model);
            Ok(model)
        };

        let registry = Self::from_models(load(Task::Disease)?, load(Task::Variety)?, load(Task::Age)?);

        if config.warm_up {
            registry.warm_up(mappings)?;
        }

        info!("All models loaded successfully");
        Ok(registry)
    }

    /// Build a registry from already-loaded models
    pub fn from_models(
        disease: Arc<dyn InferenceModel>,
        variety: Arc<dyn InferenceModel>,
        age: Arc<dyn InferenceModel>,
    ) -> Self {
        Self {
            disease,
            variety,
            age,
        }
    }

    /// Model bound to a task
    pub fn model(&self, task: Task) -> &dyn InferenceModel {
        match task {
            Task::Disease => self.disease.as_ref(),
            Task::Variety => self.variety.as_ref(),
            Task::Age => self.age.as_ref(),
        }
    }

    /// Run every model on a black image and check its output size against
    /// the class mappings (one value for the age regressor)
    pub fn warm_up(&self, mappings: &ClassMappings) -> Result<(), InitError> {
        let input = ImageTensor::zeros();

        for task in Task::ALL {
            let output = self
                .model(task)
                .forward(&input)
                .map_err(|e| InitError::WarmUp {
                    task,
                    reason: e.to_string(),
                })?;

            let expected = if task.is_classification() {
                mappings.get(task)?.len()
            } else {
                1
            };

            if output.len() != expected {
                return Err(InitError::WarmUp {
                    task,
                    reason: format!(
                        "model produces {} values, expected {}",
                        output.len(),
                        expected
                    ),
                });
            }

            debug!("{} model warm-up ok ({} outputs)", task, output.len());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mappings, StubModel};
    use crate::ModelError;

    fn registry(disease: StubModel, variety: StubModel, age: StubModel) -> ModelRegistry {
        ModelRegistry::from_models(Arc::new(disease), Arc::new(variety), Arc::new(age))
    }

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert!(config.warm_up);
        assert_eq!(config.path_for(Task::Age), &PathBuf::from("model/task3_age.onnx"));
    }

    #[test]
    fn test_initialize_fails_fast_on_missing_artifact() {
        let config = ModelConfig {
            disease_model_path: PathBuf::from("/nonexistent/disease.onnx"),
            ..Default::default()
        };
        let mappings = mappings(&["blast", "normal"], &["ADT45"]);

        match ModelRegistry::initialize(&config, &mappings) {
            Err(InitError::Model { task, source }) => {
                assert_eq!(task, Task::Disease);
                assert!(matches!(source, ModelError::NotFound(_)));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("registry initialized without artifacts"),
        }
    }

    #[test]
    fn test_warm_up_accepts_matching_outputs() {
        let registry = registry(
            StubModel::fixed(vec![0.2, 0.8]),
            StubModel::fixed(vec![1.0]),
            StubModel::fixed(vec![42.0]),
        );
        let mappings = mappings(&["blast", "normal"], &["ADT45"]);

        registry.warm_up(&mappings).unwrap();
    }

    #[test]
    fn test_warm_up_detects_mapping_skew() {
        let registry = registry(
            StubModel::fixed(vec![0.1, 0.2, 0.7]),
            StubModel::fixed(vec![1.0]),
            StubModel::fixed(vec![42.0]),
        );
        let mappings = mappings(&["blast", "normal"], &["ADT45"]);

        match registry.warm_up(&mappings) {
            Err(InitError::WarmUp { task, .. }) => assert_eq!(task, Task::Disease),
            other => panic!("expected warm-up failure, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_warm_up_requires_scalar_age() {
        let registry = registry(
            StubModel::fixed(vec![0.5, 0.5]),
            StubModel::fixed(vec![1.0]),
            StubModel::fixed(vec![10.0, 20.0]),
        );
        let mappings = mappings(&["blast", "normal"], &["ADT45"]);

        assert!(matches!(
            registry.warm_up(&mappings),
            Err(InitError::WarmUp { task: Task::Age, .. })
        ));
    }

    #[test]
    fn test_warm_up_propagates_model_failure() {
        let registry = registry(
            StubModel::fixed(vec![0.5, 0.5]),
            StubModel::failing("out of memory"),
            StubModel::fixed(vec![1.0]),
        );
        let mappings = mappings(&["blast", "normal"], &["ADT45"]);

        assert!(matches!(
            registry.warm_up(&mappings),
            Err(InitError::WarmUp { task: Task::Variety, .. })
        ));
    }
}
