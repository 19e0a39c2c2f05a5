//! valmiki-core — Face localization and age/gender classification.
//!
//! Uses a ResNet-10 SSD face detector and two CaffeNet classifiers, all
//! exported to ONNX and run through ONNX Runtime on the CPU.

pub mod classifier;
pub mod config;
pub mod detector;
pub mod error;
pub mod network;
pub mod preprocess;
pub mod registry;
pub mod service;
pub mod types;

pub use config::{ClassifierConfig, ConfigError, DetectorConfig, Padding, PipelineConfig, SelectionPolicy};
pub use error::PredictError;
pub use registry::{ModelKind, ModelPaths, ModelRegistry, RegistryError, RegistryStatus};
pub use service::InferenceService;
pub use types::{
    AgeBucket, AgeGroup, AttributePrediction, BoundingBox, Detection, FaceReport, Gender, Prediction, PredictionReport,
};

/// Model directory used when none is configured.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("models")
}
