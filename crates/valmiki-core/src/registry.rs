//! Process-wide model lifecycle.
//!
//! The registry is created empty, initialized exactly once before traffic is
//! accepted, and read-only from then on. A failed load is recorded and stays
//! visible to every later request; nothing is retried.

use crate::classifier::AttributeClassifier;
use crate::config::PipelineConfig;
use crate::detector::FaceLocator;
use crate::network::{Network, NetworkError, OrtNetwork};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Instant;
use thiserror::Error;

/// The three networks the pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    FaceDetector,
    AgeClassifier,
    GenderClassifier,
}

impl ModelKind {
    /// Load order.
    pub const ALL: [ModelKind; 3] = [
        ModelKind::FaceDetector,
        ModelKind::AgeClassifier,
        ModelKind::GenderClassifier,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "face_detector",
            ModelKind::AgeClassifier => "age_classifier",
            ModelKind::GenderClassifier => "gender_classifier",
        }
    }

    /// Versioned file name inside the model directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ModelKind::FaceDetector => "res10_300x300_ssd_iter_140000.onnx",
            ModelKind::AgeClassifier => "age_net.onnx",
            ModelKind::GenderClassifier => "gender_net.onnx",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Locations of the model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelPaths {
    pub face_detector: PathBuf,
    pub age_classifier: PathBuf,
    pub gender_classifier: PathBuf,
}

impl ModelPaths {
    /// Standard file names inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            face_detector: dir.join(ModelKind::FaceDetector.file_name()),
            age_classifier: dir.join(ModelKind::AgeClassifier.file_name()),
            gender_classifier: dir.join(ModelKind::GenderClassifier.file_name()),
        }
    }

    pub fn path(&self, kind: ModelKind) -> &Path {
        match kind {
            ModelKind::FaceDetector => &self.face_detector,
            ModelKind::AgeClassifier => &self.age_classifier,
            ModelKind::GenderClassifier => &self.gender_classifier,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("failed to load {model} model: {reason}")]
    Load { model: ModelKind, reason: String },
    #[error("model registry already initialized")]
    AlreadyInitialized,
}

/// Observable registry state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryStatus {
    Uninitialized,
    Ready,
    NotReady { model: ModelKind, reason: String },
}

/// Which model failed and why.
#[derive(Debug, Clone)]
struct LoadFailure {
    model: ModelKind,
    reason: String,
}

impl From<&LoadFailure> for RegistryError {
    fn from(f: &LoadFailure) -> Self {
        RegistryError::Load {
            model: f.model,
            reason: f.reason.clone(),
        }
    }
}

/// Networks owned by a ready registry.
pub(crate) struct LoadedModels {
    pub(crate) locator: FaceLocator,
    pub(crate) classifier: AttributeClassifier,
}

#[derive(Default)]
pub struct ModelRegistry {
    state: OnceLock<Result<LoadedModels, LoadFailure>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the three ONNX models from `paths`.
    pub fn initialize(&self, paths: &ModelPaths, config: &PipelineConfig) -> Result<(), RegistryError> {
        self.initialize_with(config, |kind| {
            let network = OrtNetwork::load(paths.path(kind), config.intra_threads)?;
            Ok(Box::new(network) as Box<dyn Network>)
        })
    }

    /// Initialize with a caller-supplied loader. All three models must load;
    /// the first failure puts the registry in the not-ready state for good.
    ///
    /// Only the first call has any effect; later calls return
    /// [`RegistryError::AlreadyInitialized`].
    pub fn initialize_with<F>(&self, config: &PipelineConfig, mut load: F) -> Result<(), RegistryError>
    where
        F: FnMut(ModelKind) -> Result<Box<dyn Network>, NetworkError>,
    {
        let mut ran = false;
        let state = self.state.get_or_init(|| {
            ran = true;
            load_all(config, &mut load)
        });

        if !ran {
            return Err(RegistryError::AlreadyInitialized);
        }
        state.as_ref().map(|_| ()).map_err(RegistryError::from)
    }

    /// `true` only after a successful [`initialize`](Self::initialize).
    pub fn is_ready(&self) -> bool {
        matches!(self.state.get(), Some(Ok(_)))
    }

    pub fn status(&self) -> RegistryStatus {
        match self.state.get() {
            None => RegistryStatus::Uninitialized,
            Some(Ok(_)) => RegistryStatus::Ready,
            Some(Err(failure)) => RegistryStatus::NotReady {
                model: failure.model,
                reason: failure.reason.clone(),
            },
        }
    }

    pub(crate) fn models(&self) -> Option<&LoadedModels> {
        self.state.get().and_then(|s| s.as_ref().ok())
    }
}

fn load_all<F>(config: &PipelineConfig, load: &mut F) -> Result<LoadedModels, LoadFailure>
where
    F: FnMut(ModelKind) -> Result<Box<dyn Network>, NetworkError>,
{
    let start = Instant::now();
    let mut load_one = |kind: ModelKind| {
        load(kind).map_err(|e| {
            tracing::error!(model = %kind, error = %e, "model failed to load");
            LoadFailure {
                model: kind,
                reason: e.to_string(),
            }
        })
    };

    let detector = load_one(ModelKind::FaceDetector)?;
    let age = load_one(ModelKind::AgeClassifier)?;
    let gender = load_one(ModelKind::GenderClassifier)?;

    tracing::info!(elapsed = ?start.elapsed(), "all models loaded");

    Ok(LoadedModels {
        locator: FaceLocator::new(detector, config.detector.clone()),
        classifier: AttributeClassifier::new(age, gender, config.classifier.clone()),
    })
}
