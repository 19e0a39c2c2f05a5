//! Request-scoped orchestration: decode → locate → crop → classify.

use crate::error::PredictError;
use crate::preprocess::{crop, decode_image};
use crate::registry::{LoadedModels, ModelRegistry, RegistryStatus};
use crate::types::Prediction;
use image::RgbImage;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

/// Single entry point for both boundary adapters.
///
/// `predict` is synchronous and CPU-bound; callers running on an async
/// runtime must move it onto a worker thread.
#[derive(Clone)]
pub struct InferenceService {
    registry: Arc<ModelRegistry>,
}

impl InferenceService {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        self.registry.is_ready()
    }

    /// Predict the age bucket and gender of the most prominent face.
    ///
    /// Checks, in order: registry readiness, image decoding, face presence.
    pub fn predict(&self, image_bytes: &[u8]) -> Result<Prediction, PredictError> {
        let Some(models) = self.registry.models() else {
            let detail = match self.registry.status() {
                RegistryStatus::NotReady { model, reason } => format!("{model} failed to load: {reason}"),
                _ => "models not loaded".to_string(),
            };
            tracing::error!(%detail, "prediction attempted but models are not loaded");
            return Err(PredictError::ServiceUnavailable(detail));
        };

        let start = Instant::now();
        let image = guarded(|| decode_image(image_bytes), |msg| {
            PredictError::InvalidImage(format!("decoder panicked: {msg}"))
        })
        .inspect_err(|e| {
            tracing::warn!(error = %e, bytes = image_bytes.len(), "could not decode image");
        })?;

        let result = guarded(|| run_pipeline(models, &image), |msg| {
            PredictError::InferenceError(format!("panic during inference: {msg}"))
        });

        match &result {
            Ok(p) => tracing::info!(
                age = %p.age.label,
                age_confidence = p.age.confidence,
                gender = %p.gender.label,
                gender_confidence = p.gender.confidence,
                elapsed = ?start.elapsed(),
                "prediction successful"
            ),
            Err(PredictError::InferenceError(detail)) => {
                tracing::error!(%detail, "inference failed");
            }
            Err(_) => {}
        }

        result
    }
}

fn run_pipeline(models: &LoadedModels, image: &RgbImage) -> Result<Prediction, PredictError> {
    let face = models.locator.locate(image)?.ok_or(PredictError::NoFaceDetected)?;

    let region = crop(image, &face.bbox);
    let attributes = models.classifier.classify(&region)?;

    Ok(Prediction {
        age: attributes.age,
        gender: attributes.gender,
        face,
    })
}

/// Run `f`, turning a panic into the error built by `on_panic`.
fn guarded<T, F>(f: F, on_panic: fn(String) -> PredictError) -> Result<T, PredictError>
where
    F: FnOnce() -> Result<T, PredictError>,
{
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(on_panic(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
