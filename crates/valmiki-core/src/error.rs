use crate::classifier::ClassifierError;
use crate::detector::DetectorError;
use thiserror::Error;

/// Failure taxonomy of [`InferenceService::predict`](crate::InferenceService::predict).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictError {
    /// The model registry is not ready; no inference was attempted.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no face detected")]
    NoFaceDetected,
    #[error("inference error: {0}")]
    InferenceError(String),
}

impl PredictError {
    /// Stable machine-readable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictError::ServiceUnavailable(_) => "ServiceUnavailable",
            PredictError::InvalidImage(_) => "InvalidImage",
            PredictError::NoFaceDetected => "NoFaceDetected",
            PredictError::InferenceError(_) => "InferenceError",
        }
    }

    /// Only an unready registry can clear up without a new request.
    pub fn is_transient(&self) -> bool {
        matches!(self, PredictError::ServiceUnavailable(_))
    }
}

impl From<DetectorError> for PredictError {
    fn from(e: DetectorError) -> Self {
        PredictError::InferenceError(format!("face detection: {e}"))
    }
}

impl From<ClassifierError> for PredictError {
    fn from(e: ClassifierError) -> Self {
        PredictError::InferenceError(format!("classification: {e}"))
    }
}
