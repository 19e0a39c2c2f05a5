//! Forward-pass abstraction over the loaded networks.
//!
//! All three models are driven through [`Network`], so the pipeline can run
//! against ONNX Runtime in production and scripted outputs in tests.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("model file not found: {0} — export the reference networks to ONNX and place them in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A loaded network that maps one NCHW tensor to its first output, flattened.
pub trait Network: Send {
    fn forward(&mut self, input: Array4<f32>) -> Result<Vec<f32>, NetworkError>;
}

/// ONNX Runtime session wrapper.
pub struct OrtNetwork {
    session: Session,
}

impl OrtNetwork {
    /// Load an ONNX model from the given path.
    pub fn load(model_path: &Path, intra_threads: usize) -> Result<Self, NetworkError> {
        if !model_path.exists() {
            return Err(NetworkError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(intra_threads)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded ONNX model"
        );

        Ok(Self { session })
    }
}

impl Network for OrtNetwork {
    fn forward(&mut self, input: Array4<f32>) -> Result<Vec<f32>, NetworkError> {
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| NetworkError::InferenceFailed(format!("output extraction: {e}")))?;

        Ok(data.to_vec())
    }
}
