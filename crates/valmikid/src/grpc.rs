//! gRPC service implementation

use tonic::{Request, Response, Status};
use valmiki_core::{PredictError, RegistryStatus};

use crate::engine::{EngineError, EngineHandle};

pub mod proto {
    tonic::include_proto!("valmiki");
}

use proto::valmiki_service_server::{ValmikiService, ValmikiServiceServer};
use proto::{HealthRequest, HealthResponse, PredictRequest, PredictResponse};

pub struct GrpcHandler {
    engine: EngineHandle,
}

impl GrpcHandler {
    pub fn new(engine: EngineHandle) -> Self {
        Self { engine }
    }

    pub fn into_server(self) -> ValmikiServiceServer<Self> {
        ValmikiServiceServer::new(self)
    }
}

#[tonic::async_trait]
impl ValmikiService for GrpcHandler {
    async fn predict(&self, request: Request<PredictRequest>) -> Result<Response<PredictResponse>, Status> {
        let req = request.into_inner();
        tracing::info!(bytes = req.image_data.len(), "received gRPC prediction request");

        if req.image_data.is_empty() {
            tracing::warn!("empty image data received");
            return Err(Status::invalid_argument("Empty image data"));
        }

        let prediction = self.engine.predict(req.image_data).await.map_err(|e| {
            let status = status_for(&e);
            tracing::warn!(code = ?status.code(), error = %e, "gRPC prediction failed");
            status
        })?;

        let age_group = prediction.age.label.group();
        Ok(Response::new(PredictResponse {
            age_group: age_group.as_str().to_string(),
            gender: prediction.gender.label.as_str().to_string(),
            confidence: prediction.age.confidence * prediction.gender.confidence,
            age_range: prediction.age.label.label().to_string(),
            age_confidence: prediction.age.confidence,
            gender_confidence: prediction.gender.confidence,
        }))
    }

    async fn health(&self, _request: Request<HealthRequest>) -> Result<Response<HealthResponse>, Status> {
        let (ready, detail) = match self.engine.status() {
            RegistryStatus::Ready => (true, String::new()),
            RegistryStatus::Uninitialized => (false, "models not loaded".to_string()),
            RegistryStatus::NotReady { model, reason } => (false, format!("{model} failed to load: {reason}")),
        };
        Ok(Response::new(HealthResponse { ready, detail }))
    }
}

fn status_for(err: &EngineError) -> Status {
    match err {
        EngineError::Predict(e) => match e {
            PredictError::InvalidImage(_) => Status::invalid_argument(e.to_string()),
            PredictError::NoFaceDetected => Status::failed_precondition(e.to_string()),
            PredictError::ServiceUnavailable(_) => Status::unavailable(e.to_string()),
            PredictError::InferenceError(_) => Status::internal(e.to_string()),
        },
        EngineError::Timeout(_) => Status::deadline_exceeded(err.to_string()),
        EngineError::ChannelClosed => Status::internal(err.to_string()),
    }
}
