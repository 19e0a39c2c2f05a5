//! Axum REST front end.

use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use valmiki_core::{PredictError, PredictionReport};

use crate::engine::{EngineError, EngineHandle};

/// Multipart field names accepted for the uploaded image.
const IMAGE_FIELDS: [&str; 2] = ["file", "image"];

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { detail: detail.into() }))
}

/// Create the REST API router.
pub fn create_rest_router(engine: EngineHandle, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/predict", post(predict_handler))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

async fn health_handler(State(engine): State<EngineHandle>) -> (StatusCode, Json<HealthResponse>) {
    if engine.is_ready() {
        return (
            StatusCode::OK,
            Json(HealthResponse {
                status: "OK",
                detail: None,
            }),
        );
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(HealthResponse {
            status: "error",
            detail: Some("Models not loaded".into()),
        }),
    )
}

async fn predict_handler(
    State(engine): State<EngineHandle>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionReport>, ApiError> {
    if !engine.is_ready() {
        tracing::error!("prediction attempted but models are not loaded");
        return Err(api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Models are not loaded, service cannot process requests.",
        ));
    }

    let mut multipart = multipart.map_err(|e| api_error(e.status(), e.body_text()))?;
    let image = read_image_field(&mut multipart).await?;

    let prediction = engine.predict(image).await.map_err(|e| {
        let (status, detail) = status_for(&e);
        tracing::warn!(%status, error = %e, "prediction request failed");
        api_error(status, detail)
    })?;

    Ok(Json(PredictionReport::from(&prediction)))
}

/// First non-empty image field of the form.
async fn read_image_field(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(e.status(), format!("Error reading file: {}", e.body_text())))?
    {
        if !field.name().is_some_and(|name| IMAGE_FIELDS.contains(&name)) {
            continue;
        }
        tracing::info!(filename = field.file_name().unwrap_or("<unnamed>"), "received prediction request");

        let data = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), format!("Error reading file: {}", e.body_text())))?;
        if data.is_empty() {
            tracing::warn!("received empty file");
            return Err(api_error(StatusCode::BAD_REQUEST, "Empty file received."));
        }
        return Ok(data.to_vec());
    }

    Err(api_error(StatusCode::BAD_REQUEST, "Missing 'file' field in multipart form."))
}

fn status_for(err: &EngineError) -> (StatusCode, String) {
    match err {
        EngineError::Predict(e) => {
            let status = match e {
                PredictError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                PredictError::InvalidImage(_) | PredictError::NoFaceDetected => StatusCode::BAD_REQUEST,
                PredictError::InferenceError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.to_string())
        }
        EngineError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, err.to_string()),
        EngineError::ChannelClosed => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "valmiki-test-boundary";

    fn multipart_body(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"face.png\"\r\n\
             Content-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn predict_request(field: &str, data: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
            .body(Body::from(multipart_body(field, data)))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn health_request() -> Request<Body> {
        Request::builder().uri("/health").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_ready() {
        let router = create_rest_router(testing::engine(vec![testing::FACE_ROW]), 1 << 20);
        let (status, body) = send(router, health_request()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "OK"}));
    }

    #[tokio::test]
    async fn test_health_not_ready() {
        let router = create_rest_router(testing::unready_engine(), 1 << 20);
        let (status, body) = send(router, health_request()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, serde_json::json!({"status": "error", "detail": "Models not loaded"}));
    }

    #[tokio::test]
    async fn test_predict_success() {
        let router = create_rest_router(testing::engine(vec![testing::FACE_ROW]), 1 << 20);
        let (status, body) = send(router, predict_request("file", &testing::face_png())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["age"], "(0-2)");
        assert_eq!(body["age_group"], "child");
        assert_eq!(body["gender"], "Male");
        assert_eq!(body["gender_confidence"], 0.75);
        assert_eq!(body["face"]["left"], 32);
        assert_eq!(body["face"]["bottom"], 96);
    }

    #[tokio::test]
    async fn test_predict_accepts_image_field() {
        let router = create_rest_router(testing::engine(vec![testing::FACE_ROW]), 1 << 20);
        let (status, _) = send(router, predict_request("image", &testing::face_png())).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_predict_client_errors() {
        let engine = testing::engine(Vec::new());
        let cases: [(&str, Vec<u8>, &str); 4] = [
            ("file", Vec::new(), "Empty file received."),
            ("other", testing::face_png(), "Missing 'file' field in multipart form."),
            ("file", b"definitely not a picture".to_vec(), "invalid image"),
            ("file", testing::face_png(), "no face detected"),
        ];
        for (field, data, detail) in cases {
            let router = create_rest_router(engine.clone(), 1 << 20);
            let (status, body) = send(router, predict_request(field, &data)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{detail}");
            assert!(body["detail"].as_str().unwrap().starts_with(detail), "{body}");
        }
    }

    #[tokio::test]
    async fn test_predict_not_ready() {
        let router = create_rest_router(testing::unready_engine(), 1 << 20);
        let (status, body) = send(router, predict_request("file", &testing::face_png())).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_predict_without_multipart_is_rejected() {
        let router = create_rest_router(testing::engine(vec![testing::FACE_ROW]), 1 << 20);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let (status, body) = send(router, request).await;
        assert!(status.is_client_error());
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn test_predict_timeout() {
        let engine = testing::slow_engine(Duration::from_millis(300), Duration::from_millis(20));
        let router = create_rest_router(engine, 1 << 20);
        let (status, _) = send(router, predict_request("file", &testing::face_png())).await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (PredictError::ServiceUnavailable("x".into()), StatusCode::SERVICE_UNAVAILABLE),
            (PredictError::InvalidImage("x".into()), StatusCode::BAD_REQUEST),
            (PredictError::NoFaceDetected, StatusCode::BAD_REQUEST),
            (PredictError::InferenceError("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&EngineError::Predict(err)).0, expected);
        }
        let timeout = EngineError::Timeout(Duration::from_secs(1));
        assert_eq!(status_for(&timeout).0, StatusCode::GATEWAY_TIMEOUT);
    }
}
