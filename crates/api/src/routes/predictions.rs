//! Prediction Routes

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use inference_engine::{
    AgePrediction, DiseasePrediction, PredictError, Predictor, Task, VarietyPrediction,
};
use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::error::ApiError;
use crate::AppState;

/// Multipart field carrying the upload
pub const UPLOAD_FIELD: &str = "file";

/// Response envelope for prediction endpoints
#[derive(Debug, Serialize)]
pub struct PredictionResponse<T> {
    pub status: &'static str,
    pub result: T,
    pub message: String,
}

impl<T> PredictionResponse<T> {
    fn success(task: Task, result: T) -> Self {
        Self {
            status: "success",
            result,
            message: format!("{} prediction completed successfully", task.title()),
        }
    }
}

/// Predict whether the plant is healthy and which disease it shows
pub async fn predict_disease(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse<DiseasePrediction>>, ApiError> {
    let image = read_upload(multipart?).await?;
    let result = run_prediction(&state, Task::Disease, image, |predictor, bytes| {
        predictor.predict_disease(bytes)
    })
    .await?;

    Ok(Json(PredictionResponse::success(Task::Disease, result)))
}

/// Identify the paddy variety
pub async fn predict_variety(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse<VarietyPrediction>>, ApiError> {
    let image = read_upload(multipart?).await?;
    let result = run_prediction(&state, Task::Variety, image, |predictor, bytes| {
        predictor.predict_variety(bytes)
    })
    .await?;

    Ok(Json(PredictionResponse::success(Task::Variety, result)))
}

/// Predict the plant age in days
pub async fn predict_age(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResponse<AgePrediction>>, ApiError> {
    let image = read_upload(multipart?).await?;
    let result = run_prediction(&state, Task::Age, image, |predictor, bytes| {
        predictor.predict_age(bytes)
    })
    .await?;

    Ok(Json(PredictionResponse::success(Task::Age, result)))
}

/// Pull the `file` field out of the form, accepting only `image/*` uploads
async fn read_upload(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|ct| ct.starts_with("image/"));
        if !is_image {
            return Err(ApiError::NotAnImage);
        }

        let bytes = field.bytes().await?;
        debug!("Received upload of {} bytes", bytes.len());
        return Ok(bytes);
    }

    Err(ApiError::MissingFile)
}

/// Run a prediction on the blocking pool and record its outcome
async fn run_prediction<T, F>(
    state: &AppState,
    task: Task,
    image: Bytes,
    predict: F,
) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Predictor, &[u8]) -> Result<T, PredictError> + Send + 'static,
{
    let predictor = state.predictor.clone();
    let start = Instant::now();

    let handle = tokio::task::spawn_blocking(move || predict(&predictor, &image[..]));
    let joined = match state.request_timeout {
        // The blocking pass keeps running; only the wait is abandoned
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => {
                record_outcome(task, "failure", start);
                return Err(ApiError::Timeout(limit));
            }
        },
        None => handle.await,
    };

    let result = match joined {
        Ok(result) => result.map_err(ApiError::from),
        Err(e) => Err(ApiError::Internal(format!("prediction task failed: {}", e))),
    };
    let outcome = if result.is_ok() { "success" } else { "failure" };
    record_outcome(task, outcome, start);

    result
}

fn record_outcome(task: Task, outcome: &'static str, start: Instant) {
    counter!("paddy_predictions_total", "task" => task.as_str(), "outcome" => outcome).increment(1);
    histogram!("paddy_prediction_seconds", "task" => task.as_str())
        .record(start.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use crate::config::ServerConfig;
    use crate::{create_router, AppState};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use inference_engine::testing::{mappings, StubModel};
    use inference_engine::{ModelRegistry, Predictor, Preprocessor};
    use serde_json::Value;
    use std::io::Cursor;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const BOUNDARY: &str = "paddy-test-boundary";

    struct Fixture {
        app: Router,
        disease: Arc<StubModel>,
    }

    fn fixture(age_output: f32) -> Fixture {
        fixture_with(StubModel::fixed(vec![age_output]), ServerConfig::default())
    }

    fn fixture_with(age: StubModel, server: ServerConfig) -> Fixture {
        let disease = Arc::new(StubModel::fixed(vec![0.1, 0.7, 0.2]));
        let registry = ModelRegistry::from_models(
            disease.clone(),
            Arc::new(StubModel::fixed(vec![0.6, 0.3, 0.1])),
            Arc::new(age),
        );
        let predictor = Predictor::new(
            Arc::new(registry),
            Arc::new(mappings(&["blast", "normal", "tungro"], &["ADT45", "IR20", "Ponni"])),
            Preprocessor::default(),
        );
        let state = AppState::new(predictor, &server);

        Fixture {
            app: create_router(Arc::new(state)),
            disease,
        }
    }

    /// Age model that outlives a one-second request timeout
    fn slow_age_fixture() -> Fixture {
        let age = StubModel::from_fn(|_| {
            std::thread::sleep(Duration::from_millis(1500));
            Ok(vec![30.0])
        });
        let server = ServerConfig {
            request_timeout_secs: Some(1),
            ..ServerConfig::default()
        };
        fixture_with(age, server)
    }

    fn png() -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(48, 32, Rgb([30, 160, 40])));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn upload(uri: &str, field: &str, content_type: &str, body: &[u8]) -> Request<Body> {
        let mut data = format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"leaf.png\"\r\nContent-Type: {}\r\n\r\n",
            BOUNDARY, field, content_type
        )
        .into_bytes();
        data.extend_from_slice(body);
        data.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(data))
            .unwrap()
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_disease_endpoint() {
        let fx = fixture(30.0);
        let (status, json) = send(
            fx.app,
            upload("/predict/disease", "file", "image/png", &png()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "success");
        assert_eq!(json["message"], "Disease prediction completed successfully");
        assert_eq!(json["result"]["disease"], "normal");
        assert_eq!(json["result"]["is_healthy"], true);
        let confidence = json["result"]["confidence"].as_f64().unwrap();
        assert!((confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_variety_endpoint() {
        let fx = fixture(30.0);
        let (status, json) = send(
            fx.app,
            upload("/predict/variety", "file", "image/jpeg", &png()),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["variety"], "ADT45");
        assert!(json["result"].get("is_healthy").is_none());
    }

    #[tokio::test]
    async fn test_age_endpoint_returns_raw_value() {
        let fx = fixture(-5.0);
        let (status, json) = send(fx.app, upload("/predict/age", "file", "image/png", &png())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["result"]["age_days"], -5.0);
        assert_eq!(json["message"], "Age prediction completed successfully");
    }

    #[tokio::test]
    async fn test_non_image_content_type_rejected_before_inference() {
        let fx = fixture(30.0);
        let (status, json) = send(
            fx.app,
            upload("/predict/disease", "file", "text/plain", &png()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "File must be an image");
        assert_eq!(fx.disease.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let fx = fixture(30.0);
        let (status, json) = send(
            fx.app,
            upload("/predict/disease", "photo", "image/png", &png()),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["detail"], "No file uploaded");
    }

    #[tokio::test]
    async fn test_undecodable_image_is_server_error() {
        let fx = fixture(30.0);
        let (status, json) = send(
            fx.app,
            upload("/predict/disease", "file", "image/png", b"not really a png"),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.starts_with("disease prediction failed: decode error"), "{}", detail);
        assert_eq!(fx.disease.calls(), 0);
    }

    #[tokio::test]
    async fn test_health_check() {
        let fx = fixture(30.0);
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, json) = send(fx.app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_prediction_timeout() {
        let fx = slow_age_fixture();
        let (status, json) = send(fx.app, upload("/predict/age", "file", "image/png", &png())).await;

        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(json["detail"], "Prediction timed out after 1s");
    }

    #[test]
    fn test_timeout_recorded_as_failure() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let fx = slow_age_fixture();
        let request = upload("/predict/age", "file", "image/png", &png());
        let (status, _) =
            metrics::with_local_recorder(&recorder, || runtime.block_on(send(fx.app, request)));
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

        let rendered = handle.render();
        let failures = rendered
            .lines()
            .find(|line| {
                line.starts_with("paddy_predictions_total{")
                    && line.contains(r#"task="age""#)
                    && line.contains(r#"outcome="failure""#)
            })
            .unwrap_or_else(|| panic!("no failure counter in:\n{}", rendered));
        assert!(failures.ends_with(" 1"), "{}", failures);
    }

    #[tokio::test]
    async fn test_non_multipart_request_gets_json_detail() {
        let fx = fixture(30.0);
        let request = Request::builder()
            .method("POST")
            .uri("/predict/variety")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"file": "leaf.png"}"#))
            .unwrap();
        let (status, json) = send(fx.app, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["detail"].as_str().unwrap().starts_with("Invalid form"), "{}", json);
        assert_eq!(fx.disease.calls(), 0);
    }
}
