//! Paddy Inference API Server
//!
//! HTTP front end for the disease, variety and age predictors.

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use inference_engine::{ClassMappings, InitError, ModelRegistry, Predictor, Preprocessor};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod error;
mod routes;

use config::{AppConfig, LoggingConfig, ServerConfig};

pub use routes::health::HealthResponse;
pub use routes::predictions::PredictionResponse;

/// Application state shared across handlers
pub struct AppState {
    /// Prediction pipeline over the loaded models
    pub predictor: Predictor,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: Instant,
    /// Prometheus render handle, when metrics are enabled
    pub metrics: Option<PrometheusHandle>,
    /// Upper bound on a single prediction
    pub request_timeout: Option<Duration>,
    /// Maximum upload size
    pub body_limit_bytes: usize,
}

impl AppState {
    /// Create new application state
    pub fn new(predictor: Predictor, server: &ServerConfig) -> Self {
        Self {
            predictor,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
            metrics: None,
            request_timeout: server.request_timeout(),
            body_limit_bytes: server.body_limit_bytes,
        }
    }

    /// Attach a Prometheus handle for the /metrics route
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::health::health))
        .route("/metrics", get(routes::health::metrics))
        .route("/predict/disease", post(routes::predictions::predict_disease))
        .route("/predict/variety", post(routes::predictions::predict_variety))
        .route("/predict/age", post(routes::predictions::predict_age))
        .layer(DefaultBodyLimit::max(state.body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let builder = FmtSubscriber::builder()
        .with_max_level(config.max_level()?)
        .with_target(true);

    let installed = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    installed.context("Failed to set tracing subscriber")
}

/// Load mappings and models and assemble the shared state
///
/// Any failure here is fatal: the service never starts without all three
/// models and both mappings.
pub fn build_state(config: &AppConfig) -> Result<AppState, InitError> {
    let mappings = ClassMappings::load(
        &config.mappings.disease_path,
        &config.mappings.variety_path,
        &config.mappings.healthy_label,
    )?;
    info!(
        "Loaded class mappings: {} diseases, {} varieties",
        mappings.disease().len(),
        mappings.variety().len()
    );

    let registry = ModelRegistry::initialize(&config.models, &mappings)?;
    let predictor = Predictor::new(
        Arc::new(registry),
        Arc::new(mappings),
        Preprocessor::new(config.preprocess),
    );

    Ok(AppState::new(predictor, &config.server))
}

/// Run the server
pub async fn run_server(server: &ServerConfig, mut state: AppState) -> anyhow::Result<()> {
    if server.metrics {
        let handle = PrometheusBuilder::new().install_recorder()?;
        state = state.with_metrics(handle);
    }

    let app = create_router(Arc::new(state));

    info!("Starting API server on {}", server.bind);

    let listener = tokio::net::TcpListener::bind(&server.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
