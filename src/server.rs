//! HTTP server.
//!
//! Serves both record instances over JSON while their watchers keep them
//! fresh in the background.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Status, version, per-instance rows and watcher state |
//! | `POST` | `/search` | Vector search over network logs, optional root-cause summary |
//! | `POST` | `/ask` | Filter path over trips, optional answer |
//! | `GET`  | `/metrics` | Last evaluation report |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "query must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_configured` (404), `no_data` (404),
//! `embedding_unavailable` (503), `internal` (500).

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use record_rag_core::eval::EvaluationRecord;
use record_rag_core::search::{log_context, LogFilter, SearchHit};
use record_rag_core::{LogRecord, RagError, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::ask::{answer_trip_question, TripAnswer};
use crate::config::Config;
use crate::embedding::Embedder;
use crate::evaluate::load_report;
use crate::generation::{create_generator, generate_answer, Answer, Generator, PromptKind};
use crate::instance::{open_logs, open_trips, Instance, LogInstance, TripInstance};
use crate::search::search_logs;
use crate::watcher::{Watcher, WatcherState};

/// Shared state passed to every handler.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    generator: Arc<dyn Generator>,
    logs: Option<Arc<LogInstance>>,
    trips: Option<Arc<TripInstance>>,
    logs_watcher: Option<watch::Receiver<WatcherState>>,
    trips_watcher: Option<watch::Receiver<WatcherState>>,
    started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: Arc<Config>, generator: Arc<dyn Generator>) -> Self {
        Self {
            config,
            generator,
            logs: None,
            trips: None,
            logs_watcher: None,
            trips_watcher: None,
            started_at: Utc::now(),
        }
    }

    pub fn with_logs(
        mut self,
        instance: Arc<LogInstance>,
        watcher: Option<watch::Receiver<WatcherState>>,
    ) -> Self {
        self.logs = Some(instance);
        self.logs_watcher = watcher;
        self
    }

    pub fn with_trips(
        mut self,
        instance: Arc<TripInstance>,
        watcher: Option<watch::Receiver<WatcherState>>,
    ) -> Self {
        self.trips = Some(instance);
        self.trips_watcher = watcher;
        self
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/search", post(handle_search))
        .route("/ask", post(handle_ask))
        .route("/metrics", get(handle_metrics))
        .layer(cors)
        .with_state(state)
}

/// Open the configured instances, start their watchers, and serve until
/// Ctrl-C. Watchers finish their current cycle before the process exits.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    if config.logs.is_none() && config.trips.is_none() {
        anyhow::bail!("Nothing to serve: configure [logs] and/or [trips]");
    }

    let config = Arc::new(config.clone());
    let embedder = Arc::new(Embedder::from_config(&config.embedding)?);
    let generator = create_generator(&config.generation);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut watchers = Vec::new();
    let mut state = AppState::new(config.clone(), generator);

    if config.logs.is_some() {
        let logs = Arc::new(open_logs(&config, embedder.clone()).await?);
        let watcher = Watcher::new(logs.as_ref(), &config.watcher);
        let rx = watcher.subscribe();
        watchers.push(tokio::spawn(watcher.run(shutdown_rx.clone())));
        state = state.with_logs(logs, Some(rx));
    }
    if config.trips.is_some() {
        let trips = Arc::new(open_trips(&config, embedder.clone()).await?);
        let watcher = Watcher::new(trips.as_ref(), &config.watcher);
        let rx = watcher.subscribe();
        watchers.push(tokio::spawn(watcher.run(shutdown_rx.clone())));
        state = state.with_trips(trips, Some(rx));
    }

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "listening");
    println!("Listening on http://{}", config.server.bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down watchers");
    let _ = shutdown_tx.send(true);
    for handle in watchers {
        if let Err(e) = handle.await {
            error!(error = %e, "watcher task panicked");
        }
    }
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_configured(instance: &str) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_configured",
        message: format!("[{}] instance is not configured", instance),
    }
}

/// Pick a status from the first [`RagError`] in the chain.
fn classify(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    let rag = err.chain().find_map(|c| c.downcast_ref::<RagError>());
    let (status, code) = match rag {
        Some(RagError::EmptyIndex) => (StatusCode::NOT_FOUND, "no_data"),
        Some(RagError::ModelUnavailable(_)) | Some(RagError::Embedding(_)) => {
            (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable")
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
    };
    if status.is_server_error() {
        error!(error = %message, "request failed");
    }
    AppError {
        status,
        code,
        message,
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    started_at: DateTime<Utc>,
    instances: Vec<InstanceHealth>,
}

#[derive(Serialize)]
struct InstanceHealth {
    name: String,
    rows: usize,
    dimension: usize,
    version: u64,
    watcher: Option<WatcherState>,
}

fn instance_health<R: Record + DeserializeOwned>(
    instance: &Instance<R>,
    watcher: &Option<watch::Receiver<WatcherState>>,
) -> InstanceHealth {
    let corpus = instance.corpus().load();
    InstanceHealth {
        name: instance.name().to_string(),
        rows: corpus.len(),
        dimension: corpus.dimension(),
        version: corpus.version(),
        watcher: watcher.as_ref().map(|rx| *rx.borrow()),
    }
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut instances = Vec::new();
    if let Some(logs) = &state.logs {
        instances.push(instance_health(logs.as_ref(), &state.logs_watcher));
    }
    if let Some(trips) = &state.trips {
        instances.push(instance_health(trips.as_ref(), &state.trips_watcher));
    }
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        started_at: state.started_at,
        instances,
    })
}

// ============ POST /search ============

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
    pub node: Option<String>,
    pub severity: Option<String>,
    pub alarm_code: Option<String>,
    #[serde(default)]
    pub summarize: bool,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit<LogRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<Answer>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    let logs = state.logs.as_ref().ok_or_else(|| not_configured("logs"))?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    let k = req.k.unwrap_or(state.config.retrieval.top_k);
    if k == 0 {
        return Err(bad_request("k must be >= 1"));
    }

    let filter = LogFilter {
        node_id: req.node,
        severity: req.severity,
        alarm_code: req.alarm_code,
    };
    let results = search_logs(logs, &req.query, k, &filter)
        .await
        .map_err(classify)?;

    let answer = if req.summarize {
        Some(
            generate_answer(
                state.generator.as_ref(),
                &log_context(&results),
                &req.query,
                PromptKind::RootCause,
            )
            .await,
        )
    } else {
        None
    };

    Ok(Json(SearchResponse { results, answer }))
}

// ============ POST /ask ============

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub query: String,
    #[serde(default)]
    pub summarize: bool,
}

#[derive(Serialize)]
struct AskResponse {
    #[serde(flatten)]
    trip: TripAnswer,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<Answer>,
}

async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    let trips = state.trips.as_ref().ok_or_else(|| not_configured("trips"))?;
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }

    let trip = answer_trip_question(trips, &req.query, state.config.retrieval.top_k)
        .await
        .map_err(classify)?;
    let message = trip.is_empty().then(|| trip.no_results_message());
    let answer = if req.summarize {
        Some(trip.summarize(state.generator.as_ref()).await)
    } else {
        None
    };

    Ok(Json(AskResponse {
        trip,
        message,
        answer,
    }))
}

// ============ GET /metrics ============

#[derive(Serialize)]
struct MetricsResponse {
    available: bool,
    report_path: String,
    records: Vec<EvaluationRecord>,
}

async fn handle_metrics(State(state): State<AppState>) -> Result<Json<MetricsResponse>, AppError> {
    let path = &state.config.evaluation.report_path;
    let report = load_report(path).map_err(classify)?;
    Ok(Json(MetricsResponse {
        available: report.is_some(),
        report_path: path.display().to_string(),
        records: report.unwrap_or_default(),
    }))
}
