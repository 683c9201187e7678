//! Stability Art Proxy
//!
//! Single-binary Rust service that:
//! 1. Loads a pool of Stability API keys from configuration
//! 2. Accepts image-generation requests over HTTP
//! 3. Dispatches each request through the key pool, rotating past
//!    exhausted keys
//! 4. Persists the returned image and replies with its location

mod artifact;
mod config;
mod metrics;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use keypool::{DispatchResult, KeyPool, RejectReason};
use stability::{ExhaustionMatcher, GenerationRequest, ImageBackend, StabilityBackend};

use crate::artifact::ArtifactStore;
use crate::config::Config;

/// How long to wait for in-flight generations after the shutdown signal.
/// Upstream calls can run tens of seconds, so this is generous.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    pool: Arc<KeyPool>,
    backend: Arc<dyn ImageBackend>,
    matcher: Arc<ExhaustionMatcher>,
    store: ArtifactStore,
    requests_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`; excess
/// requests queue rather than piling onto the upstream.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/generate-art", post(generate_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting stability-art-proxy");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        upstream_url = %config.upstream.url,
        model = %config.upstream.model,
        keys = config.keys.len(),
        "configuration loaded"
    );

    let pool = Arc::new(KeyPool::new(config.keys).context("building key pool")?);

    let store = ArtifactStore::new(config.artifacts.dir.clone());
    store
        .init()
        .await
        .with_context(|| format!("creating artifact dir {}", config.artifacts.dir.display()))?;

    let backend: Arc<dyn ImageBackend> = Arc::new(StabilityBackend::new(
        reqwest::Client::new(),
        config.upstream.url.clone(),
        config.upstream.model.clone(),
        Duration::from_secs(config.upstream.timeout_secs),
    ));

    let app_state = AppState {
        pool,
        backend,
        matcher: Arc::new(ExhaustionMatcher::default()),
        store,
        requests_total: Arc::new(AtomicU64::new(0)),
        errors_total: Arc::new(AtomicU64::new(0)),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.server.max_connections);

    let listener = TcpListener::bind(config.server.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.server.listen_addr))?;

    info!(addr = %config.server.listen_addr, "accepting requests");

    // Graceful shutdown:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow upstream cannot block exit
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// JSON error response: {"error":"...","request_id":"req_..."}
fn error_response(status: StatusCode, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": message,
        "request_id": request_id,
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// POST /generate-art — run one generation through the key pool.
async fn generate_handler(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let started = Instant::now();
    state.requests_total.fetch_add(1, Ordering::Relaxed);

    info!(
        request_id = %request_id,
        seed = request.seed,
        output_format = %request.output_format,
        "generation request received"
    );

    let result = keypool::dispatch(
        &request,
        &state.pool,
        state.backend.as_ref(),
        &state.matcher,
    )
    .await;
    let duration = started.elapsed().as_secs_f64();

    match result {
        DispatchResult::Delivered(image) => {
            match state
                .store
                .save(&image.bytes, image.seed, &request.output_format)
                .await
            {
                Ok(location) => {
                    metrics::record_request("delivered", duration);
                    let body = serde_json::json!({
                        "image_url": format!("/{}", location.trim_start_matches('/')),
                        "seed": image.seed,
                    });
                    (
                        StatusCode::OK,
                        [(axum::http::header::CONTENT_TYPE, "application/json")],
                        body.to_string(),
                    )
                        .into_response()
                }
                Err(e) => {
                    state.errors_total.fetch_add(1, Ordering::Relaxed);
                    metrics::record_request("sink_error", duration);
                    error!(request_id = %request_id, error = %e, "failed to persist artifact");
                    error_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        &format!("failed to persist artifact: {e}"),
                        &request_id,
                    )
                }
            }
        }
        DispatchResult::Rejected(RejectReason::ContentFiltered) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_request("content_filtered", duration);
            error_response(
                StatusCode::BAD_REQUEST,
                "Generation failed (content filter).",
                &request_id,
            )
        }
        DispatchResult::Rejected(RejectReason::Upstream(message)) => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_request("rejected", duration);
            error!(request_id = %request_id, error = %message, "generation rejected");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &format!("API Error: {message}"),
                &request_id,
            )
        }
        DispatchResult::AllExhausted => {
            state.errors_total.fetch_add(1, Ordering::Relaxed);
            metrics::record_request("exhausted", duration);
            warn!(request_id = %request_id, "every key failed the billing check");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "All available API keys have reached their billing limit.",
                &request_id,
            )
        }
    }
}

/// Health endpoint: pool size, cursor position, uptime, request counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let body = serde_json::json!({
        "status": "healthy",
        "keys_total": state.pool.len(),
        "cursor": state.pool.snapshot(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "requests_served": state.requests_total.load(Ordering::Relaxed),
        "errors_total": state.errors_total.load(Ordering::Relaxed),
    });
    (
        StatusCode::OK,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint — returns metrics in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
