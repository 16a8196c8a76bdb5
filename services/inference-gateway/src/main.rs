//! Inference gateway
//!
//! Single-binary service that:
//! 1. Loads TOML config and per-provider token lists
//! 2. Exposes image generation and prompt optimization over HTTP
//! 3. Rotates provider credentials via the rotation executor, persisting
//!    quota exhaustion per provider per billing day
//! 4. Serves token-pool health and Prometheus metrics

mod adapters;
mod config;
mod metrics;
mod tokens;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use provider::{AdapterError, CredentialPolicy};
use rotation::{Error as RotationError, ProviderProfile, RotationExecutor};
use serde::Deserialize;
use token_store::{FileBackend, TokenStore};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;

use crate::adapters::{ImageSpec, ModelScope, Pollinations, SiliconFlow};
use crate::config::Config;
use crate::tokens::TokenSource;

/// How long in-flight requests get to finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Rotation profiles for every shipped provider, built once at startup.
struct Profiles {
    pollinations: ProviderProfile,
    siliconflow: ProviderProfile,
    modelscope: ProviderProfile,
}

impl Profiles {
    fn new() -> Self {
        Self {
            pollinations: Pollinations::profile(),
            siliconflow: SiliconFlow::profile(),
            modelscope: ModelScope::profile(),
        }
    }

    fn iter(&self) -> [(&'static str, &ProviderProfile); 3] {
        [
            ("pollinations", &self.pollinations),
            ("siliconflow", &self.siliconflow),
            ("modelscope", &self.modelscope),
        ]
    }
}

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    executor: RotationExecutor,
    tokens: Arc<TokenSource>,
    profiles: Arc<Profiles>,
    pollinations: Arc<Pollinations>,
    siliconflow: Arc<SiliconFlow>,
    modelscope: Arc<ModelScope>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// Applies a concurrency limit layer based on `max_connections`.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/v1/images", post(image_handler))
        .route("/v1/prompts/optimize", post(optimize_handler))
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

    info!("starting inference-gateway");

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
        listen_addr = %config.gateway.listen_addr,
        state_dir = %config.gateway.state_dir.display(),
        "configuration loaded"
    );

    // Exhaustion store: file-backed when the state dir is writable,
    // in-memory otherwise. An unusable state dir costs exhaustion memory
    // across restarts, never availability.
    let store = match FileBackend::open(config.gateway.state_dir.clone()).await {
        Ok(backend) => TokenStore::new(Arc::new(backend)),
        Err(e) => {
            warn!(error = %e, "state dir unavailable, falling back to in-memory exhaustion store");
            TokenStore::in_memory()
        }
    };
    let executor = RotationExecutor::new(store);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.gateway.timeout_secs))
        .build()
        .context("building HTTP client")?;

    let state = AppState {
        executor,
        tokens: Arc::new(TokenSource::from_config(&config.providers)),
        profiles: Arc::new(Profiles::new()),
        pollinations: Arc::new(Pollinations::new(
            client.clone(),
            config.providers.pollinations.base_url.clone(),
        )),
        siliconflow: Arc::new(SiliconFlow::new(
            client.clone(),
            config.providers.siliconflow.base_url.clone(),
        )),
        modelscope: Arc::new(ModelScope::new(
            client,
            config.providers.modelscope.base_url.clone(),
        )),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(state, config.gateway.max_connections);

    let listener = TcpListener::bind(config.gateway.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.gateway.listen_addr))?;

    info!(addr = %config.gateway.listen_addr, "accepting requests");

    // Graceful shutdown with drain timeout enforcement:
    // 1. shutdown_signal() fires on SIGTERM/SIGINT
    // 2. axum stops accepting new connections and drains in-flight requests
    // 3. DRAIN_TIMEOUT bounds the drain so a slow upstream poll cannot
    //    block process exit
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
        Ok(Ok(Ok(()))) => info!("all in-flight requests drained"),
        Ok(Ok(Err(e))) => error!(error = %e, "server error during shutdown"),
        Ok(Err(e)) => error!(error = %e, "server task panicked"),
        Err(_) => warn!(
            drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
            "drain timeout exceeded, forcing shutdown"
        ),
    }

    info!("shutdown complete");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ImageApiRequest {
    /// Provider key; the anonymous-capable provider is the default.
    #[serde(default)]
    provider: Option<String>,
    #[serde(flatten)]
    spec: ImageSpec,
}

#[derive(Debug, Deserialize)]
struct OptimizeApiRequest {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

/// POST /v1/images: generate one image via the requested provider,
/// rotating that provider's tokens on quota failures.
async fn image_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<ImageApiRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let provider_key = body.provider.as_deref().unwrap_or("pollinations").to_string();
    let spec = body.spec;

    let result = match provider_key.as_str() {
        "pollinations" => {
            let adapter = state.pollinations.clone();
            let raw = state.tokens.resolve("pollinations");
            state
                .executor
                .execute(&state.profiles.pollinations, raw.as_deref(), |credential| {
                    let adapter = adapter.clone();
                    let spec = spec.clone();
                    async move { adapter.generate_image(credential.as_deref(), &spec).await }
                })
                .await
        }
        "siliconflow" => {
            let adapter = state.siliconflow.clone();
            let raw = state.tokens.resolve("siliconflow");
            state
                .executor
                .execute(&state.profiles.siliconflow, raw.as_deref(), |credential| {
                    let adapter = adapter.clone();
                    let spec = spec.clone();
                    async move { adapter.generate_image(credential.as_deref(), &spec).await }
                })
                .await
        }
        "modelscope" => {
            let adapter = state.modelscope.clone();
            let raw = state.tokens.resolve("modelscope");
            state
                .executor
                .execute(&state.profiles.modelscope, raw.as_deref(), |credential| {
                    let adapter = adapter.clone();
                    let spec = spec.clone();
                    async move { adapter.generate_image(credential.as_deref(), &spec).await }
                })
                .await
        }
        other => {
            let response = error_response(
                StatusCode::BAD_REQUEST,
                "unknown_provider",
                &format!("unknown provider: {other}"),
                &request_id,
            );
            metrics::record_request(
                "/v1/images",
                StatusCode::BAD_REQUEST.as_u16(),
                started.elapsed().as_secs_f64(),
            );
            return response;
        }
    };

    match result {
        Ok(image) => {
            metrics::record_request("/v1/images", 200, started.elapsed().as_secs_f64());
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({
                    "provider": provider_key,
                    "image": image,
                })),
            )
                .into_response()
        }
        Err(err) => {
            let (status, kind) = rotation_error_parts(&err);
            error!(provider = %provider_key, kind, error = %err, "image generation failed");
            metrics::record_request("/v1/images", status.as_u16(), started.elapsed().as_secs_f64());
            error_response(status, kind, &err.to_string(), &request_id)
        }
    }
}

/// POST /v1/prompts/optimize: rewrite a raw prompt through the streaming
/// provider, same rotation semantics as image generation.
async fn optimize_handler(
    State(state): State<AppState>,
    axum::Json(body): axum::Json<OptimizeApiRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());

    let adapter = state.siliconflow.clone();
    let raw = state.tokens.resolve("siliconflow");
    let result = state
        .executor
        .execute(&state.profiles.siliconflow, raw.as_deref(), |credential| {
            let adapter = adapter.clone();
            let prompt = body.prompt.clone();
            let model = body.model.clone();
            async move {
                adapter
                    .optimize_prompt(credential.as_deref(), &prompt, model.as_deref())
                    .await
            }
        })
        .await;

    match result {
        Ok(optimized) => {
            metrics::record_request(
                "/v1/prompts/optimize",
                200,
                started.elapsed().as_secs_f64(),
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "prompt": optimized })),
            )
                .into_response()
        }
        Err(err) => {
            let (status, kind) = rotation_error_parts(&err);
            error!(kind, error = %err, "prompt optimization failed");
            metrics::record_request(
                "/v1/prompts/optimize",
                status.as_u16(),
                started.elapsed().as_secs_f64(),
            );
            error_response(status, kind, &err.to_string(), &request_id)
        }
    }
}

/// GET /health: per-provider token stats and an overall status.
///
/// A provider is usable when it still has active tokens or accepts
/// anonymous calls. All usable → healthy, some → degraded, none →
/// unhealthy (503).
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();

    let mut providers = serde_json::Map::new();
    let mut usable_count = 0usize;
    let mut total_count = 0usize;

    for (key, profile) in state.profiles.iter() {
        let raw = state.tokens.resolve(key);
        let stats = state.executor.stats(profile, raw.as_deref()).await;
        let usable = stats.active > 0
            || matches!(profile.credential_policy, CredentialPolicy::Optional);

        total_count += 1;
        if usable {
            usable_count += 1;
        }

        providers.insert(
            key.to_string(),
            serde_json::json!({
                "total": stats.total,
                "exhausted": stats.exhausted,
                "active": stats.active,
                "usable": usable,
            }),
        );
    }

    let status = if usable_count == total_count {
        "healthy"
    } else if usable_count > 0 {
        "degraded"
    } else {
        "unhealthy"
    };

    let status_code = if usable_count > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = serde_json::json!({
        "status": status,
        "uptime_seconds": uptime,
        "providers": providers,
    });

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint, text exposition format.
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

/// Map a rotation error to an HTTP status and a stable error-type string
/// callers can branch on.
fn rotation_error_parts(err: &RotationError) -> (StatusCode, &'static str) {
    match err {
        RotationError::CredentialRequired(_) => (StatusCode::UNAUTHORIZED, "credential_required"),
        RotationError::CredentialsExhausted(_) => {
            (StatusCode::TOO_MANY_REQUESTS, "credentials_exhausted")
        }
        RotationError::Connectivity(_) => (StatusCode::BAD_GATEWAY, "connectivity_failure"),
        RotationError::Adapter(adapter_err) => match adapter_err {
            AdapterError::Upstream { status, .. } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                "upstream_error",
            ),
            AdapterError::QuotaExhausted(_) => (StatusCode::TOO_MANY_REQUESTS, "quota_exhausted"),
            AdapterError::InvalidResponse(_) => (StatusCode::BAD_GATEWAY, "invalid_response_shape"),
            AdapterError::Transport(_) => (StatusCode::BAD_GATEWAY, "connectivity_failure"),
            AdapterError::PollBudgetExceeded { .. } => {
                (StatusCode::GATEWAY_TIMEOUT, "poll_budget_exceeded")
            }
            AdapterError::StreamFailed(_) => (StatusCode::BAD_GATEWAY, "stream_error"),
            AdapterError::TaskFailed(_) => (StatusCode::BAD_GATEWAY, "task_failed"),
        },
    }
}

/// JSON error envelope: {"error":{"type":...,"message":...,"request_id":"req_..."}}
fn error_response(status: StatusCode, kind: &str, message: &str, request_id: &str) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": kind,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
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
