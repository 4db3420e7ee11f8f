//! DocQA Gateway
//!
//! HTTP entry point for the document question-answering assistant.
//! Handles:
//! - Document upload, listing, and selection
//! - Questions and chat history
//! - Observability (logging, metrics, request ids)

mod assistant;
mod handlers;
mod middleware;

use assistant::Assistant;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use docqa_common::{
    answer::AnsweringPipeline,
    completion::ChatCompletionClient,
    config::{AppConfig, ObservabilityConfig},
    embeddings::create_embedder,
    metrics,
};
use docqa_ingestion::{ChunkingConfig, DocumentStore};
use docqa_search::VectorRetriever;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::Mutex};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    /// One interaction at a time
    pub assistant: Arc<Mutex<Assistant>>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.observability);

    info!(
        service = %config.observability.service_name,
        "Starting DocQA Gateway v{}",
        docqa_common::VERSION
    );

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;
    let config = Arc::new(config);

    init_metrics(&config.observability)?;

    // Collaborators
    let completer = Arc::new(ChatCompletionClient::new(&config.completion)?);
    let pipeline = AnsweringPipeline::new(completer, config.completion.model.clone());
    let embedder = create_embedder(&config.embedding)?;
    let retriever = Arc::new(VectorRetriever::new(
        embedder,
        ChunkingConfig::from(&config.retrieval),
        config.retrieval.top_k,
    ));
    let store = DocumentStore::from_config(&config.storage);
    info!(
        working_dir = %store.working_dir().display(),
        fallback_dir = %store.fallback_dir().display(),
        model = %config.completion.model,
        "Collaborators ready"
    );

    let state = AppState {
        config: config.clone(),
        assistant: Arc::new(Mutex::new(Assistant::new(store, retriever, pipeline))),
    };

    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let shutdown = tokio::time::timeout(config.shutdown_timeout(), async {
        state.assistant.lock().await.release()
    })
    .await;
    match shutdown {
        Ok(Ok(())) => info!("Working directory released"),
        Ok(Err(e)) => warn!(error = %e, "Failed to release working directory"),
        Err(_) => warn!("Timed out releasing working directory"),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &ObservabilityConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logging,
        "Logging initialised"
    );
}

/// Install the Prometheus exporter; port 0 disables it
fn init_metrics(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.metrics_port == 0 {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Suffix("completion_duration_seconds".to_string()),
            metrics::COMPLETION_BUCKETS,
        )?
        .install()?;

    metrics::register_metrics();
    info!(%addr, "Metrics exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route(
            "/documents",
            post(handlers::documents::upload_documents).get(handlers::documents::list_documents),
        )
        .route(
            "/documents/{name}/select",
            post(handlers::documents::select_document),
        )
        .route("/history", get(handlers::history::history))
        .route("/ask", post(handlers::ask::ask));

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_bytes))
        .layer(timeout_layer(state.config.request_timeout()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Requests running past `timeout` are answered with 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
