//! DocuGrade API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Authentication and authorization
//! - Rate limiting
//! - Request routing
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    extract::FromRef,
    routing::{delete, get, post},
    Router,
};
use docugrade_common::{
    analyzer::{create_analyzer, Analyzer},
    config::{AppConfig, ObservabilityConfig},
    db::{DbPool, EntityStore, MemoryStore, Repository},
    metrics as app_metrics,
    storage::FileStorage,
};
use docugrade_orchestrator::{DocumentAnalyzer, JobManager, SubmissionAnalyzer, WorkerPool};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::middleware::rate_limit::{create_rate_limiter, GlobalRateLimiter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn EntityStore>,
    pub storage: FileStorage,
    pub jobs: Arc<JobManager>,
    pub submissions: SubmissionAnalyzer,
    pub pool: Arc<WorkerPool>,
    pub limiter: Arc<GlobalRateLimiter>,
}

// Lets the auth extractor reach the JWT configuration
impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize tracing
    init_tracing(&config.observability);

    info!("Starting DocuGrade API Gateway v{}", docugrade_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let metrics_addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
    }
    app_metrics::register_metrics();

    // Initialize the entity store
    let store: Arc<dyn EntityStore> = match config.store.provider.as_str() {
        "memory" => {
            warn!("Using in-memory store; data will not survive a restart");
            Arc::new(MemoryStore::new())
        }
        _ => {
            info!("Connecting to database...");
            let db = DbPool::new(&config.store).await?;
            Arc::new(Repository::new(db))
        }
    };

    // Initialize file storage
    let storage = FileStorage::new(&config.storage);
    storage.init().await?;

    // Initialize the analyzer client and wait for the service to come up
    let analyzer: Arc<dyn Analyzer> = create_analyzer(&config.analyzer)?;
    if let Err(e) = analyzer.wait_until_ready().await {
        warn!(error = %e, "Analyzer service not ready at startup, analyses will fail until it is");
    }

    // Shutdown signal observed by long-running orchestration loops
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Wire up the orchestration core
    let pool = Arc::new(WorkerPool::new(
        config.orchestrator.max_workers,
        config.orchestrator.queue_capacity,
    ));
    let documents = Arc::new(DocumentAnalyzer::new(
        store.clone(),
        analyzer.clone(),
        storage.clone(),
    ));
    let jobs = Arc::new(JobManager::new(
        store.clone(),
        analyzer.clone(),
        storage.clone(),
        config.orchestrator.clone(),
    ));
    let submissions = SubmissionAnalyzer::new(
        store.clone(),
        documents,
        storage.clone(),
        pool.clone(),
        config.orchestrator.clone(),
        shutdown_rx,
    );

    let limiter = create_rate_limiter(
        config.rate_limit.requests_per_second,
        config.rate_limit.burst,
    );

    // Create app state
    let state = AppState {
        config: config.clone(),
        store,
        storage,
        jobs,
        submissions,
        pool,
        limiter,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Propagate the OS signal to orchestration loops, then drain connections
    let shutdown = async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
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

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Document endpoints
        .route("/documents", post(handlers::documents::upload_document))
        .route("/documents", get(handlers::documents::list_documents))
        .route("/documents/{id}", get(handlers::documents::get_document))
        .route("/documents/{id}", delete(handlers::documents::delete_document))
        .route("/documents/{id}/analyze", post(handlers::documents::analyze_document))
        // Submission endpoints
        .route("/submissions", post(handlers::submissions::create_submission))
        .route("/submissions", get(handlers::submissions::list_submissions))
        .route("/submissions/{id}", get(handlers::submissions::get_submission))
        .route("/submissions/{id}", delete(handlers::submissions::delete_submission))
        .route("/submissions/{id}/analyze", post(handlers::submissions::analyze_submission))
        // Submission slot endpoints
        .route("/slots", post(handlers::slots::create_slot))
        .route("/slots", get(handlers::slots::list_slots))
        .route("/slots/{id}", get(handlers::slots::get_slot))
        // Job endpoints
        .route("/jobs/{id}", get(handlers::jobs::get_job));

    // Compose the app
    Router::new()
        .nest("/v1", api_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
