//! Knowgap API Gateway
//!
//! The external surface of the knowledge-gap engine:
//! - Chat retrieval with the detached unanswered-recording path
//! - Gap review (clusters, orphan groups, dismissal)
//! - Resolution workflow
//! - Observability (logging, metrics, health probes)

mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use knowgap_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    metrics,
};
use knowgap_engine::cluster::{create_centroid_policy, create_labeler};
use knowgap_engine::hooks::{create_alert_channel, create_pipeline};
use knowgap_engine::store::PgClusterStore;
use knowgap_engine::{GapEngine, PgResponseCorpus, ResolutionWorkflow, RetrievalService};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
    pub retrieval: Arc<RetrievalService>,
    pub engine: Arc<GapEngine>,
    pub resolver: Arc<ResolutionWorkflow>,
}

// Lets the auth extractor resolve API keys against the tenant table
impl axum::extract::FromRef<AppState> for Repository {
    fn from_ref(state: &AppState) -> Repository {
        Repository::new(state.db.clone())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Knowgap API Gateway v{}", knowgap_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    if config.observability.metrics_port > 0 {
        let metrics_addr =
            SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()?;
        info!("Metrics exporter listening on {}", metrics_addr);
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repo = Repository::new(db.clone());

    // Wire the engine
    let embedder = create_embedder(&config.embedding)?;
    let store = Arc::new(PgClusterStore::new(repo.clone()));
    let labeler = create_labeler(&config.labeling);
    let alerts = create_alert_channel(&config.hooks);
    let pipeline = create_pipeline(&config.hooks);
    let centroid_policy = create_centroid_policy(&config.clustering.centroid_policy);

    let retrieval = Arc::new(RetrievalService::new(
        Arc::new(repo.clone()),
        embedder.clone(),
        config.retrieval.clone(),
    ));
    let engine = Arc::new(GapEngine::new(
        store.clone(),
        embedder,
        labeler,
        alerts,
        centroid_policy,
        config.clustering.clone(),
        config.labeling.max_label_chars,
    ));
    let resolver = Arc::new(ResolutionWorkflow::new(
        store,
        Arc::new(PgResponseCorpus::new(repo)),
        pipeline,
    ));

    // Create app state
    let state = AppState {
        config: config.clone(),
        db,
        retrieval,
        engine,
        resolver,
    };

    // Build the router
    let app = create_router(state);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
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

    // API routes
    let api_routes = Router::new()
        // Chat endpoint
        .route("/chat/retrieve", post(handlers::chat::retrieve))
        // Gap review endpoints
        .route("/gaps/clusters", get(handlers::clusters::list_clusters))
        .route("/gaps/clusters/label", post(handlers::clusters::label_clusters))
        .route(
            "/gaps/questions/{id}",
            delete(handlers::clusters::dismiss_question),
        )
        // Resolution endpoint
        .route("/gaps/resolve", post(handlers::resolve::resolve));

    // Compose the app
    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
