use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use photo_analysis_jobs::app_state::AppState;
use photo_analysis_jobs::config::AppConfig;
use photo_analysis_jobs::db::{self, PgStore};
use photo_analysis_jobs::routes::{self, auth::AuthConfig};
use photo_analysis_jobs::services::compute::ComputeWorkerClient;
use photo_analysis_jobs::services::dispatcher::{run_dispatch_loop, BatchDispatcher};
use photo_analysis_jobs::services::orchestrator::JobOrchestrator;
use photo_analysis_jobs::services::recorder::OutcomeRecorder;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing photo-analysis-jobs server");

    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe_metrics();

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let store = Arc::new(PgStore::new(db_pool, config.item_insert_chunk_size));

    tracing::info!(url = %config.compute_worker_url, "Initializing compute worker client");
    let compute = ComputeWorkerClient::new(&config.compute_worker_url, config.dispatch_timeout())
        .expect("Failed to initialize compute worker client");

    let (dispatcher, dispatch_rx) =
        BatchDispatcher::channel(config.dispatch_queue_capacity, config.dispatch_chunk_size);
    tokio::spawn(run_dispatch_loop(dispatch_rx, Arc::new(compute)));

    let orchestrator = JobOrchestrator::new(store.clone(), store.clone(), dispatcher)
        .with_stale_after(config.stale_after());
    let recorder = OutcomeRecorder::new(store.clone(), store);
    let auth = AuthConfig::new(config.jwt_secret.clone(), config.worker_token.clone());

    let state = AppState::new(orchestrator, recorder, auth);

    let app = routes::router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024));

    tracing::info!("Starting photo-analysis-jobs on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
