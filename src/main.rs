use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use domain_lookup::{
    config::Config,
    dns::HickoryDnsGateway,
    errors::LookupError,
    lookup::{LookupResponse, LookupService, LookupSource, SystemClock},
    metrics,
    store::SqliteRecordStore,
    whois::TcpWhoisGateway,
};

#[derive(Clone)]
struct AppState {
    lookup_service: Arc<LookupService>,
    config: Arc<Config>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "domain_lookup=info,tower_http=debug".into()),
        )
        .init();

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!("Configuration loaded successfully");

    // Wire up the lookup service
    let store = Arc::new(SqliteRecordStore::connect(&config.database_url).await?);
    let dns = Arc::new(HickoryDnsGateway::new(Duration::from_secs(
        config.dns_timeout_seconds,
    )));
    let whois = Arc::new(TcpWhoisGateway::new(&config));
    let lookup_service = Arc::new(LookupService::new(store, dns, whois, Arc::new(SystemClock)));

    // Initialize metrics
    metrics::init_metrics();

    let app_state = AppState {
        lookup_service,
        config: config.clone(),
    };

    // Build the application
    let app = Router::new()
        .route("/api/domain/:domain_name", get(domain_lookup_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .into_inner(),
        )
        .with_state(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Domain lookup service listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    // Graceful shutdown handling
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C signal handler");
        info!("Received shutdown signal, gracefully shutting down...");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    Ok(())
}

async fn domain_lookup_handler(
    Path(domain_name): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<LookupResponse>, LookupError> {
    let start_time = Instant::now();
    metrics::increment_requests(&domain_name);

    let response = match state.lookup_service.lookup(&domain_name).await {
        Ok(response) => response,
        Err(err) => {
            metrics::increment_errors(err.kind());
            return Err(err);
        }
    };

    match response.source {
        LookupSource::Cache => metrics::increment_cache_hits(),
        LookupSource::External => metrics::increment_cache_misses(),
    }
    metrics::record_request_time(start_time.elapsed().as_millis() as u64);

    Ok(Json(response))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.config.start_time.elapsed().as_secs(),
    })
}
