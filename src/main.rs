use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use site_photo_verify::app_state::AppState;
use site_photo_verify::config::AppConfig;
use site_photo_verify::db::{self, PgJobStore};
use site_photo_verify::routes;
use site_photo_verify::services::executor::PipelineExecutor;
use site_photo_verify::services::ocr::{SharedRecognizer, TextRecognizer, WorkersAiClient};
use site_photo_verify::services::pipeline::PipelineContext;
use site_photo_verify::services::replies::PromptCatalog;
use site_photo_verify::services::sealing::ImageSealer;
use site_photo_verify::services::storage::R2Client;
use site_photo_verify::services::twilio::TwilioClient;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");
    let templates = config.templates().expect("Invalid CATEGORY_TEMPLATES");

    tracing::info!("Initializing site-photo-verify server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);
    routes::metrics::describe();

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Initializing R2 storage client");
    let r2_client = R2Client::new(
        &config.r2_bucket,
        &config.r2_endpoint,
        &config.r2_access_key,
        &config.r2_secret_key,
    )
    .expect("Failed to initialize R2 client");

    tracing::info!("Initializing AES-256-GCM photo sealing");
    let sealer =
        ImageSealer::from_base64_key(&config.encryption_key).expect("Failed to initialize sealing");

    tracing::info!("Initializing Twilio WhatsApp transport");
    let twilio = Arc::new(
        TwilioClient::new(
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_from_number,
        )
        .expect("Failed to initialize Twilio client"),
    );

    // Built on the first photo that needs text recognition
    let (cf_account, cf_token) = (config.cf_account_id.clone(), config.cf_api_token.clone());
    let recognizer = SharedRecognizer::lazy(move || {
        let client = WorkersAiClient::new(&cf_account, &cf_token)?;
        Ok(Arc::new(client) as Arc<dyn TextRecognizer>)
    });

    let ctx = PipelineContext {
        store: Arc::new(PgJobStore::new(db_pool)),
        blobs: Arc::new(r2_client),
        sealer: Arc::new(sealer),
        fetcher: twilio.clone(),
        notifier: twilio,
        recognizer: Arc::new(recognizer),
        catalog: PromptCatalog {
            example_url_label: config.example_url_label.clone(),
            example_url_azimuth: config.example_url_azimuth.clone(),
        },
    };
    let executor = PipelineExecutor::new(Arc::new(ctx));
    let state = AppState::new(executor, templates, config.thresholds());
    let executor = state.executor.clone();

    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(1024 * 1024)); // 1 MB, webhooks are form posts

    tracing::info!("Starting site-photo-verify on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Draining in-flight photos");
    executor.wait_idle().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
