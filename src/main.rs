// =============================================================================
// HOTEL BOOKING SERVICE - Main Entry Point
// =============================================================================
// WHAT THIS SERVICE DOES:
// - Serves the room catalog
// - Quotes stays: per-night availability against room capacity, plus cost
// - Starts and verifies Paystack payments, and accepts signed Paystack webhooks
// - Persists bookings, lets staff assign room numbers
// - Lists paid transactions that never produced a booking (reconciliation)
// - Exposes Prometheus metrics
// =============================================================================

// -----------------------------------------------------------------------------
// MODULE DECLARATIONS
// -----------------------------------------------------------------------------
mod auth;          // Subject extraction and role checks (auth.rs)
mod availability;  // Date ranges, inventory index, availability (availability.rs)
mod booking;       // Booking builder and domain errors (booking.rs)
mod cache;         // Redis cache (cache.rs)
mod checkout;      // Booking flow orchestration (checkout.rs)
mod config;        // Configuration loading (config.rs)
mod db;            // PostgreSQL store (db.rs)
mod error;         // HTTP error type (error.rs)
mod flow;          // Booking flow state machine (flow.rs)
mod handlers;      // HTTP request handlers (handlers.rs)
mod metrics;       // Prometheus metrics setup (metrics.rs)
mod models;        // Data structures (models.rs)
mod payments;      // Paystack client and webhook signatures (payments.rs)
mod pricing;       // Cost calculation (pricing.rs)
mod store;         // Store trait and in-memory store (store.rs)


use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::Database;
use crate::metrics::setup_metrics;
use crate::payments::{PaymentGateway, PaystackClient};
use crate::store::{BookingStore, InMemoryStore};

// -----------------------------------------------------------------------------
// APPLICATION STATE
// -----------------------------------------------------------------------------
// Built once in main and shared with every handler through State<Arc<AppState>>.
// Dropped when the server shuts down.
pub struct AppState {
    pub config: Config,

    /// Booking persistence (PostgreSQL or in-memory)
    pub store: Arc<dyn BookingStore>,

    /// Payment gateway (Paystack)
    pub payments: Arc<dyn PaymentGateway>,

    /// Best-effort Redis cache
    pub cache: Cache,

    /// Prometheus metrics handle
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

// -----------------------------------------------------------------------------
// ROUTES
// -----------------------------------------------------------------------------
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ----- Health & Readiness Endpoints -----
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        // ----- Catalog -----
        .route("/api/v1/rooms", get(handlers::list_rooms))
        .route("/api/v1/rooms/:id", get(handlers::get_room))
        .route("/api/v1/rooms/:id/availability", post(handlers::check_availability))
        // ----- Payments -----
        .route("/api/v1/payments/initialize", post(handlers::initialize_payment))
        .route("/api/v1/payments/webhook", post(handlers::payment_webhook))
        // ----- Bookings -----
        .route(
            "/api/v1/bookings",
            get(handlers::my_bookings).post(handlers::create_booking),
        )
        .route("/api/v1/bookings/:id", get(handlers::get_booking))
        // ----- Staff / Admin -----
        .route("/api/v1/admin/bookings", get(handlers::admin_list_bookings))
        .route(
            "/api/v1/admin/bookings/:id/room-number",
            put(handlers::assign_room_number),
        )
        .route("/api/v1/admin/reconciliation", get(handlers::reconciliation))
        // ----- Middleware Layers -----
        .layer(axum::middleware::from_fn(crate::metrics::track_http))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// -----------------------------------------------------------------------------
// MAIN FUNCTION
// -----------------------------------------------------------------------------
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -------------------------------------------------------------------------
    // STEP 1: Load environment variables
    // -------------------------------------------------------------------------
    dotenvy::dotenv().ok();

    // -------------------------------------------------------------------------
    // STEP 2: Initialize logging/tracing
    // -------------------------------------------------------------------------
    // RUST_LOG controls log levels, e.g. RUST_LOG=info,hotel_booking_service=debug
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hotel_booking_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting Hotel Booking Service...");

    // -------------------------------------------------------------------------
    // STEP 3: Load configuration
    // -------------------------------------------------------------------------
    let config = Config::from_env()?;
    info!(port = config.port, currency = %config.currency, "Configuration loaded");

    // -------------------------------------------------------------------------
    // STEP 4: Set up Prometheus metrics
    // -------------------------------------------------------------------------
    let metrics_handle = setup_metrics()?;
    info!("Prometheus metrics initialized");

    // -------------------------------------------------------------------------
    // STEP 5: Booking store
    // -------------------------------------------------------------------------
    let store: Arc<dyn BookingStore> = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url).await?;
            info!("Connected to PostgreSQL");
            db.run_migrations().await?;
            info!("Database migrations completed");
            Arc::new(db)
        }
        None => {
            warn!("DATABASE_URL not set; bookings are kept in memory and lost on restart");
            Arc::new(InMemoryStore::with_sample_rooms())
        }
    };

    // -------------------------------------------------------------------------
    // STEP 6: Redis cache
    // -------------------------------------------------------------------------
    let cache = match &config.redis_url {
        Some(url) => {
            let client = redis::Client::open(url.as_str())?;
            let conn = redis::aio::ConnectionManager::new(client).await?;
            info!("Connected to Redis");
            Cache::new(conn)
        }
        None => {
            info!("REDIS_URL not set; caching disabled");
            Cache::disabled()
        }
    };

    // -------------------------------------------------------------------------
    // STEP 7: Payment gateway
    // -------------------------------------------------------------------------
    let payments: Arc<dyn PaymentGateway> = Arc::new(PaystackClient::new(
        config.paystack_secret_key.clone(),
        config.paystack_base_url.clone(),
    ));

    // -------------------------------------------------------------------------
    // STEP 8: Create application state and routes
    // -------------------------------------------------------------------------
    let port = config.port;
    let state = Arc::new(AppState {
        config,
        store,
        payments,
        cache,
        metrics_handle,
    });
    let app = router(state);

    // -------------------------------------------------------------------------
    // STEP 9: Start the HTTP server
    // -------------------------------------------------------------------------
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(address = %addr, "Hotel Booking Service is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Hotel Booking Service stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
