//! Encore HTTP Server
//!
//! Axum-based server for the crowdfunding checkout-to-fulfillment pipeline:
//! checkout session creation for backers and the Stripe confirmation
//! webhook that updates the fulfillment ledger and sends emails.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use encore_core::{LedgerStore, MemoryLedgerStore};
use encore_payments::{LoopsClient, NotificationConfig, StripeClient};

use crate::handlers::{create_checkout, health_check, stripe_webhook};
use crate::state::{AppState, NotificationSetup};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    // Ledger store
    let store: Arc<dyn LedgerStore> = build_store().await?;

    // Payments
    let stripe = StripeClient::from_env().ok();
    if stripe.is_some() {
        tracing::info!("✓ Stripe configured");
    } else {
        tracing::warn!("⚠ Stripe not configured - checkout and webhook disabled");
        tracing::warn!("  Set STRIPE_SECRET_KEY and STRIPE_WEBHOOK_SECRET in .env");
    }

    // Notifications
    let notifications = match (LoopsClient::from_env(), NotificationConfig::from_env()) {
        (Ok(mailer), Ok(config)) => {
            tracing::info!("✓ Email notifications configured");
            Some(NotificationSetup {
                mailer: Arc::new(mailer),
                config,
            })
        }
        _ => {
            tracing::warn!("⚠ Loops not configured - contribution emails disabled");
            tracing::warn!("  Set LOOPS_API_KEY and LOOPS_RECEIPT_TEMPLATE_ID in .env");
            None
        }
    };

    let site_url =
        std::env::var("SITE_URL").unwrap_or_else(|_| "http://localhost:3000".into());

    // Build application state
    let state = AppState {
        store,
        stripe: stripe.map(Arc::new),
        notifications,
        site_url,
    };

    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/checkout", post(create_checkout))
        .route("/webhook/stripe", post(stripe_webhook))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🎵 encore-server running on http://{}", addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  POST /api/checkout    - Create contribution checkout");
    tracing::info!("  POST /webhook/stripe  - Payment confirmation webhook");
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(feature = "postgres")]
async fn build_store() -> anyhow::Result<Arc<dyn LedgerStore>> {
    use encore_core::PgLedgerStore;

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            let store = PgLedgerStore::connect(&url).await?;
            tracing::info!("✓ Connected to Postgres ledger");
            Ok(Arc::new(store))
        }
        Err(_) => {
            tracing::warn!("⚠ DATABASE_URL not set - using in-memory ledger");
            Ok(Arc::new(MemoryLedgerStore::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store() -> anyhow::Result<Arc<dyn LedgerStore>> {
    tracing::warn!("⚠ Built without the postgres feature - using in-memory ledger");
    Ok(Arc::new(MemoryLedgerStore::new()))
}
