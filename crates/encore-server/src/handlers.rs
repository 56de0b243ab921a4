//! HTTP Handlers

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use encore_payments::{ContributionRequest, PaymentError, WebhookHandler};

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub email_configured: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub tier_id: i64,

    /// Defaults to the tier's own project
    #[serde(default)]
    pub project_id: Option<i64>,

    /// Authenticated backer identity. Auth itself lives at the edge; the
    /// handler only insists the identity is present.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

type HandlerError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>, code: &str) -> HandlerError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
            code: code.into(),
        }),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.stripe.is_some(),
        email_configured: state.notifications.is_some(),
    })
}

/// Create a Stripe checkout session for a tier contribution
pub async fn create_checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, HandlerError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let (user_id, email) = match (payload.user_id, payload.email) {
        (Some(user_id), Some(email)) => (user_id, email),
        _ => {
            return Err(error(
                StatusCode::UNAUTHORIZED,
                "Sign in to back this project",
                "UNAUTHENTICATED",
            ));
        }
    };

    let tier = state
        .store
        .tier(payload.tier_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Tier lookup failed");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error",
                "STORAGE_ERROR",
            )
        })?
        .ok_or_else(|| error(StatusCode::NOT_FOUND, "Tier not found", "TIER_NOT_FOUND"))?;

    let project_id = payload.project_id.unwrap_or(tier.project_id);
    let project = state
        .store
        .project(project_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Project lookup failed");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage error",
                "STORAGE_ERROR",
            )
        })?
        .ok_or_else(|| {
            error(
                StatusCode::NOT_FOUND,
                "Project not found",
                "PROJECT_NOT_FOUND",
            )
        })?;

    let origin = headers
        .get("origin")
        .and_then(|v| v.to_str().ok())
        .unwrap_or(&state.site_url)
        .to_string();

    let session = stripe
        .create_contribution_session(ContributionRequest {
            tier,
            project,
            user_id,
            customer_email: email,
            origin,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Checkout error");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.user_message(),
                "CHECKOUT_ERROR",
            )
        })?;

    Ok(Json(CheckoutResponse {
        checkout_url: session.checkout_url,
        session_id: session.id,
    }))
}

/// Stripe webhook endpoint
///
/// Body must stay raw for signature verification. A rejected signature or
/// unusable metadata answers 400 so the gateway surfaces the failure; a
/// duplicate delivery answers 200 like any other success.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, HandlerError> {
    let stripe = state.stripe.as_ref().ok_or_else(|| {
        error(
            StatusCode::SERVICE_UNAVAILABLE,
            "Payments not configured",
            "PAYMENTS_DISABLED",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            error(
                StatusCode::BAD_REQUEST,
                "Missing Stripe signature",
                "MISSING_SIGNATURE",
            )
        })?;

    let mut handler = WebhookHandler::new(state.store.clone());
    if let Some(notifications) = &state.notifications {
        handler = handler.with_dispatcher(notifications.dispatcher());
    }

    let event = handler
        .parse_event(&body, signature, stripe.webhook_secret())
        .map_err(|e| {
            tracing::warn!(error = %e, "Webhook rejected");
            error(StatusCode::BAD_REQUEST, "Invalid signature", "INVALID_SIGNATURE")
        })?;

    handler.handle(event).await.map_err(|e| {
        if e.is_rejection() {
            tracing::warn!(error = %e, "Webhook rejected");
            error(StatusCode::BAD_REQUEST, e.to_string(), "WEBHOOK_REJECTED")
        } else {
            tracing::error!(error = %e, "Webhook processing error");
            error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook processing failed",
                "WEBHOOK_ERROR",
            )
        }
    })?;

    Ok(StatusCode::OK)
}
