//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Stripe API error
    #[error("Stripe error: {0}")]
    Stripe(String),

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Webhook metadata missing a required correlation field
    #[error("Webhook metadata missing required field: {0}")]
    MissingMetadata(&'static str),

    /// Tier lookup failed during checkout
    #[error("Tier not found: {0}")]
    TierNotFound(i64),

    /// Project lookup failed during checkout
    #[error("Project not found: {0}")]
    ProjectNotFound(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Ledger storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transactional email API error
    #[error("Email error: {0}")]
    Email(String),
}

impl PaymentError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::Stripe(_) | PaymentError::Storage(_) | PaymentError::Email(_)
        )
    }

    /// Whether the webhook caller should be answered with a client error
    /// (bad request) rather than a server error
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PaymentError::WebhookSignature(_)
                | PaymentError::WebhookParse(_)
                | PaymentError::MissingMetadata(_)
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            PaymentError::Stripe(_) => "Payment processing failed. Please try again.",
            PaymentError::TierNotFound(_) => "That reward tier no longer exists.",
            PaymentError::ProjectNotFound(_) => "That project no longer exists.",
            PaymentError::Config(_) => "Service configuration error.",
            _ => "An error occurred processing your request.",
        }
    }
}

impl From<encore_core::CoreError> for PaymentError {
    fn from(err: encore_core::CoreError) -> Self {
        PaymentError::Storage(err.to_string())
    }
}
