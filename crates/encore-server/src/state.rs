//! Application State

use std::sync::Arc;

use encore_core::LedgerStore;
use encore_payments::{NotificationConfig, NotificationDispatcher, StripeClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Fulfillment ledger (memory in development, Postgres in production)
    pub store: Arc<dyn LedgerStore>,

    /// Stripe client (None if not configured)
    pub stripe: Option<Arc<StripeClient>>,

    /// Email dispatch settings paired with a mailer (None disables
    /// contribution notifications)
    pub notifications: Option<NotificationSetup>,

    /// Public site URL used when the request carries no origin header
    pub site_url: String,
}

/// Mailer plus its template configuration
#[derive(Clone)]
pub struct NotificationSetup {
    pub mailer: Arc<dyn encore_payments::Mailer>,
    pub config: NotificationConfig,
}

impl NotificationSetup {
    pub fn dispatcher(&self) -> NotificationDispatcher {
        NotificationDispatcher::new(self.mailer.clone(), self.config.clone())
    }
}
