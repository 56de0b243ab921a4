//! # encore-payments
//!
//! Checkout-to-fulfillment pipeline for the Encore crowdfunding platform.
//!
//! ## Flow
//!
//! ```text
//! ┌─────────────┐     ┌─────────────────┐     ┌──────────────────┐
//! │  Project    │────▶│  Stripe Hosted  │────▶│  Webhook:        │
//! │  page (UI)  │     │  Checkout Page  │     │  fulfill + email │
//! └─────────────┘     └─────────────────┘     └──────────────────┘
//! ```
//!
//! The checkout builder grosses up the tier price so the artist receives the
//! full face amount after processor fees, and carries correlation metadata
//! (user, tier, project, fee) on the gateway session. All local state is
//! written by the webhook handler once the asynchronous `checkout.session.
//! completed` event arrives; duplicate deliveries are absorbed by the
//! ledger's payment-intent idempotency gate.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use encore_payments::{ContributionRequest, StripeClient, WebhookHandler};
//!
//! let stripe = StripeClient::new("sk_test_xxx", "whsec_xxx");
//!
//! // Redirect the backer to session.checkout_url
//! let session = stripe.create_contribution_session(ContributionRequest {
//!     tier,
//!     project,
//!     user_id,
//!     customer_email: "fan@example.com".into(),
//!     origin: "https://encore.fm".into(),
//! }).await?;
//!
//! // Later, from the webhook endpoint:
//! let handler = WebhookHandler::new(store);
//! let event = handler.parse_event(&body, &signature, stripe.webhook_secret())?;
//! handler.handle(event).await?;
//! ```

mod checkout;
mod error;
mod fees;
mod notify;
mod webhook;

pub use checkout::{CheckoutSession, ContributionRequest, StripeClient};
pub use error::{PaymentError, Result};
pub use fees::{FeeSchedule, GrossCharge, DEFAULT_FIXED_FEE_CENTS, DEFAULT_RATE_BPS};
pub use notify::{
    ContributionReceipt, DispatchSummary, LoopsClient, Mailer, NotificationConfig,
    NotificationDispatcher,
};
pub use webhook::{CompletedCheckout, WebhookHandler, WebhookOutcome};
