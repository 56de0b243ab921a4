//! Stripe Webhook Handling
//!
//! Drives the fulfillment sequence for asynchronous payment confirmations:
//! verify the event signature, filter to checkout completions, extract the
//! correlation metadata, record the contribution through the ledger's
//! idempotency gate, and fan out best-effort notifications.
//!
//! Delivery is at-least-once: gateways redeliver events, and concurrent
//! deliveries of the same event are possible. Everything downstream of the
//! contribution insert is gated by that insert, so a redelivered event
//! acknowledges as a no-op instead of double-counting.

use std::collections::HashMap;
use std::sync::Arc;

use stripe::{Event, EventObject, EventType, Webhook, WebhookError};
use uuid::Uuid;

use encore_core::{
    Cents, FulfillmentOutcome, LedgerStore, NewContribution, SlotStatus,
};

use crate::checkout::{META_PROCESSING_FEE, META_PROJECT_ID, META_TIER_ID, META_USER_ID};
use crate::error::{PaymentError, Result};
use crate::notify::{
    ContributionReceipt, NotificationDispatcher, DONATION_TIER_NAME, FALLBACK_BACKER_NAME,
};

/// Tier name rendered when the tier row is gone by the time the email builds
const FALLBACK_TIER_NAME: &str = "Reward tier";

/// A checkout-completed event reduced to the fields fulfillment needs
#[derive(Clone, Debug)]
pub struct CompletedCheckout {
    /// Gateway transaction id — the idempotency key
    pub payment_intent: String,

    /// Gross amount charged to the backer
    pub amount_total_cents: Cents,

    /// Processing-fee cents carried through session metadata
    pub fee_cents: Cents,

    /// Backer, from session metadata
    pub user_id: Uuid,

    /// Funded project, from session metadata
    pub project_id: i64,

    /// Claimed tier, absent for plain donations
    pub tier_id: Option<i64>,

    /// Email the backer entered on the hosted page
    pub customer_email: Option<String>,
}

impl CompletedCheckout {
    /// Net amount credited to the project
    pub fn net_cents(&self) -> Cents {
        (self.amount_total_cents - self.fee_cents).max(0)
    }

    /// Build from raw session fields. Missing `userId` or `projectId`
    /// rejects the event; `tierId` is optional and a missing or malformed
    /// fee falls back to zero (the whole gross then counts as net).
    pub fn from_parts(
        payment_intent: Option<String>,
        amount_total: Option<i64>,
        customer_email: Option<String>,
        metadata: &HashMap<String, String>,
    ) -> Result<Self> {
        let payment_intent =
            payment_intent.ok_or(PaymentError::MissingMetadata("payment_intent"))?;

        let user_id = metadata
            .get(META_USER_ID)
            .ok_or(PaymentError::MissingMetadata("userId"))?;
        let user_id = Uuid::parse_str(user_id)
            .map_err(|e| PaymentError::WebhookParse(format!("invalid userId: {e}")))?;

        let project_id = metadata
            .get(META_PROJECT_ID)
            .ok_or(PaymentError::MissingMetadata("projectId"))?;
        let project_id: i64 = project_id
            .parse()
            .map_err(|e| PaymentError::WebhookParse(format!("invalid projectId: {e}")))?;

        let tier_id = metadata
            .get(META_TIER_ID)
            .map(|s| {
                s.parse::<i64>()
                    .map_err(|e| PaymentError::WebhookParse(format!("invalid tierId: {e}")))
            })
            .transpose()?;

        let fee_cents = metadata
            .get(META_PROCESSING_FEE)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);

        Ok(Self {
            payment_intent,
            amount_total_cents: amount_total.unwrap_or(0),
            fee_cents,
            user_id,
            project_id,
            tier_id,
            customer_email,
        })
    }

    fn from_session(session: &stripe::CheckoutSession) -> Result<Self> {
        let empty = HashMap::new();
        let metadata = session.metadata.as_ref().unwrap_or(&empty);

        Self::from_parts(
            session.payment_intent.as_ref().map(|pi| pi.id().to_string()),
            session.amount_total,
            session
                .customer_details
                .as_ref()
                .and_then(|d| d.email.clone()),
            metadata,
        )
    }
}

/// Result of processing one webhook delivery
#[derive(Clone, Debug)]
pub enum WebhookOutcome {
    /// First delivery: contribution recorded, counters updated
    Fulfilled {
        contribution_id: Uuid,
        slot: SlotStatus,
    },

    /// Redelivery of an already-recorded payment; acknowledged, no writes
    Duplicate,

    /// Event type we don't act on; acknowledged and skipped
    Ignored,
}

/// Webhook handler
pub struct WebhookHandler {
    store: Arc<dyn LedgerStore>,
    dispatcher: Option<NotificationDispatcher>,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            dispatcher: None,
        }
    }

    /// Attach a notification dispatcher (absent means fulfillment runs
    /// silently, e.g. when email is not configured)
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Verify webhook signature and parse the event. A signature mismatch
    /// and an unparseable payload are distinct rejections — both 4xx, but
    /// only the former suggests a forged request.
    pub fn parse_event(&self, payload: &str, signature: &str, secret: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, secret).map_err(|e| match e {
            WebhookError::BadParse(err) => PaymentError::WebhookParse(err.to_string()),
            other => PaymentError::WebhookSignature(other.to_string()),
        })
    }

    /// Process a verified webhook event
    pub async fn handle(&self, event: Event) -> Result<WebhookOutcome> {
        match event.type_ {
            EventType::CheckoutSessionCompleted => {
                if let EventObject::CheckoutSession(session) = &event.data.object {
                    let completed = CompletedCheckout::from_session(session)?;
                    self.fulfill(completed).await
                } else {
                    Err(PaymentError::WebhookParse(
                        "Invalid checkout session data".into(),
                    ))
                }
            }
            other => {
                tracing::debug!(event_type = ?other, "Unhandled webhook event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    /// Run the fulfillment sequence for a completed checkout: idempotent
    /// ledger write, then best-effort notifications. Notification failures
    /// never surface here — the ledger entry is authoritative.
    pub async fn fulfill(&self, checkout: CompletedCheckout) -> Result<WebhookOutcome> {
        let outcome = self
            .store
            .record_fulfillment(NewContribution {
                user_id: checkout.user_id,
                project_id: checkout.project_id,
                tier_id: checkout.tier_id,
                amount_cents: checkout.net_cents(),
                payment_intent_id: checkout.payment_intent.clone(),
            })
            .await?;

        let (contribution, slot) = match outcome {
            FulfillmentOutcome::Duplicate => {
                tracing::info!(
                    payment_intent = %checkout.payment_intent,
                    "Duplicate delivery, contribution already recorded"
                );
                return Ok(WebhookOutcome::Duplicate);
            }
            FulfillmentOutcome::Recorded { contribution, slot } => (contribution, slot),
        };

        if slot == SlotStatus::SoldOut {
            tracing::warn!(
                payment_intent = %checkout.payment_intent,
                tier_id = ?checkout.tier_id,
                "No tier slot available at fulfillment; contribution kept for manual reconciliation"
            );
        }

        tracing::info!(
            contribution_id = %contribution.id,
            project_id = contribution.project_id,
            amount_cents = contribution.amount_cents,
            "Contribution recorded"
        );

        if let Some(dispatcher) = &self.dispatcher {
            let receipt = self.build_receipt(&checkout).await;
            let stakeholders = match self.store.stakeholder_emails(checkout.project_id).await {
                Ok(emails) => emails,
                Err(e) => {
                    tracing::warn!(error = %e, "Stakeholder lookup failed, alerting no one");
                    Vec::new()
                }
            };
            dispatcher.dispatch(&receipt, &stakeholders).await;
        }

        Ok(WebhookOutcome::Fulfilled {
            contribution_id: contribution.id,
            slot,
        })
    }

    /// Enrich the checkout with display data for the emails. Every lookup
    /// here degrades to a fallback value; nothing aborts the already
    /// committed ledger write.
    async fn build_receipt(&self, checkout: &CompletedCheckout) -> ContributionReceipt {
        let profile = self.store.profile(checkout.user_id).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Profile lookup failed during receipt build");
            None
        });

        let backer_name = profile
            .as_ref()
            .and_then(|p| p.full_name.clone())
            .unwrap_or_else(|| FALLBACK_BACKER_NAME.into());
        let backer_email = checkout
            .customer_email
            .clone()
            .or_else(|| profile.map(|p| p.email));

        let project = self
            .store
            .project(checkout.project_id)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Project lookup failed during receipt build");
                None
            });

        let tier_name = match checkout.tier_id {
            None => DONATION_TIER_NAME.into(),
            Some(tier_id) => self
                .store
                .tier(tier_id)
                .await
                .ok()
                .flatten()
                .map_or_else(|| FALLBACK_TIER_NAME.into(), |t| t.name),
        };

        let (project_title, artist_name, project_image_url) = match project {
            Some(p) => (p.title, p.artist_name, p.image_url),
            None => ("An Encore project".into(), "the artist".into(), None),
        };

        ContributionReceipt {
            backer_name,
            backer_email,
            project_id: checkout.project_id,
            project_title,
            artist_name,
            project_image_url,
            tier_name,
            net_cents: checkout.net_cents(),
            gross_cents: checkout.amount_total_cents,
            payment_intent_id: checkout.payment_intent.clone(),
            paid_at: chrono::Utc::now(),
        }
    }
}
