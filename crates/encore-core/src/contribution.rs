//! Contributions
//!
//! A contribution is the durable ledger entry for one confirmed payment.
//! Rows are created exactly once per payment-gateway transaction and never
//! updated or deleted by normal operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::money::Cents;

/// A confirmed payment, recorded once per gateway transaction
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Contribution {
    /// Contribution ID
    pub id: Uuid,

    /// Backer who paid
    pub user_id: Uuid,

    /// Funded project
    pub project_id: i64,

    /// Claimed tier (None for a plain donation)
    pub tier_id: Option<i64>,

    /// Amount credited to the project in cents, net of the processing fee
    pub amount_cents: Cents,

    /// Payment gateway transaction id — the idempotency key.
    /// At most one contribution may exist per value.
    pub payment_intent_id: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Input for recording a new contribution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewContribution {
    pub user_id: Uuid,
    pub project_id: i64,
    pub tier_id: Option<i64>,
    pub amount_cents: Cents,
    pub payment_intent_id: String,
}

impl NewContribution {
    /// Materialize into a full ledger entry with a fresh id and timestamp
    pub fn into_contribution(self) -> Contribution {
        Contribution {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            project_id: self.project_id,
            tier_id: self.tier_id,
            amount_cents: self.amount_cents,
            payment_intent_id: self.payment_intent_id,
            created_at: Utc::now(),
        }
    }
}
