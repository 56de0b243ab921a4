//! # encore-core
//!
//! Domain model and fulfillment ledger for the Encore crowdfunding platform.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     Fulfillment Ledger                        │
//! │  ┌──────────────┐  ┌──────────────┐  ┌────────────────────┐  │
//! │  │ Contribution │  │ Tier slots   │  │ Project funding /  │  │
//! │  │ (idempotency │──│ (conditional │──│ backer counters    │  │
//! │  │  gate)       │  │  increment)  │  │ (atomic add)       │  │
//! │  └──────────────┘  └──────────────┘  └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LedgerStore` trait keeps the webhook handler agnostic of where the
//! ledger lives: in memory for development and tests, or Postgres behind the
//! `postgres` feature for production.

pub mod contribution;
pub mod error;
pub mod ledger;
pub mod money;
pub mod profile;
pub mod project;

#[cfg(feature = "postgres")]
pub mod postgres;

pub use contribution::{Contribution, NewContribution};
pub use error::{CoreError, Result};
pub use ledger::{FulfillmentOutcome, LedgerStore, MemoryLedgerStore, SlotStatus};
pub use money::{format_usd, Cents};
pub use profile::{Profile, UserType};
pub use project::{Project, ProjectStatus, Tier};

#[cfg(feature = "postgres")]
pub use postgres::PgLedgerStore;
