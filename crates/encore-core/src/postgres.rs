//! Postgres Ledger Store
//!
//! The webhook handler runs outside any user session, so this store connects
//! with a privileged credential and bypasses row-level security. All
//! fulfillment writes happen inside a single transaction:
//!
//! - `INSERT ... ON CONFLICT (payment_intent_id) DO NOTHING` is the
//!   idempotency gate; zero rows affected means a duplicate delivery.
//! - The tier slot claim is a conditional `UPDATE` against the cap.
//! - Funding counters are atomic arithmetic updates, never read-then-write.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use uuid::Uuid;

use crate::contribution::{Contribution, NewContribution};
use crate::error::Result;
use crate::ledger::{FulfillmentOutcome, LedgerStore, SlotStatus};
use crate::profile::{Profile, UserType};
use crate::project::{Project, ProjectStatus, Tier};

/// Ledger store backed by Postgres
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect with the privileged database URL and run pending migrations
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| crate::error::CoreError::Storage(e.to_string()))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn project_from_row(row: &sqlx::postgres::PgRow) -> Project {
    Project {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        artist_name: row.get("artist_name"),
        funding_goal_cents: row.get("funding_goal_cents"),
        current_funding_cents: row.get("current_funding_cents"),
        backer_count: row.get::<i32, _>("backer_count").max(0) as u32,
        status: ProjectStatus::from_str(row.get::<&str, _>("status")),
        image_url: row.get("image_url"),
        donation_link: row.get("donation_link"),
        created_at: row.get("created_at"),
    }
}

fn tier_from_row(row: &sqlx::postgres::PgRow) -> Tier {
    Tier {
        id: row.get("id"),
        project_id: row.get("project_id"),
        name: row.get("name"),
        price_cents: row.get("price_cents"),
        perks: row.get("perks"),
        total_slots: row.get::<Option<i32>, _>("total_slots").map(|v| v.max(0) as u32),
        claimed_slots: row.get::<i32, _>("claimed_slots").max(0) as u32,
    }
}

fn contribution_from_row(row: &sqlx::postgres::PgRow) -> Contribution {
    Contribution {
        id: row.get("id"),
        user_id: row.get("user_id"),
        project_id: row.get("project_id"),
        tier_id: row.get("tier_id"),
        amount_cents: row.get("amount_cents"),
        payment_intent_id: row.get("payment_intent_id"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn project(&self, id: i64) -> Result<Option<Project>> {
        let row = sqlx::query("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(project_from_row))
    }

    async fn tier(&self, id: i64) -> Result<Option<Tier>> {
        let row = sqlx::query("SELECT * FROM tiers WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(tier_from_row))
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(|r| Profile {
            id: r.get("id"),
            full_name: r.get("full_name"),
            email: r.get("email"),
            avatar_url: r.get("avatar_url"),
            user_type: UserType::from_str(r.get::<&str, _>("user_type")),
        }))
    }

    async fn record_fulfillment(&self, new: NewContribution) -> Result<FulfillmentOutcome> {
        let contribution = new.into_contribution();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            "INSERT INTO contributions \
             (id, user_id, project_id, tier_id, amount_cents, payment_intent_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (payment_intent_id) DO NOTHING",
        )
        .bind(contribution.id)
        .bind(contribution.user_id)
        .bind(contribution.project_id)
        .bind(contribution.tier_id)
        .bind(contribution.amount_cents)
        .bind(&contribution.payment_intent_id)
        .bind(contribution.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Duplicate delivery of the same event; nothing else runs
            tx.rollback().await?;
            return Ok(FulfillmentOutcome::Duplicate);
        }

        let slot = match contribution.tier_id {
            None => SlotStatus::Untiered,
            Some(tier_id) => {
                let claimed = sqlx::query(
                    "UPDATE tiers SET claimed_slots = claimed_slots + 1 \
                     WHERE id = $1 AND (total_slots IS NULL OR claimed_slots < total_slots)",
                )
                .bind(tier_id)
                .execute(&mut *tx)
                .await?;

                if claimed.rows_affected() == 1 {
                    SlotStatus::Claimed
                } else {
                    SlotStatus::SoldOut
                }
            }
        };

        let funded = sqlx::query(
            "UPDATE projects SET \
             current_funding_cents = current_funding_cents + $2, \
             backer_count = backer_count + 1 \
             WHERE id = $1",
        )
        .bind(contribution.project_id)
        .bind(contribution.amount_cents)
        .execute(&mut *tx)
        .await?;

        if funded.rows_affected() == 0 {
            tracing::warn!(
                project_id = contribution.project_id,
                "Project row missing during funding update"
            );
        }

        tx.commit().await?;

        Ok(FulfillmentOutcome::Recorded { contribution, slot })
    }

    async fn stakeholder_emails(&self, project_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT p.email FROM profiles p \
             JOIN project_members m ON m.profile_id = p.id AND m.project_id = $1 \
             UNION ALL \
             SELECT email FROM profiles WHERE user_type = 'admin'",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("email")).collect())
    }

    async fn project_contributions(&self, project_id: i64) -> Result<Vec<Contribution>> {
        let rows = sqlx::query(
            "SELECT * FROM contributions WHERE project_id = $1 ORDER BY created_at",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(contribution_from_row).collect())
    }
}
