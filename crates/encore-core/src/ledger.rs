//! Fulfillment Ledger
//!
//! The ledger owns the contribution table and the two derived counters
//! (tier claimed slots, project funding/backer count). Webhook deliveries
//! are at-least-once, so [`LedgerStore::record_fulfillment`] is the single
//! gate that turns duplicate deliveries into no-ops: the contribution insert
//! is keyed on the payment-intent id, and every counter update rides on the
//! same atomic operation as that insert.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::contribution::{Contribution, NewContribution};
use crate::error::Result;
use crate::money::Cents;
use crate::profile::{Profile, UserType};
use crate::project::{Project, Tier};

/// Result of attempting to claim a tier slot during fulfillment
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotStatus {
    /// A slot was claimed
    Claimed,
    /// No slot was available (sold-out race, or the tier row is gone).
    /// The contribution is still recorded — money was taken — and the
    /// mismatch is left for manual reconciliation.
    SoldOut,
    /// The contribution had no tier (plain donation)
    Untiered,
}

/// Outcome of [`LedgerStore::record_fulfillment`]
#[derive(Clone, Debug)]
pub enum FulfillmentOutcome {
    /// First delivery: contribution inserted and counters updated
    Recorded {
        contribution: Contribution,
        slot: SlotStatus,
    },
    /// A contribution with this payment-intent id already exists.
    /// No counters were touched.
    Duplicate,
}

/// Fulfillment ledger storage
///
/// Implementations must make `record_fulfillment` safe under concurrent
/// invocation: duplicate payment-intent ids must insert at most one row,
/// counter updates must be atomic arithmetic (never read-modify-write),
/// and the slot claim must be a conditional increment against the cap.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Fetch a project by id
    async fn project(&self, id: i64) -> Result<Option<Project>>;

    /// Fetch a tier by id
    async fn tier(&self, id: i64) -> Result<Option<Tier>>;

    /// Fetch a profile by id
    async fn profile(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Record a confirmed payment: insert the contribution (idempotency
    /// gate), claim a tier slot if one was specified, and add the net
    /// amount and one backer to the project counters — all as one logical
    /// transaction.
    async fn record_fulfillment(&self, new: NewContribution) -> Result<FulfillmentOutcome>;

    /// Emails of everyone who should receive stakeholder alerts for a
    /// project: its team members plus all platform admins. May contain
    /// duplicates; the dispatcher dedupes.
    async fn stakeholder_emails(&self, project_id: i64) -> Result<Vec<String>>;

    /// All contributions recorded for a project
    async fn project_contributions(&self, project_id: i64) -> Result<Vec<Contribution>>;
}

#[derive(Default)]
struct Inner {
    projects: HashMap<i64, Project>,
    tiers: HashMap<i64, Tier>,
    profiles: HashMap<Uuid, Profile>,
    team: HashMap<i64, Vec<Uuid>>,
    contributions: Vec<Contribution>,
    by_intent: HashSet<String>,
}

/// In-memory ledger store (for development and tests)
///
/// A single lock guards all tables, so the insert and both counter updates
/// in `record_fulfillment` commit together.
pub struct MemoryLedgerStore {
    inner: RwLock<Inner>,
}

impl Default for MemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Insert or replace a project
    pub fn insert_project(&self, project: Project) {
        let mut inner = self.inner.write().unwrap();
        inner.projects.insert(project.id, project);
    }

    /// Insert or replace a tier
    pub fn insert_tier(&self, tier: Tier) {
        let mut inner = self.inner.write().unwrap();
        inner.tiers.insert(tier.id, tier);
    }

    /// Insert or replace a profile
    pub fn insert_profile(&self, profile: Profile) {
        let mut inner = self.inner.write().unwrap();
        inner.profiles.insert(profile.id, profile);
    }

    /// Attach a profile to a project's team
    pub fn add_team_member(&self, project_id: i64, profile_id: Uuid) {
        let mut inner = self.inner.write().unwrap();
        inner.team.entry(project_id).or_default().push(profile_id);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn project(&self, id: i64) -> Result<Option<Project>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.projects.get(&id).cloned())
    }

    async fn tier(&self, id: i64) -> Result<Option<Tier>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.tiers.get(&id).cloned())
    }

    async fn profile(&self, id: Uuid) -> Result<Option<Profile>> {
        let inner = self.inner.read().unwrap();
        Ok(inner.profiles.get(&id).cloned())
    }

    async fn record_fulfillment(&self, new: NewContribution) -> Result<FulfillmentOutcome> {
        let mut inner = self.inner.write().unwrap();

        // Idempotency gate: at most one contribution per payment intent
        if inner.by_intent.contains(&new.payment_intent_id) {
            return Ok(FulfillmentOutcome::Duplicate);
        }

        let project_id = new.project_id;
        let tier_id = new.tier_id;
        let amount: Cents = new.amount_cents;

        let contribution = new.into_contribution();
        inner.by_intent.insert(contribution.payment_intent_id.clone());
        inner.contributions.push(contribution.clone());

        // Conditional slot claim against the cap
        let slot = match tier_id {
            None => SlotStatus::Untiered,
            Some(id) => match inner.tiers.get_mut(&id) {
                Some(tier) if tier.has_open_slot() => {
                    tier.claimed_slots += 1;
                    SlotStatus::Claimed
                }
                _ => SlotStatus::SoldOut,
            },
        };

        // Funding counters
        if let Some(project) = inner.projects.get_mut(&project_id) {
            project.current_funding_cents += amount;
            project.backer_count += 1;
        } else {
            tracing::warn!(project_id, "Project row missing during funding update");
        }

        Ok(FulfillmentOutcome::Recorded { contribution, slot })
    }

    async fn stakeholder_emails(&self, project_id: i64) -> Result<Vec<String>> {
        let inner = self.inner.read().unwrap();
        let mut emails: Vec<String> = inner
            .team
            .get(&project_id)
            .into_iter()
            .flatten()
            .filter_map(|id| inner.profiles.get(id))
            .map(|p| p.email.clone())
            .collect();

        emails.extend(
            inner
                .profiles
                .values()
                .filter(|p| p.user_type == UserType::Admin)
                .map(|p| p.email.clone()),
        );

        Ok(emails)
    }

    async fn project_contributions(&self, project_id: i64) -> Result<Vec<Contribution>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .contributions
            .iter()
            .filter(|c| c.project_id == project_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::ProjectStatus;
    use chrono::Utc;
    use std::sync::Arc;

    fn project(id: i64) -> Project {
        Project {
            id,
            slug: format!("project-{id}"),
            title: "Midnight Sessions".into(),
            artist_name: "Ada Quinn".into(),
            funding_goal_cents: 500_000,
            current_funding_cents: 0,
            backer_count: 0,
            status: ProjectStatus::Fundraising,
            image_url: None,
            donation_link: None,
            created_at: Utc::now(),
        }
    }

    fn tier(id: i64, project_id: i64, total_slots: Option<u32>) -> Tier {
        Tier {
            id,
            project_id,
            name: "Early Bird".into(),
            price_cents: 2000,
            perks: vec!["Digital album".into()],
            total_slots,
            claimed_slots: 0,
        }
    }

    fn new_contribution(intent: &str) -> NewContribution {
        NewContribution {
            user_id: Uuid::new_v4(),
            project_id: 7,
            tier_id: Some(3),
            amount_cents: 2000,
            payment_intent_id: intent.into(),
        }
    }

    fn seeded_store() -> MemoryLedgerStore {
        let store = MemoryLedgerStore::new();
        store.insert_project(project(7));
        store.insert_tier(tier(3, 7, Some(10)));
        store
    }

    #[tokio::test]
    async fn test_record_fulfillment_updates_counters() {
        let store = seeded_store();

        let outcome = store.record_fulfillment(new_contribution("pi_1")).await.unwrap();
        assert!(matches!(
            outcome,
            FulfillmentOutcome::Recorded {
                slot: SlotStatus::Claimed,
                ..
            }
        ));

        let project = store.project(7).await.unwrap().unwrap();
        assert_eq!(project.current_funding_cents, 2000);
        assert_eq!(project.backer_count, 1);
        assert_eq!(store.tier(3).await.unwrap().unwrap().claimed_slots, 1);
    }

    #[tokio::test]
    async fn test_duplicate_intent_is_noop() {
        let store = seeded_store();

        store.record_fulfillment(new_contribution("pi_1")).await.unwrap();
        let replay = store.record_fulfillment(new_contribution("pi_1")).await.unwrap();
        assert!(matches!(replay, FulfillmentOutcome::Duplicate));

        let project = store.project(7).await.unwrap().unwrap();
        assert_eq!(project.current_funding_cents, 2000);
        assert_eq!(project.backer_count, 1);
        assert_eq!(store.tier(3).await.unwrap().unwrap().claimed_slots, 1);
        assert_eq!(store.project_contributions(7).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_slot_cap_not_exceeded() {
        let store = MemoryLedgerStore::new();
        store.insert_project(project(7));
        store.insert_tier(tier(3, 7, Some(1)));

        let first = store.record_fulfillment(new_contribution("pi_a")).await.unwrap();
        let second = store.record_fulfillment(new_contribution("pi_b")).await.unwrap();

        let slots: Vec<SlotStatus> = [first, second]
            .into_iter()
            .map(|o| match o {
                FulfillmentOutcome::Recorded { slot, .. } => slot,
                FulfillmentOutcome::Duplicate => panic!("distinct intents cannot be duplicates"),
            })
            .collect();

        assert_eq!(slots[0], SlotStatus::Claimed);
        assert_eq!(slots[1], SlotStatus::SoldOut);
        assert_eq!(store.tier(3).await.unwrap().unwrap().claimed_slots, 1);

        // Both payments were taken, so both are in the ledger
        assert_eq!(store.project_contributions(7).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_untiered_donation() {
        let store = seeded_store();

        let mut donation = new_contribution("pi_donate");
        donation.tier_id = None;
        let outcome = store.record_fulfillment(donation).await.unwrap();
        assert!(matches!(
            outcome,
            FulfillmentOutcome::Recorded {
                slot: SlotStatus::Untiered,
                ..
            }
        ));

        assert_eq!(store.tier(3).await.unwrap().unwrap().claimed_slots, 0);
        let project = store.project(7).await.unwrap().unwrap();
        assert_eq!(project.backer_count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_funding_sum_matches_contributions_under_concurrency() {
        let store = Arc::new(seeded_store());

        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut c = new_contribution(&format!("pi_{i}"));
                c.tier_id = None;
                store.record_fulfillment(c).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let project = store.project(7).await.unwrap().unwrap();
        let contributions = store.project_contributions(7).await.unwrap();
        let sum: Cents = contributions.iter().map(|c| c.amount_cents).sum();

        assert_eq!(contributions.len(), 32);
        assert_eq!(project.backer_count, 32);
        assert_eq!(project.current_funding_cents, sum);
    }

    #[tokio::test]
    async fn test_stakeholder_emails_include_team_and_admins() {
        let store = seeded_store();

        let artist = Profile {
            id: Uuid::new_v4(),
            full_name: Some("Ada Quinn".into()),
            email: "ada@example.com".into(),
            avatar_url: None,
            user_type: UserType::Artist,
        };
        let admin = Profile {
            id: Uuid::new_v4(),
            full_name: None,
            email: "ops@example.com".into(),
            avatar_url: None,
            user_type: UserType::Admin,
        };
        store.add_team_member(7, artist.id);
        store.insert_profile(artist);
        store.insert_profile(admin);

        let mut emails = store.stakeholder_emails(7).await.unwrap();
        emails.sort();
        assert_eq!(emails, vec!["ada@example.com", "ops@example.com"]);
    }
}
