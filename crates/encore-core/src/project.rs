//! Projects and Reward Tiers
//!
//! A project is an artist's campaign; tiers are the priced reward levels a
//! backer can claim. The funding counters on `Project` and the slot counter
//! on `Tier` are derived state owned by the fulfillment ledger — they are
//! only ever mutated through [`crate::ledger::LedgerStore::record_fulfillment`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Cents;

/// Project lifecycle status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Fundraising,
    Funded,
    Completed,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &str {
        match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Fundraising => "fundraising",
            ProjectStatus::Funded => "funded",
            ProjectStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fundraising" => ProjectStatus::Fundraising,
            "funded" => ProjectStatus::Funded,
            "completed" => ProjectStatus::Completed,
            _ => ProjectStatus::Draft,
        }
    }
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Draft
    }
}

/// An artist's crowdfunding campaign
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Project {
    /// Project ID
    pub id: i64,

    /// URL slug for the public project page
    pub slug: String,

    /// Campaign title
    pub title: String,

    /// Artist display name
    pub artist_name: String,

    /// Funding goal in cents
    pub funding_goal_cents: Cents,

    /// Current funding in cents, net of processing fees.
    /// Invariant: equals the sum of all contribution amounts for this project.
    pub current_funding_cents: Cents,

    /// Number of confirmed contributions
    pub backer_count: u32,

    /// Lifecycle status
    pub status: ProjectStatus,

    /// Hero image for the project page and receipt emails
    pub image_url: Option<String>,

    /// Optional external donation link
    pub donation_link: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Public project page path, e.g. `/midnight-sessions`
    pub fn public_path(&self) -> String {
        format!("/{}", self.slug)
    }

    /// Percentage of the funding goal reached (0 when the goal is unset)
    pub fn percent_funded(&self) -> f64 {
        if self.funding_goal_cents <= 0 {
            return 0.0;
        }
        (self.current_funding_cents as f64 / self.funding_goal_cents as f64) * 100.0
    }
}

/// A priced reward level within a project
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tier {
    /// Tier ID
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Tier name shown on the checkout line item
    pub name: String,

    /// Face price in cents — the amount the project receives
    pub price_cents: Cents,

    /// Ordered list of perks included at this level
    pub perks: Vec<String>,

    /// Slot cap (None = unbounded)
    pub total_slots: Option<u32>,

    /// Slots claimed so far.
    /// Invariant: increments exactly once per confirmed contribution
    /// referencing this tier; never exceeds `total_slots` when bounded.
    pub claimed_slots: u32,
}

impl Tier {
    /// Whether a slot is still available
    pub fn has_open_slot(&self) -> bool {
        self.total_slots.is_none_or(|cap| self.claimed_slots < cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier(total: Option<u32>, claimed: u32) -> Tier {
        Tier {
            id: 1,
            project_id: 1,
            name: "Vinyl".into(),
            price_cents: 4500,
            perks: vec!["Signed vinyl".into()],
            total_slots: total,
            claimed_slots: claimed,
        }
    }

    #[test]
    fn test_status_round_trip() {
        for s in ["draft", "fundraising", "funded", "completed"] {
            assert_eq!(ProjectStatus::from_str(s).as_str(), s);
        }
        assert_eq!(ProjectStatus::from_str("bogus"), ProjectStatus::Draft);
    }

    #[test]
    fn test_tier_slot_availability() {
        assert!(tier(None, 10_000).has_open_slot());
        assert!(tier(Some(5), 4).has_open_slot());
        assert!(!tier(Some(5), 5).has_open_slot());
    }

    #[test]
    fn test_public_path() {
        let project = Project {
            id: 7,
            slug: "midnight-sessions".into(),
            title: "Midnight Sessions".into(),
            artist_name: "Ada Quinn".into(),
            funding_goal_cents: 500_000,
            current_funding_cents: 0,
            backer_count: 0,
            status: ProjectStatus::Fundraising,
            image_url: None,
            donation_link: None,
            created_at: Utc::now(),
        };
        assert_eq!(project.public_path(), "/midnight-sessions");
    }
}
