//! Stripe Checkout Integration
//!
//! Builds hosted checkout sessions for tier contributions. The backer sees
//! two line items — the tier at face price and a separate processing-fee
//! line — so the receipt is transparent about contribution versus fee.
//! No local state is written here; everything lives in the gateway session
//! until the confirmation webhook fires.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use stripe::{
    CheckoutSession as StripeCheckoutSession, CheckoutSessionMode, Client,
    CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData,
    CreateCheckoutSessionPaymentMethodTypes, Currency,
};
use uuid::Uuid;

use encore_core::{Cents, Project, Tier};

use crate::error::{PaymentError, Result};
use crate::fees::FeeSchedule;

/// Metadata keys carried on the gateway session. The webhook handler reads
/// these back to correlate the payment with local rows.
pub const META_USER_ID: &str = "userId";
pub const META_TIER_ID: &str = "tierId";
pub const META_PROJECT_ID: &str = "projectId";
pub const META_PROCESSING_FEE: &str = "processingFee";

/// Stripe client wrapper
pub struct StripeClient {
    client: Client,
    webhook_secret: String,
    fees: FeeSchedule,
}

impl StripeClient {
    /// Create a new Stripe client
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret: webhook_secret.to_string(),
            fees: FeeSchedule::default(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| PaymentError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;

        Ok(Self::new(&secret_key, &webhook_secret))
    }

    /// Override the fee schedule
    pub fn with_fees(mut self, fees: FeeSchedule) -> Self {
        self.fees = fees;
        self
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// Get the fee schedule
    pub fn fees(&self) -> FeeSchedule {
        self.fees
    }

    /// Create a hosted checkout session for a tier contribution
    ///
    /// Returns a URL to redirect the backer to Stripe's hosted payment page.
    pub async fn create_contribution_session(
        &self,
        request: ContributionRequest,
    ) -> Result<CheckoutSession> {
        let charge = self.fees.gross_charge(request.tier.price_cents);
        let (success_url, cancel_url) = redirect_urls(&request.origin, &request.project);
        let metadata = session_metadata(
            request.user_id,
            &request.tier,
            &request.project,
            charge.fee_cents,
        );

        let tier_description = format!(
            "{} by {}",
            request.project.title, request.project.artist_name
        );

        let mut params = CreateCheckoutSession::new();
        params.customer_email = Some(&request.customer_email);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.mode = Some(CheckoutSessionMode::Payment);
        params.payment_method_types = Some(vec![CreateCheckoutSessionPaymentMethodTypes::Card]);
        params.metadata = Some(metadata);

        // Two line items: tier at face price, fee broken out separately
        params.line_items = Some(vec![
            CreateCheckoutSessionLineItems {
                quantity: Some(1),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(request.tier.price_cents),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: request.tier.name.clone(),
                        description: Some(tier_description),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            CreateCheckoutSessionLineItems {
                quantity: Some(1),
                price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                    currency: Currency::USD,
                    unit_amount: Some(charge.fee_cents),
                    product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                        name: "Processing fee".into(),
                        description: Some(
                            "Card processing cost, passed through so the artist receives the full tier price"
                                .into(),
                        ),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ]);

        let session = StripeCheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PaymentError::Stripe(e.to_string()))?;

        let checkout_url = session
            .url
            .ok_or_else(|| PaymentError::Stripe("No checkout URL returned".into()))?;

        Ok(CheckoutSession {
            id: session.id.to_string(),
            checkout_url,
            gross_cents: charge.total_cents,
            fee_cents: charge.fee_cents,
        })
    }

    /// Get the underlying Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Success and cancel redirect targets for a checkout session. Success goes
/// to the confirmation page; cancel lands back on the project's public page.
fn redirect_urls(origin: &str, project: &Project) -> (String, String) {
    let origin = origin.trim_end_matches('/');
    (
        format!("{origin}/success?session_id={{CHECKOUT_SESSION_ID}}"),
        format!("{origin}{}", project.public_path()),
    )
}

/// Correlation metadata attached to the gateway session. Gateway metadata is
/// string-typed, so ids and the fee are stringified here.
fn session_metadata(
    user_id: Uuid,
    tier: &Tier,
    project: &Project,
    fee_cents: Cents,
) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(META_USER_ID.to_string(), user_id.to_string());
    metadata.insert(META_TIER_ID.to_string(), tier.id.to_string());
    metadata.insert(META_PROJECT_ID.to_string(), project.id.to_string());
    metadata.insert(META_PROCESSING_FEE.to_string(), fee_cents.to_string());
    metadata
}

/// Request to create a contribution checkout session
#[derive(Clone, Debug)]
pub struct ContributionRequest {
    /// Tier being claimed (already resolved by the caller)
    pub tier: Tier,

    /// Project the tier belongs to
    pub project: Project,

    /// Authenticated backer
    pub user_id: Uuid,

    /// Backer email, prefilled on the hosted page
    pub customer_email: String,

    /// Request origin used to build redirect URLs
    pub origin: String,
}

/// Result of creating a checkout session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Stripe session ID
    pub id: String,

    /// URL to redirect the backer to
    pub checkout_url: String,

    /// Total the backer will be charged
    pub gross_cents: Cents,

    /// Fee line included in that total
    pub fee_cents: Cents,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use encore_core::ProjectStatus;

    fn project() -> Project {
        Project {
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
        }
    }

    fn tier() -> Tier {
        Tier {
            id: 3,
            project_id: 7,
            name: "Early Bird".into(),
            price_cents: 2000,
            perks: vec![],
            total_slots: Some(100),
            claimed_slots: 0,
        }
    }

    #[test]
    fn test_redirect_urls() {
        let (success, cancel) = redirect_urls("https://encore.fm", &project());
        assert_eq!(
            success,
            "https://encore.fm/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(cancel, "https://encore.fm/midnight-sessions");

        // Trailing slash on the origin must not double up
        let (success, _) = redirect_urls("https://encore.fm/", &project());
        assert!(success.starts_with("https://encore.fm/success"));
    }

    #[test]
    fn test_session_metadata_keys() {
        let user = Uuid::new_v4();
        let metadata = session_metadata(user, &tier(), &project(), 91);

        assert_eq!(metadata[META_USER_ID], user.to_string());
        assert_eq!(metadata[META_TIER_ID], "3");
        assert_eq!(metadata[META_PROJECT_ID], "7");
        assert_eq!(metadata[META_PROCESSING_FEE], "91");
    }
}
