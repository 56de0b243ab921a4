//! Contribution Notifications
//!
//! Best-effort transactional email after a contribution commits: one receipt
//! to the backer, and — when an alert template is configured — one alert per
//! project stakeholder. Sends are independent and time-bounded; a failed
//! send is logged and lost. Nothing here can roll back the ledger write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;

use encore_core::{format_usd, Cents};

use crate::error::{PaymentError, Result};

/// Fallback backer display name when the profile lookup fails
pub const FALLBACK_BACKER_NAME: &str = "Valued Supporter";

/// Tier name rendered for tierless contributions
pub const DONATION_TIER_NAME: &str = "Donation";

/// Per-recipient send timeout
const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Transactional email sender
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one templated email to one address
    async fn send(
        &self,
        template_id: &str,
        to: &str,
        variables: &HashMap<String, String>,
    ) -> Result<()>;
}

/// Loops transactional email client
pub struct LoopsClient {
    http: reqwest::Client,
    api_key: String,
    endpoint: String,
}

#[derive(Serialize)]
struct TransactionalPayload<'a> {
    #[serde(rename = "transactionalId")]
    transactional_id: &'a str,
    email: &'a str,
    #[serde(rename = "dataVariables")]
    data_variables: &'a HashMap<String, String>,
}

impl LoopsClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(SEND_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: "https://app.loops.so/api/v1/transactional".into(),
        }
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LOOPS_API_KEY")
            .map_err(|_| PaymentError::Config("LOOPS_API_KEY not set".into()))?;
        Ok(Self::new(api_key))
    }
}

#[async_trait]
impl Mailer for LoopsClient {
    async fn send(
        &self,
        template_id: &str,
        to: &str,
        variables: &HashMap<String, String>,
    ) -> Result<()> {
        let payload = TransactionalPayload {
            transactional_id: template_id,
            email: to,
            data_variables: variables,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaymentError::Email(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Email(format!(
                "Loops returned {} for {}",
                response.status(),
                to
            )));
        }

        Ok(())
    }
}

/// Template identifiers for contribution emails
#[derive(Clone, Debug)]
pub struct NotificationConfig {
    /// Receipt template sent to the backer
    pub receipt_template: String,

    /// Stakeholder alert template (None disables the fan-out)
    pub alert_template: Option<String>,
}

impl NotificationConfig {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let receipt_template = std::env::var("LOOPS_RECEIPT_TEMPLATE_ID")
            .map_err(|_| PaymentError::Config("LOOPS_RECEIPT_TEMPLATE_ID not set".into()))?;
        let alert_template = std::env::var("LOOPS_ALERT_TEMPLATE_ID").ok();

        Ok(Self {
            receipt_template,
            alert_template,
        })
    }
}

/// Enriched context for one confirmed contribution, ready to template
#[derive(Clone, Debug)]
pub struct ContributionReceipt {
    pub backer_name: String,
    pub backer_email: Option<String>,
    pub project_id: i64,
    pub project_title: String,
    pub artist_name: String,
    pub project_image_url: Option<String>,
    pub tier_name: String,
    /// Amount credited to the project
    pub net_cents: Cents,
    /// Amount charged to the backer's card
    pub gross_cents: Cents,
    pub payment_intent_id: String,
    pub paid_at: DateTime<Utc>,
}

impl ContributionReceipt {
    /// Flatten into the string map the email API expects
    pub fn variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("customerName".into(), self.backer_name.clone());
        vars.insert("projectId".into(), self.project_id.to_string());
        vars.insert("projectName".into(), self.project_title.clone());
        vars.insert("artistName".into(), self.artist_name.clone());
        vars.insert(
            "projectImageUrl".into(),
            self.project_image_url.clone().unwrap_or_default(),
        );
        vars.insert("tierName".into(), self.tier_name.clone());
        vars.insert("amount".into(), format_usd(self.net_cents));
        vars.insert("totalCharged".into(), format_usd(self.gross_cents));
        vars.insert("transactionId".into(), self.payment_intent_id.clone());
        vars.insert(
            "paymentDate".into(),
            self.paid_at.format("%B %-d, %Y").to_string(),
        );
        vars
    }
}

/// Outcome counts for one dispatch round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub sent: usize,
    pub failed: usize,
}

/// Fans a contribution out to the backer and project stakeholders
pub struct NotificationDispatcher {
    mailer: Arc<dyn Mailer>,
    config: NotificationConfig,
}

impl NotificationDispatcher {
    pub fn new(mailer: Arc<dyn Mailer>, config: NotificationConfig) -> Self {
        Self { mailer, config }
    }

    /// Send the receipt and stakeholder alerts. One recipient failing never
    /// blocks the others; failures are logged and counted, not returned.
    pub async fn dispatch(
        &self,
        receipt: &ContributionReceipt,
        stakeholders: &[String],
    ) -> DispatchSummary {
        let variables = receipt.variables();
        let mut targets: Vec<(&str, &str)> = Vec::new();

        if let Some(email) = receipt.backer_email.as_deref() {
            targets.push((self.config.receipt_template.as_str(), email));
        } else {
            tracing::warn!(
                payment_intent = %receipt.payment_intent_id,
                "No backer email on session, skipping receipt"
            );
        }

        if let Some(alert_template) = self.config.alert_template.as_deref() {
            let mut seen: Vec<&str> = targets.iter().map(|(_, to)| *to).collect();
            for email in stakeholders {
                if seen.iter().any(|s| s.eq_ignore_ascii_case(email)) {
                    continue;
                }
                seen.push(email.as_str());
                targets.push((alert_template, email.as_str()));
            }
        }

        let variables = &variables;
        let sends = targets.iter().map(|(template, to)| async move {
            match tokio::time::timeout(SEND_TIMEOUT, self.mailer.send(template, to, variables))
                .await
            {
                Ok(Ok(())) => true,
                Ok(Err(e)) => {
                    tracing::warn!(to = %to, error = %e, "Notification send failed");
                    false
                }
                Err(_) => {
                    tracing::warn!(to = %to, "Notification send timed out");
                    false
                }
            }
        });

        let results = join_all(sends).await;
        let sent = results.iter().filter(|ok| **ok).count();
        let summary = DispatchSummary {
            sent,
            failed: results.len() - sent,
        };

        tracing::info!(
            payment_intent = %receipt.payment_intent_id,
            sent = summary.sent,
            failed = summary.failed,
            "Contribution notifications dispatched"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Debug)]
    pub struct SentEmail {
        pub template_id: String,
        pub to: String,
        pub variables: HashMap<String, String>,
    }

    /// Records sends; fails any address listed in `fail_for`
    #[derive(Default)]
    pub struct RecordingMailer {
        pub sent: Mutex<Vec<SentEmail>>,
        pub fail_for: Vec<String>,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(
            &self,
            template_id: &str,
            to: &str,
            variables: &HashMap<String, String>,
        ) -> Result<()> {
            if self.fail_for.iter().any(|f| f == to) {
                return Err(PaymentError::Email(format!("forced failure for {to}")));
            }
            self.sent.lock().unwrap().push(SentEmail {
                template_id: template_id.into(),
                to: to.into(),
                variables: variables.clone(),
            });
            Ok(())
        }
    }

    fn receipt() -> ContributionReceipt {
        ContributionReceipt {
            backer_name: "Sam Lee".into(),
            backer_email: Some("sam@example.com".into()),
            project_id: 7,
            project_title: "Midnight Sessions".into(),
            artist_name: "Ada Quinn".into(),
            project_image_url: None,
            tier_name: "Early Bird".into(),
            net_cents: 2000,
            gross_cents: 2091,
            payment_intent_id: "pi_123".into(),
            paid_at: Utc::now(),
        }
    }

    fn config(alert: bool) -> NotificationConfig {
        NotificationConfig {
            receipt_template: "tmpl_receipt".into(),
            alert_template: alert.then(|| "tmpl_alert".into()),
        }
    }

    #[test]
    fn test_receipt_variables() {
        let vars = receipt().variables();
        assert_eq!(vars["customerName"], "Sam Lee");
        assert_eq!(vars["projectName"], "Midnight Sessions");
        assert_eq!(vars["artistName"], "Ada Quinn");
        assert_eq!(vars["tierName"], "Early Bird");
        assert_eq!(vars["amount"], "$20.00");
        assert_eq!(vars["totalCharged"], "$20.91");
        assert_eq!(vars["transactionId"], "pi_123");
        assert_eq!(vars["projectImageUrl"], "");
    }

    #[tokio::test]
    async fn test_dispatch_receipt_only() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = NotificationDispatcher::new(mailer.clone(), config(false));

        let summary = dispatcher
            .dispatch(&receipt(), &["ada@example.com".into()])
            .await;

        // No alert template configured, so stakeholders are skipped
        assert_eq!(summary, DispatchSummary { sent: 1, failed: 0 });
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "sam@example.com");
        assert_eq!(sent[0].template_id, "tmpl_receipt");
    }

    #[tokio::test]
    async fn test_dispatch_fans_out_and_dedupes() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = NotificationDispatcher::new(mailer.clone(), config(true));

        let stakeholders = vec![
            "ada@example.com".to_string(),
            "ops@example.com".to_string(),
            "Ada@example.com".to_string(),
            "sam@example.com".to_string(),
        ];
        let summary = dispatcher.dispatch(&receipt(), &stakeholders).await;

        // Backer + two unique stakeholders; case-insensitive duplicate and
        // the backer's own address are dropped from the alert list
        assert_eq!(summary, DispatchSummary { sent: 3, failed: 0 });
        let sent = mailer.sent.lock().unwrap();
        let alert_count = sent.iter().filter(|s| s.template_id == "tmpl_alert").count();
        assert_eq!(alert_count, 2);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let mailer = Arc::new(RecordingMailer {
            fail_for: vec!["ada@example.com".into()],
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(mailer.clone(), config(true));

        let stakeholders = vec!["ada@example.com".to_string(), "ops@example.com".to_string()];
        let summary = dispatcher.dispatch(&receipt(), &stakeholders).await;

        assert_eq!(summary, DispatchSummary { sent: 2, failed: 1 });
        let sent = mailer.sent.lock().unwrap();
        assert!(sent.iter().any(|s| s.to == "ops@example.com"));
    }

    #[tokio::test]
    async fn test_missing_backer_email_skips_receipt() {
        let mailer = Arc::new(RecordingMailer::default());
        let dispatcher = NotificationDispatcher::new(mailer.clone(), config(true));

        let mut receipt = receipt();
        receipt.backer_email = None;
        let summary = dispatcher
            .dispatch(&receipt, &["ops@example.com".into()])
            .await;

        assert_eq!(summary, DispatchSummary { sent: 1, failed: 0 });
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent[0].template_id, "tmpl_alert");
    }
}
