//! Webhook notifier: POSTs a JSON summary of each new pending approval.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::approvals::Approval;
use crate::clients::Notifier;
use crate::error::OutreachError;

/// Sends pending-approval notifications to an HTTP endpoint (dashboard,
/// Slack relay, whatever the operator pointed the URL at).
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    token: Option<SecretString>,
}

#[derive(Serialize)]
struct ApprovalNotification<'a> {
    approval_id: String,
    candidate_id: String,
    campaign_id: String,
    kind: &'a str,
    proposed_text: &'a str,
    created_at: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, token: Option<SecretString>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn pending_approval(&self, approval: &Approval) -> Result<(), OutreachError> {
        let payload = ApprovalNotification {
            approval_id: approval.id.to_string(),
            candidate_id: approval.candidate_id.to_string(),
            campaign_id: approval.campaign_id.to_string(),
            kind: approval.approval_type.as_str(),
            proposed_text: &approval.proposed_text,
            created_at: approval.created_at.to_rfc3339(),
        };

        let mut request = self.client.post(&self.url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = request.send().await.map_err(|e| OutreachError::NotifyFailed {
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(OutreachError::NotifyFailed {
                reason: format!("Webhook returned {}", response.status()),
            });
        }

        debug!(approval_id = %approval.id, "Approval webhook delivered");
        Ok(())
    }
}
