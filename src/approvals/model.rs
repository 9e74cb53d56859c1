//! Approval data model: one record per proposed outbound action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clients::OutreachKind;

/// Status of an approval in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Waiting for human action.
    Pending,
    /// Approved: the scheduler will send it.
    Approved,
    /// Human rejected; never sent.
    Rejected,
    /// Sent successfully.
    Sent,
    /// Send attempt failed; not retried.
    Failed,
}

impl ApprovalStatus {
    /// Legal status progressions. Everything not listed is terminal.
    pub fn can_resolve_to(&self, target: ApprovalStatus) -> bool {
        use ApprovalStatus::*;

        matches!(
            (self, target),
            (Pending, Approved) | (Pending, Rejected) | (Approved, Sent) | (Approved, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Sent | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ApprovalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown approval status: {s}")),
        }
    }
}

/// One proposed outbound action awaiting (or past) human review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub campaign_id: Uuid,
    pub approval_type: OutreachKind,
    /// Text the engine proposed.
    pub proposed_text: String,
    /// Human-edited override. When set, this is what actually gets sent.
    pub approved_text: Option<String>,
    pub status: ApprovalStatus,
    /// When the human approved or rejected.
    pub responded_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub failed_reason: Option<String>,
    /// Pipeline stage this approval advances once sent, if any.
    pub pipeline_stage_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    pub fn new(
        candidate_id: Uuid,
        campaign_id: Uuid,
        approval_type: OutreachKind,
        proposed_text: impl Into<String>,
        pipeline_stage_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            campaign_id,
            approval_type,
            proposed_text: proposed_text.into(),
            approved_text: None,
            status: ApprovalStatus::Pending,
            responded_at: None,
            sent_at: None,
            failed_reason: None,
            pipeline_stage_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Text to actually send: the human override when present, otherwise the
    /// proposed text.
    pub fn outgoing_text(&self) -> &str {
        self.approved_text.as_deref().unwrap_or(&self.proposed_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_resolutions() {
        assert!(ApprovalStatus::Pending.can_resolve_to(ApprovalStatus::Approved));
        assert!(ApprovalStatus::Pending.can_resolve_to(ApprovalStatus::Rejected));
        assert!(ApprovalStatus::Approved.can_resolve_to(ApprovalStatus::Sent));
        assert!(ApprovalStatus::Approved.can_resolve_to(ApprovalStatus::Failed));
    }

    #[test]
    fn pending_never_jumps_to_sent() {
        assert!(!ApprovalStatus::Pending.can_resolve_to(ApprovalStatus::Sent));
        assert!(!ApprovalStatus::Pending.can_resolve_to(ApprovalStatus::Failed));
    }

    #[test]
    fn rejected_is_terminal() {
        for target in [
            ApprovalStatus::Pending,
            ApprovalStatus::Approved,
            ApprovalStatus::Sent,
            ApprovalStatus::Failed,
        ] {
            assert!(!ApprovalStatus::Rejected.can_resolve_to(target));
        }
        assert!(ApprovalStatus::Rejected.is_terminal());
    }

    #[test]
    fn sent_and_failed_are_terminal() {
        assert!(ApprovalStatus::Sent.is_terminal());
        assert!(ApprovalStatus::Failed.is_terminal());
        assert!(!ApprovalStatus::Sent.can_resolve_to(ApprovalStatus::Failed));
    }

    #[test]
    fn outgoing_text_prefers_override() {
        let mut approval = Approval::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            OutreachKind::Message,
            "Hi J...",
            None,
        );
        assert_eq!(approval.outgoing_text(), "Hi J...");
        approval.approved_text = Some("Hi Jane...".into());
        assert_eq!(approval.outgoing_text(), "Hi Jane...");
    }
}
