//! Approval gate: every outbound message passes through here.
//!
//! The engine proposes, a human disposes. Drafts enter the queue as
//! `pending`; only a human can move them to `approved` or `rejected`, and
//! only the sender can move `approved` to `sent` or `failed`. All status
//! movement goes through conditional database updates, so two processes
//! racing on the same approval cannot both win.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::approvals::{Approval, ApprovalStatus};
use crate::clients::{Notifier, OutreachKind};
use crate::error::{ApprovalError, Result};
use crate::store::Database;

pub struct ApprovalGate {
    db: Arc<dyn Database>,
    notifier: Arc<dyn Notifier>,
}

impl ApprovalGate {
    pub fn new(db: Arc<dyn Database>, notifier: Arc<dyn Notifier>) -> Self {
        Self { db, notifier }
    }

    /// Queue a draft for human review.
    ///
    /// Returns `None` if the candidate already has an open (pending or
    /// approved-unsent) approval; one open item per candidate keeps the
    /// review queue free of duplicates when a cycle re-examines a candidate.
    pub async fn create_pending(
        &self,
        candidate_id: Uuid,
        campaign_id: Uuid,
        kind: OutreachKind,
        proposed_text: impl Into<String>,
        pipeline_stage_id: Option<Uuid>,
    ) -> Result<Option<Approval>> {
        if self.db.has_open_approval(candidate_id).await? {
            return Ok(None);
        }

        let approval = Approval::new(
            candidate_id,
            campaign_id,
            kind,
            proposed_text,
            pipeline_stage_id,
        );
        self.db.insert_approval(&approval).await?;
        info!(
            approval_id = %approval.id,
            candidate_id = %candidate_id,
            kind = %kind,
            "Approval queued for review"
        );

        // Notification is best-effort. The approval is already persisted;
        // the reviewer will still see it in the queue.
        if let Err(e) = self.notifier.pending_approval(&approval).await {
            warn!(approval_id = %approval.id, "Approval notification failed: {e}");
        }

        Ok(Some(approval))
    }

    /// Human approves a pending draft, optionally with edited text.
    /// The edited text is what gets sent; the original proposal is retained.
    pub async fn approve(&self, id: Uuid, edited_text: Option<&str>) -> Result<Approval> {
        self.resolve(id, ApprovalStatus::Approved, edited_text).await
    }

    /// Human rejects a pending draft. Terminal for this approval.
    pub async fn reject(&self, id: Uuid) -> Result<Approval> {
        self.resolve(id, ApprovalStatus::Rejected, None).await
    }

    async fn resolve(
        &self,
        id: Uuid,
        target: ApprovalStatus,
        edited_text: Option<&str>,
    ) -> Result<Approval> {
        let approval = self
            .db
            .get_approval(id)
            .await?
            .ok_or(ApprovalError::NotFound { id })?;
        if !approval.status.can_resolve_to(target) {
            return Err(ApprovalError::InvalidResolution {
                id,
                status: approval.status.to_string(),
                target: target.to_string(),
            }
            .into());
        }

        // The precheck gives the error message; the conditional update gives
        // atomicity against another reviewer racing on the same item.
        let applied = self
            .db
            .resolve_approval(id, approval.status, target, edited_text)
            .await?;
        if !applied {
            return Err(ApprovalError::InvalidResolution {
                id,
                status: approval.status.to_string(),
                target: target.to_string(),
            }
            .into());
        }

        info!(approval_id = %id, status = %target, "Approval resolved");
        self.db
            .get_approval(id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound { id }.into())
    }

    /// Record a successful send. Legal only from `approved`.
    pub async fn mark_sent(&self, id: Uuid) -> Result<()> {
        if !self.db.mark_approval_sent(id).await? {
            return Err(self.illegal_move(id, ApprovalStatus::Sent).await);
        }
        Ok(())
    }

    /// Record a failed send attempt. Legal only from `approved`. A human
    /// re-approves or abandons; the engine never auto-retries.
    pub async fn mark_failed(&self, id: Uuid, reason: &str) -> Result<()> {
        if !self.db.mark_approval_failed(id, reason).await? {
            return Err(self.illegal_move(id, ApprovalStatus::Failed).await);
        }
        warn!(approval_id = %id, reason, "Approved send failed");
        Ok(())
    }

    async fn illegal_move(&self, id: Uuid, target: ApprovalStatus) -> crate::error::Error {
        match self.db.get_approval(id).await {
            Ok(Some(a)) => ApprovalError::InvalidResolution {
                id,
                status: a.status.to_string(),
                target: target.to_string(),
            }
            .into(),
            Ok(None) => ApprovalError::NotFound { id }.into(),
            Err(e) => e.into(),
        }
    }

    /// Drafts awaiting human review, oldest first.
    pub async fn pending(&self) -> Result<Vec<Approval>> {
        Ok(self
            .db
            .list_approvals_by_status(ApprovalStatus::Pending)
            .await?)
    }

    /// Approved drafts the send phase should pick up, oldest approval first.
    pub async fn ready_to_send(&self) -> Result<Vec<Approval>> {
        Ok(self
            .db
            .list_approvals_by_status(ApprovalStatus::Approved)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::LogNotifier;
    use crate::error::Error;
    use crate::store::LibSqlBackend;

    async fn gate() -> ApprovalGate {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        ApprovalGate::new(db, Arc::new(LogNotifier))
    }

    #[tokio::test]
    async fn create_then_approve_with_edit() {
        let gate = gate().await;
        let candidate_id = Uuid::new_v4();
        let approval = gate
            .create_pending(
                candidate_id,
                Uuid::new_v4(),
                OutreachKind::Message,
                "Hi ther",
                None,
            )
            .await
            .unwrap()
            .unwrap();

        let approved = gate.approve(approval.id, Some("Hi there")).await.unwrap();
        assert_eq!(approved.status, ApprovalStatus::Approved);
        assert_eq!(approved.outgoing_text(), "Hi there");
    }

    #[tokio::test]
    async fn duplicate_open_approval_suppressed() {
        let gate = gate().await;
        let candidate_id = Uuid::new_v4();
        let campaign_id = Uuid::new_v4();

        let first = gate
            .create_pending(candidate_id, campaign_id, OutreachKind::Message, "a", None)
            .await
            .unwrap();
        assert!(first.is_some());

        let second = gate
            .create_pending(candidate_id, campaign_id, OutreachKind::Message, "b", None)
            .await
            .unwrap();
        assert!(second.is_none());

        // After the first is rejected the candidate may be queued again.
        gate.reject(first.unwrap().id).await.unwrap();
        let third = gate
            .create_pending(candidate_id, campaign_id, OutreachKind::Message, "c", None)
            .await
            .unwrap();
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn rejected_is_terminal() {
        let gate = gate().await;
        let approval = gate
            .create_pending(
                Uuid::new_v4(),
                Uuid::new_v4(),
                OutreachKind::Inmail,
                "text",
                None,
            )
            .await
            .unwrap()
            .unwrap();

        gate.reject(approval.id).await.unwrap();

        let err = gate.approve(approval.id, None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Approval(ApprovalError::InvalidResolution { .. })
        ));
    }

    #[tokio::test]
    async fn sent_only_from_approved() {
        let gate = gate().await;
        let approval = gate
            .create_pending(
                Uuid::new_v4(),
                Uuid::new_v4(),
                OutreachKind::ConnectionRequest,
                "text",
                None,
            )
            .await
            .unwrap()
            .unwrap();

        // Pending draft cannot be marked sent.
        assert!(gate.mark_sent(approval.id).await.is_err());

        gate.approve(approval.id, None).await.unwrap();
        gate.mark_sent(approval.id).await.unwrap();

        // Sent is terminal.
        assert!(gate.mark_failed(approval.id, "late failure").await.is_err());
    }

    #[tokio::test]
    async fn unknown_approval_reported_missing() {
        let gate = gate().await;
        let err = gate.approve(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, Error::Approval(ApprovalError::NotFound { .. })));
    }
}
