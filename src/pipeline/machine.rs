//! Pipeline state machine: the only legal mutation path for a candidate's
//! status.
//!
//! Legality is a static transition graph plus a handful of minimum-dwell
//! rules. Dwell is measured from the most recent logged entry into the
//! candidate's current status; absent one, from the candidate's last-updated
//! timestamp. Timeout edges exist because acceptance and non-response on the
//! external network are never observed directly, only inferred from elapsed
//! time.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::candidates::{action_types, AgentAction, Candidate, PipelineStatus};
use crate::error::{PipelineError, Result};
use crate::store::Database;

use PipelineStatus::*;

/// Directly reachable statuses from `status`. Empty for terminals.
pub fn valid_transitions(status: PipelineStatus) -> &'static [PipelineStatus] {
    match status {
        Identified => &[ConnectionSent, Archived],
        ConnectionSent => &[ConnectedNoMessage, ConnectionExpired, Archived],
        ConnectionExpired => &[InmailSent, Archived],
        ConnectedNoMessage => &[Message1Sent],
        Message1Sent => &[RepliedPositive, RepliedNegative, RepliedMaybe, Message2Sent],
        Message2Sent => &[RepliedPositive, RepliedNegative, RepliedMaybe, Archived],
        InmailSent => &[RepliedPositive, RepliedNegative, RepliedMaybe, Archived],
        RepliedPositive => &[QualifyLinkSent],
        RepliedNegative => &[NotAFit],
        RepliedMaybe => &[QualifyLinkSent],
        QualifyLinkSent => &[Qualified, Archived],
        Qualified => &[IntroBooked, NotAFit],
        IntroBooked => &[ClientReviewing],
        ClientReviewing => &[OfferExtended, Passed],
        OfferExtended => &[Placed, NotAFit],
        Placed => &[],
        Passed => &[Archived],
        NotAFit => &[Archived],
        Archived => &[],
    }
}

/// Minimum dwell before the edge becomes eligible. `None` means the edge is
/// immediate.
pub fn dwell_rule(from: PipelineStatus, to: PipelineStatus) -> Option<Duration> {
    match (from, to) {
        (ConnectedNoMessage, Message1Sent) => Some(Duration::hours(24)),
        (Message1Sent, Message2Sent) => Some(Duration::days(5)),
        (Message2Sent, Archived) => Some(Duration::days(7)),
        (InmailSent, Archived) => Some(Duration::days(14)),
        (ConnectionSent, ConnectionExpired) => Some(Duration::days(21)),
        _ => None,
    }
}

pub struct PipelineStateMachine {
    db: Arc<dyn Database>,
}

impl PipelineStateMachine {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// When the candidate entered its current status, per the action log.
    /// Falls back to `updated_at` for candidates predating the log (or whose
    /// status was set outside a logged transition).
    async fn entered_current_status(&self, candidate: &Candidate) -> Result<DateTime<Utc>> {
        let logged = self
            .db
            .latest_entry_into_status(candidate.id, candidate.pipeline_status)
            .await?;
        Ok(logged.unwrap_or(candidate.updated_at))
    }

    /// Check edge legality and dwell for a candidate without applying.
    pub async fn check_transition(
        &self,
        candidate: &Candidate,
        target: PipelineStatus,
    ) -> Result<()> {
        let from = candidate.pipeline_status;
        if !valid_transitions(from).contains(&target) {
            return Err(PipelineError::InvalidTransition {
                id: candidate.id,
                from: from.to_string(),
                to: target.to_string(),
            }
            .into());
        }

        if let Some(required) = dwell_rule(from, target) {
            let entered = self.entered_current_status(candidate).await?;
            let elapsed = Utc::now() - entered;
            if elapsed < required {
                let remaining = (required - elapsed)
                    .to_std()
                    .unwrap_or(std::time::Duration::ZERO);
                return Err(PipelineError::TimingNotElapsed {
                    from: from.to_string(),
                    to: target.to_string(),
                    remaining,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Validate and apply a transition, logging exactly one action.
    ///
    /// The status write is conditional on the status the legality check saw;
    /// if another process moved the candidate in between, the transition is
    /// abandoned with `ConcurrentUpdate` and no action is logged.
    pub async fn transition(
        &self,
        candidate_id: Uuid,
        target: PipelineStatus,
        metadata: serde_json::Value,
    ) -> Result<Candidate> {
        let candidate = self.load(candidate_id).await?;
        self.check_transition(&candidate, target).await?;
        self.apply(candidate, target, metadata, action_types::PIPELINE_TRANSITION)
            .await
    }

    /// Apply a transition skipping the dwell check. Edge legality still
    /// holds. Logged under a distinct action type so manual overrides stay
    /// separable from automatic moves.
    pub async fn force_transition(
        &self,
        candidate_id: Uuid,
        target: PipelineStatus,
        metadata: serde_json::Value,
    ) -> Result<Candidate> {
        let candidate = self.load(candidate_id).await?;
        let from = candidate.pipeline_status;
        if !valid_transitions(from).contains(&target) {
            return Err(PipelineError::InvalidTransition {
                id: candidate.id,
                from: from.to_string(),
                to: target.to_string(),
            }
            .into());
        }
        self.apply(
            candidate,
            target,
            metadata,
            action_types::PIPELINE_TRANSITION_FORCED,
        )
        .await
    }

    async fn load(&self, candidate_id: Uuid) -> Result<Candidate> {
        self.db
            .get_candidate(candidate_id)
            .await?
            .ok_or_else(|| PipelineError::CandidateNotFound { id: candidate_id }.into())
    }

    async fn apply(
        &self,
        candidate: Candidate,
        target: PipelineStatus,
        metadata: serde_json::Value,
        action_type: &str,
    ) -> Result<Candidate> {
        let from = candidate.pipeline_status;
        let applied = self
            .db
            .update_candidate_status(candidate.id, from, target)
            .await?;
        if !applied {
            return Err(PipelineError::ConcurrentUpdate { id: candidate.id }.into());
        }

        let mut entry = json!({
            "from": from.as_str(),
            "to": target.as_str(),
        });
        if let (Some(entry_map), Some(extra)) = (entry.as_object_mut(), metadata.as_object()) {
            for (k, v) in extra {
                entry_map.entry(k.clone()).or_insert_with(|| v.clone());
            }
        }

        let action = AgentAction::new(candidate.id, action_type, true, entry);
        self.db.insert_action(&action).await?;

        info!(
            candidate_id = %candidate.id,
            from = %from,
            to = %target,
            forced = action_type == action_types::PIPELINE_TRANSITION_FORCED,
            "Pipeline transition"
        );

        self.load(candidate.id).await
    }

    /// Connection requests older than the 21-day expiry window.
    pub async fn find_expired_connections(&self) -> Result<Vec<Candidate>> {
        self.find_dwelled(ConnectionSent, ConnectionExpired).await
    }

    /// Candidates whose no-response window has elapsed: second messages
    /// after 7 days, InMails after 14.
    pub async fn find_timed_out_candidates(&self) -> Result<Vec<Candidate>> {
        let mut timed_out = self.find_dwelled(Message2Sent, Archived).await?;
        timed_out.extend(self.find_dwelled(InmailSent, Archived).await?);
        Ok(timed_out)
    }

    async fn find_dwelled(
        &self,
        status: PipelineStatus,
        target: PipelineStatus,
    ) -> Result<Vec<Candidate>> {
        let required = dwell_rule(status, target).unwrap_or_else(Duration::zero);
        let now = Utc::now();

        let mut matched = Vec::new();
        for candidate in self.db.list_candidates_by_status(None, status).await? {
            let entered = self.entered_current_status(&candidate).await?;
            if now - entered >= required {
                matched.push(candidate);
            }
        }
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::LibSqlBackend;

    #[test]
    fn every_status_has_a_row() {
        for status in PipelineStatus::ALL {
            // Must not panic; targets must themselves be known statuses.
            for target in valid_transitions(status) {
                assert!(PipelineStatus::ALL.contains(target));
            }
        }
    }

    #[test]
    fn terminals_have_no_outgoing_edges() {
        assert!(valid_transitions(Placed).is_empty());
        assert!(valid_transitions(Archived).is_empty());
        // Near-terminals keep their single archive edge.
        assert_eq!(valid_transitions(Passed), &[Archived]);
        assert_eq!(valid_transitions(NotAFit), &[Archived]);
    }

    #[test]
    fn dwell_rules_cover_the_timed_edges() {
        assert_eq!(
            dwell_rule(ConnectedNoMessage, Message1Sent),
            Some(Duration::hours(24))
        );
        assert_eq!(dwell_rule(Message1Sent, Message2Sent), Some(Duration::days(5)));
        assert_eq!(dwell_rule(Message2Sent, Archived), Some(Duration::days(7)));
        assert_eq!(dwell_rule(InmailSent, Archived), Some(Duration::days(14)));
        assert_eq!(
            dwell_rule(ConnectionSent, ConnectionExpired),
            Some(Duration::days(21))
        );
        // Untimed edges stay immediate.
        assert_eq!(dwell_rule(Identified, ConnectionSent), None);
        assert_eq!(dwell_rule(RepliedPositive, QualifyLinkSent), None);
    }

    async fn machine_with_db() -> (PipelineStateMachine, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (PipelineStateMachine::new(db.clone()), db)
    }

    async fn seeded_candidate(
        db: &Arc<dyn Database>,
        status: PipelineStatus,
        entered_ago: Duration,
    ) -> Candidate {
        let mut c = Candidate::new(Uuid::new_v4(), "ext", "Sam");
        c.pipeline_status = status;
        c.updated_at = Utc::now() - entered_ago;
        db.insert_candidate(&c).await.unwrap();

        let mut action = AgentAction::new(
            c.id,
            action_types::PIPELINE_TRANSITION,
            true,
            json!({"from": "identified", "to": status.as_str()}),
        );
        action.created_at = Utc::now() - entered_ago;
        db.insert_action(&action).await.unwrap();
        c
    }

    #[tokio::test]
    async fn invalid_edge_rejected() {
        let (machine, db) = machine_with_db().await;
        let c = seeded_candidate(&db, Identified, Duration::zero()).await;

        let err = machine
            .transition(c.id, Placed, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn dwell_not_elapsed_rejected_with_remaining() {
        let (machine, db) = machine_with_db().await;
        let c = seeded_candidate(
            &db,
            ConnectedNoMessage,
            Duration::hours(24) - Duration::seconds(30),
        )
        .await;

        let err = machine
            .transition(c.id, Message1Sent, json!({}))
            .await
            .unwrap_err();
        match err {
            Error::Pipeline(PipelineError::TimingNotElapsed { remaining, .. }) => {
                assert!(remaining <= std::time::Duration::from_secs(30));
                assert!(remaining > std::time::Duration::from_secs(5));
            }
            other => panic!("expected TimingNotElapsed, got {other}"),
        }
    }

    #[tokio::test]
    async fn dwell_elapsed_succeeds_and_logs_one_action() {
        let (machine, db) = machine_with_db().await;
        let c = seeded_candidate(
            &db,
            ConnectedNoMessage,
            Duration::hours(24) + Duration::seconds(30),
        )
        .await;

        let updated = machine
            .transition(c.id, Message1Sent, json!({"note": "first touch"}))
            .await
            .unwrap();
        assert_eq!(updated.pipeline_status, Message1Sent);

        let actions = db.list_actions_for_candidate(c.id, 10).await.unwrap();
        let transitions: Vec<_> = actions
            .iter()
            .filter(|a| {
                a.action_type == action_types::PIPELINE_TRANSITION
                    && a.metadata["to"] == "message_1_sent"
            })
            .collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].metadata["from"], "connected_no_message");
        assert_eq!(transitions[0].metadata["note"], "first touch");
    }

    #[tokio::test]
    async fn force_skips_dwell_but_not_edges() {
        let (machine, db) = machine_with_db().await;
        let c = seeded_candidate(&db, ConnectedNoMessage, Duration::hours(1)).await;

        // Dwell would block this; force does not.
        let updated = machine
            .force_transition(c.id, Message1Sent, json!({}))
            .await
            .unwrap();
        assert_eq!(updated.pipeline_status, Message1Sent);

        let actions = db.list_actions_for_candidate(c.id, 10).await.unwrap();
        assert!(actions
            .iter()
            .any(|a| a.action_type == action_types::PIPELINE_TRANSITION_FORCED));

        // A non-edge stays illegal even when forced.
        let err = machine
            .force_transition(c.id, Placed, json!({}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Pipeline(PipelineError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn expired_connections_found_after_21_days() {
        let (machine, db) = machine_with_db().await;
        let expired =
            seeded_candidate(&db, ConnectionSent, Duration::days(21) + Duration::hours(1)).await;
        let _fresh = seeded_candidate(&db, ConnectionSent, Duration::days(3)).await;

        let found = machine.find_expired_connections().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, expired.id);
    }

    #[tokio::test]
    async fn timed_out_scan_covers_messages_and_inmails() {
        let (machine, db) = machine_with_db().await;
        let stale_msg =
            seeded_candidate(&db, Message2Sent, Duration::days(7) + Duration::hours(1)).await;
        let _recent_msg = seeded_candidate(&db, Message2Sent, Duration::days(2)).await;
        let stale_inmail =
            seeded_candidate(&db, InmailSent, Duration::days(14) + Duration::hours(1)).await;
        let _recent_inmail = seeded_candidate(&db, InmailSent, Duration::days(10)).await;

        let found = machine.find_timed_out_candidates().await.unwrap();
        let ids: Vec<_> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&stale_msg.id));
        assert!(ids.contains(&stale_inmail.id));
    }

    #[tokio::test]
    async fn dwell_falls_back_to_updated_at_without_log() {
        let (machine, db) = machine_with_db().await;
        let mut c = Candidate::new(Uuid::new_v4(), "ext-nolog", "Kim");
        c.pipeline_status = ConnectedNoMessage;
        c.updated_at = Utc::now() - Duration::hours(30);
        db.insert_candidate(&c).await.unwrap();

        let updated = machine
            .transition(c.id, Message1Sent, json!({}))
            .await
            .unwrap();
        assert_eq!(updated.pipeline_status, Message1Sent);
    }
}
