//! Unified `Database` trait: single async interface for all persistence.
//!
//! Covers candidates, campaigns, pipelines, stage progress, the approval
//! queue, the append-only agent action log, and the cross-process daily
//! action counters. The candidate/approval state is shared with the
//! dashboard process, so every status change here is a conditional update
//! guarded on the expected prior value.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::approvals::{Approval, ApprovalStatus};
use crate::campaigns::Campaign;
use crate::candidates::{AgentAction, Candidate, PipelineStatus};
use crate::error::DatabaseError;
use crate::pipeline::{PipelineDefinition, Stage, StageProgress, StageState};
use crate::scoring::ScoringResult;

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Candidates ──────────────────────────────────────────────────

    async fn insert_candidate(&self, candidate: &Candidate) -> Result<(), DatabaseError>;

    async fn get_candidate(&self, id: Uuid) -> Result<Option<Candidate>, DatabaseError>;

    /// Look up by the external profile identity (discovery idempotency key).
    async fn get_candidate_by_external_id(
        &self,
        campaign_id: Uuid,
        external_id: &str,
    ) -> Result<Option<Candidate>, DatabaseError>;

    /// Conditionally move a candidate's status. The update only applies when
    /// the stored status still equals `expected`; returns whether a row
    /// changed. This is the re-validation guard against the dashboard
    /// process writing concurrently.
    async fn update_candidate_status(
        &self,
        id: Uuid,
        expected: PipelineStatus,
        new: PipelineStatus,
    ) -> Result<bool, DatabaseError>;

    /// Persist a scoring result onto the candidate row.
    async fn update_candidate_score(
        &self,
        id: Uuid,
        result: &ScoringResult,
    ) -> Result<(), DatabaseError>;

    /// Candidates in one status, optionally scoped to a campaign, oldest
    /// update first.
    async fn list_candidates_by_status(
        &self,
        campaign_id: Option<Uuid>,
        status: PipelineStatus,
    ) -> Result<Vec<Candidate>, DatabaseError>;

    /// Candidates whose admission-time scoring never completed (no hard
    /// filter verdict recorded), oldest first.
    async fn list_unscored_candidates(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<Candidate>, DatabaseError>;

    // ── Campaigns ───────────────────────────────────────────────────

    async fn insert_campaign(&self, campaign: &Campaign) -> Result<(), DatabaseError>;

    async fn get_campaign(&self, id: Uuid) -> Result<Option<Campaign>, DatabaseError>;

    async fn list_active_campaigns(&self) -> Result<Vec<Campaign>, DatabaseError>;

    // ── Pipelines & stage progress ──────────────────────────────────

    /// Insert a pipeline definition together with its stages.
    async fn insert_pipeline(&self, pipeline: &PipelineDefinition) -> Result<(), DatabaseError>;

    async fn get_pipeline(&self, id: Uuid) -> Result<Option<PipelineDefinition>, DatabaseError>;

    async fn get_stage(&self, id: Uuid) -> Result<Option<Stage>, DatabaseError>;

    async fn insert_stage_progress(&self, progress: &StageProgress) -> Result<(), DatabaseError>;

    /// Most recent stage progress for a candidate, by started_at.
    async fn latest_stage_progress(
        &self,
        candidate_id: Uuid,
    ) -> Result<Option<StageProgress>, DatabaseError>;

    /// All `in_progress` stage records for candidates of one campaign.
    async fn list_in_progress_stages(
        &self,
        campaign_id: Uuid,
    ) -> Result<Vec<StageProgress>, DatabaseError>;

    async fn update_stage_progress(
        &self,
        id: Uuid,
        state: StageState,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError>;

    // ── Approvals ───────────────────────────────────────────────────

    async fn insert_approval(&self, approval: &Approval) -> Result<(), DatabaseError>;

    async fn get_approval(&self, id: Uuid) -> Result<Option<Approval>, DatabaseError>;

    /// Approvals in one status, oldest response/creation first.
    async fn list_approvals_by_status(
        &self,
        status: ApprovalStatus,
    ) -> Result<Vec<Approval>, DatabaseError>;

    /// Human resolution: pending -> approved/rejected. Conditional on the
    /// stored status still being `expected`; returns whether a row changed.
    /// Sets `responded_at` and, when given, the edited `approved_text`.
    async fn resolve_approval(
        &self,
        id: Uuid,
        expected: ApprovalStatus,
        new: ApprovalStatus,
        approved_text: Option<&str>,
    ) -> Result<bool, DatabaseError>;

    /// approved -> sent, conditional, stamps `sent_at`.
    async fn mark_approval_sent(&self, id: Uuid) -> Result<bool, DatabaseError>;

    /// approved -> failed, conditional, records the reason.
    async fn mark_approval_failed(&self, id: Uuid, reason: &str) -> Result<bool, DatabaseError>;

    /// Whether the candidate has any approval still in flight
    /// (pending or approved).
    async fn has_open_approval(&self, candidate_id: Uuid) -> Result<bool, DatabaseError>;

    // ── Agent action log ────────────────────────────────────────────

    async fn insert_action(&self, action: &AgentAction) -> Result<(), DatabaseError>;

    /// Timing oracle: when did this candidate last enter `status`?
    /// Reads the newest transition log entry whose metadata `to` matches.
    async fn latest_entry_into_status(
        &self,
        candidate_id: Uuid,
        status: PipelineStatus,
    ) -> Result<Option<DateTime<Utc>>, DatabaseError>;

    async fn list_actions_for_candidate(
        &self,
        candidate_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AgentAction>, DatabaseError>;

    // ── Daily action counters (cross-process rate limiting) ─────────

    /// Today's count for one action type. `day` is a `YYYY-MM-DD` UTC date.
    async fn action_count(&self, day: &str, action_type: &str) -> Result<i64, DatabaseError>;

    /// Atomically increment the counter for (day, action type).
    async fn increment_action_count(
        &self,
        day: &str,
        action_type: &str,
    ) -> Result<(), DatabaseError>;
}
