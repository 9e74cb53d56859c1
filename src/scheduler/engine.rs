//! Scheduler engine: the fixed-period loop driving the outreach funnel.
//!
//! Single-threaded and cooperative: one cycle runs its phases strictly in
//! order, external calls are made sequentially, and the next cycle does not
//! start until the previous one finished. A cycle with a phase-level error
//! degrades to a longer backoff sleep and tries again; the loop never exits
//! on its own. The stop signal is checked between cycles and between phases;
//! an in-flight network call is allowed to finish.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::approvals::{Approval, ApprovalGate};
use crate::campaigns::Campaign;
use crate::candidates::{action_types, AgentAction, Candidate, PipelineStatus};
use crate::clients::{MessageGenerator, OutreachClient, OutreachKind, SemanticScorer};
use crate::config::{EngineConfig, Settings};
use crate::error::{Error, PipelineError, Result};
use crate::limits::RateLimiter;
use crate::pipeline::{PipelineStateMachine, Stage, StageAction, StageProgress, StageState};
use crate::scheduler::hours::within_working_hours;
use crate::scoring::ScoringAdapter;
use crate::store::Database;

/// Action-log type for an outreach kind.
fn action_type_for(kind: OutreachKind) -> &'static str {
    match kind {
        OutreachKind::ConnectionRequest => action_types::CONNECTION_REQUEST,
        OutreachKind::Message | OutreachKind::FollowUp => action_types::MESSAGE,
        OutreachKind::Inmail => action_types::INMAIL,
    }
}

/// Pipeline status a successful send of this kind moves the candidate into.
fn status_after_send(kind: OutreachKind) -> PipelineStatus {
    match kind {
        OutreachKind::ConnectionRequest => PipelineStatus::ConnectionSent,
        OutreachKind::Message => PipelineStatus::Message1Sent,
        OutreachKind::FollowUp => PipelineStatus::Message2Sent,
        OutreachKind::Inmail => PipelineStatus::InmailSent,
    }
}

/// Outreach kind for an outbound stage action. None for non-outbound stages.
fn kind_for_stage(action: StageAction) -> Option<OutreachKind> {
    match action {
        StageAction::ConnectionRequest => Some(OutreachKind::ConnectionRequest),
        StageAction::Message => Some(OutreachKind::Message),
        StageAction::FollowUp => Some(OutreachKind::FollowUp),
        StageAction::Inmail => Some(OutreachKind::Inmail),
        _ => None,
    }
}

pub struct SchedulerEngine {
    db: Arc<dyn Database>,
    machine: PipelineStateMachine,
    gate: Arc<ApprovalGate>,
    limiter: RateLimiter,
    scoring: ScoringAdapter,
    outreach: Arc<dyn OutreachClient>,
    generator: Arc<dyn MessageGenerator>,
    settings: Settings,
    config: EngineConfig,
}

impl SchedulerEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<dyn Database>,
        gate: Arc<ApprovalGate>,
        outreach: Arc<dyn OutreachClient>,
        scorer: Arc<dyn SemanticScorer>,
        generator: Arc<dyn MessageGenerator>,
        settings: Settings,
        config: EngineConfig,
    ) -> Self {
        Self {
            machine: PipelineStateMachine::new(db.clone()),
            limiter: RateLimiter::new(db.clone(), settings.quotas.clone()),
            scoring: ScoringAdapter::new(scorer),
            db,
            gate,
            outreach,
            generator,
            settings,
            config,
        }
    }

    /// Run until the shutdown flag flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            "Scheduler started"
        );
        self.startup_sweep().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let sleep = if !within_working_hours(&self.settings, Utc::now()) {
                debug!("Outside working hours, parked");
                self.config.off_hours_park
            } else if self.run_cycle(&shutdown).await {
                self.config.cycle_interval
            } else {
                warn!(
                    backoff_secs = self.config.error_backoff.as_secs(),
                    "Cycle had errors, backing off"
                );
                self.config.error_backoff
            };

            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = shutdown.changed() => {}
            }
        }
        info!("Scheduler stopped");
    }

    /// Log orphaned in-progress stages on boot. Progress survives restarts
    /// by design, so this is observational only.
    async fn startup_sweep(&self) {
        let campaigns = match self.db.list_active_campaigns().await {
            Ok(c) => c,
            Err(e) => {
                warn!("Startup sweep skipped: {e}");
                return;
            }
        };
        let cutoff = Utc::now() - chrono::Duration::days(30);
        for campaign in campaigns {
            let stages = match self.db.list_in_progress_stages(campaign.id).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(campaign_id = %campaign.id, "Startup sweep failed: {e}");
                    continue;
                }
            };
            for progress in stages {
                if progress.started_at.is_some_and(|t| t < cutoff) {
                    warn!(
                        candidate_id = %progress.candidate_id,
                        stage_id = %progress.stage_id,
                        "Stage in progress for over 30 days"
                    );
                }
            }
        }
    }

    /// One full cycle. Returns false if any phase reported an error.
    /// Phases run strictly in order; a failing phase never blocks the rest.
    pub async fn run_cycle(&self, shutdown: &watch::Receiver<bool>) -> bool {
        fn note(clean: &mut bool, phase: &str, outcome: Result<()>) {
            if let Err(e) = outcome {
                error!(phase, "Phase failed: {e}");
                *clean = false;
            }
        }

        let mut clean = true;
        note(&mut clean, "send_approved", self.send_approved().await);
        if *shutdown.borrow() {
            return clean;
        }
        note(&mut clean, "discover", self.discover().await);
        if *shutdown.borrow() {
            return clean;
        }
        note(&mut clean, "advance_pipeline", self.advance_pipeline().await);
        if *shutdown.borrow() {
            return clean;
        }
        note(&mut clean, "fallback_contact", self.fallback_contact().await);
        note(&mut clean, "check_inbox", self.check_inbox().await);
        clean
    }

    /// Bounded uniform pause between consecutive sends. Load-bearing: even
    /// pacing reads as automation to the external network's abuse detection.
    async fn pacing_delay(&self) {
        let secs = rand::thread_rng()
            .gen_range(self.settings.min_send_delay_secs..=self.settings.max_send_delay_secs);
        debug!(secs, "Pacing before next send");
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    // ── Phase 1: send approved ──────────────────────────────────────

    async fn send_approved(&self) -> Result<()> {
        let ready = self.gate.ready_to_send().await?;
        if ready.is_empty() {
            return Ok(());
        }
        info!(count = ready.len(), "Sending approved outreach");

        let mut sent_any = false;
        for approval in ready {
            if sent_any {
                self.pacing_delay().await;
            }
            match self.send_one(&approval).await {
                Ok(did_send) => sent_any |= did_send,
                Err(e) => {
                    warn!(approval_id = %approval.id, "Send handling failed: {e}");
                }
            }
        }
        Ok(())
    }

    /// Send one approved item. Returns whether a network send happened.
    async fn send_one(&self, approval: &Approval) -> Result<bool> {
        let Some(candidate) = self.db.get_candidate(approval.candidate_id).await? else {
            // Without a terminal status the item would be re-drained every
            // cycle; fail it so the queue forgets it and the reason is kept.
            warn!(approval_id = %approval.id, "Approval references a missing candidate");
            self.gate.mark_failed(approval.id, "candidate missing").await?;
            return Ok(false);
        };

        let kind = approval.approval_type;
        let action_type = action_type_for(kind);
        if !self.limiter.check(action_type).await?.is_allowed() {
            debug!(approval_id = %approval.id, action_type, "Quota exhausted, deferred");
            return Ok(false);
        }

        match self
            .outreach
            .send(&candidate.external_id, approval.outgoing_text(), kind)
            .await
        {
            Ok(()) => {
                self.gate.mark_sent(approval.id).await?;
                self.db
                    .insert_action(&AgentAction::new(
                        candidate.id,
                        action_type,
                        true,
                        json!({"approval_id": approval.id, "kind": kind.as_str()}),
                    ))
                    .await?;
                self.limiter.record(action_type).await?;

                if let Some(stage_id) = approval.pipeline_stage_id {
                    if let Err(e) = self.complete_stage(&candidate, stage_id).await {
                        warn!(candidate_id = %candidate.id, "Stage advance failed: {e}");
                    }
                }

                let target = status_after_send(kind);
                let metadata = json!({"approval_id": approval.id});
                let moved = match self
                    .machine
                    .transition(candidate.id, target, metadata.clone())
                    .await
                {
                    // The send is a fact: a human approved it and the network
                    // accepted it. The status must follow even when the dwell
                    // window the machine would have waited for has not passed,
                    // or the timing oracle drifts from reality for good.
                    Err(Error::Pipeline(PipelineError::TimingNotElapsed { .. })) => {
                        self.machine
                            .force_transition(candidate.id, target, metadata)
                            .await
                    }
                    other => other,
                };
                if let Err(e) = moved {
                    warn!(
                        candidate_id = %candidate.id,
                        target = %target,
                        "Post-send transition refused: {e}"
                    );
                }
                Ok(true)
            }
            Err(e) => {
                self.gate.mark_failed(approval.id, &e.to_string()).await?;
                self.db
                    .insert_action(&AgentAction::new(
                        candidate.id,
                        action_type,
                        false,
                        json!({"approval_id": approval.id, "error": e.to_string()}),
                    ))
                    .await?;
                Ok(true)
            }
        }
    }

    /// Complete the stage an approval was bound to and start the next one.
    async fn complete_stage(&self, candidate: &Candidate, stage_id: uuid::Uuid) -> Result<()> {
        let Some(progress) = self.db.latest_stage_progress(candidate.id).await? else {
            return Ok(());
        };
        if progress.stage_id != stage_id || progress.state != StageState::InProgress {
            return Ok(());
        }

        self.db
            .update_stage_progress(progress.id, StageState::Completed, Some(Utc::now()))
            .await?;

        let Some(stage) = self.db.get_stage(stage_id).await? else {
            return Ok(());
        };
        let Some(pipeline) = self.db.get_pipeline(stage.pipeline_id).await? else {
            return Ok(());
        };
        if let Some(next) = pipeline.next_stage(&stage) {
            self.db
                .insert_stage_progress(&StageProgress::start(candidate.id, next.id))
                .await?;
            debug!(
                candidate_id = %candidate.id,
                stage_order = next.stage_order,
                "Next stage started"
            );
        }
        Ok(())
    }

    // ── Phase 2: discover ───────────────────────────────────────────

    async fn discover(&self) -> Result<()> {
        for campaign in self.db.list_active_campaigns().await? {
            if let Err(e) = self.rescore_unscored(&campaign).await {
                warn!(campaign_id = %campaign.id, "Rescore pass failed: {e}");
            }

            let Some(query) = campaign.search_query.clone() else {
                continue;
            };
            if !self
                .limiter
                .check(action_types::PROFILE_VIEW)
                .await?
                .is_allowed()
            {
                debug!(campaign_id = %campaign.id, "Discovery quota exhausted");
                continue;
            }

            let profiles = match self.outreach.discover(&query).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(campaign_id = %campaign.id, "Discovery failed: {e}");
                    continue;
                }
            };
            self.limiter.record(action_types::PROFILE_VIEW).await?;

            let mut inserted = 0usize;
            for profile in profiles {
                let existing = self
                    .db
                    .get_candidate_by_external_id(campaign.id, &profile.external_id)
                    .await?;
                if existing.is_some() {
                    continue;
                }

                let mut candidate = Candidate::new(campaign.id, profile.external_id, profile.name);
                candidate.location = profile.location;
                candidate.current_company = profile.current_company;
                candidate.current_title = profile.current_title;
                candidate.positions = profile.positions;
                candidate.certifications = profile.certifications;

                if let Err(e) = self.admit_candidate(&campaign, candidate).await {
                    warn!(campaign_id = %campaign.id, "Candidate admission failed: {e}");
                    continue;
                }
                inserted += 1;
            }
            if inserted > 0 {
                info!(campaign_id = %campaign.id, inserted, "Discovery admitted candidates");
            }
        }
        Ok(())
    }

    async fn admit_candidate(&self, campaign: &Campaign, candidate: Candidate) -> Result<()> {
        self.db.insert_candidate(&candidate).await?;
        self.score_candidate(campaign, &candidate).await;
        Ok(())
    }

    /// Score one candidate and persist the verdict. A scorer failure leaves
    /// the row unscored with a failed action in the log; the rescore pass
    /// picks it up again next cycle.
    async fn score_candidate(&self, campaign: &Campaign, candidate: &Candidate) {
        let result = match self.scoring.score(candidate, &campaign.job_spec).await {
            Ok(result) => result,
            Err(e) => {
                warn!(candidate_id = %candidate.id, "Scoring failed: {e}");
                let action = AgentAction::new(
                    candidate.id,
                    action_types::SCORING,
                    false,
                    json!({"error": e.to_string()}),
                );
                if let Err(log_err) = self.db.insert_action(&action).await {
                    warn!(candidate_id = %candidate.id, "Scoring failure not logged: {log_err}");
                }
                return;
            }
        };
        if let Err(e) = self.db.update_candidate_score(candidate.id, &result).await {
            warn!(candidate_id = %candidate.id, "Score persist failed: {e}");
        }
    }

    /// Retry candidates whose admission-time scoring never completed. Until
    /// a hard filter verdict lands they are invisible to the staging and
    /// fallback phases.
    async fn rescore_unscored(&self, campaign: &Campaign) -> Result<()> {
        let unscored = self.db.list_unscored_candidates(campaign.id).await?;
        if unscored.is_empty() {
            return Ok(());
        }
        info!(campaign_id = %campaign.id, count = unscored.len(), "Rescoring candidates");
        for candidate in unscored {
            self.score_candidate(campaign, &candidate).await;
        }
        Ok(())
    }

    // ── Phase 3: advance pipeline ───────────────────────────────────

    async fn advance_pipeline(&self) -> Result<()> {
        self.sweep_timeouts().await;

        for campaign in self.db.list_active_campaigns().await? {
            let Some(pipeline_id) = campaign.pipeline_id else {
                continue;
            };
            let Some(pipeline) = self.db.get_pipeline(pipeline_id).await? else {
                warn!(campaign_id = %campaign.id, "Campaign references a missing pipeline");
                continue;
            };

            if let Some(first) = pipeline.stages.first() {
                if let Err(e) = self.start_first_stages(&campaign, first).await {
                    warn!(campaign_id = %campaign.id, "First-stage start failed: {e}");
                }
            }

            let in_progress = self.db.list_in_progress_stages(campaign.id).await?;
            let now = Utc::now();
            for progress in in_progress {
                if let Err(e) = self.advance_one(&campaign, &progress, now).await {
                    warn!(
                        candidate_id = %progress.candidate_id,
                        "Stage advance failed: {e}"
                    );
                }
            }
        }
        Ok(())
    }

    /// Apply the inferred-timeout edges: stale connection requests expire,
    /// unanswered follow-ups and InMails archive.
    async fn sweep_timeouts(&self) {
        match self.machine.find_expired_connections().await {
            Ok(expired) => {
                for candidate in expired {
                    if let Err(e) = self
                        .machine
                        .transition(
                            candidate.id,
                            PipelineStatus::ConnectionExpired,
                            json!({"reason": "connection_request_timeout"}),
                        )
                        .await
                    {
                        warn!(candidate_id = %candidate.id, "Expiry transition failed: {e}");
                    }
                }
            }
            Err(e) => warn!("Expired-connection scan failed: {e}"),
        }

        match self.machine.find_timed_out_candidates().await {
            Ok(timed_out) => {
                for candidate in timed_out {
                    if let Err(e) = self
                        .machine
                        .transition(
                            candidate.id,
                            PipelineStatus::Archived,
                            json!({"reason": "no_response_timeout"}),
                        )
                        .await
                    {
                        warn!(candidate_id = %candidate.id, "Timeout transition failed: {e}");
                    }
                }
            }
            Err(e) => warn!("Timed-out scan failed: {e}"),
        }
    }

    /// Put hard-filter-passing identified candidates onto the pipeline's
    /// first stage.
    async fn start_first_stages(&self, campaign: &Campaign, first: &Stage) -> Result<()> {
        let identified = self
            .db
            .list_candidates_by_status(Some(campaign.id), PipelineStatus::Identified)
            .await?;
        for candidate in identified {
            if candidate.hard_filter_passed != Some(true) {
                continue;
            }
            if self.db.latest_stage_progress(candidate.id).await?.is_some() {
                continue;
            }
            self.db
                .insert_stage_progress(&StageProgress::start(candidate.id, first.id))
                .await?;
        }
        Ok(())
    }

    async fn advance_one(
        &self,
        campaign: &Campaign,
        progress: &StageProgress,
        now: chrono::DateTime<Utc>,
    ) -> Result<()> {
        let Some(stage) = self.db.get_stage(progress.stage_id).await? else {
            warn!(stage_id = %progress.stage_id, "Progress references a missing stage");
            return Ok(());
        };
        if !progress.delay_elapsed(stage.delay_days, now) {
            return Ok(());
        }

        match kind_for_stage(stage.action) {
            Some(kind) => {
                let Some(candidate) = self.db.get_candidate(progress.candidate_id).await? else {
                    return Ok(());
                };
                self.queue_draft(
                    &candidate,
                    campaign,
                    kind,
                    Some(stage.id),
                    stage.requires_approval,
                )
                .await
            }
            None => {
                // wait / reminder carry no outbound text: complete and move
                // on. profile_view / withdraw would carry a network effect
                // this engine does not perform; completing them is recorded
                // so the log stays honest about stages that did nothing.
                let Some(candidate) = self.db.get_candidate(progress.candidate_id).await? else {
                    return Ok(());
                };
                if matches!(
                    stage.action,
                    StageAction::ProfileView | StageAction::Withdraw
                ) {
                    warn!(
                        candidate_id = %candidate.id,
                        action = stage.action.as_str(),
                        "Stage action not performed, completed as a no-op"
                    );
                    self.db
                        .insert_action(&AgentAction::new(
                            candidate.id,
                            action_types::STAGE_SKIPPED,
                            false,
                            json!({"action": stage.action.as_str()}),
                        ))
                        .await?;
                }
                self.db
                    .update_stage_progress(progress.id, StageState::Completed, Some(now))
                    .await?;
                let Some(pipeline) = self.db.get_pipeline(stage.pipeline_id).await? else {
                    return Ok(());
                };
                if let Some(next) = pipeline.next_stage(&stage) {
                    self.db
                        .insert_stage_progress(&StageProgress::start(candidate.id, next.id))
                        .await?;
                }
                Ok(())
            }
        }
    }

    /// Generate outreach copy and queue it behind the gate. Stages that
    /// waive review get their item approved immediately; it still waits for
    /// the next send phase, so quota and pacing apply either way.
    async fn queue_draft(
        &self,
        candidate: &Candidate,
        campaign: &Campaign,
        kind: OutreachKind,
        stage_id: Option<uuid::Uuid>,
        requires_approval: bool,
    ) -> Result<()> {
        if self.db.has_open_approval(candidate.id).await? {
            return Ok(());
        }

        let draft = match self
            .generator
            .generate(candidate, &campaign.job_spec.role_context, kind)
            .await
        {
            Ok(draft) => draft,
            Err(e) => {
                // Generation failures leave a durable trace, not just a log line.
                self.db
                    .insert_action(&AgentAction::new(
                        candidate.id,
                        action_types::DRAFT_GENERATION,
                        false,
                        json!({"kind": kind.as_str(), "error": e.to_string()}),
                    ))
                    .await?;
                return Err(e.into());
            }
        };
        debug!(
            candidate_id = %candidate.id,
            kind = %kind,
            reasoning = %draft.reasoning,
            "Draft generated"
        );

        let created = self
            .gate
            .create_pending(candidate.id, campaign.id, kind, draft.text, stage_id)
            .await?;
        if let Some(approval) = created {
            if !requires_approval {
                self.gate.approve(approval.id, None).await?;
            }
        }
        Ok(())
    }

    // ── Phase 4: fallback contact ───────────────────────────────────

    async fn fallback_contact(&self) -> Result<()> {
        for campaign in self.db.list_active_campaigns().await? {
            if campaign.pipeline_id.is_some() {
                continue;
            }
            let identified = self
                .db
                .list_candidates_by_status(Some(campaign.id), PipelineStatus::Identified)
                .await?;
            for candidate in identified {
                if candidate.hard_filter_passed != Some(true) {
                    continue;
                }
                if let Err(e) = self
                    .queue_draft(
                        &candidate,
                        &campaign,
                        OutreachKind::ConnectionRequest,
                        None,
                        true,
                    )
                    .await
                {
                    warn!(candidate_id = %candidate.id, "Fallback draft failed: {e}");
                }
            }
        }
        Ok(())
    }

    // ── Phase 5: inbox check ────────────────────────────────────────

    /// Stub hook: replies are surfaced to the log only; ingestion lives
    /// with the dashboard process.
    async fn check_inbox(&self) -> Result<()> {
        match self.outreach.check_inbox().await {
            Ok(replies) if !replies.is_empty() => {
                info!(count = replies.len(), "Inbound replies awaiting review");
            }
            Ok(_) => {}
            Err(e) => warn!("Inbox check failed: {e}"),
        }
        Ok(())
    }
}
