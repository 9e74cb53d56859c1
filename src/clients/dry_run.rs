//! Dry-run collaborators: log instead of touching the external network.
//!
//! Used when the engine runs without production adapters attached: sends
//! are recorded but not delivered, discovery and inbox return nothing, and
//! scoring hands back a neutral mid-range result.

use async_trait::async_trait;
use tracing::info;

use crate::campaigns::JobSpec;
use crate::candidates::Candidate;
use crate::clients::{
    DiscoveredProfile, Draft, InboundReply, MessageGenerator, OutreachClient, OutreachKind,
    SemanticScorer,
};
use crate::error::{OutreachError, ScoringError};
use crate::scoring::{ScoreBucket, ScoreWeights, ScoringResult};

pub struct DryRunOutreach;

#[async_trait]
impl OutreachClient for DryRunOutreach {
    async fn send(
        &self,
        target: &str,
        text: &str,
        kind: OutreachKind,
    ) -> Result<(), OutreachError> {
        info!(target, kind = %kind, chars = text.len(), "Dry-run send (not delivered)");
        Ok(())
    }

    async fn discover(&self, query: &str) -> Result<Vec<DiscoveredProfile>, OutreachError> {
        info!(query, "Dry-run discovery (no results)");
        Ok(Vec::new())
    }

    async fn check_inbox(&self) -> Result<Vec<InboundReply>, OutreachError> {
        Ok(Vec::new())
    }
}

/// Scores every candidate at half of each category weight.
pub struct NeutralScorer;

#[async_trait]
impl SemanticScorer for NeutralScorer {
    async fn score(
        &self,
        _candidate: &Candidate,
        _spec: &JobSpec,
        weights: &ScoreWeights,
    ) -> Result<ScoringResult, ScoringError> {
        let halves = ScoringResult {
            role_fit: weights.role_fit / 2.0,
            company_context: weights.company_context / 2.0,
            trajectory_stability: weights.trajectory_stability / 2.0,
            education: weights.education / 2.0,
            profile_quality: weights.profile_quality / 2.0,
            bonus: 0.0,
            total_score: (weights.role_fit
                + weights.company_context
                + weights.trajectory_stability
                + weights.education
                + weights.profile_quality)
                / 2.0,
            bucket: ScoreBucket::Cool,
            hard_filter_passed: true,
            flags: vec!["dry_run".to_string()],
        };
        Ok(halves)
    }
}

/// Produces a plain templated draft instead of calling a language model.
pub struct TemplateGenerator;

#[async_trait]
impl MessageGenerator for TemplateGenerator {
    async fn generate(
        &self,
        candidate: &Candidate,
        role_context: &str,
        kind: OutreachKind,
    ) -> Result<Draft, OutreachError> {
        let text = match kind {
            OutreachKind::ConnectionRequest => format!(
                "Hi {}, I'm hiring for a role I think could interest you. Open to connecting?",
                candidate.name
            ),
            OutreachKind::Message | OutreachKind::Inmail => format!(
                "Hi {}, thanks for connecting. {} Would you be open to a quick chat?",
                candidate.name, role_context
            ),
            OutreachKind::FollowUp => format!(
                "Hi {}, floating this back to the top of your inbox in case it got buried.",
                candidate.name
            ),
        };
        Ok(Draft {
            text,
            reasoning: "template output, no model involved".to_string(),
        })
    }
}
