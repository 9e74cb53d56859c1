//! Scoring adapter: orchestrates hard filters and the external semantic
//! scorer, then normalizes the result.

use std::sync::Arc;

use tracing::{debug, info};

use crate::campaigns::JobSpec;
use crate::candidates::Candidate;
use crate::clients::SemanticScorer;
use crate::error::Result;
use crate::scoring::{HardFilter, ScoreBucket, ScoreWeights, ScoringResult, MAX_TOTAL_SCORE};

pub struct ScoringAdapter {
    scorer: Arc<dyn SemanticScorer>,
}

impl ScoringAdapter {
    pub fn new(scorer: Arc<dyn SemanticScorer>) -> Self {
        Self { scorer }
    }

    /// Score one candidate against a job spec.
    ///
    /// Hard filters run first; a disqualified candidate gets the canonical
    /// zero result and the external scorer is never invoked. Otherwise the
    /// scorer runs with the spec's weight overrides (or the defaults), and
    /// its output is normalized: the total is clamped to [0, 110] and the
    /// bucket is recomputed locally from the clamped total.
    pub async fn score(&self, candidate: &Candidate, spec: &JobSpec) -> Result<ScoringResult> {
        if let Some(reason) = HardFilter::evaluate(candidate, spec) {
            info!(
                candidate_id = %candidate.id,
                reason = %reason,
                "Candidate disqualified by hard filter"
            );
            return Ok(ScoringResult::disqualified(&reason));
        }

        let weights = spec
            .weight_overrides
            .clone()
            .unwrap_or_else(ScoreWeights::default);

        let raw = self.scorer.score(candidate, spec, &weights).await?;
        let result = normalize(raw);
        debug!(
            candidate_id = %candidate.id,
            total = result.total_score,
            bucket = %result.bucket,
            "Candidate scored"
        );
        Ok(result)
    }
}

/// Clamp the total and recompute the bucket. The scorer's own bucket claim
/// is discarded.
fn normalize(mut result: ScoringResult) -> ScoringResult {
    result.total_score = result.total_score.clamp(0.0, MAX_TOTAL_SCORE);
    result.bucket = ScoreBucket::for_total(result.total_score);
    result.hard_filter_passed = true;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubScorer {
        calls: AtomicUsize,
        result: ScoringResult,
    }

    impl StubScorer {
        fn returning(result: ScoringResult) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                result,
            })
        }
    }

    #[async_trait]
    impl SemanticScorer for StubScorer {
        async fn score(
            &self,
            _candidate: &Candidate,
            _spec: &JobSpec,
            _weights: &ScoreWeights,
        ) -> std::result::Result<ScoringResult, ScoringError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn raw_result(total: f64, bucket: ScoreBucket) -> ScoringResult {
        ScoringResult {
            role_fit: 30.0,
            company_context: 20.0,
            trajectory_stability: 15.0,
            education: 8.0,
            profile_quality: 4.0,
            bonus: 5.0,
            total_score: total,
            bucket,
            hard_filter_passed: true,
            flags: vec![],
        }
    }

    fn candidate() -> Candidate {
        Candidate::new(uuid::Uuid::new_v4(), "ext", "Alex")
    }

    #[tokio::test]
    async fn scorer_skipped_on_disqualification() {
        let stub = StubScorer::returning(raw_result(90.0, ScoreBucket::Hot));
        let adapter = ScoringAdapter::new(stub.clone());

        let mut c = candidate();
        c.current_company = Some("Blocked Corp".into());
        let spec = JobSpec {
            disqualify_companies: vec!["Blocked Corp".into()],
            ..Default::default()
        };

        let result = adapter.score(&c, &spec).await.unwrap();
        assert!(!result.hard_filter_passed);
        assert_eq!(result.total_score, 0.0);
        assert_eq!(result.bucket, ScoreBucket::Cold);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inconsistent_scorer_output_normalized() {
        // Scorer claims Cold despite a huge (out of range) total.
        let stub = StubScorer::returning(raw_result(140.0, ScoreBucket::Cold));
        let adapter = ScoringAdapter::new(stub.clone());

        let result = adapter
            .score(&candidate(), &JobSpec::default())
            .await
            .unwrap();
        assert_eq!(result.total_score, MAX_TOTAL_SCORE);
        assert_eq!(result.bucket, ScoreBucket::Hot);
        assert!(result.hard_filter_passed);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_total_clamped_to_zero() {
        let stub = StubScorer::returning(raw_result(-5.0, ScoreBucket::Hot));
        let adapter = ScoringAdapter::new(stub);

        let result = adapter
            .score(&candidate(), &JobSpec::default())
            .await
            .unwrap();
        assert_eq!(result.total_score, 0.0);
        assert_eq!(result.bucket, ScoreBucket::Cold);
    }
}
