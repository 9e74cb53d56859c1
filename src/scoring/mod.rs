//! Candidate scoring: deterministic hard filters plus the weighted-rubric
//! adapter around the external semantic scorer.

pub mod adapter;
pub mod filters;

use serde::{Deserialize, Serialize};

pub use adapter::ScoringAdapter;
pub use filters::HardFilter;

/// Maximum total score after the bonus cap.
pub const MAX_TOTAL_SCORE: f64 = 110.0;

/// Outreach priority bucket derived from the total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBucket {
    Hot,
    Warm,
    Cool,
    Cold,
}

impl ScoreBucket {
    /// Bucket thresholds over the clamped total: >=85 Hot, >=65 Warm,
    /// >=45 Cool, else Cold.
    pub fn for_total(total: f64) -> Self {
        if total >= 85.0 {
            Self::Hot
        } else if total >= 65.0 {
            Self::Warm
        } else if total >= 45.0 {
            Self::Cool
        } else {
            Self::Cold
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cool => "cool",
            Self::Cold => "cold",
        }
    }
}

impl std::fmt::Display for ScoreBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ScoreBucket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cool" => Ok(Self::Cool),
            "cold" => Ok(Self::Cold),
            _ => Err(format!("Unknown score bucket: {s}")),
        }
    }
}

/// Point allocation per rubric category. Overridable per job spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub role_fit: f64,
    pub company_context: f64,
    pub trajectory_stability: f64,
    pub education: f64,
    pub profile_quality: f64,
    /// Cap on the discretionary bonus on top of the weighted categories.
    pub bonus_cap: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            role_fit: 40.0,
            company_context: 25.0,
            trajectory_stability: 20.0,
            education: 10.0,
            profile_quality: 5.0,
            bonus_cap: 10.0,
        }
    }
}

/// Result of scoring one candidate against one job spec.
///
/// `total_score` and `bucket` are authoritative only after the adapter has
/// clamped and recomputed them; raw scorer output is never trusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    pub role_fit: f64,
    pub company_context: f64,
    pub trajectory_stability: f64,
    pub education: f64,
    pub profile_quality: f64,
    pub bonus: f64,
    pub total_score: f64,
    pub bucket: ScoreBucket,
    pub hard_filter_passed: bool,
    #[serde(default)]
    pub flags: Vec<String>,
}

impl ScoringResult {
    /// Canonical result for a hard-filter disqualification: every sub-score
    /// zero, bucket Cold, one `disqualified:<reason>` flag.
    pub fn disqualified(reason: &str) -> Self {
        Self {
            role_fit: 0.0,
            company_context: 0.0,
            trajectory_stability: 0.0,
            education: 0.0,
            profile_quality: 0.0,
            bonus: 0.0,
            total_score: 0.0,
            bucket: ScoreBucket::Cold,
            hard_filter_passed: false,
            flags: vec![format!("disqualified:{reason}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_thresholds() {
        assert_eq!(ScoreBucket::for_total(110.0), ScoreBucket::Hot);
        assert_eq!(ScoreBucket::for_total(85.0), ScoreBucket::Hot);
        assert_eq!(ScoreBucket::for_total(84.9), ScoreBucket::Warm);
        assert_eq!(ScoreBucket::for_total(65.0), ScoreBucket::Warm);
        assert_eq!(ScoreBucket::for_total(45.0), ScoreBucket::Cool);
        assert_eq!(ScoreBucket::for_total(44.9), ScoreBucket::Cold);
        assert_eq!(ScoreBucket::for_total(0.0), ScoreBucket::Cold);
    }

    #[test]
    fn default_weights_sum_to_hundred() {
        let w = ScoreWeights::default();
        let sum = w.role_fit + w.company_context + w.trajectory_stability + w.education
            + w.profile_quality;
        assert_eq!(sum, 100.0);
        assert_eq!(w.bonus_cap, 10.0);
    }

    #[test]
    fn disqualified_result_is_canonical() {
        let r = ScoringResult::disqualified("employer match: acme");
        assert_eq!(r.total_score, 0.0);
        assert_eq!(r.bucket, ScoreBucket::Cold);
        assert!(!r.hard_filter_passed);
        assert_eq!(r.flags, vec!["disqualified:employer match: acme"]);
    }
}
