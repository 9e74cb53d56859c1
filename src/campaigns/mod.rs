//! Campaign model: the unit of sourcing work.
//!
//! A campaign binds a job spec to either a configured pipeline (staged
//! outreach) or the fallback single-touch flow, plus an optional discovery
//! search query.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Deterministic requirements and disqualifiers for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobSpec {
    /// Required location when the role is onsite.
    pub required_location: Option<String>,
    /// Whether the role requires onsite presence.
    #[serde(default)]
    pub onsite_required: bool,
    /// Employers that disqualify (case-insensitive substring, either way).
    #[serde(default)]
    pub disqualify_companies: Vec<String>,
    /// Title fragments that disqualify (case-insensitive substring).
    #[serde(default)]
    pub disqualify_titles: Vec<String>,
    /// Certifications the candidate must hold.
    #[serde(default)]
    pub required_certifications: Vec<String>,
    /// Per-spec rubric weight overrides. None means engine defaults.
    #[serde(default)]
    pub weight_overrides: Option<crate::scoring::ScoreWeights>,
    /// Free-text context handed to the message generator.
    #[serde(default)]
    pub role_context: String,
}

/// An outreach campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub active: bool,
    /// Discovery query on the external network. None disables discovery.
    pub search_query: Option<String>,
    /// Bound pipeline definition. None means fallback single-touch outreach.
    pub pipeline_id: Option<Uuid>,
    pub job_spec: JobSpec,
    pub created_at: DateTime<Utc>,
}

impl Campaign {
    pub fn new(name: impl Into<String>, job_spec: JobSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            active: true,
            search_query: None,
            pipeline_id: None,
            job_spec,
            created_at: Utc::now(),
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.search_query = Some(query.into());
        self
    }

    pub fn with_pipeline(mut self, pipeline_id: Uuid) -> Self {
        self.pipeline_id = Some(pipeline_id);
        self
    }
}
