//! Candidate data model: pipeline statuses, profiles, and the action log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scoring::ScoreBucket;

/// Position of a candidate in the 19-state outreach funnel.
///
/// Exactly one status per candidate at any time; mutated only through
/// `pipeline::PipelineStateMachine`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Sourced by discovery, not yet contacted.
    Identified,
    /// Connection request sent, awaiting acceptance.
    ConnectionSent,
    /// Connection request aged out without acceptance.
    ConnectionExpired,
    /// Connection accepted, no message sent yet.
    ConnectedNoMessage,
    /// First direct message sent.
    Message1Sent,
    /// Second (follow-up) message sent.
    Message2Sent,
    /// InMail sent to a non-connection.
    InmailSent,
    /// Candidate replied positively.
    RepliedPositive,
    /// Candidate replied negatively.
    RepliedNegative,
    /// Candidate replied with an ambiguous answer.
    RepliedMaybe,
    /// Qualification link sent.
    QualifyLinkSent,
    /// Candidate completed qualification.
    Qualified,
    /// Intro call booked.
    IntroBooked,
    /// Client is reviewing the candidate.
    ClientReviewing,
    /// Offer extended.
    OfferExtended,
    /// Candidate placed. Terminal.
    Placed,
    /// Client passed on the candidate.
    Passed,
    /// Candidate is not a fit.
    NotAFit,
    /// Removed from active outreach. Terminal.
    Archived,
}

impl PipelineStatus {
    /// All 19 statuses, in funnel order.
    pub const ALL: [PipelineStatus; 19] = [
        Self::Identified,
        Self::ConnectionSent,
        Self::ConnectionExpired,
        Self::ConnectedNoMessage,
        Self::Message1Sent,
        Self::Message2Sent,
        Self::InmailSent,
        Self::RepliedPositive,
        Self::RepliedNegative,
        Self::RepliedMaybe,
        Self::QualifyLinkSent,
        Self::Qualified,
        Self::IntroBooked,
        Self::ClientReviewing,
        Self::OfferExtended,
        Self::Placed,
        Self::Passed,
        Self::NotAFit,
        Self::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identified => "identified",
            Self::ConnectionSent => "connection_sent",
            Self::ConnectionExpired => "connection_expired",
            Self::ConnectedNoMessage => "connected_no_message",
            Self::Message1Sent => "message_1_sent",
            Self::Message2Sent => "message_2_sent",
            Self::InmailSent => "inmail_sent",
            Self::RepliedPositive => "replied_positive",
            Self::RepliedNegative => "replied_negative",
            Self::RepliedMaybe => "replied_maybe",
            Self::QualifyLinkSent => "qualify_link_sent",
            Self::Qualified => "qualified",
            Self::IntroBooked => "intro_booked",
            Self::ClientReviewing => "client_reviewing",
            Self::OfferExtended => "offer_extended",
            Self::Placed => "placed",
            Self::Passed => "passed",
            Self::NotAFit => "not_a_fit",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|status| status.as_str() == s)
            .copied()
            .ok_or_else(|| format!("Unknown pipeline status: {s}"))
    }
}

/// One recorded role in a candidate's position history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub title: String,
    pub company: String,
    /// Tenure in months.
    pub months: u32,
}

/// A prospective candidate sourced into a campaign.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: Uuid,
    pub campaign_id: Uuid,
    /// Identity on the external network, used for idempotent discovery.
    pub external_id: String,
    pub name: String,
    pub location: Option<String>,
    pub current_company: Option<String>,
    pub current_title: Option<String>,
    #[serde(default)]
    pub positions: Vec<Position>,
    #[serde(default)]
    pub certifications: Vec<String>,
    pub pipeline_status: PipelineStatus,
    pub total_score: Option<f64>,
    pub bucket: Option<ScoreBucket>,
    pub hard_filter_passed: Option<bool>,
    pub disqualify_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Candidate {
    /// Create a freshly identified candidate for a campaign.
    pub fn new(campaign_id: Uuid, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            external_id: external_id.into(),
            name: name.into(),
            location: None,
            current_company: None,
            current_title: None,
            positions: Vec::new(),
            certifications: Vec::new(),
            pipeline_status: PipelineStatus::Identified,
            total_score: None,
            bucket: None,
            hard_filter_passed: None,
            disqualify_reason: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Append-only log entry for every externally relevant engine action.
///
/// Doubles as the audit trail and as the timing oracle: "when did this
/// candidate enter status X" is answered by the newest transition entry
/// whose metadata `to` field equals X.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAction {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub action_type: String,
    pub success: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AgentAction {
    pub fn new(
        candidate_id: Uuid,
        action_type: impl Into<String>,
        success: bool,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            action_type: action_type.into(),
            success,
            metadata,
            created_at: Utc::now(),
        }
    }
}

/// Action-type names written to the log.
pub mod action_types {
    pub const PIPELINE_TRANSITION: &str = "pipeline_transition";
    pub const PIPELINE_TRANSITION_FORCED: &str = "pipeline_transition_forced";
    pub const CONNECTION_REQUEST: &str = "connection_request";
    pub const MESSAGE: &str = "message";
    pub const INMAIL: &str = "inmail";
    pub const PROFILE_VIEW: &str = "profile_view";
    pub const DRAFT_GENERATION: &str = "draft_generation";
    pub const SCORING: &str = "scoring";
    pub const STAGE_SKIPPED: &str = "stage_skipped";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nineteen_statuses() {
        assert_eq!(PipelineStatus::ALL.len(), 19);
    }

    #[test]
    fn status_string_roundtrip() {
        for status in PipelineStatus::ALL {
            let parsed: PipelineStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn status_serde_matches_db_strings() {
        let json = serde_json::to_string(&PipelineStatus::ConnectedNoMessage).unwrap();
        assert_eq!(json, "\"connected_no_message\"");
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("ghosted".parse::<PipelineStatus>().is_err());
    }

    #[test]
    fn new_candidate_starts_identified() {
        let c = Candidate::new(Uuid::new_v4(), "ext-1", "Jane Doe");
        assert_eq!(c.pipeline_status, PipelineStatus::Identified);
        assert!(c.total_score.is_none());
    }
}
