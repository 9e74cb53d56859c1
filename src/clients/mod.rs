//! External collaborator traits: the outreach network, the semantic
//! scorer, the message generator, and the approval notifier.
//!
//! The engine only ever talks to the outside world through these traits;
//! production implementations live in their own processes or adapters and
//! tests substitute stubs.

pub mod dry_run;
pub mod webhook;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::approvals::Approval;
use crate::campaigns::JobSpec;
use crate::candidates::Candidate;
use crate::error::{OutreachError, ScoringError};
use crate::scoring::{ScoreWeights, ScoringResult};

pub use webhook::WebhookNotifier;

/// What kind of outbound touch a send represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutreachKind {
    ConnectionRequest,
    Message,
    FollowUp,
    Inmail,
}

impl OutreachKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::Message => "message",
            Self::FollowUp => "follow_up",
            Self::Inmail => "inmail",
        }
    }
}

impl std::fmt::Display for OutreachKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OutreachKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection_request" => Ok(Self::ConnectionRequest),
            "message" => Ok(Self::Message),
            "follow_up" => Ok(Self::FollowUp),
            "inmail" => Ok(Self::Inmail),
            _ => Err(format!("Unknown outreach kind: {s}")),
        }
    }
}

/// A raw profile returned by network discovery, before it becomes a
/// `Candidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredProfile {
    /// Identity on the external network (discovery idempotency key).
    pub external_id: String,
    pub name: String,
    pub location: Option<String>,
    pub current_company: Option<String>,
    pub current_title: Option<String>,
    #[serde(default)]
    pub positions: Vec<crate::candidates::Position>,
    #[serde(default)]
    pub certifications: Vec<String>,
}

/// An inbound reply surfaced by the inbox check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundReply {
    pub external_id: String,
    pub text: String,
    pub received_at: DateTime<Utc>,
}

/// A generated outreach draft.
#[derive(Debug, Clone)]
pub struct Draft {
    pub text: String,
    pub reasoning: String,
}

/// Client for the external professional network.
///
/// Calls are made strictly sequentially by the scheduler, never fanned out.
#[async_trait]
pub trait OutreachClient: Send + Sync {
    /// Send one outbound touch to a profile.
    async fn send(
        &self,
        target: &str,
        text: &str,
        kind: OutreachKind,
    ) -> Result<(), OutreachError>;

    /// Run a discovery search and return raw profiles.
    async fn discover(&self, query: &str) -> Result<Vec<DiscoveredProfile>, OutreachError>;

    /// Poll for inbound replies. Stub hook; reply ingestion is handled
    /// elsewhere.
    async fn check_inbox(&self) -> Result<Vec<InboundReply>, OutreachError>;
}

/// External weighted-rubric scorer.
#[async_trait]
pub trait SemanticScorer: Send + Sync {
    async fn score(
        &self,
        candidate: &Candidate,
        spec: &JobSpec,
        weights: &ScoreWeights,
    ) -> Result<ScoringResult, ScoringError>;
}

/// External outreach-copy generator.
#[async_trait]
pub trait MessageGenerator: Send + Sync {
    async fn generate(
        &self,
        candidate: &Candidate,
        role_context: &str,
        kind: OutreachKind,
    ) -> Result<Draft, OutreachError>;
}

/// Receives a notification whenever a new pending approval is created.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn pending_approval(&self, approval: &Approval) -> Result<(), OutreachError>;
}

/// Notifier that only writes a log line. Default when no webhook is
/// configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn pending_approval(&self, approval: &Approval) -> Result<(), OutreachError> {
        tracing::info!(
            approval_id = %approval.id,
            candidate_id = %approval.candidate_id,
            kind = %approval.approval_type,
            "Approval awaiting human review"
        );
        Ok(())
    }
}
