//! Error types for the outreach engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Outreach error: {0}")]
    Outreach(#[from] OutreachError),

    #[error("Scoring error: {0}")]
    Scoring(#[from] ScoringError),

    #[error("Approval error: {0}")]
    Approval(#[from] ApprovalError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Pipeline state machine errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The requested target is not an edge of the transition graph.
    /// Always rejected, never retried.
    #[error("Invalid transition for candidate {id}: {from} -> {to}")]
    InvalidTransition { id: Uuid, from: String, to: String },

    /// The edge is valid but its minimum dwell time has not elapsed.
    /// The caller re-checks on a later cycle.
    #[error("Transition {from} -> {to} not yet eligible, {remaining:?} remaining")]
    TimingNotElapsed {
        from: String,
        to: String,
        remaining: Duration,
    },

    #[error("Candidate {id} not found")]
    CandidateNotFound { id: Uuid },

    /// The candidate's status changed under us (another process wrote first).
    #[error("Candidate {id} was modified concurrently, transition abandoned")]
    ConcurrentUpdate { id: Uuid },
}

/// External outreach/discovery call failures. Caught per item, never escape
/// a scheduler phase.
#[derive(Debug, thiserror::Error)]
pub enum OutreachError {
    #[error("Send to {target} failed: {reason}")]
    SendFailed { target: String, reason: String },

    #[error("Discovery for query '{query}' failed: {reason}")]
    DiscoveryFailed { query: String, reason: String },

    #[error("Inbox check failed: {reason}")]
    InboxFailed { reason: String },

    #[error("Message generation failed: {reason}")]
    GenerationFailed { reason: String },

    #[error("Notification failed: {reason}")]
    NotifyFailed { reason: String },
}

/// Semantic scorer call failures.
#[derive(Debug, thiserror::Error)]
pub enum ScoringError {
    #[error("Scorer request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Scorer returned an unusable result: {reason}")]
    InvalidResult { reason: String },
}

/// Approval queue errors.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Approval {id} not found")]
    NotFound { id: Uuid },

    #[error("Approval {id} is {status}, cannot move to {target}")]
    InvalidResolution {
        id: Uuid,
        status: String,
        target: String,
    },
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
