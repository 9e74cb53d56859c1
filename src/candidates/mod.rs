//! Candidate domain: profiles, pipeline statuses, and the agent action log.

pub mod model;

pub use model::{action_types, AgentAction, Candidate, PipelineStatus, Position};
