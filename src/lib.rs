//! Outreach Assist: candidate-outreach pipeline and scheduling engine.
//!
//! The engine owns the candidate funnel: a fixed 19-state pipeline state
//! machine with timing rules, a human approval gate in front of every
//! outbound action, cross-process daily rate limits, deterministic hard
//! filters plus a scoring adapter, and a phase-ordered scheduler loop that
//! drives it all on a fixed period inside a working-hours window.

pub mod approvals;
pub mod campaigns;
pub mod candidates;
pub mod clients;
pub mod config;
pub mod error;
pub mod limits;
pub mod pipeline;
pub mod scheduler;
pub mod scoring;
pub mod store;

pub use error::{Error, Result};
