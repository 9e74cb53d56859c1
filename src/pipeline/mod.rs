//! Outreach pipeline: the candidate state machine and staged pipeline
//! definitions.

pub mod machine;
pub mod stages;

pub use machine::{dwell_rule, valid_transitions, PipelineStateMachine};
pub use stages::{
    PipelineDefinition, Stage, StageAction, StageProgress, StageState,
};
