//! Scheduler: working-hours gating and the phase-ordered engine loop.

pub mod engine;
pub mod hours;

pub use engine::SchedulerEngine;
pub use hours::within_working_hours;
