//! Approval queue: the human gate in front of every outbound action.

pub mod gate;
pub mod model;

pub use gate::ApprovalGate;
pub use model::{Approval, ApprovalStatus};
