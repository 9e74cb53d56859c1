//! Pipeline definitions: ordered outreach stages and per-candidate
//! progress through them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a pipeline stage does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageAction {
    ConnectionRequest,
    Message,
    FollowUp,
    Wait,
    Reminder,
    Inmail,
    ProfileView,
    Withdraw,
}

impl StageAction {
    /// Whether this action produces an outbound send and therefore requires
    /// a human-approved message.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            Self::ConnectionRequest | Self::Message | Self::FollowUp | Self::Inmail
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectionRequest => "connection_request",
            Self::Message => "message",
            Self::FollowUp => "follow_up",
            Self::Wait => "wait",
            Self::Reminder => "reminder",
            Self::Inmail => "inmail",
            Self::ProfileView => "profile_view",
            Self::Withdraw => "withdraw",
        }
    }
}

impl std::fmt::Display for StageAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection_request" => Ok(Self::ConnectionRequest),
            "message" => Ok(Self::Message),
            "follow_up" => Ok(Self::FollowUp),
            "wait" => Ok(Self::Wait),
            "reminder" => Ok(Self::Reminder),
            "inmail" => Ok(Self::Inmail),
            "profile_view" => Ok(Self::ProfileView),
            "withdraw" => Ok(Self::Withdraw),
            _ => Err(format!("Unknown stage action: {s}")),
        }
    }
}

/// One configured step of a campaign's pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub stage_order: u32,
    pub action: StageAction,
    /// Days the candidate must sit in the stage before it fires.
    pub delay_days: u32,
    pub requires_approval: bool,
    /// Optional message template reference.
    pub template: Option<String>,
}

/// An ordered set of stages bound to one or more campaigns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub id: Uuid,
    pub name: String,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
}

impl PipelineDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            stages: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Append a stage; order is assigned from the current stage count.
    pub fn add_stage(
        &mut self,
        action: StageAction,
        delay_days: u32,
        requires_approval: bool,
    ) -> &Stage {
        let stage = Stage {
            id: Uuid::new_v4(),
            pipeline_id: self.id,
            stage_order: self.stages.len() as u32,
            action,
            delay_days,
            requires_approval,
            template: None,
        };
        self.stages.push(stage);
        self.stages.last().unwrap()
    }

    /// The stage after the given one, by order. None at the end.
    pub fn next_stage(&self, after: &Stage) -> Option<&Stage> {
        self.stages
            .iter()
            .find(|s| s.stage_order == after.stage_order + 1)
    }
}

/// Progress state of one (candidate, stage) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    InProgress,
    Completed,
    Skipped,
    Failed,
}

impl StageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown stage state: {s}")),
        }
    }
}

/// Per-candidate record of one stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProgress {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub stage_id: Uuid,
    pub state: StageState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StageProgress {
    /// Start a stage for a candidate (state `in_progress`, clock running).
    pub fn start(candidate_id: Uuid, stage_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            stage_id,
            state: StageState::InProgress,
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    /// Whether the stage's delay has elapsed since it started.
    pub fn delay_elapsed(&self, delay_days: u32, now: DateTime<Utc>) -> bool {
        match self.started_at {
            Some(started) => now - started >= chrono::Duration::days(i64::from(delay_days)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_actions() {
        assert!(StageAction::ConnectionRequest.is_outbound());
        assert!(StageAction::Message.is_outbound());
        assert!(StageAction::FollowUp.is_outbound());
        assert!(StageAction::Inmail.is_outbound());
        assert!(!StageAction::Wait.is_outbound());
        assert!(!StageAction::Reminder.is_outbound());
        assert!(!StageAction::ProfileView.is_outbound());
        assert!(!StageAction::Withdraw.is_outbound());
    }

    #[test]
    fn stage_order_assigned_sequentially() {
        let mut def = PipelineDefinition::new("default");
        def.add_stage(StageAction::ConnectionRequest, 0, true);
        def.add_stage(StageAction::Wait, 2, false);
        def.add_stage(StageAction::Message, 1, true);
        let orders: Vec<u32> = def.stages.iter().map(|s| s.stage_order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
    }

    #[test]
    fn next_stage_walks_order() {
        let mut def = PipelineDefinition::new("default");
        def.add_stage(StageAction::ConnectionRequest, 0, true);
        def.add_stage(StageAction::Message, 1, true);
        let first = def.stages[0].clone();
        let next = def.next_stage(&first).unwrap();
        assert_eq!(next.action, StageAction::Message);
        let last = def.stages[1].clone();
        assert!(def.next_stage(&last).is_none());
    }

    #[test]
    fn delay_elapsed_boundary() {
        let mut progress = StageProgress::start(Uuid::new_v4(), Uuid::new_v4());
        let started = Utc::now();
        progress.started_at = Some(started);
        assert!(progress.delay_elapsed(0, started));
        assert!(!progress.delay_elapsed(3, started + chrono::Duration::days(2)));
        assert!(progress.delay_elapsed(3, started + chrono::Duration::days(3)));
    }
}
