use std::time::Duration;

use crate::{CompletionReason, Component, WorkflowError, WorkflowState};

/// The final outcome of a call to run or resume a workflow
#[derive(Debug)]
pub enum RunOutcome {
    /// Arbitration stopped the run
    Completed {
        reason: CompletionReason,
        state: WorkflowState,
        duration: Duration,
    },
    /// Suspended after an evaluation; resume with `token`
    AwaitingFeedback {
        token: String,
        state: WorkflowState,
    },
    /// Stopped at a step boundary (e.g., Ctrl+C). `token` is set when a
    /// checkpoint store is configured.
    Interrupted {
        token: Option<String>,
        state: WorkflowState,
        duration: Duration,
    },
    /// A component failed; `state` holds the history accumulated so far
    Failed {
        round: usize,
        component: Component,
        error: WorkflowError,
        state: WorkflowState,
        duration: Duration,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &WorkflowState {
        match self {
            Self::Completed { state, .. }
            | Self::AwaitingFeedback { state, .. }
            | Self::Interrupted { state, .. }
            | Self::Failed { state, .. } => state,
        }
    }

    /// Number of proposal versions produced
    pub fn rounds(&self) -> usize {
        self.state().iteration()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    /// Short label for logs and transcripts
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::AwaitingFeedback { .. } => "awaiting_feedback",
            Self::Interrupted { .. } => "interrupted",
            Self::Failed { .. } => "failed",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed { .. } => 0,
            Self::Failed { .. } => 2,
            Self::AwaitingFeedback { .. } => 3,
            Self::Interrupted { .. } => 130,
        }
    }
}
