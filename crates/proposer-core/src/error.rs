use proposer_agent::RequestError;
use proposer_critic::CritiqueError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::checkpoint::CheckpointError;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] RequestError),

    #[error("Proposal generation failed: {0}")]
    GenerationFailed(String),

    #[error("Proposal revision failed: {0}")]
    RevisionFailed(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] CritiqueError),

    #[error("Arbitration error: {0}")]
    Arbitration(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("Cannot resume: {0}")]
    InvalidResume(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl WorkflowError {
    /// Workflow component a failure is attributed to
    pub fn component(&self) -> Component {
        match self {
            WorkflowError::InvalidInput(_) | WorkflowError::Config(_) => Component::Setup,
            WorkflowError::GenerationFailed(_) => Component::Generation,
            WorkflowError::RevisionFailed(_) => Component::Revision,
            WorkflowError::Evaluation(_) => Component::Evaluation,
            WorkflowError::Arbitration(_) => Component::Arbitration,
            WorkflowError::Checkpoint(_) | WorkflowError::InvalidResume(_) => {
                Component::Checkpoint
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Setup,
    Generation,
    Evaluation,
    Revision,
    Arbitration,
    Checkpoint,
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::Setup => "setup",
            Component::Generation => "generation",
            Component::Evaluation => "evaluation",
            Component::Revision => "revision",
            Component::Arbitration => "arbitration",
            Component::Checkpoint => "checkpoint",
        };
        write!(f, "{}", name)
    }
}
