use std::sync::Arc;

use proposer_agent::{Backend, BackendConfig, BackendError, Message, ProposalRequest};
use tracing::{debug, info};

use crate::{CritiquePrompts, Dimension, EvaluationParseError, EvaluationResult};

/// Sampling temperature for critique calls unless the caller overrides it
pub const CRITIQUE_TEMPERATURE: f32 = 0.1;

/// Inputs required to critique one proposal
#[derive(Clone, Copy)]
pub struct CritiqueInput<'a> {
    pub request: &'a ProposalRequest,
    pub proposal: &'a str,
    /// Round the proposal belongs to (0-indexed), for logging
    pub round: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum CritiqueError {
    #[error("Unsupported evaluation dimension '{0}'. Must be one of: logic, completeness, innovation, feasibility, default")]
    UnsupportedDimension(String),

    #[error("Evaluation dimension '{0}' is configured more than once")]
    DuplicateDimension(Dimension),

    #[error("At least one evaluation dimension must be configured")]
    NoDimensions,

    #[error("Critic backend failed for {dimension}: {source}")]
    Backend {
        dimension: Dimension,
        #[source]
        source: BackendError,
    },

    #[error("Failed to parse {dimension} evaluation: {source}")]
    Parse {
        dimension: Dimension,
        #[source]
        source: EvaluationParseError,
    },
}

impl CritiqueError {
    /// Dimension the failure belongs to, when it came from a single reviewer
    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            CritiqueError::Backend { dimension, .. } | CritiqueError::Parse { dimension, .. } => {
                Some(*dimension)
            }
            CritiqueError::DuplicateDimension(dimension) => Some(*dimension),
            CritiqueError::UnsupportedDimension(_) | CritiqueError::NoDimensions => None,
        }
    }
}

/// Scores proposals along a single dimension.
///
/// Holds no per-call state, so one unit can serve any number of rounds and runs.
pub struct CritiqueUnit {
    backend: Arc<dyn Backend>,
    dimension: Dimension,
    config: BackendConfig,
}

impl CritiqueUnit {
    /// Build a unit from a dimension name, failing fast on unknown names
    pub fn new(
        backend: Arc<dyn Backend>,
        dimension: &str,
        config: BackendConfig,
    ) -> Result<Self, CritiqueError> {
        let dimension = dimension
            .parse::<Dimension>()
            .map_err(CritiqueError::UnsupportedDimension)?;
        Ok(Self::for_dimension(backend, dimension, config))
    }

    pub fn for_dimension(
        backend: Arc<dyn Backend>,
        dimension: Dimension,
        mut config: BackendConfig,
    ) -> Self {
        if config.temperature.is_none() {
            config.temperature = Some(CRITIQUE_TEMPERATURE);
        }
        Self {
            backend,
            dimension,
            config,
        }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    /// Score one proposal. Unparseable responses are errors, never defaults.
    pub async fn evaluate(
        &self,
        input: CritiqueInput<'_>,
    ) -> Result<EvaluationResult, CritiqueError> {
        let messages = vec![
            Message::system(CritiquePrompts::system_prompt(self.dimension)),
            Message::user(CritiquePrompts::build_evaluation_prompt(
                &input.request.problem,
                input.proposal,
                &input.request.goals_text(),
                &input.request.constraints_text(),
                self.dimension,
            )),
        ];

        debug!(
            dimension = %self.dimension,
            round = input.round,
            proposal_len = input.proposal.len(),
            "Running critique"
        );

        let output = self
            .backend
            .invoke(&messages, &self.config)
            .await
            .map_err(|source| CritiqueError::Backend {
                dimension: self.dimension,
                source,
            })?;

        let result = EvaluationResult::parse(self.dimension, &output).map_err(|source| {
            CritiqueError::Parse {
                dimension: self.dimension,
                source,
            }
        })?;

        info!(
            dimension = %self.dimension,
            round = input.round,
            score = result.score,
            "Critique completed"
        );

        Ok(result)
    }
}
