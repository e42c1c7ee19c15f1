use proposer_critic::EvaluationAmendment;
use serde::{Deserialize, Serialize};

use crate::{WorkflowError, WorkflowState};

/// Why a run stopped iterating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// `max_iterations` proposal versions were produced
    BudgetExhausted,
    /// The latest overall score reached `excellent_score`
    QualityMet,
    /// A reviewer chose to stop
    ReviewerStopped,
}

impl std::fmt::Display for CompletionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CompletionReason::BudgetExhausted => "iteration budget exhausted",
            CompletionReason::QualityMet => "quality threshold met",
            CompletionReason::ReviewerStopped => "stopped by reviewer",
        };
        write!(f, "{}", text)
    }
}

/// Outcome of the arbitration step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Refine,
    Complete(CompletionReason),
}

impl Decision {
    pub fn short_description(&self) -> String {
        match self {
            Decision::Refine => "refine".to_string(),
            Decision::Complete(reason) => format!("complete ({})", reason),
        }
    }
}

/// Reviewer's continue/stop choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Continue,
    Stop,
}

impl std::str::FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "continue" => Ok(ReviewAction::Continue),
            "stop" => Ok(ReviewAction::Stop),
            _ => Err(format!("Unknown review action: {} (expected continue or stop)", s)),
        }
    }
}

/// External input supplied when resuming a suspended run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewFeedback {
    /// Changes to the latest evaluation
    #[serde(default)]
    pub amendment: Option<EvaluationAmendment>,
    /// Continue/stop override; `None` keeps the automatic decision
    #[serde(default)]
    pub action: Option<ReviewAction>,
}

impl ReviewFeedback {
    pub fn stop() -> Self {
        Self {
            amendment: None,
            action: Some(ReviewAction::Stop),
        }
    }

    pub fn proceed() -> Self {
        Self {
            amendment: None,
            action: Some(ReviewAction::Continue),
        }
    }
}

/// Decide whether to refine or stop after an evaluation.
///
/// Precedence: a reviewer `Stop`, then the iteration budget, then a reviewer
/// `Continue` (which skips the score check), then the quality threshold. The
/// budget is never overridden, so a run produces at most `max_iterations`
/// proposals. The threshold is compared against the amended latest evaluation.
pub fn arbitrate(
    state: &WorkflowState,
    review: Option<ReviewAction>,
) -> Result<Decision, WorkflowError> {
    let latest_round = state
        .evaluations()
        .len()
        .checked_sub(1)
        .ok_or_else(|| WorkflowError::Arbitration("no evaluation to arbitrate".to_string()))?;

    if state.evaluations().len() != state.proposals().len() {
        return Err(WorkflowError::Arbitration(format!(
            "{} proposals but {} evaluations",
            state.proposals().len(),
            state.evaluations().len()
        )));
    }

    if review == Some(ReviewAction::Stop) {
        return Ok(Decision::Complete(CompletionReason::ReviewerStopped));
    }

    if state.iteration() >= state.settings().max_iterations {
        return Ok(Decision::Complete(CompletionReason::BudgetExhausted));
    }

    if review == Some(ReviewAction::Continue) {
        return Ok(Decision::Refine);
    }

    let score = state
        .effective_evaluation(latest_round)
        .map(|e| e.overall_score)
        .ok_or_else(|| WorkflowError::Arbitration("latest evaluation missing".to_string()))?;

    if score >= state.settings().excellent_score {
        Ok(Decision::Complete(CompletionReason::QualityMet))
    } else {
        Ok(Decision::Refine)
    }
}
