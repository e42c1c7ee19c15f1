use std::borrow::Cow;

use chrono::{DateTime, Utc};
use proposer_agent::ProposalRequest;
use proposer_critic::{CompositeEvaluation, EvaluationAmendment, MAX_SCORE};
use serde::{Deserialize, Serialize};

use crate::arbitration::CompletionReason;
use crate::WorkflowError;

/// Where a run sits in the refinement state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Init,
    Generated,
    Evaluated,
    AwaitingFeedback,
    Refine,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowStatus::Completed | WorkflowStatus::Failed)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStatus::Init => "init",
            WorkflowStatus::Generated => "generated",
            WorkflowStatus::Evaluated => "evaluated",
            WorkflowStatus::AwaitingFeedback => "awaiting_feedback",
            WorkflowStatus::Refine => "refine",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// Per-run configuration snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Maximum number of proposal versions (generation plus revisions)
    pub max_iterations: usize,
    /// Overall score at or above which the run completes, on the [0, 10] scale
    pub excellent_score: f64,
    /// Number of references requested from the retriever each round
    pub reference_count: usize,
    /// Suspend for reviewer input after every evaluation
    pub human_review: bool,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            excellent_score: 8.5,
            reference_count: 4,
            human_review: false,
        }
    }
}

impl WorkflowSettings {
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.max_iterations == 0 {
            return Err(WorkflowError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !self.excellent_score.is_finite() || !(0.0..=MAX_SCORE).contains(&self.excellent_score)
        {
            return Err(WorkflowError::Config(format!(
                "excellent_score {} is outside the 0-10 range",
                self.excellent_score
            )));
        }
        Ok(())
    }
}

/// A reviewer amendment, recorded against the round it applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendmentRecord {
    pub round: usize,
    pub amendment: EvaluationAmendment,
    pub recorded_at: DateTime<Utc>,
}

/// State of one refinement run.
///
/// History only grows: proposals, evaluations, and amendments are appended and
/// never edited. `iteration` always equals the number of proposals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    run_id: String,
    request: ProposalRequest,
    settings: WorkflowSettings,
    proposals: Vec<String>,
    evaluations: Vec<CompositeEvaluation>,
    #[serde(default)]
    amendments: Vec<AmendmentRecord>,
    status: WorkflowStatus,
    iteration: usize,
    #[serde(default)]
    completion: Option<CompletionReason>,
    started_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(request: ProposalRequest, settings: WorkflowSettings) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            request,
            settings,
            proposals: Vec::new(),
            evaluations: Vec::new(),
            amendments: Vec::new(),
            status: WorkflowStatus::Init,
            iteration: 0,
            completion: None,
            started_at: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn request(&self) -> &ProposalRequest {
        &self.request
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn proposals(&self) -> &[String] {
        &self.proposals
    }

    pub fn evaluations(&self) -> &[CompositeEvaluation] {
        &self.evaluations
    }

    pub fn amendments(&self) -> &[AmendmentRecord] {
        &self.amendments
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    /// Number of proposal versions produced so far
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn completion_reason(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn current_proposal(&self) -> Option<&str> {
        self.proposals.last().map(String::as_str)
    }

    /// Latest evaluation exactly as the aggregator produced it
    pub fn latest_evaluation(&self) -> Option<&CompositeEvaluation> {
        self.evaluations.last()
    }

    /// Evaluation of `round` with every reviewer amendment for that round applied
    pub fn effective_evaluation(&self, round: usize) -> Option<Cow<'_, CompositeEvaluation>> {
        let evaluation = self.evaluations.get(round)?;
        let mut amendments = self.amendments.iter().filter(|a| a.round == round).peekable();

        if amendments.peek().is_none() {
            return Some(Cow::Borrowed(evaluation));
        }

        let amended = amendments.fold(evaluation.clone(), |acc, record| {
            acc.amended(&record.amendment)
        });
        Some(Cow::Owned(amended))
    }

    /// Every round's effective evaluation, oldest first
    pub fn effective_history(&self) -> Vec<CompositeEvaluation> {
        (0..self.evaluations.len())
            .filter_map(|round| self.effective_evaluation(round).map(Cow::into_owned))
            .collect()
    }

    /// Overall score of the latest round after amendments
    pub fn final_score(&self) -> Option<f64> {
        let round = self.evaluations.len().checked_sub(1)?;
        self.effective_evaluation(round).map(|e| e.overall_score)
    }

    /// Round currently being worked on (0-indexed)
    pub fn current_round(&self) -> usize {
        self.iteration.saturating_sub(1)
    }

    pub(crate) fn push_proposal(&mut self, proposal: String) {
        self.proposals.push(proposal);
        self.iteration += 1;
        self.status = WorkflowStatus::Generated;
    }

    pub(crate) fn push_evaluation(&mut self, evaluation: CompositeEvaluation) {
        self.evaluations.push(evaluation);
        self.status = WorkflowStatus::Evaluated;
    }

    pub(crate) fn push_amendment(&mut self, round: usize, amendment: EvaluationAmendment) {
        self.amendments.push(AmendmentRecord {
            round,
            amendment,
            recorded_at: Utc::now(),
        });
    }

    pub(crate) fn set_status(&mut self, status: WorkflowStatus) {
        self.status = status;
    }

    pub(crate) fn complete(&mut self, reason: CompletionReason) {
        self.completion = Some(reason);
        self.status = WorkflowStatus::Completed;
    }
}
