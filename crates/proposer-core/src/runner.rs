use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use proposer_agent::{ProposalRequest, Reference, Retriever};
use proposer_critic::{CritiqueInput, EvaluationAggregator};
use proposer_logging::{DimensionScore, LogEvent, Logger, ProposalSource, RunHeader, SessionWriter};
use tracing::{debug, info, warn};

use crate::arbitration::{arbitrate, Decision, ReviewAction, ReviewFeedback};
use crate::checkpoint::CheckpointStore;
use crate::{
    GenerationUnit, RevisionUnit, RunOutcome, WorkflowError, WorkflowSettings, WorkflowState,
    WorkflowStatus,
};

/// Drives the generate → evaluate → arbitrate → refine state machine
pub struct WorkflowRunner {
    generator: GenerationUnit,
    aggregator: EvaluationAggregator,
    reviser: RevisionUnit,
    logger: Arc<Logger>,
    retriever: Option<Arc<dyn Retriever>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    session_dir: Option<PathBuf>,
    open_transcript: Mutex<Option<Arc<SessionWriter>>>,
    interrupted: Arc<AtomicBool>,
}

impl WorkflowRunner {
    pub fn new(
        generator: GenerationUnit,
        aggregator: EvaluationAggregator,
        reviser: RevisionUnit,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            generator,
            aggregator,
            reviser,
            logger,
            retriever: None,
            checkpoints: None,
            session_dir: None,
            open_transcript: Mutex::new(None),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Write one JSONL transcript per run into `dir`
    pub fn with_session_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.session_dir = Some(dir.into());
        self
    }

    /// Get a handle to signal interruption
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Validate inputs and create the state for a new run.
    ///
    /// Nothing here contacts a backend.
    pub fn start(
        &self,
        request: ProposalRequest,
        settings: WorkflowSettings,
    ) -> Result<WorkflowState, WorkflowError> {
        request.validate()?;
        settings.validate()?;
        if settings.human_review && self.checkpoints.is_none() {
            return Err(WorkflowError::Config(
                "human review requires a checkpoint store".to_string(),
            ));
        }

        let state = WorkflowState::new(request, settings);
        info!(run_id = state.run_id(), "Starting refinement run");

        self.logger.log(&LogEvent::RunStarted {
            run_id: state.run_id().to_string(),
            problem: state.request().problem.clone(),
            dimensions: self.dimension_names(),
            max_iterations: state.settings().max_iterations,
            excellent_score: state.settings().excellent_score,
        });
        self.write_header(&state);

        Ok(state)
    }

    /// Run a new workflow to a terminal or suspended state.
    ///
    /// Malformed input is returned as `Err` before any backend call; every
    /// later failure is reported as [`RunOutcome::Failed`].
    pub async fn run(
        &self,
        request: ProposalRequest,
        settings: WorkflowSettings,
    ) -> Result<RunOutcome, WorkflowError> {
        let state = self.start(request, settings)?;
        Ok(self.drive(state, Instant::now()).await)
    }

    /// Continue a checkpointed run.
    ///
    /// A run awaiting feedback takes the amendment and continue/stop choice
    /// from `feedback` and re-enters at arbitration. An interrupted run picks
    /// up from its recorded status and accepts no feedback. Completed steps
    /// are never re-run.
    pub async fn resume(
        &self,
        token: &str,
        feedback: ReviewFeedback,
    ) -> Result<RunOutcome, WorkflowError> {
        let store = self.checkpoints.as_ref().ok_or_else(|| {
            WorkflowError::Config("resuming requires a checkpoint store".to_string())
        })?;
        let mut state = store.load(token)?;
        let started = Instant::now();

        info!(run_id = state.run_id(), status = %state.status(), "Resuming run");
        if let Some(transcript) = self.transcript(&state) {
            transcript.write_resumed(&state.status().to_string());
        }

        match state.status() {
            WorkflowStatus::Completed | WorkflowStatus::Failed => {
                return Err(WorkflowError::InvalidResume(format!(
                    "run {} is already {}",
                    state.run_id(),
                    state.status()
                )));
            }
            WorkflowStatus::AwaitingFeedback => {
                if let Some(amendment) = feedback.amendment.filter(|a| !a.is_empty()) {
                    amendment.validate().map_err(WorkflowError::InvalidResume)?;
                    let round = state.evaluations().len().saturating_sub(1);
                    debug!(round, "Recording reviewer amendment");
                    state.push_amendment(round, amendment);
                }
                if let Err(e) = self.decide(&mut state, feedback.action) {
                    return Ok(self.fail(state, e, started));
                }
            }
            _ => {
                if feedback.action.is_some() || feedback.amendment.is_some_and(|a| !a.is_empty()) {
                    return Err(WorkflowError::InvalidResume(format!(
                        "run {} is not awaiting feedback",
                        state.run_id()
                    )));
                }
            }
        }

        Ok(self.drive(state, started).await)
    }

    /// Perform one state transition and return the new status.
    ///
    /// On error the state is left as it was before the step: a failed
    /// generation or revision appends nothing.
    pub async fn step(&self, state: &mut WorkflowState) -> Result<WorkflowStatus, WorkflowError> {
        match state.status() {
            WorkflowStatus::Init => {
                let round = state.iteration();
                let references = self.references(state, round).await;
                let started = Instant::now();
                let proposal = self.generator.generate(state.request(), &references).await?;
                self.log_proposal(round, ProposalSource::Generation, &proposal, started.elapsed());
                state.push_proposal(proposal);
            }
            WorkflowStatus::Generated => {
                let round = state.current_round();
                let proposal = state.current_proposal().ok_or_else(|| {
                    WorkflowError::Arbitration("generated state without a proposal".to_string())
                })?;
                let started = Instant::now();
                let evaluation = self
                    .aggregator
                    .aggregate(CritiqueInput {
                        request: state.request(),
                        proposal,
                        round,
                    })
                    .await?;

                self.logger.log(&LogEvent::EvaluationCompleted {
                    round,
                    overall_score: evaluation.overall_score,
                    scores: evaluation
                        .dimensions
                        .iter()
                        .map(|r| DimensionScore {
                            dimension: r.dimension.to_string(),
                            score: r.score,
                        })
                        .collect(),
                    duration_secs: started.elapsed().as_secs_f64(),
                });
                state.push_evaluation(evaluation);
            }
            WorkflowStatus::Evaluated => {
                if state.settings().human_review {
                    state.set_status(WorkflowStatus::AwaitingFeedback);
                } else {
                    self.decide(state, None)?;
                }
            }
            WorkflowStatus::Refine => {
                let round = state.iteration();
                let current = state.current_proposal().ok_or_else(|| {
                    WorkflowError::Arbitration("refine state without a proposal".to_string())
                })?;
                let references = self.references(state, round).await;
                let history = state.effective_history();
                let started = Instant::now();
                let revision = self
                    .reviser
                    .revise(current, state.request(), &history, &references)
                    .await?;

                self.logger.log(&LogEvent::AnalysisCompleted {
                    round,
                    structured: revision.analysis.is_structured(),
                });
                self.log_proposal(
                    round,
                    ProposalSource::Revision,
                    &revision.proposal,
                    started.elapsed(),
                );
                state.push_proposal(revision.proposal);
            }
            WorkflowStatus::AwaitingFeedback => {
                return Err(WorkflowError::InvalidResume(
                    "run is awaiting reviewer feedback".to_string(),
                ));
            }
            WorkflowStatus::Completed | WorkflowStatus::Failed => {}
        }

        Ok(state.status())
    }

    /// Arbitrate the latest evaluation and apply the decision
    fn decide(
        &self,
        state: &mut WorkflowState,
        review: Option<ReviewAction>,
    ) -> Result<Decision, WorkflowError> {
        let decision = arbitrate(state, review)?;
        let round = state.current_round();

        self.logger.log(&LogEvent::ArbitrationDecided {
            round,
            decision: decision.short_description(),
        });

        if let (Some(session), Some(proposal), Some(evaluation)) = (
            self.transcript(state),
            state.current_proposal(),
            state.effective_evaluation(round),
        ) {
            session.write_round(
                round,
                proposal,
                evaluation.overall_score,
                evaluation
                    .dimensions
                    .iter()
                    .map(|r| DimensionScore {
                        dimension: r.dimension.to_string(),
                        score: r.score,
                    })
                    .collect(),
                &evaluation.combined_feedback,
                &decision.short_description(),
            );
        }

        match decision {
            Decision::Refine => state.set_status(WorkflowStatus::Refine),
            Decision::Complete(reason) => state.complete(reason),
        }
        Ok(decision)
    }

    async fn drive(&self, mut state: WorkflowState, started: Instant) -> RunOutcome {
        loop {
            match state.status() {
                WorkflowStatus::Completed => {
                    let reason = match state.completion_reason() {
                        Some(reason) => reason,
                        None => {
                            let err = WorkflowError::Arbitration(
                                "completed without a completion reason".to_string(),
                            );
                            return self.fail(state, err, started);
                        }
                    };
                    self.logger.log(&LogEvent::RunCompleted {
                        rounds: state.iteration(),
                        final_score: state.final_score(),
                        reason: reason.to_string(),
                        duration_secs: started.elapsed().as_secs_f64(),
                    });
                    self.discard_checkpoint(&state);
                    let outcome = RunOutcome::Completed {
                        reason,
                        state,
                        duration: started.elapsed(),
                    };
                    self.write_end(&outcome);
                    return outcome;
                }
                WorkflowStatus::AwaitingFeedback => {
                    let token = match self.checkpoints.as_ref().map(|s| s.save(&state)) {
                        Some(Ok(token)) => token,
                        Some(Err(e)) => return self.fail(state, e.into(), started),
                        None => {
                            let err = WorkflowError::Config(
                                "human review requires a checkpoint store".to_string(),
                            );
                            return self.fail(state, err, started);
                        }
                    };
                    self.logger.log(&LogEvent::AwaitingFeedback {
                        round: state.current_round(),
                        token: token.clone(),
                    });
                    let outcome = RunOutcome::AwaitingFeedback { token, state };
                    self.write_end(&outcome);
                    return outcome;
                }
                WorkflowStatus::Failed => {
                    let err =
                        WorkflowError::InvalidResume("run has already failed".to_string());
                    return self.fail(state, err, started);
                }
                _ => {}
            }

            if self.interrupted.load(Ordering::SeqCst) {
                info!("Run interrupted by user");
                let token = self.checkpoint(&state);
                self.logger.log(&LogEvent::RunInterrupted {
                    round: state.current_round(),
                    token: token.clone(),
                });
                let outcome = RunOutcome::Interrupted {
                    token,
                    state,
                    duration: started.elapsed(),
                };
                self.write_end(&outcome);
                return outcome;
            }

            if let Err(e) = self.step(&mut state).await {
                return self.fail(state, e, started);
            }
        }
    }

    fn fail(&self, mut state: WorkflowState, error: WorkflowError, started: Instant) -> RunOutcome {
        // round being produced for generation/revision, otherwise the latest one
        let round = match state.status() {
            WorkflowStatus::Init | WorkflowStatus::Refine => state.iteration(),
            _ => state.current_round(),
        };
        let component = error.component();

        warn!(round, %component, error = %error, "Run failed");
        self.logger.log(&LogEvent::ErrorEncountered {
            round,
            component: component.to_string(),
            error: error.to_string(),
        });

        state.set_status(WorkflowStatus::Failed);
        self.discard_checkpoint(&state);

        let outcome = RunOutcome::Failed {
            round,
            component,
            error,
            state,
            duration: started.elapsed(),
        };
        self.write_end(&outcome);
        outcome
    }

    async fn references(&self, state: &WorkflowState, round: usize) -> Vec<Reference> {
        let Some(retriever) = self.retriever.as_ref() else {
            return Vec::new();
        };
        let k = state.settings().reference_count;
        if k == 0 {
            return Vec::new();
        }

        let request = state.request();
        let query = std::iter::once(request.problem.as_str())
            .chain(request.goals.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join("\n");

        match retriever.retrieve(&query, k).await {
            Ok(references) => {
                self.logger.log(&LogEvent::ReferencesRetrieved {
                    round,
                    count: references.len(),
                });
                references
            }
            Err(e) => {
                warn!(round, error = %e, "Reference retrieval failed, continuing without references");
                Vec::new()
            }
        }
    }

    fn checkpoint(&self, state: &WorkflowState) -> Option<String> {
        let store = self.checkpoints.as_ref()?;
        match store.save(state) {
            Ok(token) => Some(token),
            Err(e) => {
                warn!(error = %e, "Failed to save checkpoint");
                None
            }
        }
    }

    fn discard_checkpoint(&self, state: &WorkflowState) {
        if let Some(store) = self.checkpoints.as_ref() {
            if let Err(e) = store.remove(state.run_id()) {
                warn!(error = %e, "Failed to remove checkpoint");
            }
        }
    }

    fn log_proposal(&self, round: usize, source: ProposalSource, proposal: &str, elapsed: Duration) {
        self.logger.log(&LogEvent::ProposalGenerated {
            round,
            source,
            chars: proposal.chars().count(),
            duration_secs: elapsed.as_secs_f64(),
        });
    }

    fn dimension_names(&self) -> Vec<String> {
        self.aggregator
            .dimensions()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Transcript of the run `state` belongs to, opened on first use
    fn transcript(&self, state: &WorkflowState) -> Option<Arc<SessionWriter>> {
        let dir = self.session_dir.as_ref()?;
        let mut current = self.open_transcript.lock().ok()?;
        if let Some(writer) = current.as_ref().filter(|w| w.run_id() == state.run_id()) {
            return Some(writer.clone());
        }

        match SessionWriter::open_in(dir, state.run_id(), state.started_at()) {
            Ok(writer) => {
                let writer = Arc::new(writer);
                *current = Some(writer.clone());
                Some(writer)
            }
            Err(e) => {
                warn!(error = %e, "Session transcript disabled");
                None
            }
        }
    }

    fn write_header(&self, state: &WorkflowState) {
        if let Some(session) = self.transcript(state) {
            let request = state.request();
            session.write_start(RunHeader {
                run_id: state.run_id(),
                problem: &request.problem,
                goals: &request.goals,
                constraints: request
                    .constraints
                    .iter()
                    .map(|c| (c.kind.clone(), c.value.clone()))
                    .collect(),
                dimensions: self.dimension_names(),
                max_iterations: state.settings().max_iterations,
                excellent_score: state.settings().excellent_score,
            });
        }
    }

    fn write_end(&self, outcome: &RunOutcome) {
        if let Some(session) = self.transcript(outcome.state()) {
            let duration = match outcome {
                RunOutcome::Completed { duration, .. }
                | RunOutcome::Interrupted { duration, .. }
                | RunOutcome::Failed { duration, .. } => duration.as_secs_f64(),
                RunOutcome::AwaitingFeedback { .. } => 0.0,
            };
            session.write_end(
                outcome.label(),
                outcome.rounds(),
                outcome.state().final_score(),
                duration,
            );
        }
    }
}
