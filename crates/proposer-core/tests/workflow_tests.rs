use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use proposer_agent::{
    Backend, BackendConfig, BackendError, BackendType, Constraint, Message, ProposalRequest,
    Reference, StaticRetriever,
};
use proposer_core::{
    CompletionReason, Component, GenerationUnit, MemoryCheckpointStore, ReviewAction,
    ReviewFeedback, RevisionUnit, RunOutcome, WorkflowError, WorkflowRunner, WorkflowSettings,
    WorkflowStatus,
};
use proposer_critic::{EvaluationAggregator, EvaluationAmendment};
use proposer_logging::Logger;

#[derive(Clone, Copy)]
enum AnalysisReply {
    Structured,
    Prose,
    Fail,
}

/// Scripted backend playing every role, told apart by the system prompt.
///
/// Critics score "proposal vN" with `scores[N - 1]` (the last score repeats).
struct ScriptedBackend {
    scores: Vec<f64>,
    analysis: AnalysisReply,
    fail_generation: bool,
    /// Version whose logic critique comes back unparseable
    garbled_version: Option<usize>,
    generations: AtomicUsize,
    critiques: AtomicUsize,
    analyses: AtomicUsize,
    rewrites: AtomicUsize,
    generation_prompts: Mutex<Vec<String>>,
    rewrite_prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(scores: &[f64]) -> Self {
        Self {
            scores: scores.to_vec(),
            analysis: AnalysisReply::Structured,
            fail_generation: false,
            garbled_version: None,
            generations: AtomicUsize::new(0),
            critiques: AtomicUsize::new(0),
            analyses: AtomicUsize::new(0),
            rewrites: AtomicUsize::new(0),
            generation_prompts: Mutex::new(Vec::new()),
            rewrite_prompts: Mutex::new(Vec::new()),
        }
    }

    fn with_analysis(mut self, analysis: AnalysisReply) -> Self {
        self.analysis = analysis;
        self
    }

    fn total_calls(&self) -> usize {
        self.generations.load(Ordering::SeqCst)
            + self.critiques.load(Ordering::SeqCst)
            + self.analyses.load(Ordering::SeqCst)
            + self.rewrites.load(Ordering::SeqCst)
    }

    fn critique(&self, dimension: &str, user: &str) -> String {
        let version = user
            .split("## Proposal\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .and_then(|line| line.strip_prefix("proposal v"))
            .and_then(|n| n.trim().parse::<usize>().ok())
            .unwrap_or(1);

        if self.garbled_version == Some(version) && dimension == "logic" {
            return "Honestly it reads fine to me.".to_string();
        }

        let score = self
            .scores
            .get(version - 1)
            .or(self.scores.last())
            .copied()
            .unwrap_or(5.0);
        format!(
            "<evaluation>{}</evaluation>",
            serde_json::json!({
                "score": score,
                "feedback": format!("{} looks like {}", dimension, score),
                "suggestions": [format!("improve {}", dimension)],
            })
        )
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn name(&self) -> &str {
        "Scripted"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Claude
    }

    async fn invoke(
        &self,
        messages: &[Message],
        _config: &BackendConfig,
    ) -> Result<String, BackendError> {
        let system = messages[0].content.as_str();
        let user = messages[1].content.as_str();

        if let Some(dimension) = system.lines().find_map(|l| l.strip_prefix("Dimension: ")) {
            self.critiques.fetch_add(1, Ordering::SeqCst);
            return Ok(self.critique(dimension.trim(), user));
        }

        if system.contains("You analyze the evaluation history") {
            self.analyses.fetch_add(1, Ordering::SeqCst);
            return match self.analysis {
                AnalysisReply::Structured => Ok(r#"<analysis>{"key_issues": ["thin plan"], "suggestions_by_dimension": {"logic": ["add steps"]}}</analysis>"#.to_string()),
                AnalysisReply::Prose => Ok("The plan still has no owners or dates.".to_string()),
                AnalysisReply::Fail => Err(BackendError::ExecutionFailed("analysis model offline".into())),
            };
        }

        if system.contains("You revise proposals") {
            let n = self.rewrites.fetch_add(1, Ordering::SeqCst);
            self.rewrite_prompts.lock().unwrap().push(user.to_string());
            return Ok(format!("proposal v{}", n + 2));
        }

        self.generations.fetch_add(1, Ordering::SeqCst);
        self.generation_prompts.lock().unwrap().push(user.to_string());
        if self.fail_generation {
            return Err(BackendError::ExecutionFailed("quota exceeded".into()));
        }
        Ok("proposal v1".to_string())
    }

    async fn is_available(&self) -> bool {
        true
    }
}

fn runner(backend: Arc<ScriptedBackend>) -> WorkflowRunner {
    let aggregator = EvaluationAggregator::new(
        backend.clone(),
        &["logic", "completeness", "feasibility"],
        BackendConfig::new(),
    )
    .unwrap();
    WorkflowRunner::new(
        GenerationUnit::new(backend.clone(), BackendConfig::new()),
        aggregator,
        RevisionUnit::new(backend, BackendConfig::new()),
        Arc::new(Logger::quiet()),
    )
}

fn request() -> ProposalRequest {
    ProposalRequest::new(
        "Our release process takes three weeks.",
        vec!["Ship weekly".into(), "Keep quality".into()],
        vec![Constraint::new("headcount", "no new hires")],
    )
}

fn settings(max_iterations: usize, excellent_score: f64) -> WorkflowSettings {
    WorkflowSettings {
        max_iterations,
        excellent_score,
        ..Default::default()
    }
}

#[tokio::test]
async fn stops_once_quality_threshold_is_met() {
    let backend = Arc::new(ScriptedBackend::new(&[5.0, 8.5]));
    let outcome = runner(backend.clone())
        .run(request(), settings(5, 8.0))
        .await
        .unwrap();

    match &outcome {
        RunOutcome::Completed { reason, state, .. } => {
            assert_eq!(*reason, CompletionReason::QualityMet);
            assert_eq!(state.iteration(), 2);
            assert_eq!(state.proposals(), ["proposal v1", "proposal v2"]);
            assert_eq!(state.evaluations().len(), 2);
            assert_eq!(state.status(), WorkflowStatus::Completed);
            assert_eq!(state.final_score(), Some(8.5));
        }
        other => panic!("expected completion, got {}", other.label()),
    }
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(backend.generations.load(Ordering::SeqCst), 1);
    assert_eq!(backend.rewrites.load(Ordering::SeqCst), 1);
    assert_eq!(backend.critiques.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn budget_exhaustion_completes_below_threshold() {
    let backend = Arc::new(ScriptedBackend::new(&[3.0]));
    let outcome = runner(backend.clone())
        .run(request(), settings(2, 8.5))
        .await
        .unwrap();

    match outcome {
        RunOutcome::Completed { reason, state, .. } => {
            assert_eq!(reason, CompletionReason::BudgetExhausted);
            assert_eq!(state.iteration(), 2);
            assert_eq!(state.status(), WorkflowStatus::Completed);
        }
        other => panic!("expected completion, got {}", other.label()),
    }
}

#[tokio::test]
async fn never_exceeds_max_iterations() {
    for max in 1..=4 {
        let backend = Arc::new(ScriptedBackend::new(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let outcome = runner(backend.clone())
            .run(request(), settings(max, 9.0))
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(outcome.state().proposals().len(), max);
        assert_eq!(
            backend.generations.load(Ordering::SeqCst) + backend.rewrites.load(Ordering::SeqCst),
            max
        );
    }
}

#[tokio::test]
async fn history_grows_in_lockstep_and_is_never_rewritten() {
    let backend = Arc::new(ScriptedBackend::new(&[4.0, 5.0, 6.0]));
    let runner = runner(backend);
    let mut state = runner.start(request(), settings(3, 9.0)).unwrap();
    assert_eq!(state.status(), WorkflowStatus::Init);

    let mut seen_proposals: Vec<String> = Vec::new();
    let mut seen_scores: Vec<f64> = Vec::new();

    for round in 0..3 {
        let status = runner.step(&mut state).await.unwrap();
        assert_eq!(status, WorkflowStatus::Generated);
        assert_eq!(state.proposals().len(), round + 1);
        assert_eq!(state.iteration(), round + 1);
        assert_eq!(state.evaluations().len(), round);

        let status = runner.step(&mut state).await.unwrap();
        assert_eq!(status, WorkflowStatus::Evaluated);
        assert_eq!(state.evaluations().len(), round + 1);

        // earlier entries are untouched
        assert_eq!(&state.proposals()[..round], seen_proposals.as_slice());
        let scores: Vec<f64> = state.evaluations().iter().map(|e| e.overall_score).collect();
        assert_eq!(&scores[..round], seen_scores.as_slice());

        seen_proposals = state.proposals().to_vec();
        seen_scores = scores;

        let status = runner.step(&mut state).await.unwrap();
        if round < 2 {
            assert_eq!(status, WorkflowStatus::Refine);
        } else {
            assert_eq!(status, WorkflowStatus::Completed);
        }
    }

    assert_eq!(seen_scores, vec![4.0, 5.0, 6.0]);
    assert_eq!(
        state.completion_reason(),
        Some(CompletionReason::BudgetExhausted)
    );
}

#[tokio::test]
async fn invalid_constraint_fails_before_any_backend_call() {
    let backend = Arc::new(ScriptedBackend::new(&[9.0]));
    let request: ProposalRequest = serde_json::from_value(serde_json::json!({
        "problem": "Reduce churn",
        "goals": ["Keep customers"],
        "constraints": [{"type": "x"}]
    }))
    .unwrap();

    let result = runner(backend.clone()).run(request.clone(), settings(3, 8.5)).await;
    assert!(matches!(result, Err(WorkflowError::InvalidInput(_))));

    let generator = GenerationUnit::new(backend.clone(), BackendConfig::new());
    let result = generator.generate(&request, &[]).await;
    assert!(matches!(result, Err(WorkflowError::InvalidInput(_))));

    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn generation_failure_reports_round_and_component() {
    let mut scripted = ScriptedBackend::new(&[5.0]);
    scripted.fail_generation = true;
    let backend = Arc::new(scripted);

    let outcome = runner(backend).run(request(), settings(3, 8.5)).await.unwrap();
    match &outcome {
        RunOutcome::Failed {
            round,
            component,
            error,
            state,
            ..
        } => {
            assert_eq!(*round, 0);
            assert_eq!(*component, Component::Generation);
            assert!(matches!(error, WorkflowError::GenerationFailed(_)));
            assert!(state.proposals().is_empty());
            assert_eq!(state.status(), WorkflowStatus::Failed);
        }
        other => panic!("expected failure, got {}", other.label()),
    }
    assert_eq!(outcome.exit_code(), 2);
}

#[tokio::test]
async fn unparseable_critique_fails_the_round_and_keeps_history() {
    let mut scripted = ScriptedBackend::new(&[5.0, 6.0]);
    scripted.garbled_version = Some(2);
    let backend = Arc::new(scripted);

    let outcome = runner(backend).run(request(), settings(3, 8.5)).await.unwrap();
    match outcome {
        RunOutcome::Failed {
            round,
            component,
            state,
            ..
        } => {
            assert_eq!(round, 1);
            assert_eq!(component, Component::Evaluation);
            assert_eq!(state.proposals().len(), 2);
            assert_eq!(state.evaluations().len(), 1);
        }
        other => panic!("expected failure, got {}", other.label()),
    }
}

#[tokio::test]
async fn revision_proceeds_when_analysis_is_unstructured() {
    let backend = Arc::new(ScriptedBackend::new(&[4.0, 9.0]).with_analysis(AnalysisReply::Prose));
    let outcome = runner(backend.clone())
        .run(request(), settings(3, 8.5))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    assert_eq!(outcome.state().proposals().len(), 2);
    let prompts = backend.rewrite_prompts.lock().unwrap();
    assert!(prompts[0].contains("The plan still has no owners or dates."));
    assert!(prompts[0].contains("## Current Proposal\nproposal v1"));
}

#[tokio::test]
async fn revision_proceeds_when_analysis_backend_fails() {
    let backend = Arc::new(ScriptedBackend::new(&[4.0, 9.0]).with_analysis(AnalysisReply::Fail));
    let outcome = runner(backend.clone())
        .run(request(), settings(3, 8.5))
        .await
        .unwrap();

    assert!(outcome.is_completed());
    let prompts = backend.rewrite_prompts.lock().unwrap();
    // locally derived analysis lists chronic dimensions and tagged suggestions
    assert!(prompts[0].contains("logic is consistently weak"));
    assert!(prompts[0].contains("- [feasibility] improve feasibility"));
}

#[tokio::test]
async fn human_review_suspends_and_resumes_at_arbitration() {
    let backend = Arc::new(ScriptedBackend::new(&[5.0]));
    let store = Arc::new(MemoryCheckpointStore::new());
    let runner = runner(backend.clone()).with_checkpoints(store.clone());
    let review = WorkflowSettings {
        human_review: true,
        ..settings(3, 8.5)
    };

    let outcome = runner.run(request(), review).await.unwrap();
    let token = match &outcome {
        RunOutcome::AwaitingFeedback { token, state } => {
            assert_eq!(state.status(), WorkflowStatus::AwaitingFeedback);
            assert_eq!(state.evaluations().len(), 1);
            token.clone()
        }
        other => panic!("expected suspension, got {}", other.label()),
    };
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(store.len(), 1);
    let calls_before = backend.total_calls();

    let feedback = ReviewFeedback {
        amendment: Some(EvaluationAmendment {
            overall_score: Some(9.0),
            feedback: Some("Good enough for a pilot".into()),
            suggestions: vec![],
        }),
        action: None,
    };
    let outcome = runner.resume(&token, feedback).await.unwrap();

    match outcome {
        RunOutcome::Completed { reason, state, .. } => {
            assert_eq!(reason, CompletionReason::QualityMet);
            // nothing was re-run
            assert_eq!(backend.total_calls(), calls_before);
            assert_eq!(state.proposals().len(), 1);
            // the stored evaluation is untouched; the amendment is overlaid
            assert_eq!(state.evaluations()[0].overall_score, 5.0);
            assert_eq!(state.final_score(), Some(9.0));
            assert_eq!(state.amendments().len(), 1);
        }
        other => panic!("expected completion, got {}", other.label()),
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn resumed_run_keeps_a_single_transcript() {
    let dir = tempfile::tempdir().unwrap();
    let backend = Arc::new(ScriptedBackend::new(&[5.0]));
    let store = Arc::new(MemoryCheckpointStore::new());
    let review = WorkflowSettings {
        human_review: true,
        ..settings(3, 8.5)
    };

    let first = runner(backend.clone())
        .with_checkpoints(store.clone())
        .with_session_dir(dir.path());
    let token = match first.run(request(), review).await.unwrap() {
        RunOutcome::AwaitingFeedback { token, .. } => token,
        other => panic!("expected suspension, got {}", other.label()),
    };
    drop(first);

    // a separate runner, as a later process would build
    let second = runner(backend)
        .with_checkpoints(store)
        .with_session_dir(dir.path());
    let outcome = second.resume(&token, ReviewFeedback::stop()).await.unwrap();
    assert!(outcome.is_completed());

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);

    let contents = std::fs::read_to_string(&files[0]).unwrap();
    let types: Vec<String> = contents
        .lines()
        .map(|l| {
            let line: serde_json::Value = serde_json::from_str(l).unwrap();
            line["type"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(
        types,
        ["run_start", "run_end", "run_resumed", "round", "run_end"]
    );
}

#[tokio::test]
async fn reviewer_can_continue_then_stop() {
    let backend = Arc::new(ScriptedBackend::new(&[9.5, 4.0]));
    let store = Arc::new(MemoryCheckpointStore::new());
    let runner = runner(backend.clone()).with_checkpoints(store);
    let review = WorkflowSettings {
        human_review: true,
        ..settings(3, 8.5)
    };

    let token = match runner.run(request(), review).await.unwrap() {
        RunOutcome::AwaitingFeedback { token, .. } => token,
        other => panic!("expected suspension, got {}", other.label()),
    };

    // continue despite an excellent score
    let token = match runner.resume(&token, ReviewFeedback::proceed()).await.unwrap() {
        RunOutcome::AwaitingFeedback { token, state } => {
            assert_eq!(state.proposals(), ["proposal v1", "proposal v2"]);
            assert_eq!(state.evaluations().len(), 2);
            token
        }
        other => panic!("expected suspension, got {}", other.label()),
    };

    match runner.resume(&token, ReviewFeedback::stop()).await.unwrap() {
        RunOutcome::Completed { reason, state, .. } => {
            assert_eq!(reason, CompletionReason::ReviewerStopped);
            assert_eq!(state.iteration(), 2);
        }
        other => panic!("expected completion, got {}", other.label()),
    }

    let spent = runner.resume(&token, ReviewFeedback::default()).await;
    assert!(matches!(spent, Err(WorkflowError::Checkpoint(_))));
}

#[tokio::test]
async fn human_review_requires_a_checkpoint_store() {
    let backend = Arc::new(ScriptedBackend::new(&[5.0]));
    let review = WorkflowSettings {
        human_review: true,
        ..Default::default()
    };
    let result = runner(backend.clone()).run(request(), review).await;
    assert!(matches!(result, Err(WorkflowError::Config(_))));
    assert_eq!(backend.total_calls(), 0);
}

#[tokio::test]
async fn interrupted_run_resumes_where_it_stopped() {
    let backend = Arc::new(ScriptedBackend::new(&[5.0, 9.0]));
    let store = Arc::new(MemoryCheckpointStore::new());
    let runner = runner(backend.clone()).with_checkpoints(store);
    let interrupt = runner.interrupt_handle();

    interrupt.store(true, Ordering::SeqCst);
    let token = match runner.run(request(), settings(3, 8.5)).await.unwrap() {
        RunOutcome::Interrupted { token, state, .. } => {
            assert_eq!(state.status(), WorkflowStatus::Init);
            token.expect("checkpoint token")
        }
        other => panic!("expected interruption, got {}", other.label()),
    };
    assert_eq!(backend.total_calls(), 0);

    let rejected = runner
        .resume(
            &token,
            ReviewFeedback {
                amendment: None,
                action: Some(ReviewAction::Stop),
            },
        )
        .await;
    assert!(matches!(rejected, Err(WorkflowError::InvalidResume(_))));

    interrupt.store(false, Ordering::SeqCst);
    let outcome = runner.resume(&token, ReviewFeedback::default()).await.unwrap();
    assert!(outcome.is_completed());
    assert_eq!(outcome.rounds(), 2);
}

#[tokio::test]
async fn references_reach_the_generation_prompt() {
    let backend = Arc::new(ScriptedBackend::new(&[9.0]));
    let retriever = Arc::new(StaticRetriever::new(vec![
        Reference::document("Weekly release trains cut lead time", "release-notes.md"),
        Reference::document("Unrelated gardening advice", "garden.md"),
    ]));
    let runner = runner(backend.clone()).with_retriever(retriever);

    let outcome = runner.run(request(), settings(3, 8.5)).await.unwrap();
    assert!(outcome.is_completed());

    let prompts = backend.generation_prompts.lock().unwrap();
    assert!(prompts[0].contains("## Reference Material"));
    assert!(prompts[0].contains("Source: release-notes.md"));
}
