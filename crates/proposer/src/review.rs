//! Interactive reviewer prompts.

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Confirm, FuzzySelect, Input, Select};

use proposer_core::{
    CheckpointStore, FileCheckpointStore, ReviewAction, ReviewFeedback, RunOutcome,
    WorkflowRunner, WorkflowState,
};
use proposer_critic::{EvaluationAmendment, MAX_SCORE};

use crate::report;

/// Keep answering feedback requests on the terminal until the run stops
/// waiting for a reviewer.
pub async fn review_loop(
    runner: &WorkflowRunner,
    mut outcome: RunOutcome,
    interactive: bool,
) -> Result<RunOutcome> {
    if !interactive {
        return Ok(outcome);
    }

    while let RunOutcome::AwaitingFeedback { token, state } = &outcome {
        let token = token.clone();
        let feedback = prompt_feedback(state)?;
        outcome = runner.resume(&token, feedback).await?;
    }

    Ok(outcome)
}

fn prompt_feedback(state: &WorkflowState) -> Result<ReviewFeedback> {
    eprintln!();
    eprintln!(
        "{}",
        format!("=== Review: round {} ===", state.current_round())
            .bright_blue()
            .bold()
    );
    if let Some(proposal) = state.current_proposal() {
        eprintln!("{}", proposal);
        eprintln!();
    }
    if let Some(evaluation) = state.latest_evaluation() {
        report::print_evaluation(evaluation);
    }

    let choices = ["Let the workflow decide", "Keep refining", "Accept and stop"];
    let action = match Select::new()
        .with_prompt("Next step")
        .items(&choices)
        .default(0)
        .interact()?
    {
        1 => Some(ReviewAction::Continue),
        2 => Some(ReviewAction::Stop),
        _ => None,
    };

    let amend = Confirm::new()
        .with_prompt("Amend the evaluation?")
        .default(false)
        .interact()?;

    let amendment = if amend {
        Some(prompt_amendment()?).filter(|a| !a.is_empty())
    } else {
        None
    };

    Ok(ReviewFeedback { amendment, action })
}

fn prompt_amendment() -> Result<EvaluationAmendment> {
    let score: String = Input::new()
        .with_prompt("Overall score (0-10, blank to keep)")
        .allow_empty(true)
        .validate_with(|input: &String| -> Result<(), String> {
            if input.trim().is_empty() {
                return Ok(());
            }
            match input.trim().parse::<f64>() {
                Ok(score) if (0.0..=MAX_SCORE).contains(&score) => Ok(()),
                _ => Err("Enter a number between 0 and 10".to_string()),
            }
        })
        .interact_text()?;

    let feedback: String = Input::new()
        .with_prompt("Feedback (blank for none)")
        .allow_empty(true)
        .interact_text()?;

    let mut suggestions = Vec::new();
    loop {
        let suggestion: String = Input::new()
            .with_prompt("Suggestion (blank to finish)")
            .allow_empty(true)
            .interact_text()?;
        if suggestion.trim().is_empty() {
            break;
        }
        suggestions.push(suggestion.trim().to_string());
    }

    Ok(EvaluationAmendment {
        overall_score: score.trim().parse().ok(),
        feedback: Some(feedback.trim().to_string()).filter(|f| !f.is_empty()),
        suggestions,
    })
}

/// Pick a saved checkpoint to resume
pub fn pick_checkpoint(store: &FileCheckpointStore) -> Result<String> {
    let candidates: Vec<(String, WorkflowState)> = store
        .tokens()?
        .into_iter()
        .filter_map(|token| store.load(&token).ok().map(|state| (token, state)))
        .filter(|(_, state)| !state.status().is_terminal())
        .collect();

    if candidates.is_empty() {
        anyhow::bail!("No resumable runs in {}", store.dir().display());
    }

    let items: Vec<String> = candidates
        .iter()
        .map(|(_, state)| {
            let ts = state.started_at().format("%Y-%m-%d %H:%M");
            format!(
                "{} | {:17} ({} rounds) | \"{}\"",
                ts,
                state.status().to_string(),
                state.iteration(),
                report::preview(&state.request().problem, 60)
            )
        })
        .collect();

    let selection = FuzzySelect::new()
        .with_prompt("Select a run")
        .items(&items)
        .default(0)
        .interact()?;

    Ok(candidates[selection].0.clone())
}
