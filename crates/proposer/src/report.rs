//! Final output of a run.

use anyhow::Result;
use colored::Colorize;
use serde_json::json;

use proposer_core::RunOutcome;
use proposer_critic::CompositeEvaluation;

/// Print the outcome, then the proposal itself on stdout
pub fn emit(outcome: &RunOutcome, json_output: bool) -> Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&outcome_json(outcome))?);
        return Ok(());
    }

    print_outcome(outcome);
    if let Some(proposal) = outcome.state().current_proposal() {
        println!("{}", proposal);
    }
    Ok(())
}

pub fn outcome_json(outcome: &RunOutcome) -> serde_json::Value {
    let state = outcome.state();
    let latest = state
        .evaluations()
        .len()
        .checked_sub(1)
        .and_then(|round| state.effective_evaluation(round));

    let mut value = json!({
        "status": outcome.label(),
        "run_id": state.run_id(),
        "rounds": outcome.rounds(),
        "final_score": state.final_score(),
        "completion_reason": state.completion_reason(),
        "proposal": state.current_proposal(),
        "evaluation": latest.as_deref(),
    });

    match outcome {
        RunOutcome::AwaitingFeedback { token, .. } => {
            value["token"] = json!(token);
        }
        RunOutcome::Interrupted { token, .. } => {
            value["token"] = json!(token);
        }
        RunOutcome::Failed {
            round,
            component,
            error,
            ..
        } => {
            value["error"] = json!({
                "round": round,
                "component": component,
                "message": error.to_string(),
            });
        }
        RunOutcome::Completed { .. } => {}
    }

    value
}

pub fn print_evaluation(evaluation: &CompositeEvaluation) {
    eprintln!(
        "{} {:.1}/10",
        "Overall:".bold(),
        evaluation.overall_score
    );
    for result in &evaluation.dimensions {
        eprintln!("  {:<13} {:.1}", result.dimension.as_str(), result.score);
    }
    if !evaluation.suggestions.is_empty() {
        eprintln!("{}", "Suggestions:".bold());
        for suggestion in &evaluation.suggestions {
            eprintln!("  - {}", suggestion);
        }
    }
}

fn print_outcome(outcome: &RunOutcome) {
    let state = outcome.state();
    eprintln!();
    match outcome {
        RunOutcome::Completed {
            reason, duration, ..
        } => {
            eprintln!("{}", "=== COMPLETED ===".bright_green().bold());
            eprintln!("Reason: {}", reason);
            eprintln!("Rounds: {}", outcome.rounds());
            if let Some(score) = state.final_score() {
                eprintln!("Final score: {:.1}/10", score);
            }
            eprintln!("Duration: {:.1}s", duration.as_secs_f64());
        }
        RunOutcome::AwaitingFeedback { token, .. } => {
            eprintln!("{}", "=== AWAITING FEEDBACK ===".bright_yellow().bold());
            eprintln!("Rounds: {}", outcome.rounds());
            if let Some(evaluation) = state.latest_evaluation() {
                print_evaluation(evaluation);
            }
            eprintln!("Resume with: proposer resume {}", token);
        }
        RunOutcome::Interrupted {
            token, duration, ..
        } => {
            eprintln!("{}", "=== INTERRUPTED ===".bright_yellow().bold());
            eprintln!("Stopped after {} round(s)", outcome.rounds());
            eprintln!("Duration: {:.1}s", duration.as_secs_f64());
            if let Some(token) = token {
                eprintln!("Resume with: proposer resume {}", token);
            }
        }
        RunOutcome::Failed {
            round,
            component,
            error,
            duration,
            ..
        } => {
            eprintln!("{}", "=== FAILED ===".bright_red().bold());
            eprintln!("{} failed in round {}: {}", component, round, error);
            eprintln!("Duration: {:.1}s", duration.as_secs_f64());
        }
    }
}

/// First `max` characters of `text` on one line
pub fn preview(text: &str, max: usize) -> String {
    let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if line.chars().count() > max {
        format!("{}...", line.chars().take(max).collect::<String>())
    } else {
        line
    }
}
