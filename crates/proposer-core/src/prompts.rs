use proposer_agent::{ProposalRequest, Reference, ReferenceKind};

use crate::revision::{HistoryAnalysis, HistoryDigest};

/// Prompts for producing the first proposal version
pub struct ProposalPrompts;

impl ProposalPrompts {
    pub fn system_prompt() -> &'static str {
        r#"You are an expert proposal writer. Given a problem, a list of goals, and a list of constraints, you write a complete, detailed, and actionable proposal that meets every goal and respects every constraint.

Write the proposal itself, in Markdown. Do not describe what you are going to write, and do not add commentary after it."#
    }

    /// Build the generation prompt. References switch to a variant that asks
    /// the writer to draw on them.
    pub fn build_generation_prompt(request: &ProposalRequest, references: &[Reference]) -> String {
        if references.is_empty() {
            format!(
                r#"Write a detailed proposal for the following problem.

{problem}

## Goals
{goals}

## Constraints
{constraints}

Make the proposal as detailed as possible and make sure it satisfies every goal and constraint."#,
                problem = request.problem,
                goals = request.goals_text(),
                constraints = request.constraints_text(),
            )
        } else {
            format!(
                r#"Write a detailed proposal for the following problem, grounded in the reference material below.

{problem}

## Goals
{goals}

## Constraints
{constraints}

## Reference Material
{references}

Requirements:
1. Make full use of relevant information in the reference material
2. Satisfy every goal and constraint"#,
                problem = request.problem,
                goals = request.goals_text(),
                constraints = request.constraints_text(),
                references = format_references(references),
            )
        }
    }
}

/// Prompts for the two revision stages
pub struct RevisionPrompts;

impl RevisionPrompts {
    pub fn analysis_system_prompt() -> &'static str {
        r#"You analyze the evaluation history of a proposal to find what must change in the next version. Separate chronic weaknesses (low across rounds) from regressions (a recent drop)."#
    }

    pub fn build_analysis_prompt(digest: &HistoryDigest, feedback_history: &[String]) -> String {
        let rounds = feedback_history
            .iter()
            .enumerate()
            .map(|(i, feedback)| format!("### Round {}\n{}", i + 1, feedback))
            .collect::<Vec<_>>()
            .join("\n\n");

        format!(
            r#"Analyze the evaluation history below.

## Score Summary
{summary}

## Feedback By Round
{rounds}

Identify:
1. The main problems and shortcomings
2. Concrete suggestions for each dimension
3. The key points the next version must fix

Respond with your analysis inside <analysis> tags as JSON:

<analysis>
{{
  "key_issues": ["..."],
  "suggestions_by_dimension": {{"dimension": ["..."]}}
}}
</analysis>"#,
            summary = digest.summary(),
            rounds = rounds,
        )
    }

    pub fn rewrite_system_prompt() -> &'static str {
        r#"You revise proposals. Using an analysis of past evaluations, produce an improved version of the proposal.

Always return the complete revised proposal in Markdown, never a diff or a list of changes."#
    }

    /// Build the rewrite prompt for either analysis shape
    pub fn build_rewrite_prompt(
        current: &str,
        request: &ProposalRequest,
        analysis: &HistoryAnalysis,
        references: &[Reference],
    ) -> String {
        let analysis_text = match analysis {
            HistoryAnalysis::Structured {
                key_issues,
                suggestions_by_dimension,
            } => {
                let mut text = String::from("### Key Issues\n");
                if key_issues.is_empty() {
                    text.push_str("- (none identified)\n");
                }
                for issue in key_issues {
                    text.push_str(&format!("- {}\n", issue));
                }
                text.push_str("\n### Suggestions\n");
                for (dimension, suggestions) in suggestions_by_dimension {
                    for suggestion in suggestions {
                        text.push_str(&format!("- [{}] {}\n", dimension, suggestion));
                    }
                }
                text
            }
            HistoryAnalysis::Unstructured(text) => text.clone(),
        };

        let references_section = if references.is_empty() {
            String::new()
        } else {
            format!("\n## Reference Material\n{}\n", format_references(references))
        };

        format!(
            r#"Revise the proposal below based on the analysis.

## Problem
{problem}

## Goals
{goals}

## Constraints
{constraints}

## Current Proposal
{current}

## Analysis
{analysis}
{references}
Address every key issue, adopt the relevant suggestions, and draw on successful precedent where it helps. Return the full revised proposal."#,
            problem = request.problem,
            goals = request.goals_text(),
            constraints = request.constraints_text(),
            current = current,
            analysis = analysis_text.trim_end(),
            references = references_section,
        )
    }
}

fn format_references(references: &[Reference]) -> String {
    references
        .iter()
        .enumerate()
        .map(|(i, reference)| {
            let label = match (reference.kind, reference.source()) {
                (ReferenceKind::Case, _) => "Precedent case".to_string(),
                (ReferenceKind::Document, Some(source)) => format!("Source: {}", source),
                (ReferenceKind::Document, None) => "Document".to_string(),
            };
            format!("[{}] {}\n{}", i + 1, label, reference.content.trim())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
