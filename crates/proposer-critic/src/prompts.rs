use crate::Dimension;

/// Prompt templates for the critique reviewers
pub struct CritiquePrompts;

impl CritiquePrompts {
    /// Persona prompt for one evaluation dimension
    pub fn system_prompt(dimension: Dimension) -> String {
        let persona = match dimension {
            Dimension::Logic => "You are a logic reviewer. You judge whether a proposal's reasoning is coherent, whether causes lead to the claimed effects, and whether its structure holds together.",
            Dimension::Completeness => "You are a completeness reviewer. You judge whether a proposal covers every goal and constraint in enough detail, and you point out anything important that is missing.",
            Dimension::Innovation => "You are an innovation reviewer. You judge how novel and distinctive a proposal's solution is, and whether that novelty has practical value.",
            Dimension::Feasibility => "You are a feasibility reviewer. You judge whether a proposal can actually be delivered: technical viability, resource requirements, and implementation risk.",
            Dimension::General => "You are a senior proposal reviewer. You judge a proposal as a whole against its goals and constraints.",
        };

        format!(
            r#"{persona}

Dimension: {name}

Score the proposal from 1 (unusable) to 10 (excellent) for {focus}.
Score only this dimension; other reviewers cover the rest.

## Required Response Format

Explain your reasoning briefly, then end your response with an evaluation block:

<evaluation>
{{"score": 7, "feedback": "What works and what does not, for this dimension", "suggestions": ["Specific, actionable improvement", "..."]}}
</evaluation>"#,
            persona = persona,
            name = dimension,
            focus = dimension.focus(),
        )
    }

    /// Build the review request for one proposal
    pub fn build_evaluation_prompt(
        problem: &str,
        proposal: &str,
        goals_text: &str,
        constraints_text: &str,
        dimension: Dimension,
    ) -> String {
        format!(
            r#"Please evaluate the following proposal.

## Problem
{problem}

## Proposal
{proposal}

## Goals
{goals}

## Constraints
{constraints}

Focus specifically on the {name} of the proposal."#,
            problem = problem,
            proposal = proposal,
            goals = goals_text,
            constraints = constraints_text,
            name = dimension,
        )
    }
}
