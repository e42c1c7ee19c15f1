use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::Dimension;

/// Highest score on the canonical scale
pub const MAX_SCORE: f64 = 10.0;

/// One reviewer's verdict on one proposal along one dimension.
///
/// `score` is on the canonical [0, 10] scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub dimension: Dimension,
    pub score: f64,
    pub feedback: String,
    pub suggestions: Vec<String>,
}

#[derive(Error, Debug)]
pub enum EvaluationParseError {
    #[error("No evaluation block found in critic output")]
    NoEvaluationFound,

    #[error("Failed to parse evaluation JSON: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Invalid evaluation format: {0}")]
    InvalidFormat(String),

    #[error("Score {0} is outside the 0-10 range")]
    ScoreOutOfRange(f64),
}

/// Shapes a reviewer is allowed to answer with
#[derive(Deserialize)]
#[serde(untagged)]
enum RawEvaluation {
    Flat {
        score: f64,
        #[serde(default, alias = "comments")]
        feedback: String,
        #[serde(default)]
        suggestions: RawSuggestions,
    },
    PerGoal {
        overall_score: f64,
        #[serde(default)]
        overall_feedback: String,
        #[serde(default)]
        evaluations: BTreeMap<String, GoalEvaluation>,
    },
}

#[derive(Deserialize)]
struct GoalEvaluation {
    #[serde(default)]
    suggestions: RawSuggestions,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSuggestions {
    List(Vec<String>),
    Single(String),
}

impl Default for RawSuggestions {
    fn default() -> Self {
        RawSuggestions::List(Vec::new())
    }
}

impl RawSuggestions {
    fn into_vec(self) -> Vec<String> {
        match self {
            RawSuggestions::List(items) => items
                .into_iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            RawSuggestions::Single(s) if s.trim().is_empty() => Vec::new(),
            RawSuggestions::Single(s) => vec![s.trim().to_string()],
        }
    }
}

impl EvaluationResult {
    /// Parse a reviewer's response.
    ///
    /// Expected format in the output:
    /// ```text
    /// <evaluation>
    /// {"score": 7, "feedback": "...", "suggestions": ["...", "..."]}
    /// </evaluation>
    /// ```
    /// A fenced ```json block or a bare JSON object are accepted as well, as is
    /// the per-goal shape `{"overall_score", "overall_feedback", "evaluations"}`.
    pub fn parse(dimension: Dimension, output: &str) -> Result<Self, EvaluationParseError> {
        debug!(%dimension, output_len = output.len(), "Parsing critic evaluation");

        let json = extract_json(output)?;
        let raw: RawEvaluation = serde_json::from_str(json)?;

        let (score, feedback, suggestions) = match raw {
            RawEvaluation::Flat {
                score,
                feedback,
                suggestions,
            } => (score, feedback, suggestions.into_vec()),
            RawEvaluation::PerGoal {
                overall_score,
                overall_feedback,
                evaluations,
            } => {
                let suggestions = evaluations
                    .into_iter()
                    .flat_map(|(goal, eval)| {
                        eval.suggestions
                            .into_vec()
                            .into_iter()
                            .map(move |s| format!("{}: {}", goal, s))
                    })
                    .collect();
                (overall_score, overall_feedback, suggestions)
            }
        };

        if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) {
            return Err(EvaluationParseError::ScoreOutOfRange(score));
        }

        Ok(Self {
            dimension,
            score,
            feedback: feedback.trim().to_string(),
            suggestions,
        })
    }

    /// Score mapped onto [0, 1] for display
    pub fn normalized_score(&self) -> f64 {
        self.score / MAX_SCORE
    }
}

/// Return the trimmed body of the first `<tag>...</tag>` block, if any
pub fn extract_block<'a>(output: &'a str, tag: &str) -> Result<Option<&'a str>, String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);

    match (output.find(&open), output.rfind(&close)) {
        (Some(start), Some(end)) if start < end => Ok(Some(output[start + open.len()..end].trim())),
        (Some(_), Some(_)) => Err(format!("Malformed <{}> block", tag)),
        (Some(_), None) => Err(format!("Unterminated <{}> block", tag)),
        _ => Ok(None),
    }
}

/// Find the body of a fenced ```json code block
pub fn extract_fenced_json(output: &str) -> Option<&str> {
    let start = output.find("```json")? + "```json".len();
    let end = output[start..].find("```")? + start;
    Some(output[start..end].trim())
}

fn extract_json(output: &str) -> Result<&str, EvaluationParseError> {
    if let Some(block) =
        extract_block(output, "evaluation").map_err(EvaluationParseError::InvalidFormat)?
    {
        return Ok(strip_fence(block));
    }

    if let Some(fenced) = extract_fenced_json(output) {
        return Ok(fenced);
    }

    let trimmed = output.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&trimmed[start..=end]),
        _ => Err(EvaluationParseError::NoEvaluationFound),
    }
}

/// Reviewers sometimes wrap the block body in a code fence as well
fn strip_fence(block: &str) -> &str {
    extract_fenced_json(block).unwrap_or(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_evaluation_block() {
        let output = r#"
The argument holds together but skips the rollout plan.

<evaluation>
{"score": 7, "feedback": "Mostly coherent", "suggestions": ["Add rollout plan", "Cite data"]}
</evaluation>
"#;
        let result = EvaluationResult::parse(Dimension::Logic, output).unwrap();
        assert_eq!(result.dimension, Dimension::Logic);
        assert!((result.score - 7.0).abs() < f64::EPSILON);
        assert_eq!(result.feedback, "Mostly coherent");
        assert_eq!(result.suggestions, vec!["Add rollout plan", "Cite data"]);
        assert!((result.normalized_score() - 0.7).abs() < 1e-9);
    }

    #[test]
    fn parses_fenced_json() {
        let output = "Here you go:\n```json\n{\"score\": 4.5, \"comments\": \"thin\", \"suggestions\": \"Expand section 2\"}\n```";
        let result = EvaluationResult::parse(Dimension::Completeness, output).unwrap();
        assert!((result.score - 4.5).abs() < f64::EPSILON);
        assert_eq!(result.feedback, "thin");
        assert_eq!(result.suggestions, vec!["Expand section 2"]);
    }

    #[test]
    fn parses_per_goal_shape() {
        let output = r#"{
            "overall_score": 8,
            "overall_feedback": "Solid",
            "evaluations": {
                "cost": {"score": 9, "feedback": "cheap", "suggestions": "Negotiate licences"},
                "adoption": {"score": 7, "feedback": "ok", "suggestions": ""}
            }
        }"#;
        let result = EvaluationResult::parse(Dimension::Feasibility, output).unwrap();
        assert!((result.score - 8.0).abs() < f64::EPSILON);
        assert_eq!(result.feedback, "Solid");
        assert_eq!(result.suggestions, vec!["cost: Negotiate licences"]);
    }

    #[test]
    fn rejects_out_of_range_score() {
        let output = r#"<evaluation>{"score": 42, "feedback": "wow"}</evaluation>"#;
        let result = EvaluationResult::parse(Dimension::Logic, output);
        assert!(matches!(
            result,
            Err(EvaluationParseError::ScoreOutOfRange(s)) if (s - 42.0).abs() < f64::EPSILON
        ));
    }

    #[test]
    fn rejects_missing_score() {
        let output = r#"<evaluation>{"feedback": "no number here"}</evaluation>"#;
        let result = EvaluationResult::parse(Dimension::Logic, output);
        assert!(matches!(result, Err(EvaluationParseError::JsonParseError(_))));
    }

    #[test]
    fn rejects_prose_without_json() {
        let result = EvaluationResult::parse(Dimension::Logic, "Looks great to me, 9/10.");
        assert!(matches!(result, Err(EvaluationParseError::NoEvaluationFound)));
    }

    #[test]
    fn rejects_unterminated_block() {
        let result = EvaluationResult::parse(Dimension::Logic, "<evaluation>{\"score\": 5}");
        assert!(matches!(result, Err(EvaluationParseError::InvalidFormat(_))));
    }
}
