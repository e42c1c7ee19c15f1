use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::evaluation::MAX_SCORE;
use crate::{Dimension, EvaluationResult};

/// Source tag used for suggestions added during human review
pub const REVIEWER_SOURCE: &str = "reviewer";

/// A suggestion tagged with the dimension (or reviewer) it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedSuggestion {
    pub source: String,
    pub text: String,
}

impl std::fmt::Display for TaggedSuggestion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.source, self.text)
    }
}

/// The aggregated, multi-dimension evaluation of one proposal version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeEvaluation {
    /// Unweighted mean of the dimension scores, on the [0, 10] scale
    pub overall_score: f64,
    /// Per-dimension results in configured order
    pub dimensions: Vec<EvaluationResult>,
    /// Each dimension's feedback, labelled, in configured order
    pub combined_feedback: String,
    /// All suggestions, dimension by dimension in configured order
    pub suggestions: Vec<TaggedSuggestion>,
    pub created_at: DateTime<Utc>,
}

impl CompositeEvaluation {
    /// Combine per-dimension results, which must already be in configured order.
    ///
    /// Returns `None` for an empty result set, since no mean exists.
    pub fn from_results(results: Vec<EvaluationResult>) -> Option<Self> {
        if results.is_empty() {
            return None;
        }

        let overall_score = results.iter().map(|r| r.score).sum::<f64>() / results.len() as f64;

        let combined_feedback = std::iter::once("Multi-dimension evaluation summary:".to_string())
            .chain(
                results
                    .iter()
                    .map(|r| format!("- {}: {}", r.dimension, r.feedback)),
            )
            .collect::<Vec<_>>()
            .join("\n");

        let suggestions = results
            .iter()
            .flat_map(|r| {
                r.suggestions.iter().map(move |s| TaggedSuggestion {
                    source: r.dimension.to_string(),
                    text: s.clone(),
                })
            })
            .collect();

        Some(Self {
            overall_score,
            dimensions: results,
            combined_feedback,
            suggestions,
            created_at: Utc::now(),
        })
    }

    /// Look up the result for one dimension
    pub fn dimension(&self, dimension: Dimension) -> Option<&EvaluationResult> {
        self.dimensions.iter().find(|r| r.dimension == dimension)
    }

    /// Overall score mapped onto [0, 1] for display
    pub fn normalized_score(&self) -> f64 {
        self.overall_score / MAX_SCORE
    }

    /// Produce the evaluation as seen after a reviewer's amendment.
    ///
    /// The receiver is left untouched; per-dimension results are carried over as-is.
    pub fn amended(&self, amendment: &EvaluationAmendment) -> CompositeEvaluation {
        let mut amended = self.clone();

        if let Some(score) = amendment.overall_score {
            amended.overall_score = score;
        }

        if let Some(ref feedback) = amendment.feedback {
            amended.combined_feedback = format!(
                "{}\n- {}: {}",
                amended.combined_feedback, REVIEWER_SOURCE, feedback
            );
        }

        amended
            .suggestions
            .extend(amendment.suggestions.iter().map(|s| TaggedSuggestion {
                source: REVIEWER_SOURCE.to_string(),
                text: s.clone(),
            }));

        amended
    }
}

/// Changes a human reviewer applies to the latest evaluation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationAmendment {
    /// Replacement overall score on the [0, 10] scale
    #[serde(default)]
    pub overall_score: Option<f64>,
    /// Additional reviewer feedback
    #[serde(default)]
    pub feedback: Option<String>,
    /// Additional reviewer suggestions
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl EvaluationAmendment {
    pub fn is_empty(&self) -> bool {
        self.overall_score.is_none() && self.feedback.is_none() && self.suggestions.is_empty()
    }

    /// Check the replacement score is on the canonical scale
    pub fn validate(&self) -> Result<(), String> {
        match self.overall_score {
            Some(score) if !score.is_finite() || !(0.0..=MAX_SCORE).contains(&score) => Err(
                format!("Amended score {} is outside the 0-10 range", score),
            ),
            _ => Ok(()),
        }
    }
}
