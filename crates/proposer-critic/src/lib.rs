//! # proposer-critic
//!
//! Multi-dimension critique of proposals.
//!
//! - [`CritiqueUnit`] scores one proposal along one [`Dimension`]
//! - [`EvaluationAggregator`] runs every configured unit concurrently and
//!   combines their verdicts into a [`CompositeEvaluation`]
//!
//! Scores live on the [0, 10] scale throughout; `normalized_score()` helpers
//! map them onto [0, 1] for display only.

mod aggregator;
mod composite;
mod critique;
mod dimension;
pub mod evaluation;
mod prompts;

pub use aggregator::EvaluationAggregator;
pub use composite::{CompositeEvaluation, EvaluationAmendment, TaggedSuggestion, REVIEWER_SOURCE};
pub use critique::{CritiqueError, CritiqueInput, CritiqueUnit, CRITIQUE_TEMPERATURE};
pub use dimension::Dimension;
pub use evaluation::{EvaluationParseError, EvaluationResult, MAX_SCORE};
pub use prompts::CritiquePrompts;
