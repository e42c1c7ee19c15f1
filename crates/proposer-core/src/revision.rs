use std::collections::BTreeMap;
use std::sync::Arc;

use proposer_agent::{Backend, BackendConfig, Message, ProposalRequest, Reference};
use proposer_critic::evaluation::{extract_block, extract_fenced_json};
use proposer_critic::CompositeEvaluation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{RevisionPrompts, WorkflowError};

/// Mean score below which a dimension counts as chronically weak
pub const CHRONIC_THRESHOLD: f64 = 7.0;

pub const ANALYSIS_TEMPERATURE: f32 = 0.2;
pub const REVISION_TEMPERATURE: f32 = 0.5;

/// Score series of one dimension across rounds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionTrend {
    pub dimension: String,
    pub scores: Vec<f64>,
    pub mean: f64,
    pub latest: f64,
    /// Mean below [`CHRONIC_THRESHOLD`]
    pub chronic: bool,
    /// Latest score below the previous one
    pub regressed: bool,
}

/// Compact, deterministic view of the whole evaluation history
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryDigest {
    pub trends: Vec<DimensionTrend>,
    pub overall_scores: Vec<f64>,
    /// Distinct suggestions per source (dimension or reviewer), first-seen order
    pub suggestions: BTreeMap<String, Vec<String>>,
}

impl HistoryDigest {
    pub fn from_history(history: &[CompositeEvaluation]) -> Self {
        let mut trends: Vec<(String, Vec<f64>)> = Vec::new();
        let mut suggestions: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for evaluation in history {
            for result in &evaluation.dimensions {
                let name = result.dimension.to_string();
                match trends.iter_mut().find(|(d, _)| *d == name) {
                    Some((_, scores)) => scores.push(result.score),
                    None => trends.push((name, vec![result.score])),
                }
            }
            for suggestion in &evaluation.suggestions {
                let entry = suggestions.entry(suggestion.source.clone()).or_default();
                if !entry.contains(&suggestion.text) {
                    entry.push(suggestion.text.clone());
                }
            }
        }

        let trends = trends
            .into_iter()
            .map(|(dimension, scores)| {
                let mean = scores.iter().sum::<f64>() / scores.len() as f64;
                let latest = scores.last().copied().unwrap_or_default();
                let regressed = scores.len() >= 2 && latest < scores[scores.len() - 2];
                DimensionTrend {
                    dimension,
                    mean,
                    latest,
                    chronic: mean < CHRONIC_THRESHOLD,
                    regressed,
                    scores,
                }
            })
            .collect();

        Self {
            trends,
            overall_scores: history.iter().map(|e| e.overall_score).collect(),
            suggestions,
        }
    }

    pub fn chronic_dimensions(&self) -> impl Iterator<Item = &DimensionTrend> {
        self.trends.iter().filter(|t| t.chronic)
    }

    pub fn regressed_dimensions(&self) -> impl Iterator<Item = &DimensionTrend> {
        self.trends.iter().filter(|t| t.regressed)
    }

    /// One line per dimension, e.g. `- logic: 5.0 -> 6.5 (mean 5.75, chronic)`
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .trends
            .iter()
            .map(|t| {
                let series = t
                    .scores
                    .iter()
                    .map(|s| format!("{:.1}", s))
                    .collect::<Vec<_>>()
                    .join(" -> ");
                let mut flags = Vec::new();
                if t.chronic {
                    flags.push("chronic");
                }
                if t.regressed {
                    flags.push("regressed");
                }
                let flags = if flags.is_empty() {
                    String::new()
                } else {
                    format!(", {}", flags.join(", "))
                };
                format!("- {}: {} (mean {:.2}{})", t.dimension, series, t.mean, flags)
            })
            .collect();

        let overall = self
            .overall_scores
            .iter()
            .map(|s| format!("{:.2}", s))
            .collect::<Vec<_>>()
            .join(" -> ");
        lines.push(format!("- overall: {}", overall));
        lines.join("\n")
    }

    /// Structured analysis derived without a backend call
    pub fn local_analysis(&self) -> HistoryAnalysis {
        let mut key_issues: Vec<String> = self
            .chronic_dimensions()
            .map(|t| format!("{} is consistently weak (mean {:.1})", t.dimension, t.mean))
            .collect();
        key_issues.extend(self.regressed_dimensions().map(|t| {
            let previous = t.scores[t.scores.len() - 2];
            format!(
                "{} dropped from {:.1} to {:.1}",
                t.dimension, previous, t.latest
            )
        }));

        HistoryAnalysis::Structured {
            key_issues,
            suggestions_by_dimension: self.suggestions.clone(),
        }
    }
}

/// Result of the analysis stage
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryAnalysis {
    Structured {
        key_issues: Vec<String>,
        suggestions_by_dimension: BTreeMap<String, Vec<String>>,
    },
    Unstructured(String),
}

#[derive(Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    key_issues: Vec<String>,
    #[serde(default, alias = "suggestions")]
    suggestions_by_dimension: BTreeMap<String, Vec<String>>,
}

impl HistoryAnalysis {
    /// Read an `<analysis>` block (or fenced/bare JSON). Anything that does not
    /// parse is kept verbatim as an unstructured analysis.
    pub fn parse(output: &str) -> Self {
        let candidate = match extract_block(output, "analysis") {
            Ok(Some(block)) => Some(extract_fenced_json(block).unwrap_or(block)),
            Ok(None) => extract_fenced_json(output).or_else(|| {
                let trimmed = output.trim();
                (trimmed.starts_with('{') && trimmed.ends_with('}')).then_some(trimmed)
            }),
            Err(_) => None,
        };

        match candidate.map(serde_json::from_str::<RawAnalysis>) {
            Some(Ok(raw)) => HistoryAnalysis::Structured {
                key_issues: raw.key_issues,
                suggestions_by_dimension: raw.suggestions_by_dimension,
            },
            Some(Err(e)) => {
                debug!(error = %e, "Analysis JSON did not match the expected shape");
                HistoryAnalysis::Unstructured(output.trim().to_string())
            }
            None => HistoryAnalysis::Unstructured(output.trim().to_string()),
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, HistoryAnalysis::Structured { .. })
    }
}

/// JSON schema requested from the backend for the analysis stage
pub fn analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "key_issues": {"type": "array", "items": {"type": "string"}},
            "suggestions_by_dimension": {
                "type": "object",
                "additionalProperties": {"type": "array", "items": {"type": "string"}}
            }
        },
        "required": ["key_issues", "suggestions_by_dimension"]
    })
}

/// A revised proposal and the analysis it was written from
#[derive(Debug, Clone)]
pub struct Revision {
    pub proposal: String,
    pub analysis: HistoryAnalysis,
}

/// Produces a new proposal version from the current one and the evaluation history
pub struct RevisionUnit {
    backend: Arc<dyn Backend>,
    analysis_config: BackendConfig,
    rewrite_config: BackendConfig,
}

impl RevisionUnit {
    pub fn new(backend: Arc<dyn Backend>, config: BackendConfig) -> Self {
        let mut analysis_config = config.clone().with_schema(analysis_schema());
        if analysis_config.temperature.is_none() {
            analysis_config.temperature = Some(ANALYSIS_TEMPERATURE);
        }
        let mut rewrite_config = config;
        if rewrite_config.temperature.is_none() {
            rewrite_config.temperature = Some(REVISION_TEMPERATURE);
        }
        Self {
            backend,
            analysis_config,
            rewrite_config,
        }
    }

    /// Analysis stage. Never fails: unparseable output becomes
    /// `Unstructured`, and a failed or empty backend call falls back to the
    /// digest's own analysis.
    pub async fn analyze(&self, history: &[CompositeEvaluation]) -> HistoryAnalysis {
        let digest = HistoryDigest::from_history(history);
        let feedback: Vec<String> = history.iter().map(|e| e.combined_feedback.clone()).collect();

        let messages = vec![
            Message::system(RevisionPrompts::analysis_system_prompt()),
            Message::user(RevisionPrompts::build_analysis_prompt(&digest, &feedback)),
        ];

        match self.backend.invoke(&messages, &self.analysis_config).await {
            Ok(output) if output.trim().is_empty() => {
                warn!("History analysis was empty, using local analysis");
                digest.local_analysis()
            }
            Ok(output) => HistoryAnalysis::parse(&output),
            Err(e) => {
                warn!(error = %e, "History analysis failed, using local analysis");
                digest.local_analysis()
            }
        }
    }

    /// Produce a complete, standalone revised proposal
    pub async fn revise(
        &self,
        current: &str,
        request: &ProposalRequest,
        history: &[CompositeEvaluation],
        references: &[Reference],
    ) -> Result<Revision, WorkflowError> {
        if history.is_empty() {
            return Err(WorkflowError::RevisionFailed(
                "no evaluation history to revise from".to_string(),
            ));
        }

        let analysis = self.analyze(history).await;
        debug!(
            structured = analysis.is_structured(),
            rounds = history.len(),
            "History analyzed"
        );

        let messages = vec![
            Message::system(RevisionPrompts::rewrite_system_prompt()),
            Message::user(RevisionPrompts::build_rewrite_prompt(
                current, request, &analysis, references,
            )),
        ];

        let output = self
            .backend
            .invoke(&messages, &self.rewrite_config)
            .await
            .map_err(|e| WorkflowError::RevisionFailed(e.to_string()))?;

        let proposal = output.trim();
        if proposal.is_empty() {
            return Err(WorkflowError::RevisionFailed(
                "backend returned an empty proposal".to_string(),
            ));
        }

        info!(chars = proposal.len(), "Proposal revised");
        Ok(Revision {
            proposal: proposal.to_string(),
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proposer_critic::{Dimension, EvaluationResult};

    fn round(scores: &[(Dimension, f64, &str)]) -> CompositeEvaluation {
        CompositeEvaluation::from_results(
            scores
                .iter()
                .map(|(dimension, score, suggestion)| EvaluationResult {
                    dimension: *dimension,
                    score: *score,
                    feedback: format!("{} feedback", dimension),
                    suggestions: vec![suggestion.to_string()],
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn digest_separates_chronic_from_regressed() {
        let history = vec![
            round(&[(Dimension::Logic, 5.0, "fix flow"), (Dimension::Feasibility, 9.0, "ok")]),
            round(&[(Dimension::Logic, 6.0, "fix flow"), (Dimension::Feasibility, 7.5, "staff it")]),
        ];
        let digest = HistoryDigest::from_history(&history);

        let logic = &digest.trends[0];
        assert_eq!(logic.dimension, "logic");
        assert!(logic.chronic);
        assert!(!logic.regressed);

        let feasibility = &digest.trends[1];
        assert!(!feasibility.chronic);
        assert!(feasibility.regressed);

        assert_eq!(digest.suggestions["logic"], vec!["fix flow"]);
        assert_eq!(digest.suggestions["feasibility"], vec!["ok", "staff it"]);
        assert!(digest.summary().contains("- logic: 5.0 -> 6.0 (mean 5.50, chronic)"));
    }

    #[test]
    fn local_analysis_names_weak_dimensions() {
        let history = vec![
            round(&[(Dimension::Completeness, 8.0, "a")]),
            round(&[(Dimension::Completeness, 6.0, "b")]),
        ];
        match HistoryDigest::from_history(&history).local_analysis() {
            HistoryAnalysis::Structured { key_issues, .. } => {
                assert_eq!(key_issues, vec!["completeness dropped from 8.0 to 6.0"]);
            }
            other => panic!("expected structured analysis, got {:?}", other),
        }
    }

    #[test]
    fn parses_structured_analysis() {
        let output = r#"Here is my analysis.
<analysis>
{"key_issues": ["No budget"], "suggestions_by_dimension": {"completeness": ["Add a cost table"]}}
</analysis>"#;
        let analysis = HistoryAnalysis::parse(output);
        assert_eq!(
            analysis,
            HistoryAnalysis::Structured {
                key_issues: vec!["No budget".into()],
                suggestions_by_dimension: BTreeMap::from([(
                    "completeness".to_string(),
                    vec!["Add a cost table".to_string()]
                )]),
            }
        );
    }

    #[test]
    fn prose_falls_back_to_unstructured() {
        let analysis = HistoryAnalysis::parse("  The plan lacks dates and owners.  ");
        assert_eq!(
            analysis,
            HistoryAnalysis::Unstructured("The plan lacks dates and owners.".into())
        );

        let wrong_shape = HistoryAnalysis::parse("<analysis>{\"key_issues\": \"one\"}</analysis>");
        assert!(!wrong_shape.is_structured());
    }
}
