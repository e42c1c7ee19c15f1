use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Which unit produced a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalSource {
    Generation,
    Revision,
}

/// Score of one dimension within a round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: String,
    pub score: f64,
}

/// Structured log events for the refinement workflow.
///
/// `round` is 0-indexed everywhere; human-facing output shows it 1-indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        run_id: String,
        problem: String,
        dimensions: Vec<String>,
        max_iterations: usize,
        excellent_score: f64,
    },
    ReferencesRetrieved {
        round: usize,
        count: usize,
    },
    ProposalGenerated {
        round: usize,
        source: ProposalSource,
        chars: usize,
        duration_secs: f64,
    },
    AnalysisCompleted {
        round: usize,
        structured: bool,
    },
    EvaluationCompleted {
        round: usize,
        overall_score: f64,
        scores: Vec<DimensionScore>,
        duration_secs: f64,
    },
    ArbitrationDecided {
        round: usize,
        decision: String,
    },
    AwaitingFeedback {
        round: usize,
        token: String,
    },
    RunInterrupted {
        round: usize,
        token: Option<String>,
    },
    RunCompleted {
        rounds: usize,
        final_score: Option<f64>,
        reason: String,
        duration_secs: f64,
    },
    ErrorEncountered {
        round: usize,
        component: String,
        error: String,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// File that mirrors workflow events inside a log directory
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

/// Logger for workflow events. Console output goes to stderr; an optional file
/// receives every event as timestamped JSON.
pub struct Logger {
    format: LogFormat,
    quiet: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            quiet: false,
            file_writer: None,
        }
    }

    /// Logger that writes nothing to the console
    pub fn quiet() -> Self {
        Self {
            format: LogFormat::Compact,
            quiet: true,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            quiet: false,
            file_writer: Some(Mutex::new(file)),
        })
    }

    /// Console logger that also mirrors events to `events.jsonl` in
    /// `log_dir`, when one is given
    pub fn for_log_dir(format: LogFormat, log_dir: Option<&Path>) -> std::io::Result<Self> {
        match log_dir {
            Some(dir) => Self::with_file(format, &dir.join(EVENTS_FILE_NAME)),
            None => Ok(Self::new(format)),
        }
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        if self.quiet {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => {
                let _ = writeln!(std::io::stderr(), "{}", Self::compact_line(event));
            }
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::RunStarted {
                problem,
                dimensions,
                max_iterations,
                excellent_score,
                ..
            } => {
                let border = "─".repeat(69);
                let _ = writeln!(stderr);
                let _ = writeln!(stderr, "{}", format!("╭{}╮", border).bright_blue());
                let _ = writeln!(
                    stderr,
                    "{}  {}",
                    "│".bright_blue(),
                    "proposer".bold().bright_white()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Problem:".dimmed(),
                    truncate(problem, 58).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Dimensions:".dimmed(),
                    dimensions.join(", ").dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {} rounds, stop at {:.1}",
                    "│".bright_blue(),
                    "Budget:".dimmed(),
                    max_iterations,
                    excellent_score
                );
                let _ = writeln!(stderr, "{}", format!("╰{}╯", border).bright_blue());
                let _ = writeln!(stderr);
            }
            LogEvent::ReferencesRetrieved { count, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} reference{}",
                    "📚".dimmed(),
                    count,
                    if *count == 1 { "" } else { "s" }
                );
            }
            LogEvent::ProposalGenerated {
                round,
                source,
                chars,
                duration_secs,
            } => {
                let header = format!("─ Round {} ", round + 1);
                let padding = "─".repeat(67usize.saturating_sub(header.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    header.bright_blue().bold(),
                    padding.bright_blue()
                );
                let label = match source {
                    ProposalSource::Generation => "GENERATE",
                    ProposalSource::Revision => "REVISE",
                };
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    label.bright_cyan().bold()
                );
                let _ = writeln!(
                    stderr,
                    "    {} {} chars ({:.1}s)",
                    "✓".bright_green(),
                    chars,
                    duration_secs
                );
            }
            LogEvent::AnalysisCompleted { structured, .. } => {
                if !structured {
                    let _ = writeln!(
                        stderr,
                        "    {} {}",
                        "⚠".bright_yellow(),
                        "History analysis was unstructured".dimmed()
                    );
                }
            }
            LogEvent::EvaluationCompleted {
                overall_score,
                scores,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "CRITIQUE".bright_magenta().bold()
                );
                for score in scores {
                    let _ = writeln!(
                        stderr,
                        "    {} {:<14} {:>4.1}",
                        "│".dimmed(),
                        score.dimension,
                        score.score
                    );
                }
                let _ = writeln!(
                    stderr,
                    "    {} overall {:.2} ({:.1}s)",
                    "∑".bright_white(),
                    overall_score,
                    duration_secs
                );
            }
            LogEvent::ArbitrationDecided { decision, .. } => {
                let styled = if decision.starts_with("refine") {
                    format!("→ Decision: {}", decision).bright_yellow().to_string()
                } else {
                    format!("✓ Decision: {}", decision).bright_green().to_string()
                };
                let _ = writeln!(stderr, "    {}", styled);
                let _ = writeln!(stderr);
                let _ = writeln!(stderr, "{}", format!("└{}┘", "─".repeat(69)).bright_blue());
                let _ = writeln!(stderr);
            }
            LogEvent::AwaitingFeedback { token, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} Awaiting reviewer feedback (token {})",
                    "⏸".bright_yellow(),
                    token.bold()
                );
            }
            LogEvent::RunInterrupted { round, token } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Interrupted during round {}",
                    "⚠".bright_yellow(),
                    round + 1
                );
                if let Some(token) = token {
                    let _ = writeln!(stderr, "  Resume with: proposer resume {}", token);
                }
            }
            LogEvent::RunCompleted { .. } => {
                // Final outcome is printed by the binary
            }
            LogEvent::ErrorEncountered {
                round,
                component,
                error,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} failed in round {}: {}",
                    "✗".bright_red(),
                    component,
                    round + 1,
                    error.bright_red()
                );
            }
        }
    }

    fn compact_line(event: &LogEvent) -> String {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted { run_id, .. } => format!("run:start {}", run_id),
            LogEvent::ReferencesRetrieved { round, count } => {
                format!("refs:{} n={}", round + 1, count)
            }
            LogEvent::ProposalGenerated {
                round,
                source,
                chars,
                duration_secs,
            } => {
                let tag = match source {
                    ProposalSource::Generation => "generate",
                    ProposalSource::Revision => "revise",
                };
                format!(
                    "{}:{} chars={} {:.1}s",
                    tag,
                    round + 1,
                    chars,
                    duration_secs
                )
            }
            LogEvent::AnalysisCompleted { round, structured } => format!(
                "analysis:{} {}",
                round + 1,
                if *structured { "structured" } else { "unstructured" }
            ),
            LogEvent::EvaluationCompleted {
                round,
                overall_score,
                ..
            } => format!("eval:{} score={:.2}", round + 1, overall_score),
            LogEvent::ArbitrationDecided { round, decision } => {
                format!("decide:{} {}", round + 1, decision)
            }
            LogEvent::AwaitingFeedback { round, token } => {
                format!("await:{} {}", round + 1, token)
            }
            LogEvent::RunInterrupted { round, .. } => format!("interrupt:{}", round + 1),
            LogEvent::RunCompleted {
                rounds,
                duration_secs,
                ..
            } => format!("run:done:{} {:.1}s", rounds, duration_secs),
            LogEvent::ErrorEncountered {
                round,
                component,
                error,
            } => format!("error:{}:{}:{}", round + 1, component, error),
        };
        format!("[{}] {}", timestamp, msg)
    }
}

/// Shorten to at most `max` characters, marking the cut with "..."
fn truncate(s: &str, max: usize) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max && first_line.len() == s.trim_end().len() {
        return first_line.to_string();
    }
    let kept: String = first_line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}
