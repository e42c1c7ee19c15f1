use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::DimensionScore;

/// Each line type in the run transcript.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLine {
    RunStart {
        timestamp: DateTime<Utc>,
        run_id: String,
        problem: String,
        goals: Vec<String>,
        constraints: Vec<(String, String)>,
        dimensions: Vec<String>,
        max_iterations: usize,
        excellent_score: f64,
    },
    RunResumed {
        run_id: String,
        status: String,
        timestamp: DateTime<Utc>,
    },
    Round {
        round: usize,
        proposal: String,
        overall_score: f64,
        scores: Vec<DimensionScore>,
        combined_feedback: String,
        decision: String,
        timestamp: DateTime<Utc>,
    },
    RunEnd {
        outcome: String,
        rounds: usize,
        final_score: Option<f64>,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Run header written as the first transcript line
#[derive(Debug, Clone)]
pub struct RunHeader<'a> {
    pub run_id: &'a str,
    pub problem: &'a str,
    pub goals: &'a [String],
    pub constraints: Vec<(String, String)>,
    pub dimensions: Vec<String>,
    pub max_iterations: usize,
    pub excellent_score: f64,
}

/// Writes a run transcript as JSONL under the user data directory
/// (`~/.local/share/proposer/runs/` on Linux).
///
/// One file per run: reopening the same run appends to its existing
/// transcript, so a resumed run keeps a single history.
pub struct SessionWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
    run_id: String,
}

impl SessionWriter {
    /// Open the transcript of `run_id` under the user data directory
    pub fn open(run_id: &str, started_at: DateTime<Utc>) -> io::Result<Self> {
        Self::open_in(&Self::default_dir()?, run_id, started_at)
    }

    /// Open, or reopen, the transcript of `run_id` inside `dir`.
    ///
    /// The file is named after the run's start time and a hash of its id.
    pub fn open_in(dir: &Path, run_id: &str, started_at: DateTime<Utc>) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let timestamp_str = started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(run_id.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let path = dir.join(format!("{}_{}.jsonl", timestamp_str, short_hash));
        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
            run_id: run_id.to_string(),
        })
    }

    /// `~/.local/share/proposer/runs` on Linux
    pub fn default_dir() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("proposer").join("runs"))
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Returns the path to the transcript file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_start(&self, header: RunHeader<'_>) {
        self.write_line(&SessionLine::RunStart {
            timestamp: Utc::now(),
            run_id: header.run_id.to_string(),
            problem: header.problem.to_string(),
            goals: header.goals.to_vec(),
            constraints: header.constraints,
            dimensions: header.dimensions,
            max_iterations: header.max_iterations,
            excellent_score: header.excellent_score,
        });
    }

    /// Mark a run picked up again from a checkpoint
    pub fn write_resumed(&self, status: &str) {
        self.write_line(&SessionLine::RunResumed {
            run_id: self.run_id.clone(),
            status: status.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Write one round line. Takes plain fields so this crate stays independent
    /// of the workflow types.
    pub fn write_round(
        &self,
        round: usize,
        proposal: &str,
        overall_score: f64,
        scores: Vec<DimensionScore>,
        combined_feedback: &str,
        decision: &str,
    ) {
        self.write_line(&SessionLine::Round {
            round,
            proposal: proposal.to_string(),
            overall_score,
            scores,
            combined_feedback: combined_feedback.to_string(),
            decision: decision.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn write_end(
        &self,
        outcome: &str,
        rounds: usize,
        final_score: Option<f64>,
        duration_secs: f64,
    ) {
        self.write_line(&SessionLine::RunEnd {
            outcome: outcome.to_string(),
            rounds,
            final_score,
            duration_secs,
            timestamp: Utc::now(),
        });
    }

    fn write_line(&self, line: &SessionLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_start_round_and_end_lines() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SessionWriter::open_in(dir.path(), "run-1", Utc::now()).unwrap();

        let goals = vec!["Cut lead time".to_string()];
        writer.write_start(RunHeader {
            run_id: "run-1",
            problem: "How do we ship faster?",
            goals: &goals,
            constraints: vec![("budget".into(), "none".into())],
            dimensions: vec!["logic".into(), "feasibility".into()],
            max_iterations: 3,
            excellent_score: 8.5,
        });
        writer.write_round(
            0,
            "Automate releases",
            6.5,
            vec![DimensionScore {
                dimension: "logic".into(),
                score: 6.5,
            }],
            "Multi-dimension evaluation summary:\n- logic: fine",
            "refine",
        );
        writer.write_end("completed", 1, Some(6.5), 1.2);

        let contents = fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "run_start");
        assert_eq!(lines[0]["constraints"][0][0], "budget");
        assert_eq!(lines[1]["type"], "round");
        assert_eq!(lines[1]["scores"][0]["dimension"], "logic");
        assert_eq!(lines[2]["type"], "run_end");
        assert_eq!(lines[2]["final_score"], 6.5);
    }

    #[test]
    fn file_name_carries_start_time_and_run_hash() {
        let dir = tempfile::tempdir().unwrap();
        let started_at = DateTime::parse_from_rfc3339("2026-03-01T09:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let writer = SessionWriter::open_in(dir.path(), "abc", started_at).unwrap();
        let name = writer.path().file_name().unwrap().to_string_lossy();

        // sha256("abc") starts with ba7816
        assert_eq!(name, "2026-03-01T09-30-00Z_ba7816.jsonl");
    }

    #[test]
    fn reopening_a_run_appends_to_its_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let started_at = Utc::now();

        let first = SessionWriter::open_in(dir.path(), "run-7", started_at).unwrap();
        first.write_end("awaiting_feedback", 1, Some(5.0), 0.0);
        drop(first);

        let second = SessionWriter::open_in(dir.path(), "run-7", started_at).unwrap();
        second.write_resumed("awaiting_feedback");
        second.write_end("completed", 1, Some(9.0), 0.4);

        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
        let contents = fs::read_to_string(second.path()).unwrap();
        let types: Vec<String> = contents
            .lines()
            .map(|l| {
                let line: serde_json::Value = serde_json::from_str(l).unwrap();
                line["type"].as_str().unwrap().to_string()
            })
            .collect();
        assert_eq!(types, ["run_end", "run_resumed", "run_end"]);
    }
}
