//! Project configuration file support for proposer.
//!
//! Loads configuration from `proposer.toml` in the working directory.

use anyhow::{bail, Context, Result};
use proposer_agent::ProposalRequest;
use proposer_core::WorkflowSettings;
use serde::Deserialize;
use std::path::Path;

/// Project-level configuration loaded from `proposer.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Global default backend (applies to every role)
    pub backend: Option<String>,
    /// Global default model (applies to every role)
    pub model: Option<String>,
    #[serde(default)]
    pub generation: RoleConfig,
    #[serde(default)]
    pub critique: RoleConfig,
    #[serde(default)]
    pub revision: RoleConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Configuration for a specific role
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub backend: Option<String>,
    pub model: Option<String>,
}

/// Loop settings; anything unset falls back to the built-in defaults
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    pub max_iterations: Option<usize>,
    pub excellent_score: Option<f64>,
    pub dimensions: Option<Vec<String>>,
    pub reference_count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    Generation,
    Critique,
    Revision,
}

/// The config file name
pub const CONFIG_FILE_NAME: &str = "proposer.toml";

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    fn role(&self, role: RoleKind) -> &RoleConfig {
        match role {
            RoleKind::Generation => &self.generation,
            RoleKind::Critique => &self.critique,
            RoleKind::Revision => &self.revision,
        }
    }

    /// Priority: role section > global > None
    pub fn backend_for(&self, role: RoleKind) -> Option<&str> {
        self.role(role)
            .backend
            .as_deref()
            .or(self.backend.as_deref())
    }

    /// Priority: role section > global > None
    pub fn model_for(&self, role: RoleKind) -> Option<&str> {
        self.role(role).model.as_deref().or(self.model.as_deref())
    }

    /// Workflow settings with file values laid over the defaults
    pub fn settings(&self) -> WorkflowSettings {
        let defaults = WorkflowSettings::default();
        WorkflowSettings {
            max_iterations: self
                .workflow
                .max_iterations
                .unwrap_or(defaults.max_iterations),
            excellent_score: self
                .workflow
                .excellent_score
                .unwrap_or(defaults.excellent_score),
            reference_count: self
                .workflow
                .reference_count
                .unwrap_or(defaults.reference_count),
            human_review: defaults.human_review,
        }
    }
}

/// Load a proposal request from a `.toml` or `.json` file
pub fn load_request(path: &Path) -> Result<ProposalRequest> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file {}", path.display()))?;

    let request: ProposalRequest = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => toml::from_str(&content)
            .with_context(|| format!("Invalid request in {}", path.display()))?,
        Some("json") => serde_json::from_str(&content)
            .with_context(|| format!("Invalid request in {}", path.display()))?,
        _ => bail!(
            "Unsupported request file {}: expected .toml or .json",
            path.display()
        ),
    };

    Ok(request)
}
