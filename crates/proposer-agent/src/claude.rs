use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::message::{render_transcript, schema_hint, system_text};
use crate::{Backend, BackendConfig, BackendError, BackendType, Message, ProcessSpawner};

/// Claude CLI backend, driven in non-interactive print mode
pub struct ClaudeBackend {
    binary_path: PathBuf,
}

impl ClaudeBackend {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("claude"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Default for ClaudeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for ClaudeBackend {
    fn name(&self) -> &str {
        "Claude"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Claude
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn invoke(
        &self,
        messages: &[Message],
        config: &BackendConfig,
    ) -> Result<String, BackendError> {
        let mut prompt = render_transcript(messages);
        if let Some(ref schema) = config.response_schema {
            prompt.push_str(&schema_hint(schema));
        }
        let system = system_text(messages);

        debug!(
            backend = self.name(),
            prompt_len = prompt.len(),
            temperature = ?config.temperature,
            "Invoking backend"
        );

        let mut args = vec!["--print"];

        let model_arg;
        if let Some(ref model) = config.model {
            args.push("--model");
            model_arg = model.clone();
            args.push(&model_arg);
        }

        if let Some(ref system) = system {
            args.push("--system-prompt");
            args.push(system);
        }

        // End of options, so prompts starting with '-' are not read as flags
        args.push("--");
        args.push(&prompt);

        ProcessSpawner::spawn(&self.binary_path, &args, config)
            .await?
            .into_text()
    }
}
