use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::message::{render_transcript, schema_hint, system_text};
use crate::{Backend, BackendConfig, BackendError, BackendType, Message, ProcessSpawner};

/// OpenCode CLI backend
pub struct OpenCodeBackend {
    binary_path: PathBuf,
}

impl OpenCodeBackend {
    pub fn new() -> Self {
        Self {
            binary_path: PathBuf::from("opencode"),
        }
    }

    pub fn with_binary_path(path: PathBuf) -> Self {
        Self { binary_path: path }
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }
}

impl Default for OpenCodeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for OpenCodeBackend {
    fn name(&self) -> &str {
        "OpenCode"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::OpenCode
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
        // No system prompt flag, so instructions lead the prompt
        let mut prompt = match system_text(messages) {
            Some(system) => format!("{}\n\n{}", system, render_transcript(messages)),
            None => render_transcript(messages),
        };
        if let Some(ref schema) = config.response_schema {
            prompt.push_str(&schema_hint(schema));
        }

        debug!(
            backend = self.name(),
            prompt_len = prompt.len(),
            "Invoking backend"
        );

        let mut args = vec!["run"];

        let model_arg;
        if let Some(ref model) = config.model {
            args.push("--model");
            model_arg = model.clone();
            args.push(&model_arg);
        }

        args.push("--prompt");
        args.push(&prompt);

        ProcessSpawner::spawn(&self.binary_path, &args, config)
            .await?
            .into_text()
    }
}
