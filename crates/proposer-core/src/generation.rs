use std::sync::Arc;

use proposer_agent::{Backend, BackendConfig, Message, ProposalRequest, Reference};
use tracing::{debug, info, warn};

use crate::{ProposalPrompts, WorkflowError};

/// Sampling temperature for first drafts unless the caller overrides it
pub const GENERATION_TEMPERATURE: f32 = 0.7;

/// Produces the first proposal version
pub struct GenerationUnit {
    backend: Arc<dyn Backend>,
    config: BackendConfig,
}

impl GenerationUnit {
    pub fn new(backend: Arc<dyn Backend>, mut config: BackendConfig) -> Self {
        if config.temperature.is_none() {
            config.temperature = Some(GENERATION_TEMPERATURE);
        }
        Self { backend, config }
    }

    /// Write a proposal for `request`.
    ///
    /// The request is validated before the backend is contacted. Exactly one
    /// backend call is made; failures and empty output are `GenerationFailed`.
    pub async fn generate(
        &self,
        request: &ProposalRequest,
        references: &[Reference],
    ) -> Result<String, WorkflowError> {
        request.validate()?;

        if request.goals.is_empty() {
            warn!("Proposal request has no goals");
        }

        let messages = vec![
            Message::system(ProposalPrompts::system_prompt()),
            Message::user(ProposalPrompts::build_generation_prompt(request, references)),
        ];

        debug!(
            backend = self.backend.name(),
            references = references.len(),
            "Generating proposal"
        );

        let output = self
            .backend
            .invoke(&messages, &self.config)
            .await
            .map_err(|e| WorkflowError::GenerationFailed(e.to_string()))?;

        let proposal = output.trim();
        if proposal.is_empty() {
            return Err(WorkflowError::GenerationFailed(
                "backend returned an empty proposal".to_string(),
            ));
        }

        info!(chars = proposal.len(), "Proposal generated");
        Ok(proposal.to_string())
    }
}
