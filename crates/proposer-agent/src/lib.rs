mod claude;
mod message;
mod opencode;
mod output;
mod request;
mod retrieval;
mod spawner;
mod traits;

pub use claude::ClaudeBackend;
pub use message::{render_transcript, schema_hint, system_text, Message, Role};
pub use opencode::OpenCodeBackend;
pub use output::ProcessOutput;
pub use request::{Constraint, ProposalRequest, RequestError};
pub use retrieval::{Reference, ReferenceKind, RetrievalError, Retriever, StaticRetriever};
pub use spawner::ProcessSpawner;
pub use traits::{Backend, BackendConfig, BackendError, BackendType};

use std::sync::Arc;

/// Create a backend by type
pub fn create_backend(backend_type: BackendType) -> Arc<dyn Backend> {
    match backend_type {
        BackendType::Claude => Arc::new(ClaudeBackend::new()),
        BackendType::OpenCode => Arc::new(OpenCodeBackend::new()),
    }
}
