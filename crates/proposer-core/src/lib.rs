//! # proposer-core
//!
//! The refinement workflow: generate a proposal, critique it along several
//! dimensions, then either stop or revise and go again.
//!
//! ## Key Types
//!
//! - [`WorkflowRunner`] - Iteration controller (`run`, `step`, `resume`)
//! - [`WorkflowState`] - Append-only history of one run
//! - [`GenerationUnit`] / [`RevisionUnit`] - Produce proposal versions
//! - [`arbitrate`] - Stopping policy
//! - [`CheckpointStore`] - Persistence for suspended and interrupted runs
//! - [`RunOutcome`] - How a call to run or resume ended

mod arbitration;
mod checkpoint;
mod error;
mod generation;
mod outcome;
mod prompts;
mod revision;
mod runner;
mod state;

pub use arbitration::{arbitrate, CompletionReason, Decision, ReviewAction, ReviewFeedback};
pub use checkpoint::{
    CheckpointError, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
};
pub use error::{Component, WorkflowError};
pub use generation::{GenerationUnit, GENERATION_TEMPERATURE};
pub use outcome::RunOutcome;
pub use prompts::{ProposalPrompts, RevisionPrompts};
pub use revision::{
    analysis_schema, DimensionTrend, HistoryAnalysis, HistoryDigest, Revision, RevisionUnit,
    ANALYSIS_TEMPERATURE, CHRONIC_THRESHOLD, REVISION_TEMPERATURE,
};
pub use runner::WorkflowRunner;
pub use state::{AmendmentRecord, WorkflowSettings, WorkflowState, WorkflowStatus};
