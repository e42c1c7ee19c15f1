use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tracing::debug;

use crate::WorkflowState;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("No checkpoint found for token {0}")]
    NotFound(String),

    #[error("Invalid checkpoint token: {0}")]
    InvalidToken(String),

    #[error("Checkpoint I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not determine data directory")]
    NoDataDir,

    #[error("Checkpoint store is unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for suspended or interrupted runs
pub trait CheckpointStore: Send + Sync {
    /// Persist `state` and return the token that resumes it.
    ///
    /// Saving the same run again overwrites its previous checkpoint.
    fn save(&self, state: &WorkflowState) -> Result<String, CheckpointError>;

    fn load(&self, token: &str) -> Result<WorkflowState, CheckpointError>;

    fn remove(&self, token: &str) -> Result<(), CheckpointError>;
}

/// Stores one JSON file per run, named by the run id
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under the user data directory (`~/.local/share/proposer/checkpoints` on Linux)
    pub fn default_location() -> Result<Self, CheckpointError> {
        let data_dir = dirs::data_dir().ok_or(CheckpointError::NoDataDir)?;
        Ok(Self::new(data_dir.join("proposer").join("checkpoints")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Tokens of all saved checkpoints, most recently written first
    pub fn tokens(&self) -> Result<Vec<String>, CheckpointError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(token) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();
            entries.push((modified, token.to_string()));
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries.into_iter().map(|(_, token)| token).collect())
    }

    fn path_for(&self, token: &str) -> Result<PathBuf, CheckpointError> {
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(CheckpointError::InvalidToken(token.to_string()));
        }
        Ok(self.dir.join(format!("{}.json", token)))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<String, CheckpointError> {
        fs::create_dir_all(&self.dir)?;
        let token = state.run_id().to_string();
        let path = self.path_for(&token)?;

        // write then rename
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, &path)?;

        debug!(path = %path.display(), status = %state.status(), "Checkpoint saved");
        Ok(token)
    }

    fn load(&self, token: &str) -> Result<WorkflowState, CheckpointError> {
        let path = self.path_for(token)?;
        let contents = fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CheckpointError::NotFound(token.to_string()),
            _ => CheckpointError::Io(e),
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn remove(&self, token: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(token)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, mainly for tests and embedding
#[derive(Default)]
pub struct MemoryCheckpointStore {
    states: Mutex<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.lock().map(|s| s.len()).unwrap_or_default()
    }

    fn states(&self) -> Result<MutexGuard<'_, HashMap<String, String>>, CheckpointError> {
        self.states
            .lock()
            .map_err(|e| CheckpointError::Unavailable(e.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, state: &WorkflowState) -> Result<String, CheckpointError> {
        // stored serialized, like the file store
        let json = serde_json::to_string(state)?;
        let token = state.run_id().to_string();
        self.states()?.insert(token.clone(), json);
        Ok(token)
    }

    fn load(&self, token: &str) -> Result<WorkflowState, CheckpointError> {
        let json = self
            .states()?
            .get(token)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound(token.to_string()))?;
        Ok(serde_json::from_str(&json)?)
    }

    fn remove(&self, token: &str) -> Result<(), CheckpointError> {
        self.states()?.remove(token);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkflowSettings;
    use proposer_agent::ProposalRequest;

    fn state() -> WorkflowState {
        let mut state = WorkflowState::new(
            ProposalRequest::new("problem", vec!["goal".into()], vec![]),
            WorkflowSettings::default(),
        );
        state.push_proposal("draft".into());
        state
    }

    #[test]
    fn file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("checkpoints"));
        let state = state();

        let token = store.save(&state).unwrap();
        assert_eq!(token, state.run_id());

        let loaded = store.load(&token).unwrap();
        assert_eq!(loaded.proposals(), state.proposals());
        assert_eq!(loaded.iteration(), 1);

        store.remove(&token).unwrap();
        assert!(matches!(store.load(&token), Err(CheckpointError::NotFound(_))));
        // removing twice is fine
        store.remove(&token).unwrap();
    }

    #[test]
    fn file_store_lists_saved_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("missing"));
        assert!(store.tokens().unwrap().is_empty());

        let store = FileCheckpointStore::new(dir.path());
        let first = store.save(&state()).unwrap();
        let second = store.save(&state()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut tokens = store.tokens().unwrap();
        tokens.sort();
        let mut expected = vec![first, second];
        expected.sort();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn file_store_rejects_path_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        assert!(matches!(
            store.load("../etc/passwd"),
            Err(CheckpointError::InvalidToken(_))
        ));
    }

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryCheckpointStore::new();
        let state = state();
        let token = store.save(&state).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load(&token).unwrap().run_id(), state.run_id());
        store.remove(&token).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn memory_store_reports_a_poisoned_lock() {
        let store = std::sync::Arc::new(MemoryCheckpointStore::new());
        let poisoner = store.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.states.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        let state = state();
        assert!(matches!(
            store.save(&state),
            Err(CheckpointError::Unavailable(_))
        ));
        assert!(matches!(
            store.remove(state.run_id()),
            Err(CheckpointError::Unavailable(_))
        ));
        assert!(matches!(
            store.load(state.run_id()),
            Err(CheckpointError::Unavailable(_))
        ));
    }
}
