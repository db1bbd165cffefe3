use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("store error: {0}")]
    Store(String),

    #[error("entry already exists: run {run_id} turn {turn} ({kind})")]
    DuplicateEntry {
        run_id: String,
        turn: u64,
        kind: String,
    },

    #[error("invalid run id: {0:?} is longer than 255 bytes")]
    InvalidRunId(String),

    #[error("run not found: {0}")]
    RunNotFound(String),

    #[error("previous turn data not found: run {run_id} turn {turn}")]
    MissingPreviousTurn { run_id: String, turn: u64 },

    #[error("seed mismatch for run {run_id}: expected '{expected}' but got '{actual}'")]
    SeedMismatch {
        run_id: String,
        expected: String,
        actual: String,
    },

    #[error("snapshot not found: run {run_id} turn {turn}")]
    SnapshotNotFound { run_id: String, turn: u64 },

    #[error("invalid game state: {0}")]
    InvalidState(String),

    #[error("unknown object kind: {0}")]
    UnknownObjectKind(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
