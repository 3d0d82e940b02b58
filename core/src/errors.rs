/// Error types for the ADW orchestration system.
use thiserror::Error;

/// Errors from the state store (SQLite-backed `ADWState` persistence).
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("migration error: {0}")]
    MigrationError(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type StateStoreResult<T> = Result<T, StateStoreError>;

/// Errors surfaced while creating, validating, or removing a worktree.
#[derive(Error, Debug)]
pub enum WorktreeError {
    #[error("git command failed: {0}")]
    GitFailed(String),

    #[error("worktree validation failed: {0:?}")]
    Invalid(WorktreeInvalidReason),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Structured reason a worktree failed three-way validation (state, filesystem, git).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeInvalidReason {
    NoPath,
    MissingDir,
    NotRegistered,
}

pub type WorktreeResult<T> = Result<T, WorktreeError>;

/// Errors from spawning and supervising the external agent CLI process.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    SpawnFailed(String),

    #[error("process timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type ProcessResult<T> = Result<T, ProcessError>;

/// Errors from the thin git/GitHub CLI adapter.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("git command failed: {0}")]
    CommandFailed(String),

    #[error("unresolved merge conflict in: {0:?}")]
    ConflictUnresolved(Vec<String>),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type GitResult<T> = Result<T, GitError>;

/// Errors from a stage's `preconditions`, `should_skip`, or `execute` hooks.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("storage error: {0}")]
    Storage(#[from] StateStoreError),

    #[error("worktree error: {0}")]
    Worktree(#[from] WorktreeError),

    #[error("process error: {0}")]
    Process(#[from] ProcessError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("{0}")]
    Other(String),
}

pub type StageResult<T> = Result<T, StageError>;

/// Errors surfaced at the HTTP / CLI boundary.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl From<StateStoreError> for ApiError {
    fn from(e: StateStoreError) -> Self {
        match e {
            StateStoreError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Errors from loading `.yaml`/`.json` orchestrator and workflow configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config not found: {0}")]
    NotFound(String),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("parse error: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
