//! Error types for the history engine

use thiserror::Error;

use crate::action::ActionError;

/// Errors that can occur while driving the history engine
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The engine is disabled and refuses to mutate state
    #[error("History engine is disabled")]
    Disabled,

    /// No more undos available
    #[error("No more undos available")]
    NothingToUndo,

    /// No more redos available
    #[error("No more redos available")]
    NothingToRedo,

    /// The action at the top of the undo stack cannot be undone
    #[error("Action cannot be undone: {0}")]
    NotUndoable(String),

    /// The action's own forward or inverse logic failed
    #[error(transparent)]
    Action(#[from] ActionError),

    /// A batch is already recording
    #[error("Batch already active: {0}")]
    BatchAlreadyActive(String),

    /// No batch is recording
    #[error("No active batch")]
    NoActiveBatch,

    /// Checkpoint not found (never created, deleted or evicted)
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Checkpoint depth lies beyond the current undo stack
    #[error("Checkpoint depth {depth} is beyond the current undo depth {available}")]
    CheckpointUnreachable {
        /// Depth recorded by the checkpoint
        depth: usize,
        /// Current undo stack depth
        available: usize,
    },

    /// The task driving an operation ended without reporting a result
    #[error("History {operation} interrupted: {reason}")]
    Interrupted {
        /// Operation that was running
        operation: String,
        /// Why the task ended
        reason: String,
    },
}

impl HistoryError {
    /// Create a new NotUndoable error with context
    pub fn not_undoable(id: impl Into<String>) -> Self {
        Self::NotUndoable(id.into())
    }

    /// Create a new CheckpointNotFound error with context
    pub fn checkpoint_not_found(id: impl Into<String>) -> Self {
        Self::CheckpointNotFound(id.into())
    }

    /// Create a new Interrupted error with context
    pub fn interrupted(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a new BatchAlreadyActive error with context
    pub fn batch_already_active(description: impl Into<String>) -> Self {
        Self::BatchAlreadyActive(description.into())
    }
}

/// Configuration result type
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Errors raised while loading or saving [`crate::HistoryConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Layered source could not be read or deserialized
    #[error("Load error: {0}")]
    Load(#[from] ::config::ConfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl ConfigError {
    /// Create a new Validation error with context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
