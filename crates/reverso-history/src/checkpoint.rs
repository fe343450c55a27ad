//! Named markers into the undo stack for bulk restoration

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// Default number of retained checkpoints
pub const DEFAULT_MAX_CHECKPOINTS: usize = 50;

/// A named marker referencing an undo stack depth
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier for this checkpoint
    pub id: String,
    /// User-provided description
    pub description: String,
    /// When the checkpoint was created
    pub created_at: DateTime<Utc>,
    /// Undo stack depth when the checkpoint was created. Never revised.
    pub undo_depth: usize,
}

impl Checkpoint {
    /// Create a new checkpoint at the given undo depth
    pub fn new(description: impl Into<String>, undo_depth: usize) -> Self {
        Checkpoint {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            created_at: Utc::now(),
            undo_depth,
        }
    }
}

/// Bounded ring of checkpoints, oldest evicted first
#[derive(Debug, Clone)]
pub struct CheckpointIndex {
    checkpoints: VecDeque<Checkpoint>,
    max_checkpoints: usize,
}

impl CheckpointIndex {
    /// Create an index with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CHECKPOINTS)
    }

    /// Create an index with a custom capacity (clamped to at least 1)
    pub fn with_capacity(max_checkpoints: usize) -> Self {
        CheckpointIndex {
            checkpoints: VecDeque::new(),
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    /// Store a checkpoint, evicting the oldest when over capacity.
    ///
    /// Returns the evicted checkpoints.
    pub fn insert(&mut self, checkpoint: Checkpoint) -> Vec<Checkpoint> {
        self.checkpoints.push_back(checkpoint);
        let excess = self.checkpoints.len().saturating_sub(self.max_checkpoints);
        let evicted: Vec<Checkpoint> = self.checkpoints.drain(..excess).collect();
        for cp in &evicted {
            debug!(checkpoint_id = %cp.id, "Evicted checkpoint");
        }
        evicted
    }

    /// Get a specific checkpoint by ID
    pub fn get(&self, checkpoint_id: &str) -> Option<&Checkpoint> {
        self.checkpoints.iter().find(|cp| cp.id == checkpoint_id)
    }

    /// Delete a checkpoint by ID
    pub fn remove(&mut self, checkpoint_id: &str) -> Option<Checkpoint> {
        let pos = self
            .checkpoints
            .iter()
            .position(|cp| cp.id == checkpoint_id)?;
        self.checkpoints.remove(pos)
    }

    /// All checkpoints, oldest first
    pub fn list(&self) -> Vec<Checkpoint> {
        self.checkpoints.iter().cloned().collect()
    }

    /// Drop every checkpoint
    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }

    /// Number of checkpoints
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// Maximum retained checkpoints
    pub fn max_checkpoints(&self) -> usize {
        self.max_checkpoints
    }
}

impl Default for CheckpointIndex {
    fn default() -> Self {
        Self::new()
    }
}
