//! Batch recording: collect actions executed between begin and end

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::action::{ActionHeader, ReversibleAction};
use crate::composite::CompositeAction;
use crate::error::HistoryError;

/// An open batch window
pub struct BatchContext {
    /// Unique identifier, reused as the composite action id
    pub id: String,
    /// Description, reused as the composite action description
    pub description: String,
    /// When the batch was opened
    pub started_at: DateTime<Utc>,
    actions: Vec<Box<dyn ReversibleAction>>,
}

impl BatchContext {
    fn new(description: String) -> Self {
        BatchContext {
            id: Uuid::new_v4().to_string(),
            description,
            started_at: Utc::now(),
            actions: Vec::new(),
        }
    }

    /// Number of collected actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether nothing has been collected
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Holds at most one active batch
#[derive(Default)]
pub struct BatchRecorder {
    active: Option<BatchContext>,
}

/// Result of closing a batch
pub struct FinishedBatch {
    /// Batch identifier
    pub id: String,
    /// Batch description
    pub description: String,
    /// Composite built from the collected actions, `None` when nothing was collected
    pub composite: Option<CompositeAction>,
}

impl BatchRecorder {
    /// Create a recorder with no active batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a batch. Nested batches are rejected.
    pub fn begin(&mut self, description: impl Into<String>) -> Result<&BatchContext, HistoryError> {
        if let Some(active) = &self.active {
            return Err(HistoryError::batch_already_active(active.description.clone()));
        }
        Ok(self.active.insert(BatchContext::new(description.into())))
    }

    /// Whether a batch is open
    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The open batch, if any
    pub fn active(&self) -> Option<&BatchContext> {
        self.active.as_ref()
    }

    /// Record an already executed action into the open batch.
    ///
    /// Hands the action back when no batch is open.
    pub fn record(
        &mut self,
        action: Box<dyn ReversibleAction>,
    ) -> Result<(), Box<dyn ReversibleAction>> {
        match self.active.as_mut() {
            Some(batch) => {
                batch.actions.push(action);
                Ok(())
            }
            None => Err(action),
        }
    }

    /// Close the batch and assemble its composite action
    pub fn finish(&mut self) -> Result<FinishedBatch, HistoryError> {
        let batch = self.active.take().ok_or(HistoryError::NoActiveBatch)?;
        let composite = if batch.actions.is_empty() {
            None
        } else {
            let header = ActionHeader::with_id(batch.id.clone(), batch.description.clone())
                .with_category("batch");
            Some(CompositeAction::with_header(header, batch.actions))
        };
        Ok(FinishedBatch {
            id: batch.id,
            description: batch.description,
            composite,
        })
    }

    /// Discard the batch without touching history
    pub fn cancel(&mut self) -> Result<BatchContext, HistoryError> {
        self.active.take().ok_or(HistoryError::NoActiveBatch)
    }
}
