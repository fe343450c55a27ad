//! The history engine facade
//!
//! [`HistoryEngine`] serializes every mutation behind one async mutex and
//! republishes a [`HistoryStatus`] snapshot before releasing it, so queries are
//! synchronous, never torn and never wait on a long-running action.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

use crate::action::{guarded, ActionError, ActionPriority, ActionResult, ReversibleAction};
use crate::batch::BatchRecorder;
use crate::checkpoint::{Checkpoint, CheckpointIndex};
use crate::config::HistoryConfig;
use crate::error::HistoryError;
use crate::events::{EventBus, HistoryEvent};
use crate::store::HistoryStore;

/// Read-only view of an action held in history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSummary {
    /// Action identifier
    pub id: String,
    /// Action description
    pub description: String,
    /// Grouping label
    pub category: String,
    /// Priority hint
    pub priority: ActionPriority,
    /// Whether undo is supported
    pub can_undo: bool,
    /// When the action last completed its forward logic
    pub timestamp: Option<DateTime<Utc>>,
}

impl ActionSummary {
    fn of(action: &dyn ReversibleAction) -> Self {
        ActionSummary {
            id: action.id().to_string(),
            description: action.description().to_string(),
            category: action.category().to_string(),
            priority: action.priority(),
            can_undo: action.can_undo(),
            timestamp: action.timestamp(),
        }
    }
}

/// Point-in-time snapshot of the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStatus {
    /// Whether mutations are accepted
    pub enabled: bool,
    /// Whether a batch is recording
    pub batch_active: bool,
    /// Capacity of each stack
    pub max_history_size: usize,
    /// Undo entries, most recent first
    pub undo: Vec<ActionSummary>,
    /// Redo entries, most recent first
    pub redo: Vec<ActionSummary>,
    /// Retained checkpoints, oldest first
    pub checkpoints: Vec<Checkpoint>,
}

struct EngineState {
    store: HistoryStore,
    checkpoints: CheckpointIndex,
    batch: BatchRecorder,
    enabled: bool,
}

impl EngineState {
    fn status(&self) -> HistoryStatus {
        HistoryStatus {
            enabled: self.enabled,
            batch_active: self.batch.is_active(),
            max_history_size: self.store.max_size(),
            undo: self.store.undo_iter().map(|a| ActionSummary::of(a)).collect(),
            redo: self.store.redo_iter().map(|a| ActionSummary::of(a)).collect(),
            checkpoints: self.checkpoints.list(),
        }
    }
}

#[derive(Clone, Copy)]
enum Transition {
    Execute,
    Undo,
    Redo,
}

impl Transition {
    fn event(self, action: &dyn ReversibleAction, outcome: &ActionResult) -> HistoryEvent {
        let action_id = action.id().to_string();
        let description = action.description().to_string();
        let success = outcome.is_ok();
        let error = outcome.as_ref().err().map(ToString::to_string);
        match self {
            Transition::Execute => HistoryEvent::ActionExecuted {
                action_id,
                description,
                success,
                error,
            },
            Transition::Undo => HistoryEvent::ActionUndone {
                action_id,
                description,
                success,
                error,
            },
            Transition::Redo => HistoryEvent::ActionRedone {
                action_id,
                description,
                success,
                error,
            },
        }
    }
}

/// State shared between the facade and the tasks it spawns
struct Shared {
    state: Mutex<EngineState>,
    status: RwLock<HistoryStatus>,
    events: EventBus,
}

/// Undo/redo history engine
///
/// One instance per workspace or session. Clones share the same history.
///
/// Operations that run action logic (execute, undo, redo and checkpoint
/// restore) are driven on a spawned task, so they finish and settle the stacks
/// even when the caller stops awaiting them. These operations need a running
/// tokio runtime.
#[derive(Clone)]
pub struct HistoryEngine {
    shared: Arc<Shared>,
}

impl HistoryEngine {
    /// Create an engine with default settings
    pub fn new() -> Self {
        Self::with_config(HistoryConfig::default())
    }

    /// Create an engine from configuration. Sizes are clamped to at least 1.
    pub fn with_config(config: HistoryConfig) -> Self {
        let state = EngineState {
            store: HistoryStore::with_capacity(config.max_history_size),
            checkpoints: CheckpointIndex::with_capacity(config.max_checkpoints),
            batch: BatchRecorder::new(),
            enabled: config.enabled,
        };
        HistoryEngine {
            shared: Arc::new(Shared {
                status: RwLock::new(state.status()),
                state: Mutex::new(state),
                events: EventBus::with_capacity(config.event_channel_capacity),
            }),
        }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.shared.events.subscribe()
    }

    /// Run a critical section on its own task and wait for it
    async fn detached<F, Fut>(
        &self,
        operation: &'static str,
        section: F,
    ) -> Result<(), HistoryError>
    where
        F: FnOnce(Arc<Shared>) -> Fut,
        Fut: Future<Output = Result<(), HistoryError>> + Send + 'static,
    {
        let task = tokio::spawn(section(Arc::clone(&self.shared)));
        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!(operation, error = %e, "History task did not complete");
                Err(HistoryError::interrupted(operation, e.to_string()))
            }
        }
    }

    // ---------------------------------------------------------------------
    // Execute / undo / redo
    // ---------------------------------------------------------------------

    /// Run an action and record it. Returns `false` when it did not run or failed.
    pub async fn execute(&self, action: Box<dyn ReversibleAction>) -> bool {
        self.try_execute(action).await.is_ok()
    }

    /// Run an action and record it into history or the active batch
    pub async fn try_execute(&self, action: Box<dyn ReversibleAction>) -> Result<(), HistoryError> {
        self.detached("execute", move |shared| async move {
            let mut state = shared.state.lock().await;
            let result = shared.execute_locked(&mut state, action).await;
            shared.refresh(&state);
            result
        })
        .await
    }

    /// Reverse the most recent action. Returns `false` when nothing changed.
    pub async fn undo(&self) -> bool {
        self.try_undo().await.is_ok()
    }

    /// Reverse the most recent action and move it to the redo stack
    pub async fn try_undo(&self) -> Result<(), HistoryError> {
        self.detached("undo", |shared| async move {
            let mut state = shared.state.lock().await;
            let result = shared.undo_locked(&mut state).await;
            shared.refresh(&state);
            result
        })
        .await
    }

    /// Re-apply the most recently undone action. Returns `false` when nothing changed.
    pub async fn redo(&self) -> bool {
        self.try_redo().await.is_ok()
    }

    /// Re-apply the most recently undone action and move it to the undo stack
    pub async fn try_redo(&self) -> Result<(), HistoryError> {
        self.detached("redo", |shared| async move {
            let mut state = shared.state.lock().await;
            let result = shared.redo_locked(&mut state).await;
            shared.refresh(&state);
            result
        })
        .await
    }

    // ---------------------------------------------------------------------
    // Batches
    // ---------------------------------------------------------------------

    /// Open a batch. Returns `false` when one is already active.
    pub async fn begin_batch(&self, description: impl Into<String>) -> bool {
        self.try_begin_batch(description).await.is_ok()
    }

    /// Open a batch; actions executed until [`end_batch`](Self::end_batch)
    /// become one history entry
    pub async fn try_begin_batch(
        &self,
        description: impl Into<String>,
    ) -> Result<(), HistoryError> {
        let description = description.into();
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if !state.enabled {
            warn!(description = %description, "Batch rejected: history engine is disabled");
            return Err(HistoryError::Disabled);
        }
        let batch = match state.batch.begin(description) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Nested batch rejected");
                return Err(e);
            }
        };
        info!(batch_id = %batch.id, description = %batch.description, "Batch started");
        shared.events.publish(HistoryEvent::BatchStarted {
            batch_id: batch.id.clone(),
            description: batch.description.clone(),
        });
        shared.refresh(&state);
        Ok(())
    }

    /// Close the active batch. Returns `false` when none is active.
    pub async fn end_batch(&self) -> bool {
        self.try_end_batch().await.is_ok()
    }

    /// Close the active batch and record its actions as one composite entry.
    /// An empty batch leaves history untouched.
    pub async fn try_end_batch(&self) -> Result<(), HistoryError> {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        let finished = match state.batch.finish() {
            Ok(finished) => finished,
            Err(e) => {
                warn!(error = %e, "End batch ignored");
                return Err(e);
            }
        };

        let action_count = match finished.composite {
            None => {
                debug!(batch_id = %finished.id, "Empty batch discarded");
                0
            }
            Some(mut composite) => {
                composite.header_mut().stamp(Utc::now());
                let count = composite.len();
                let trimmed = state.store.record(Box::new(composite));
                shared.report_trimmed(trimmed);
                count
            }
        };
        info!(batch_id = %finished.id, action_count, "Batch ended");
        shared.events.publish(HistoryEvent::BatchEnded {
            batch_id: finished.id,
            description: finished.description,
            action_count,
        });
        shared.refresh(&state);
        Ok(())
    }

    /// Discard the active batch. Returns `false` when none is active.
    ///
    /// Actions already executed inside the batch are not reversed.
    pub async fn cancel_batch(&self) -> bool {
        self.try_cancel_batch().await.is_ok()
    }

    /// Discard the active batch without recording or reversing anything
    pub async fn try_cancel_batch(&self) -> Result<(), HistoryError> {
        let mut state = self.shared.state.lock().await;
        let result = self.shared.cancel_batch_locked(&mut state);
        self.shared.refresh(&state);
        result
    }

    // ---------------------------------------------------------------------
    // Checkpoints
    // ---------------------------------------------------------------------

    /// Mark the current undo depth and return the checkpoint id
    pub async fn create_checkpoint(&self, description: impl Into<String>) -> String {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        let checkpoint = Checkpoint::new(description, state.store.undo_len());
        let id = checkpoint.id.clone();
        info!(
            checkpoint_id = %id,
            depth = checkpoint.undo_depth,
            "Checkpoint created"
        );
        shared.events.publish(HistoryEvent::CheckpointCreated {
            checkpoint_id: id.clone(),
            description: checkpoint.description.clone(),
        });
        state.checkpoints.insert(checkpoint);
        shared.refresh(&state);
        id
    }

    /// Undo back to a checkpoint's depth. Returns `false` if it cannot be
    /// reached or an undo fails on the way.
    pub async fn restore_to_checkpoint(&self, checkpoint_id: &str) -> bool {
        self.try_restore_to_checkpoint(checkpoint_id).await.is_ok()
    }

    /// Undo repeatedly until the undo stack is back at the checkpoint's depth.
    ///
    /// Stops at the first failed undo, leaving the stack partially restored.
    pub async fn try_restore_to_checkpoint(&self, checkpoint_id: &str) -> Result<(), HistoryError> {
        let checkpoint_id = checkpoint_id.to_string();
        self.detached("restore", move |shared| async move {
            let mut state = shared.state.lock().await;
            let result = shared.restore_locked(&mut state, &checkpoint_id).await;
            shared.refresh(&state);
            result
        })
        .await
    }

    /// Remove a checkpoint. Returns `false` when it does not exist.
    pub async fn delete_checkpoint(&self, checkpoint_id: &str) -> bool {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        let removed = state.checkpoints.remove(checkpoint_id).is_some();
        if removed {
            debug!(checkpoint_id = %checkpoint_id, "Checkpoint deleted");
            shared.events.publish(HistoryEvent::CheckpointDeleted {
                checkpoint_id: checkpoint_id.to_string(),
            });
        } else {
            warn!(checkpoint_id = %checkpoint_id, "Delete ignored: unknown checkpoint");
        }
        shared.refresh(&state);
        removed
    }

    /// Remove every checkpoint
    pub async fn clear_checkpoints(&self) {
        let mut state = self.shared.state.lock().await;
        state.checkpoints.clear();
        self.shared.refresh(&state);
    }

    // ---------------------------------------------------------------------
    // Bounds and switches
    // ---------------------------------------------------------------------

    /// Drop both stacks and every checkpoint. An active batch is kept.
    pub async fn clear_history(&self) {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        state.store.clear();
        state.checkpoints.clear();
        info!("History cleared");
        shared.events.publish(HistoryEvent::HistoryCleared);
        shared.refresh(&state);
    }

    /// Change stack capacity (clamped to at least 1), trimming oldest entries
    pub async fn set_max_history_size(&self, max_size: usize) {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        let trimmed = state.store.set_max_size(max_size);
        debug!(max_size = state.store.max_size(), trimmed, "History capacity changed");
        shared.report_trimmed(trimmed);
        shared.refresh(&state);
    }

    /// Enable or disable mutations. Disabling cancels an active batch.
    pub async fn set_enabled(&self, enabled: bool) {
        let shared = &self.shared;
        let mut state = shared.state.lock().await;
        if state.enabled == enabled {
            return;
        }
        state.enabled = enabled;
        if !enabled && state.batch.is_active() {
            // Only fails when no batch is active
            let _ = shared.cancel_batch_locked(&mut state);
        }
        info!(enabled, "History engine toggled");
        shared.events.publish(HistoryEvent::EnabledChanged { enabled });
        shared.refresh(&state);
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    /// Full point-in-time snapshot
    pub fn status(&self) -> HistoryStatus {
        self.shared.status.read().clone()
    }

    /// Whether an undo is available
    pub fn can_undo(&self) -> bool {
        let status = self.shared.status.read();
        status.enabled && !status.undo.is_empty()
    }

    /// Whether a redo is available
    pub fn can_redo(&self) -> bool {
        let status = self.shared.status.read();
        status.enabled && !status.redo.is_empty()
    }

    /// Description of the action the next undo reverses
    pub fn next_undo_description(&self) -> Option<String> {
        self.shared.status.read().undo.first().map(|a| a.description.clone())
    }

    /// Description of the action the next redo re-applies
    pub fn next_redo_description(&self) -> Option<String> {
        self.shared.status.read().redo.first().map(|a| a.description.clone())
    }

    /// Entries held across both stacks
    pub fn history_count(&self) -> usize {
        let status = self.shared.status.read();
        status.undo.len() + status.redo.len()
    }

    /// Number of undoable entries
    pub fn undo_count(&self) -> usize {
        self.shared.status.read().undo.len()
    }

    /// Number of redoable entries
    pub fn redo_count(&self) -> usize {
        self.shared.status.read().redo.len()
    }

    /// Undo entries, most recent first
    pub fn undo_history(&self) -> Vec<ActionSummary> {
        self.shared.status.read().undo.clone()
    }

    /// Redo entries, most recent first
    pub fn redo_history(&self) -> Vec<ActionSummary> {
        self.shared.status.read().redo.clone()
    }

    /// Retained checkpoints, oldest first
    pub fn checkpoints(&self) -> Vec<Checkpoint> {
        self.shared.status.read().checkpoints.clone()
    }

    /// Whether mutations are accepted
    pub fn is_enabled(&self) -> bool {
        self.shared.status.read().enabled
    }

    /// Whether a batch is recording
    pub fn is_batch_active(&self) -> bool {
        self.shared.status.read().batch_active
    }

    /// Capacity of each stack
    pub fn max_history_size(&self) -> usize {
        self.shared.status.read().max_history_size
    }
}

impl Default for HistoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    async fn execute_locked(
        &self,
        state: &mut EngineState,
        mut action: Box<dyn ReversibleAction>,
    ) -> Result<(), HistoryError> {
        if !state.enabled {
            warn!(action_id = %action.id(), "Execute rejected: history engine is disabled");
            return Err(HistoryError::Disabled);
        }

        let outcome = guarded(action.execute()).await;
        self.events.publish(Transition::Execute.event(&*action, &outcome));
        if let Err(e) = outcome {
            error!(
                action_id = %action.id(),
                description = %action.description(),
                error = %e,
                "Action execution failed"
            );
            return Err(e.into());
        }

        action.header_mut().stamp(Utc::now());
        debug!(action_id = %action.id(), "Action executed");

        match state.batch.record(action) {
            Ok(()) => debug!("Action recorded into active batch"),
            Err(action) => {
                let trimmed = state.store.record(action);
                self.report_trimmed(trimmed);
            }
        }
        Ok(())
    }

    async fn undo_locked(&self, state: &mut EngineState) -> Result<(), HistoryError> {
        if !state.enabled {
            warn!("Undo rejected: history engine is disabled");
            return Err(HistoryError::Disabled);
        }
        let action = state
            .store
            .peek_undo_mut()
            .ok_or(HistoryError::NothingToUndo)?;

        if !action.can_undo() {
            warn!(action_id = %action.id(), "Undo rejected: action cannot be undone");
            self.events
                .publish(Transition::Undo.event(&**action, &Err(ActionError::NotUndoable)));
            return Err(HistoryError::not_undoable(action.id()));
        }

        let outcome = guarded(action.undo()).await;
        self.events.publish(Transition::Undo.event(&**action, &outcome));
        if let Err(e) = outcome {
            error!(action_id = %action.id(), error = %e, "Undo failed, action stays in history");
            return Err(e.into());
        }
        debug!(action_id = %action.id(), "Action undone");

        if let Some(action) = state.store.pop_undo() {
            let trimmed = state.store.push_redo(action);
            self.report_trimmed(trimmed);
        }
        Ok(())
    }

    async fn redo_locked(&self, state: &mut EngineState) -> Result<(), HistoryError> {
        if !state.enabled {
            warn!("Redo rejected: history engine is disabled");
            return Err(HistoryError::Disabled);
        }
        let action = state
            .store
            .peek_redo_mut()
            .ok_or(HistoryError::NothingToRedo)?;

        let outcome = guarded(action.execute()).await;
        self.events.publish(Transition::Redo.event(&**action, &outcome));
        if let Err(e) = outcome {
            error!(action_id = %action.id(), error = %e, "Redo failed, action stays in redo stack");
            return Err(e.into());
        }
        action.header_mut().stamp(Utc::now());
        debug!(action_id = %action.id(), "Action redone");

        if let Some(action) = state.store.pop_redo() {
            let trimmed = state.store.push_undo(action);
            self.report_trimmed(trimmed);
        }
        Ok(())
    }

    fn cancel_batch_locked(&self, state: &mut EngineState) -> Result<(), HistoryError> {
        let batch = match state.batch.cancel() {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Cancel batch ignored");
                return Err(e);
            }
        };
        if !batch.is_empty() {
            warn!(
                batch_id = %batch.id,
                discarded = batch.len(),
                "Batch cancelled; applied effects are not reversed"
            );
        } else {
            info!(batch_id = %batch.id, "Batch cancelled");
        }
        self.events.publish(HistoryEvent::BatchCancelled {
            batch_id: batch.id.clone(),
            discarded: batch.len(),
        });
        Ok(())
    }

    async fn restore_locked(
        &self,
        state: &mut EngineState,
        checkpoint_id: &str,
    ) -> Result<(), HistoryError> {
        let Some(checkpoint) = state.checkpoints.get(checkpoint_id).cloned() else {
            warn!(checkpoint_id = %checkpoint_id, "Restore ignored: unknown checkpoint");
            return Err(HistoryError::checkpoint_not_found(checkpoint_id));
        };
        if !state.enabled {
            warn!(checkpoint_id = %checkpoint_id, "Restore rejected: history engine is disabled");
            return Err(HistoryError::Disabled);
        }

        let available = state.store.undo_len();
        if checkpoint.undo_depth > available {
            warn!(
                checkpoint_id = %checkpoint_id,
                depth = checkpoint.undo_depth,
                available,
                "Restore ignored: checkpoint depth no longer reachable"
            );
            return Err(HistoryError::CheckpointUnreachable {
                depth: checkpoint.undo_depth,
                available,
            });
        }

        let mut result = Ok(());
        while state.store.undo_len() > checkpoint.undo_depth {
            if let Err(e) = self.undo_locked(state).await {
                warn!(
                    checkpoint_id = %checkpoint_id,
                    remaining = state.store.undo_len() - checkpoint.undo_depth,
                    error = %e,
                    "Checkpoint restore stopped early"
                );
                result = Err(e);
                break;
            }
        }

        if result.is_ok() {
            info!(
                checkpoint_id = %checkpoint_id,
                depth = checkpoint.undo_depth,
                "Checkpoint restored"
            );
        }
        self.events.publish(HistoryEvent::CheckpointRestored {
            checkpoint_id: checkpoint.id,
            success: result.is_ok(),
        });
        result
    }

    fn refresh(&self, state: &EngineState) {
        *self.status.write() = state.status();
    }

    fn report_trimmed(&self, dropped: usize) {
        if dropped > 0 {
            debug!(dropped, "History trimmed to capacity");
            self.events.publish(HistoryEvent::HistoryTrimmed { dropped });
        }
    }
}
