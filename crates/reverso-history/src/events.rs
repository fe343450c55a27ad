//! Lifecycle events published by the history engine
//!
//! Events are delivered over a tokio broadcast channel. The engine publishes
//! while it holds its write lock, so every subscriber sees events in the order
//! the operations happened.
//!
//! # Example
//!
//! ```rust
//! use reverso_history::events::{EventBus, HistoryEvent};
//!
//! # tokio_test::block_on(async {
//! let bus = EventBus::new();
//! let mut subscriber = bus.subscribe();
//!
//! bus.publish(HistoryEvent::HistoryCleared);
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event, HistoryEvent::HistoryCleared);
//! # });
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Channel capacity for broadcast events
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Largest channel capacity the bus accepts
pub const MAX_EVENT_CAPACITY: usize = 1 << 16;

/// Notification emitted after each engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    /// An action's forward logic ran through `execute`
    ActionExecuted {
        /// Action identifier
        action_id: String,
        /// Action description
        description: String,
        /// Whether the forward logic succeeded
        success: bool,
        /// Failure message, if any
        error: Option<String>,
    },
    /// An undo was attempted
    ActionUndone {
        /// Action identifier
        action_id: String,
        /// Action description
        description: String,
        /// Whether the inverse logic succeeded
        success: bool,
        /// Failure message, if any
        error: Option<String>,
    },
    /// A redo was attempted
    ActionRedone {
        /// Action identifier
        action_id: String,
        /// Action description
        description: String,
        /// Whether the forward logic succeeded
        success: bool,
        /// Failure message, if any
        error: Option<String>,
    },
    /// Both stacks and all checkpoints were cleared
    HistoryCleared,
    /// Entries were dropped to respect the capacity bound
    HistoryTrimmed {
        /// Number of dropped entries
        dropped: usize,
    },
    /// A checkpoint was created
    CheckpointCreated {
        /// Checkpoint identifier
        checkpoint_id: String,
        /// Checkpoint description
        description: String,
    },
    /// A checkpoint restoration finished
    CheckpointRestored {
        /// Checkpoint identifier
        checkpoint_id: String,
        /// Whether the undo stack reached the checkpoint depth
        success: bool,
    },
    /// A checkpoint was deleted by the caller
    CheckpointDeleted {
        /// Checkpoint identifier
        checkpoint_id: String,
    },
    /// A batch was opened
    BatchStarted {
        /// Batch identifier
        batch_id: String,
        /// Batch description
        description: String,
    },
    /// A batch was closed
    BatchEnded {
        /// Batch identifier
        batch_id: String,
        /// Batch description
        description: String,
        /// Number of actions recorded into the batch
        action_count: usize,
    },
    /// A batch was discarded without touching history
    BatchCancelled {
        /// Batch identifier
        batch_id: String,
        /// Number of discarded (already applied) actions
        discarded: usize,
    },
    /// The engine was enabled or disabled
    EnabledChanged {
        /// New state
        enabled: bool,
    },
}

/// Broadcast channel for [`HistoryEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<HistoryEvent>,
}

impl EventBus {
    /// Create a new event bus with default capacity (1024 events)
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Create a new event bus with custom capacity, clamped to
    /// `1..=MAX_EVENT_CAPACITY`
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { sender }
    }

    /// Publish an event to all subscribers
    ///
    /// Non-blocking. Slow subscribers lose the oldest events.
    pub fn publish(&self, event: HistoryEvent) {
        // No subscribers is fine
        let _ = self.sender.send(event);
    }

    /// Subscribe to events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<HistoryEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
