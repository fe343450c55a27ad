#![warn(missing_docs)]

//! Undo/Redo history engine for reverso
//!
//! Executes opaque reversible actions, reverses and replays them, groups them
//! into atomic batches and rolls back to named checkpoints. The engine knows
//! nothing about what an action does; it manages ordering, grouping and
//! lifecycle only.
//!
//! ```rust
//! use reverso_history::{FnAction, HistoryEngine};
//!
//! # tokio_test::block_on(async {
//! let engine = HistoryEngine::new();
//! assert!(engine.execute(FnAction::new("rename file", || Ok(()), || Ok(())).boxed()).await);
//! assert_eq!(engine.next_undo_description().as_deref(), Some("rename file"));
//!
//! assert!(engine.undo().await);
//! assert!(engine.can_redo());
//! # });
//! ```

pub mod action;
pub mod batch;
pub mod checkpoint;
pub mod composite;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod store;

// Re-export public API
pub use action::{
    ActionError, ActionHeader, ActionPriority, ActionResult, FnAction, ReversibleAction,
};
pub use batch::{BatchContext, BatchRecorder, FinishedBatch};
pub use checkpoint::{Checkpoint, CheckpointIndex};
pub use composite::CompositeAction;
pub use config::HistoryConfig;
pub use engine::{ActionSummary, HistoryEngine, HistoryStatus};
pub use error::{ConfigError, HistoryError};
pub use events::{EventBus, HistoryEvent};
pub use store::HistoryStore;
