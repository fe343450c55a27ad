//! Reversible actions: the unit of work the engine orders and replays

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Outcome of running an action's forward or inverse logic
pub type ActionResult = Result<(), ActionError>;

/// Failure reported by an action's own logic
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// Forward or inverse logic reported failure
    #[error("Action failed: {0}")]
    Failed(String),

    /// Forward or inverse logic panicked
    #[error("Action panicked: {0}")]
    Panicked(String),

    /// The action does not support undo
    #[error("Action cannot be undone")]
    NotUndoable,

    /// A child of a composite action failed
    #[error("Batch step {index} failed: {source}{}", rollback_note(.rollback_failures))]
    Batch {
        /// Position of the failing child
        index: usize,
        /// Failure reported by the child
        source: Box<ActionError>,
        /// Failures raised while rolling back earlier children
        rollback_failures: Vec<ActionError>,
    },
}

impl ActionError {
    /// Create a new Failed error with context
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

fn rollback_note(failures: &[ActionError]) -> String {
    match failures.len() {
        0 => String::new(),
        n => format!("; {} rollback step(s) failed", n),
    }
}

/// Ordinal hint carried by every action. Informational only.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ActionPriority {
    /// Low priority
    Low,
    /// Normal priority
    #[default]
    Normal,
    /// High priority
    High,
    /// Critical priority
    Critical,
}

impl fmt::Display for ActionPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionPriority::Low => write!(f, "Low"),
            ActionPriority::Normal => write!(f, "Normal"),
            ActionPriority::High => write!(f, "High"),
            ActionPriority::Critical => write!(f, "Critical"),
        }
    }
}

/// Identity and metadata shared by every action.
///
/// The id is assigned at creation and has no setter. The timestamp is written
/// by the engine only, after a successful forward run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionHeader {
    id: String,
    description: String,
    category: String,
    priority: ActionPriority,
    can_undo: bool,
    timestamp: Option<DateTime<Utc>>,
    metadata: HashMap<String, Value>,
}

impl ActionHeader {
    /// Create a new header with a fresh UUID
    pub fn new(description: impl Into<String>) -> Self {
        ActionHeader {
            id: Uuid::new_v4().to_string(),
            description: description.into(),
            category: "general".to_string(),
            priority: ActionPriority::Normal,
            can_undo: true,
            timestamp: None,
            metadata: HashMap::new(),
        }
    }

    pub(crate) fn with_id(id: String, description: impl Into<String>) -> Self {
        ActionHeader {
            id,
            ..Self::new(description)
        }
    }

    /// Set the grouping category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Set the priority hint
    pub fn with_priority(mut self, priority: ActionPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Set whether the action supports undo
    pub fn with_can_undo(mut self, can_undo: bool) -> Self {
        self.can_undo = can_undo;
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Unique identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable label
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Grouping label
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Priority hint
    pub fn priority(&self) -> ActionPriority {
        self.priority
    }

    /// Whether the action supports undo
    pub fn can_undo(&self) -> bool {
        self.can_undo
    }

    /// When the action last completed its forward logic
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// Opaque key/value bag owned by the action
    pub fn metadata(&self) -> &HashMap<String, Value> {
        &self.metadata
    }

    /// Mutable access to the metadata bag
    pub fn metadata_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.metadata
    }

    pub(crate) fn stamp(&mut self, at: DateTime<Utc>) {
        self.timestamp = Some(at);
    }
}

/// A unit of work with forward and inverse logic.
///
/// Implementors report failure through [`ActionError`]; the engine never
/// inspects category, priority or metadata beyond storing and reporting them.
#[async_trait]
pub trait ReversibleAction: Send + Sync {
    /// Identity and metadata
    fn header(&self) -> &ActionHeader;

    /// Mutable identity and metadata
    fn header_mut(&mut self) -> &mut ActionHeader;

    /// Apply the action
    async fn execute(&mut self) -> ActionResult;

    /// Reverse the action
    async fn undo(&mut self) -> ActionResult;

    /// Unique identifier
    fn id(&self) -> &str {
        self.header().id()
    }

    /// Human-readable label
    fn description(&self) -> &str {
        self.header().description()
    }

    /// Grouping label
    fn category(&self) -> &str {
        self.header().category()
    }

    /// Priority hint
    fn priority(&self) -> ActionPriority {
        self.header().priority()
    }

    /// Whether undo is supported
    fn can_undo(&self) -> bool {
        self.header().can_undo()
    }

    /// When the action last completed its forward logic
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.header().timestamp()
    }

    /// Opaque metadata bag
    fn metadata(&self) -> &HashMap<String, Value> {
        self.header().metadata()
    }
}

impl fmt::Debug for dyn ReversibleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReversibleAction")
            .field("id", &self.id())
            .field("description", &self.description())
            .field("can_undo", &self.can_undo())
            .finish()
    }
}

type Step = Box<dyn FnMut() -> ActionResult + Send + Sync>;

/// Action backed by a pair of synchronous closures
pub struct FnAction {
    header: ActionHeader,
    forward: Step,
    inverse: Step,
}

impl FnAction {
    /// Create an action from forward and inverse closures
    pub fn new<F, I>(description: impl Into<String>, forward: F, inverse: I) -> Self
    where
        F: FnMut() -> ActionResult + Send + Sync + 'static,
        I: FnMut() -> ActionResult + Send + Sync + 'static,
    {
        FnAction {
            header: ActionHeader::new(description),
            forward: Box::new(forward),
            inverse: Box::new(inverse),
        }
    }

    /// Create an action that can be executed but never undone
    pub fn irreversible<F>(description: impl Into<String>, forward: F) -> Self
    where
        F: FnMut() -> ActionResult + Send + Sync + 'static,
    {
        FnAction {
            header: ActionHeader::new(description).with_can_undo(false),
            forward: Box::new(forward),
            inverse: Box::new(|| Err(ActionError::NotUndoable)),
        }
    }

    /// Set the grouping category
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.header = self.header.with_category(category);
        self
    }

    /// Set the priority hint
    pub fn with_priority(mut self, priority: ActionPriority) -> Self {
        self.header = self.header.with_priority(priority);
        self
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.header = self.header.with_metadata(key, value);
        self
    }

    /// Box the action for handing to the engine
    pub fn boxed(self) -> Box<dyn ReversibleAction> {
        Box::new(self)
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ReversibleAction for FnAction {
    fn header(&self) -> &ActionHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ActionHeader {
        &mut self.header
    }

    async fn execute(&mut self) -> ActionResult {
        (self.forward)()
    }

    async fn undo(&mut self) -> ActionResult {
        (self.inverse)()
    }
}

/// Run action logic, turning a panic into [`ActionError::Panicked`]
pub(crate) async fn guarded<F>(operation: F) -> ActionResult
where
    F: Future<Output = ActionResult>,
{
    match AssertUnwindSafe(operation).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(ActionError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
