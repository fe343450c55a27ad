//! Composite actions: ordered groups that execute and undo as one unit

use async_trait::async_trait;
use tracing::{debug, error, warn};

use crate::action::{guarded, ActionError, ActionHeader, ActionResult, ReversibleAction};

/// An ordered group of actions applied as a single history entry.
///
/// Execute runs children in order and rolls back already-applied children in
/// reverse order when one fails. Undo runs inverses in reverse order and stops
/// at the first failure.
pub struct CompositeAction {
    header: ActionHeader,
    children: Vec<Box<dyn ReversibleAction>>,
}

impl CompositeAction {
    /// Create a composite from children in execution order
    pub fn new(description: impl Into<String>, children: Vec<Box<dyn ReversibleAction>>) -> Self {
        CompositeAction {
            header: ActionHeader::new(description).with_category("batch"),
            children,
        }
    }

    /// Create a composite around an existing header
    pub fn with_header(header: ActionHeader, children: Vec<Box<dyn ReversibleAction>>) -> Self {
        CompositeAction { header, children }
    }

    /// Number of child actions
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the composite has no children
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Children in execution order
    pub fn children(&self) -> &[Box<dyn ReversibleAction>] {
        &self.children
    }

    /// Undo children `[0, applied)` in reverse order, best effort.
    ///
    /// Every child is attempted even when an earlier rollback fails.
    async fn roll_back(&mut self, applied: usize) -> Vec<ActionError> {
        let mut failures = Vec::new();
        for child in self.children[..applied].iter_mut().rev() {
            debug!(child_id = %child.id(), "Rolling back batch step");
            let outcome = guarded(child.undo()).await;
            if let Err(e) = outcome {
                error!(
                    child_id = %child.id(),
                    error = %e,
                    "Batch rollback step failed"
                );
                failures.push(e);
            }
        }
        failures
    }
}

#[async_trait]
impl ReversibleAction for CompositeAction {
    fn header(&self) -> &ActionHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ActionHeader {
        &mut self.header
    }

    async fn execute(&mut self) -> ActionResult {
        for index in 0..self.children.len() {
            let outcome = guarded(self.children[index].execute()).await;
            if let Err(source) = outcome {
                warn!(
                    batch_id = %self.header.id(),
                    index,
                    error = %source,
                    "Batch step failed, rolling back"
                );
                let rollback_failures = self.roll_back(index).await;
                return Err(ActionError::Batch {
                    index,
                    source: Box::new(source),
                    rollback_failures,
                });
            }
        }
        Ok(())
    }

    async fn undo(&mut self) -> ActionResult {
        for child in self.children.iter_mut().rev() {
            let outcome = guarded(child.undo()).await;
            if let Err(e) = outcome {
                error!(child_id = %child.id(), error = %e, "Batch undo step failed");
                return Err(e);
            }
        }
        Ok(())
    }

    fn can_undo(&self) -> bool {
        self.children.iter().all(|child| child.can_undo())
    }
}
