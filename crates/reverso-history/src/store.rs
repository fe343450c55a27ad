//! Bounded undo/redo stacks

use std::collections::VecDeque;

use tracing::debug;

use crate::action::ReversibleAction;

/// Default capacity of each stack
pub const DEFAULT_MAX_HISTORY_SIZE: usize = 100;

/// Two bounded stacks of executed actions.
///
/// The tail of each deque is the entry undone or redone next. Capacity is
/// enforced after every push by dropping entries from the head.
pub struct HistoryStore {
    undo_stack: VecDeque<Box<dyn ReversibleAction>>,
    redo_stack: VecDeque<Box<dyn ReversibleAction>>,
    max_size: usize,
}

impl HistoryStore {
    /// Create a store with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_HISTORY_SIZE)
    }

    /// Create a store with a custom capacity (clamped to at least 1)
    pub fn with_capacity(max_size: usize) -> Self {
        HistoryStore {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_size: max_size.max(1),
        }
    }

    /// Record a newly executed action. Clears the redo stack.
    ///
    /// Returns the number of entries trimmed from both stacks.
    pub fn record(&mut self, action: Box<dyn ReversibleAction>) -> usize {
        let cleared = self.redo_stack.len();
        self.redo_stack.clear();
        if cleared > 0 {
            debug!(cleared, "Redo stack cleared by new action");
        }
        self.push_undo(action)
    }

    /// Push onto the undo stack without touching the redo stack
    pub fn push_undo(&mut self, action: Box<dyn ReversibleAction>) -> usize {
        self.undo_stack.push_back(action);
        trim(&mut self.undo_stack, self.max_size)
    }

    /// Push onto the redo stack
    pub fn push_redo(&mut self, action: Box<dyn ReversibleAction>) -> usize {
        self.redo_stack.push_back(action);
        trim(&mut self.redo_stack, self.max_size)
    }

    /// Next action to undo
    pub fn peek_undo(&self) -> Option<&dyn ReversibleAction> {
        self.undo_stack.back().map(|a| &**a)
    }

    /// Next action to redo
    pub fn peek_redo(&self) -> Option<&dyn ReversibleAction> {
        self.redo_stack.back().map(|a| &**a)
    }

    /// Mutable access to the next action to undo
    pub fn peek_undo_mut(&mut self) -> Option<&mut Box<dyn ReversibleAction>> {
        self.undo_stack.back_mut()
    }

    /// Mutable access to the next action to redo
    pub fn peek_redo_mut(&mut self) -> Option<&mut Box<dyn ReversibleAction>> {
        self.redo_stack.back_mut()
    }

    /// Remove the next action to undo
    pub fn pop_undo(&mut self) -> Option<Box<dyn ReversibleAction>> {
        self.undo_stack.pop_back()
    }

    /// Remove the next action to redo
    pub fn pop_redo(&mut self) -> Option<Box<dyn ReversibleAction>> {
        self.redo_stack.pop_back()
    }

    /// Change the capacity (clamped to at least 1) and trim both stacks.
    ///
    /// Returns the number of entries trimmed.
    pub fn set_max_size(&mut self, max_size: usize) -> usize {
        self.max_size = max_size.max(1);
        trim(&mut self.undo_stack, self.max_size) + trim(&mut self.redo_stack, self.max_size)
    }

    /// Current capacity of each stack
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Drop every entry from both stacks
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
    }

    /// Number of undoable entries
    pub fn undo_len(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redoable entries
    pub fn redo_len(&self) -> usize {
        self.redo_stack.len()
    }

    /// Undo entries, most recent first
    pub fn undo_iter(&self) -> impl Iterator<Item = &(dyn ReversibleAction + 'static)> {
        self.undo_stack.iter().rev().map(|a| &**a)
    }

    /// Redo entries, most recent first
    pub fn redo_iter(&self) -> impl Iterator<Item = &(dyn ReversibleAction + 'static)> {
        self.redo_stack.iter().rev().map(|a| &**a)
    }
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop the oldest entries until the stack fits. Trimmed actions are never undone.
fn trim(stack: &mut VecDeque<Box<dyn ReversibleAction>>, max_size: usize) -> usize {
    let excess = stack.len().saturating_sub(max_size);
    for dropped in stack.drain(..excess) {
        debug!(action_id = %dropped.id(), "Trimmed action from history");
    }
    excess
}
