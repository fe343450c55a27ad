//! Integration tests for end-to-end engine workflows

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reverso_history::{
    ActionError, ActionHeader, ActionResult, CompositeAction, FnAction, HistoryConfig,
    HistoryEngine, HistoryError, HistoryEvent, ReversibleAction,
};

type Log = Arc<Mutex<Vec<String>>>;

/// Records every forward and inverse call so tests can assert ordering
fn tracked(log: &Log, name: &str) -> Box<dyn ReversibleAction> {
    let fwd = Arc::clone(log);
    let inv = Arc::clone(log);
    let (fwd_name, inv_name) = (name.to_string(), name.to_string());
    FnAction::new(
        name,
        move || {
            fwd.lock().unwrap().push(format!("do {}", fwd_name));
            Ok(())
        },
        move || {
            inv.lock().unwrap().push(format!("undo {}", inv_name));
            Ok(())
        },
    )
    .boxed()
}

fn failing(name: &str) -> Box<dyn ReversibleAction> {
    let msg = format!("{} failed", name);
    FnAction::new(name, move || Err(ActionError::failed(msg.clone())), || Ok(())).boxed()
}

fn drain(log: &Log) -> Vec<String> {
    std::mem::take(&mut *log.lock().unwrap())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Forward and inverse logic each run two steps with a pause in between
struct TwoStep {
    header: ActionHeader,
    log: Log,
    pause: Duration,
}

impl TwoStep {
    fn new(log: &Log, pause: Duration) -> Box<dyn ReversibleAction> {
        Box::new(TwoStep {
            header: ActionHeader::new("two step"),
            log: Arc::clone(log),
            pause,
        })
    }

    async fn steps(&self, verb: &str) {
        self.log.lock().unwrap().push(format!("{} step1", verb));
        tokio::time::sleep(self.pause).await;
        self.log.lock().unwrap().push(format!("{} step2", verb));
    }
}

#[async_trait]
impl ReversibleAction for TwoStep {
    fn header(&self) -> &ActionHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ActionHeader {
        &mut self.header
    }

    async fn execute(&mut self) -> ActionResult {
        self.steps("exec").await;
        Ok(())
    }

    async fn undo(&mut self) -> ActionResult {
        self.steps("undo").await;
        Ok(())
    }
}

/// Async action over a shared text buffer that captures the previous value on execute
struct SetText {
    header: ActionHeader,
    buffer: Arc<tokio::sync::Mutex<String>>,
    next: String,
    previous: Option<String>,
}

impl SetText {
    fn new(buffer: &Arc<tokio::sync::Mutex<String>>, next: &str) -> Box<dyn ReversibleAction> {
        Box::new(SetText {
            header: ActionHeader::new(format!("set text to {}", next)).with_category("editor"),
            buffer: Arc::clone(buffer),
            next: next.to_string(),
            previous: None,
        })
    }
}

#[async_trait]
impl ReversibleAction for SetText {
    fn header(&self) -> &ActionHeader {
        &self.header
    }

    fn header_mut(&mut self) -> &mut ActionHeader {
        &mut self.header
    }

    async fn execute(&mut self) -> ActionResult {
        tokio::time::sleep(Duration::from_millis(1)).await;
        let mut buffer = self.buffer.lock().await;
        self.previous = Some(std::mem::replace(&mut *buffer, self.next.clone()));
        Ok(())
    }

    async fn undo(&mut self) -> ActionResult {
        let previous = self
            .previous
            .take()
            .ok_or_else(|| ActionError::failed("nothing captured"))?;
        *self.buffer.lock().await = previous;
        Ok(())
    }
}

/// Literal scenario: execute, undo, then a new execute clears redo
#[tokio::test]
async fn test_rename_then_move_scenario() {
    init_tracing();
    let engine = HistoryEngine::with_config(HistoryConfig {
        max_history_size: 10,
        ..HistoryConfig::default()
    });

    let rename = FnAction::new("rename file", || Ok(()), || Ok(()));
    assert!(engine.execute(rename.boxed()).await);
    assert_eq!(engine.history_count(), 1);
    assert!(engine.can_undo());
    assert!(!engine.can_redo());
    assert_eq!(engine.next_undo_description().as_deref(), Some("rename file"));

    assert!(engine.undo().await);
    assert_eq!(engine.history_count(), 1);
    assert!(!engine.can_undo());
    assert!(engine.can_redo());

    let moved = FnAction::new("move file", || Ok(()), || Ok(()));
    assert!(engine.execute(moved.boxed()).await);
    assert_eq!(engine.history_count(), 1);
    assert!(!engine.can_redo());
    assert_eq!(engine.next_undo_description().as_deref(), Some("move file"));
}

/// Batched actions undo as one unit, in reverse order
#[tokio::test]
async fn test_batch_atomicity() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();

    assert!(engine.begin_batch("refactor").await);
    for name in ["A", "B", "C"] {
        assert!(engine.execute(tracked(&log, name)).await);
    }
    assert!(engine.end_batch().await);
    assert_eq!(engine.history_count(), 1);
    assert_eq!(drain(&log), vec!["do A", "do B", "do C"]);

    assert!(engine.undo().await);
    assert_eq!(drain(&log), vec!["undo C", "undo B", "undo A"]);
    assert_eq!(engine.undo_count(), 0);
    assert_eq!(engine.redo_count(), 1);

    assert!(engine.redo().await);
    assert_eq!(drain(&log), vec!["do A", "do B", "do C"]);
    assert_eq!(engine.undo_count(), 1);
}

/// A composite whose middle step fails rolls back and leaves history untouched
#[tokio::test]
async fn test_partial_composite_rollback() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    let composite =
        CompositeAction::new("group", vec![tracked(&log, "A"), failing("B"), tracked(&log, "C")]);

    let err = engine.try_execute(Box::new(composite)).await.unwrap_err();
    assert!(matches!(
        err,
        HistoryError::Action(ActionError::Batch { index: 1, .. })
    ));
    assert_eq!(drain(&log), vec!["do A", "undo A"]);
    assert_eq!(engine.history_count(), 0);
}

/// Restoring a checkpoint undoes newer actions, newest first
#[tokio::test]
async fn test_checkpoint_restore_order() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();

    engine.execute(tracked(&log, "A")).await;
    engine.execute(tracked(&log, "B")).await;
    let checkpoint = engine.create_checkpoint("after B").await;
    engine.execute(tracked(&log, "C")).await;
    engine.execute(tracked(&log, "D")).await;
    drain(&log);

    assert!(engine.restore_to_checkpoint(&checkpoint).await);
    assert_eq!(engine.undo_count(), 2);
    assert_eq!(drain(&log), vec!["undo D", "undo C"]);
    assert_eq!(engine.checkpoints()[0].undo_depth, 2);
}

/// A failing undo stops restoration part way
#[tokio::test]
async fn test_checkpoint_restore_stops_on_failure() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();

    engine.execute(tracked(&log, "A")).await;
    let checkpoint = engine.create_checkpoint("after A").await;
    engine
        .execute(FnAction::new("stuck", || Ok(()), || Err(ActionError::failed("locked"))).boxed())
        .await;
    engine.execute(tracked(&log, "C")).await;
    drain(&log);

    assert!(!engine.restore_to_checkpoint(&checkpoint).await);
    assert_eq!(drain(&log), vec!["undo C"]);
    assert_eq!(engine.undo_count(), 2);
    assert_eq!(engine.next_undo_description().as_deref(), Some("stuck"));
}

/// Trimmed actions are unreachable for undo
#[tokio::test]
async fn test_capacity_trimming() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    engine.set_max_history_size(2).await;

    for name in ["A", "B", "C"] {
        engine.execute(tracked(&log, name)).await;
    }
    assert_eq!(engine.history_count(), 2);
    drain(&log);

    while engine.undo().await {}
    assert_eq!(drain(&log), vec!["undo C", "undo B"]);
}

/// A disabled engine changes nothing
#[tokio::test]
async fn test_disabled_engine_is_inert() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    engine.execute(tracked(&log, "A")).await;
    engine.execute(tracked(&log, "B")).await;
    engine.undo().await;
    drain(&log);
    let before = engine.status();

    engine.set_enabled(false).await;
    assert!(!engine.execute(tracked(&log, "C")).await);
    assert!(!engine.undo().await);
    assert!(!engine.redo().await);
    assert!(drain(&log).is_empty());

    let after = engine.status();
    assert_eq!(after.undo, before.undo);
    assert_eq!(after.redo, before.redo);

    engine.set_enabled(true).await;
    assert!(engine.redo().await);
}

/// Cancelling a batch drops bookkeeping only; effects already applied stay applied
/// and can no longer be undone through history.
#[tokio::test]
async fn test_cancel_batch_leaves_effects_unreversed() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();

    engine.begin_batch("draft").await;
    engine.execute(tracked(&log, "A")).await;
    engine.execute(tracked(&log, "B")).await;
    assert!(engine.cancel_batch().await);

    assert_eq!(drain(&log), vec!["do A", "do B"]);
    assert_eq!(engine.history_count(), 0);
    assert!(!engine.undo().await);
    assert!(drain(&log).is_empty());
}

/// An empty batch adds nothing and does not clear redo
#[tokio::test]
async fn test_empty_batch_is_discarded() {
    let engine = HistoryEngine::new();
    engine
        .execute(FnAction::new("a", || Ok(()), || Ok(())).boxed())
        .await;
    engine.undo().await;

    engine.begin_batch("nothing").await;
    assert!(engine.end_batch().await);
    assert_eq!(engine.undo_count(), 0);
    assert_eq!(engine.redo_count(), 1);
}

/// Async actions are awaited before stacks change
#[tokio::test]
async fn test_async_actions_round_trip() {
    let buffer = Arc::new(tokio::sync::Mutex::new("draft".to_string()));
    let engine = HistoryEngine::new();

    engine.execute(SetText::new(&buffer, "first")).await;
    engine.execute(SetText::new(&buffer, "second")).await;
    assert_eq!(*buffer.lock().await, "second");
    assert_eq!(engine.undo_history()[0].category, "editor");

    engine.undo().await;
    assert_eq!(*buffer.lock().await, "first");
    engine.undo().await;
    assert_eq!(*buffer.lock().await, "draft");
    engine.redo().await;
    engine.redo().await;
    assert_eq!(*buffer.lock().await, "second");
}

/// Concurrent callers are serialized; every execute lands exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_execute_is_serialized() {
    let buffer = Arc::new(tokio::sync::Mutex::new(String::new()));
    let engine = Arc::new(HistoryEngine::new());

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = Arc::clone(&engine);
        let buffer = Arc::clone(&buffer);
        handles.push(tokio::spawn(async move {
            engine.execute(SetText::new(&buffer, &i.to_string())).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }
    assert_eq!(engine.undo_count(), 16);

    while engine.undo().await {}
    assert_eq!(*buffer.lock().await, "");
}

/// Batch and checkpoint lifecycle events arrive in operation order
#[tokio::test]
async fn test_lifecycle_events() {
    let engine = HistoryEngine::new();
    let mut events = engine.subscribe();

    engine.begin_batch("group").await;
    engine
        .execute(FnAction::new("a", || Ok(()), || Ok(())).boxed())
        .await;
    engine.end_batch().await;
    let checkpoint = engine.create_checkpoint("cp").await;
    engine.restore_to_checkpoint(&checkpoint).await;
    engine.clear_history().await;

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(match event {
            HistoryEvent::BatchStarted { .. } => "batch_started",
            HistoryEvent::ActionExecuted { success: true, .. } => "executed",
            HistoryEvent::BatchEnded { action_count: 1, .. } => "batch_ended",
            HistoryEvent::CheckpointCreated { .. } => "checkpoint_created",
            HistoryEvent::CheckpointRestored { success: true, .. } => "checkpoint_restored",
            HistoryEvent::HistoryCleared => "cleared",
            other => panic!("unexpected event: {other:?}"),
        });
    }
    assert_eq!(
        kinds,
        vec![
            "batch_started",
            "executed",
            "batch_ended",
            "checkpoint_created",
            "checkpoint_restored",
            "cleared",
        ]
    );
}

/// Failures are reported through events with the error message
#[tokio::test]
async fn test_failure_events_carry_error() {
    let engine = HistoryEngine::new();
    let mut events = engine.subscribe();

    engine.execute(failing("broken")).await;
    match events.recv().await.unwrap() {
        HistoryEvent::ActionExecuted {
            description,
            success,
            error,
            ..
        } => {
            assert_eq!(description, "broken");
            assert!(!success);
            assert_eq!(error.as_deref(), Some("Action failed: broken failed"));
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

/// A composite whose rollback also fails reports both through the event stream
#[tokio::test]
async fn test_rollback_failure_is_reported_in_event() {
    let engine = HistoryEngine::new();
    let mut events = engine.subscribe();
    let stubborn = FnAction::new("stubborn", || Ok(()), || Err(ActionError::failed("locked")));
    let composite = CompositeAction::new("group", vec![stubborn.boxed(), failing("B")]);

    assert!(!engine.execute(Box::new(composite)).await);
    assert_eq!(engine.history_count(), 0);
    match events.recv().await.unwrap() {
        HistoryEvent::ActionExecuted { success, error, .. } => {
            assert!(!success);
            assert_eq!(
                error.as_deref(),
                Some("Batch step 1 failed: Action failed: B failed; 1 rollback step(s) failed")
            );
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

/// Undoing a batch entry stops at a child whose inverse fails; the entry stays undoable
#[tokio::test]
async fn test_batch_undo_stops_at_failing_child() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    let inv_log = Arc::clone(&log);
    let stuck = FnAction::new("B", || Ok(()), move || {
        inv_log.lock().unwrap().push("undo B refused".to_string());
        Err(ActionError::failed("locked"))
    });

    assert!(engine.begin_batch("edit").await);
    assert!(engine.execute(tracked(&log, "A")).await);
    assert!(engine.execute(stuck.boxed()).await);
    assert!(engine.execute(tracked(&log, "C")).await);
    assert!(engine.end_batch().await);
    drain(&log);

    let err = engine.try_undo().await.unwrap_err();
    assert!(matches!(err, HistoryError::Action(ActionError::Failed(_))));
    assert_eq!(drain(&log), vec!["undo C", "undo B refused"]);
    assert_eq!(engine.undo_count(), 1);
    assert_eq!(engine.redo_count(), 0);
    assert_eq!(engine.next_undo_description().as_deref(), Some("edit"));
}

/// An execute whose caller stops waiting still completes and lands in history
#[tokio::test]
async fn test_abandoned_execute_still_settles() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    let mut events = engine.subscribe();

    let waited = tokio::time::timeout(
        Duration::from_millis(10),
        engine.execute(TwoStep::new(&log, Duration::from_millis(50))),
    )
    .await;
    assert!(waited.is_err());

    match events.recv().await.unwrap() {
        HistoryEvent::ActionExecuted { success, .. } => assert!(success),
        other => panic!("unexpected event: {other:?}"),
    }
    // Waits for the lock held by the running operation
    engine.create_checkpoint("settled").await;
    assert_eq!(drain(&log), vec!["exec step1", "exec step2"]);
    assert_eq!(engine.undo_count(), 1);
}

/// An undo whose caller stops waiting still completes and moves the action to redo
#[tokio::test]
async fn test_abandoned_undo_still_settles() {
    let log: Log = Arc::default();
    let engine = HistoryEngine::new();
    assert!(engine.execute(TwoStep::new(&log, Duration::from_millis(50))).await);
    drain(&log);
    let mut events = engine.subscribe();

    let waited = tokio::time::timeout(Duration::from_millis(10), engine.undo()).await;
    assert!(waited.is_err());

    match events.recv().await.unwrap() {
        HistoryEvent::ActionUndone { success, .. } => assert!(success),
        other => panic!("unexpected event: {other:?}"),
    }
    engine.create_checkpoint("settled").await;
    assert_eq!(drain(&log), vec!["undo step1", "undo step2"]);
    assert_eq!(engine.undo_count(), 0);
    assert_eq!(engine.redo_count(), 1);
}
