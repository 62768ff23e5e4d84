//! End-to-end engine tests.

use super::*;
use crate::events::CollectingTraceSink;
use crate::participant::{Capabilities, FnParticipant, Participant, PrepareResult};
use crate::queue::work_queue;
use crate::registry::GroupTableBuilder;
use crate::store::MemoryRecoveryStore;
use crate::testing::{CallRecorder, FailingStore, ScriptedParticipant};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicBool, Ordering};

fn fast_config() -> EngineConfig {
    EngineConfig::new()
        .with_retry(RetryPolicy::new().with_max_retries(3).with_delay_ms(1).without_jitter())
        .with_store_retry_delay_ms(1)
}

#[tokio::test]
async fn test_plain_chain_prepares_in_order_then_commits_joined() {
    crate::testing::init_test_logging();
    let recorder = CallRecorder::new();
    let a = Arc::new(ScriptedParticipant::new("a").with_recorder(recorder.clone()));
    let b = Arc::new(ScriptedParticipant::new("b").with_recorder(recorder.clone()));
    let c = Arc::new(ScriptedParticipant::new("c").with_recorder(recorder.clone()));

    let table = GroupTableBuilder::new()
        .participant(a.clone())
        .participant(b.clone())
        .participant(c.clone())
        .build()
        .unwrap();

    let store = Arc::new(MemoryRecoveryStore::new());
    let engine = TxEngine::new(fast_config(), table, store.clone());

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Committed);

    assert_eq!(
        recorder.calls(),
        vec![
            "a.prepare", "b.prepare", "c.prepare",
            "a.commit", "b.commit", "c.commit",
        ]
    );
    assert_eq!(a.prepare_count(), 1);
    assert_eq!(b.prepare_count(), 1);
    assert_eq!(c.prepare_count(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_no_join_example_abort_reaches_joined_only() {
    // chain = [A(NO_JOIN,PREPARED,READONLY), B(PREPARED), C(ABORTED)]
    let recorder = CallRecorder::new();
    let a = Arc::new(
        ScriptedParticipant::new("a")
            .with_result(PrepareResult::prepared().no_join().readonly())
            .with_recorder(recorder.clone()),
    );
    let b = Arc::new(ScriptedParticipant::new("b").with_recorder(recorder.clone()));
    let c = Arc::new(
        ScriptedParticipant::new("c")
            .with_result(PrepareResult::aborted())
            .with_recorder(recorder.clone()),
    );

    let table = GroupTableBuilder::new()
        .participant(a.clone())
        .participant(b.clone())
        .participant(c.clone())
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Aborted);

    assert_eq!(
        recorder.calls(),
        vec!["a.prepare", "b.prepare", "c.prepare", "b.abort"]
    );
    assert_eq!(a.prepare_count(), 1);
    assert_eq!(a.abort_count(), 0);
    assert_eq!(b.abort_count(), 1);
    assert_eq!(c.abort_count(), 0);
}

#[tokio::test]
async fn test_readonly_chain_writes_only_the_admission_snapshot() {
    let readonly = PrepareResult::prepared().readonly();
    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a").with_result(readonly)))
        .participant(Arc::new(ScriptedParticipant::new("b").with_result(readonly)))
        .participant(Arc::new(ScriptedParticipant::new("c").with_result(readonly)))
        .build()
        .unwrap();

    let store = Arc::new(MemoryRecoveryStore::new());
    let engine = TxEngine::new(fast_config(), table, store.clone());

    engine.execute(Context::new()).await.unwrap();

    assert_eq!(store.put_count(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_mutating_participants_refresh_the_snapshot() {
    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a")))
        .participant(Arc::new(ScriptedParticipant::new("b")))
        .build()
        .unwrap();

    let store = Arc::new(MemoryRecoveryStore::new());
    let engine = TxEngine::new(fast_config(), table, store.clone());

    engine.execute(Context::new()).await.unwrap();

    // Admission write plus one refresh per non-readonly participant.
    assert_eq!(store.put_count(), 3);
}

#[tokio::test]
async fn test_pause_then_resume_continues_at_next_participant() {
    let recorder = CallRecorder::new();
    let a = Arc::new(ScriptedParticipant::new("a").with_recorder(recorder.clone()));

    // Pauses on its first prepare, stashing a resumable copy of the
    // context the way an external collaborator would.
    let stash: Arc<parking_lot::Mutex<Option<Context>>> = Arc::new(parking_lot::Mutex::new(None));
    let paused_once = Arc::new(AtomicBool::new(false));
    let pauser = {
        let stash = stash.clone();
        let paused_once = paused_once.clone();
        Arc::new(FnParticipant::new("pauser", move |_id, ctx: &Context| {
            if paused_once.swap(true, Ordering::SeqCst) {
                PrepareResult::prepared()
            } else {
                *stash.lock() = Some(ctx.clone());
                PrepareResult::prepared().pause()
            }
        }))
    };

    let c = Arc::new(ScriptedParticipant::new("c").with_recorder(recorder.clone()));

    let table = GroupTableBuilder::new()
        .participant(a.clone())
        .participant(pauser)
        .participant(c.clone())
        .build()
        .unwrap();

    let store = Arc::new(MemoryRecoveryStore::new());
    let engine = TxEngine::new(fast_config(), table, store.clone());

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Paused);

    let resumable = stash.lock().take().unwrap();
    let id = resumable.id().unwrap();
    assert!(engine.is_paused(id));
    assert_eq!(engine.paused_count(), 1);
    // The snapshot stays durable while suspended.
    assert!(store.contains(id));
    assert_eq!(c.prepare_count(), 0);

    let outcome = engine.execute(resumable).await.unwrap();
    assert_eq!(outcome, TxOutcome::Committed);

    assert!(!engine.is_paused(id));
    // a ran once, before the pause; the walk resumed at c.
    assert_eq!(a.prepare_count(), 1);
    assert_eq!(c.prepare_count(), 1);
    assert_eq!(a.commit_count(), 1);
    assert_eq!(c.commit_count(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_retry_bound_converts_to_abort() {
    let retrying = Arc::new(
        ScriptedParticipant::new("stuck").with_result(PrepareResult::retry()),
    );
    let table = GroupTableBuilder::new()
        .participant(retrying.clone())
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Aborted);

    // Initial call plus max_retries re-invocations.
    assert_eq!(retrying.prepare_count(), 4);
    assert_eq!(retrying.abort_count(), 0);
}

#[tokio::test]
async fn test_group_selection_splices_remaining_chain() {
    let recorder = CallRecorder::new();
    let selector = Arc::new(
        ScriptedParticipant::new("g")
            .selecting_group("fast-path")
            .with_recorder(recorder.clone()),
    );
    let skipped = Arc::new(ScriptedParticipant::new("skipped").with_recorder(recorder.clone()));
    let f1 = Arc::new(ScriptedParticipant::new("f1").with_recorder(recorder.clone()));
    let f2 = Arc::new(ScriptedParticipant::new("f2").with_recorder(recorder.clone()));

    let table = GroupTableBuilder::new()
        .participant(selector.clone())
        .participant(skipped.clone())
        .group(
            "fast-path",
            vec![f1.clone() as Arc<dyn Participant>, f2.clone()],
        )
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Committed);

    // The not-yet-executed suffix was replaced by the named group.
    assert_eq!(skipped.prepare_count(), 0);
    assert_eq!(
        recorder.calls(),
        vec![
            "g.prepare", "g.select_group",
            "f1.prepare", "f2.prepare",
            "g.commit", "f1.commit", "f2.commit",
        ]
    );
}

#[tokio::test]
async fn test_unknown_group_aborts_transaction() {
    let selector = Arc::new(ScriptedParticipant::new("g").selecting_group("no-such-group"));
    let table = GroupTableBuilder::new()
        .participant(selector.clone())
        .build()
        .unwrap();

    let sink = Arc::new(CollectingTraceSink::new());
    let engine = TxEngine::new(
        fast_config(),
        table,
        Arc::new(MemoryRecoveryStore::new()),
    )
    .with_sink(sink.clone());

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Aborted);
    assert_eq!(sink.count_of("tx.unknown_group"), 1);

    // The selector had already joined before the bad selection.
    assert_eq!(selector.abort_count(), 1);
}

#[tokio::test]
async fn test_abort_walk_skips_non_capable_and_drives_capable() {
    let aborter = Arc::new(
        ScriptedParticipant::new("aborter").with_result(PrepareResult::aborted()),
    );
    let plain = Arc::new(ScriptedParticipant::new("plain"));
    let cleaner = Arc::new(
        ScriptedParticipant::new("cleaner")
            .with_capabilities(Capabilities::ABORT_PREPARE),
    );

    let table = GroupTableBuilder::new()
        .participant(aborter.clone())
        .participant(plain.clone())
        .participant(cleaner.clone())
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Aborted);

    // The aborting vote never joins; the plain participant is skipped
    // entirely; the abort-capable one is driven through its abort-path
    // prepare and then its abort handler.
    assert_eq!(aborter.abort_count(), 0);
    assert_eq!(plain.prepare_count(), 0);
    assert_eq!(plain.abort_count(), 0);
    assert_eq!(cleaner.prepare_count(), 0);
    assert_eq!(cleaner.prepare_for_abort_count(), 1);
    assert_eq!(cleaner.abort_count(), 1);
}

#[tokio::test]
async fn test_participant_panic_is_contained_and_aborts() {
    let a = Arc::new(ScriptedParticipant::new("a"));
    let bomb = Arc::new(ScriptedParticipant::new("bomb").panicking());
    let cleaner = Arc::new(
        ScriptedParticipant::new("cleaner")
            .with_capabilities(Capabilities::ABORT_PREPARE),
    );

    let table = GroupTableBuilder::new()
        .participant(a.clone())
        .participant(bomb.clone())
        .participant(cleaner.clone())
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));

    let outcome = engine.execute(Context::new()).await.unwrap();
    assert_eq!(outcome, TxOutcome::Aborted);

    assert_eq!(a.abort_count(), 1);
    assert_eq!(cleaner.prepare_for_abort_count(), 1);
}

#[tokio::test]
async fn test_recovery_replays_unresolved_snapshots() {
    let store = Arc::new(MemoryRecoveryStore::new());

    // A previous process life left transaction 7 admitted but unresolved.
    let orphan = Context::new();
    orphan.put_persistent("mti", serde_json::json!("0200"));
    orphan.put("socket", serde_json::json!("fd:4"));
    store
        .put(7, &orphan.snapshot().to_bytes().unwrap())
        .await
        .unwrap();

    let witness = Arc::new(
        ScriptedParticipant::new("witness").with_capabilities(Capabilities::RECOVER),
    );
    let table = GroupTableBuilder::new()
        .participant(witness.clone())
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, store.clone());
    let (queue, source) = work_queue(8);

    let replayed = engine.recover(&queue).await.unwrap();
    assert_eq!(replayed, 1);
    assert_eq!(witness.recover_count(), 1);

    let ctx = source.take().await.unwrap();
    assert_eq!(ctx.id(), Some(7));
    assert_eq!(ctx.get("mti"), Some(serde_json::json!("0200")));
    assert!(!ctx.contains_key("socket"));

    let outcome = engine.execute(ctx).await.unwrap();
    assert_eq!(outcome, TxOutcome::Committed);
    assert!(store.is_empty());

    // The id sequence advanced past the recovered id.
    assert!(engine.head() >= 7);
    let fresh = Context::new();
    engine.execute(fresh).await.unwrap();
    assert_eq!(engine.head(), 8);
}

#[tokio::test]
async fn test_replaying_same_snapshot_twice_is_idempotent() {
    let seed = Context::new();
    seed.put_persistent("stan", serde_json::json!(77));
    let snapshot = seed.snapshot();

    let stash: Arc<parking_lot::Mutex<Vec<Vec<u8>>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let marker = {
        let stash = stash.clone();
        Arc::new(FnParticipant::new("marker", move |_id, ctx: &Context| {
            ctx.put_persistent("posted", serde_json::json!(true));
            stash.lock().push(ctx.snapshot().to_bytes().unwrap());
            PrepareResult::prepared()
        }))
    };

    let table = GroupTableBuilder::new().participant(marker).build().unwrap();
    let store = Arc::new(MemoryRecoveryStore::new());
    let engine = TxEngine::new(fast_config(), table, store.clone());

    for _ in 0..2 {
        let ctx = snapshot.restore();
        ctx.set_id(5);
        let outcome = engine.execute(ctx).await.unwrap();
        assert_eq!(outcome, TxOutcome::Committed);
    }

    let captured = stash.lock().clone();
    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0], captured[1]);
}

#[tokio::test]
async fn test_initial_store_failure_surfaces_and_rolls_back_admission() {
    let store = Arc::new(FailingStore::new());
    store.set_fail_puts(true);

    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a")))
        .build()
        .unwrap();

    let engine = TxEngine::new(
        fast_config().with_store_write_retries(1),
        table,
        store.clone(),
    );

    let result = engine.execute(Context::new()).await;
    assert!(matches!(result, Err(EngineError::Store(_))));
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_remove_failure_leaves_snapshot_for_next_recovery() {
    let store = Arc::new(FailingStore::new());
    let a = Arc::new(ScriptedParticipant::new("a"));

    let table = GroupTableBuilder::new().participant(a.clone()).build().unwrap();
    let engine = TxEngine::new(
        fast_config().with_store_write_retries(1),
        table,
        store.clone(),
    );

    store.set_fail_removes(true);
    let result = engine.execute(Context::new()).await;

    // Commit ran, but the transaction stays unresolved durability-wise.
    assert!(matches!(result, Err(EngineError::Store(_))));
    assert_eq!(a.commit_count(), 1);
    assert!(store.inner().contains(1));
    assert_eq!(engine.in_flight(), 1);
}

#[tokio::test]
async fn test_worker_pool_resolves_queued_transactions() {
    let sink = Arc::new(CollectingTraceSink::new());
    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a")))
        .build()
        .unwrap();

    let engine = TxEngine::new(
        fast_config().with_workers(3),
        table,
        Arc::new(MemoryRecoveryStore::new()),
    )
    .with_sink(sink.clone());

    let (queue, source) = work_queue(32);
    engine.start(Arc::new(source));

    for _ in 0..10 {
        queue.submit(Context::new()).await.unwrap();
    }

    for _ in 0..500 {
        if sink.count_of("tx.committed") == 10 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    assert_eq!(sink.count_of("tx.committed"), 10);

    engine.stop().await;
    assert_eq!(engine.head(), 10);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_head_and_tail_bookkeeping() {
    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a")))
        .build()
        .unwrap();

    let engine = TxEngine::new(fast_config(), table, Arc::new(MemoryRecoveryStore::new()));
    assert_eq!(engine.head(), 0);
    assert_eq!(engine.tail(), 0);

    for _ in 0..3 {
        engine.execute(Context::new()).await.unwrap();
    }

    assert_eq!(engine.head(), 3);
    assert_eq!(engine.tail(), 3);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_trace_is_flushed_to_sink_on_resolution() {
    let sink = Arc::new(CollectingTraceSink::new());
    let table = GroupTableBuilder::new()
        .participant(Arc::new(ScriptedParticipant::new("a")))
        .build()
        .unwrap();

    let engine = TxEngine::new(
        fast_config(),
        table,
        Arc::new(MemoryRecoveryStore::new()),
    )
    .with_sink(sink.clone());

    engine.execute(Context::new()).await.unwrap();

    assert_eq!(sink.count_of("tx.admitted"), 1);
    assert_eq!(sink.count_of("tx.committed"), 1);
    assert_eq!(sink.count_of("tx.trace"), 1);
}
