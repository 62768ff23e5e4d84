//! The transaction manager: worker pool, chain walk, and recovery.
//!
//! Workers dequeue contexts from the admission source and drive each one to
//! full resolution (or to a pause point) before taking the next. Per
//! transaction the state machine is
//! `ADMITTED -> PREPARING -> (COMMITTING | ABORTING) -> DONE`, with `PAUSED`
//! re-entering `PREPARING` at the saved position and retry as a
//! same-participant loop inside `PREPARING`.
//!
//! Different transactions run fully in parallel with no ordering between
//! them; a single transaction is always driven sequentially by exactly one
//! worker at a time.

mod config;
mod paused;
mod retry;
mod sequence;
mod shutdown;

#[cfg(test)]
mod engine_tests;

pub use config::EngineConfig;
pub use retry::RetryPolicy;
pub use shutdown::ShutdownToken;

use crate::context::{Context, ContextSnapshot, TxId};
use crate::errors::EngineError;
use crate::events::{NoOpTraceSink, TraceSink};
use crate::participant::{Capabilities, PrepareResult};
use crate::queue::{WorkQueue, WorkSource};
use crate::registry::{GroupTable, ParticipantEntry, MAIN_GROUP};
use crate::store::RecoveryStore;
use futures::FutureExt;
use parking_lot::Mutex;
use paused::{PausedRecord, PausedTable};
use sequence::TxSequence;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Terminal disposition of one processing pass over a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Every joined participant was committed.
    Committed,
    /// Every joined participant was aborted.
    Aborted,
    /// The transaction suspended; it holds no worker until re-admitted.
    Paused,
}

impl fmt::Display for TxOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed => write!(f, "committed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Per-attempt execution state, carried across a pause.
struct ExecState {
    group: String,
    index: usize,
    aborting: bool,
    joined: Vec<ParticipantEntry>,
}

impl ExecState {
    fn fresh() -> Self {
        Self {
            group: MAIN_GROUP.to_string(),
            index: 0,
            aborting: false,
            joined: Vec::new(),
        }
    }

    fn from_record(record: PausedRecord) -> Self {
        Self {
            group: record.group,
            index: record.index,
            aborting: record.aborting,
            joined: record.joined,
        }
    }

    fn to_record(&self) -> PausedRecord {
        PausedRecord {
            group: self.group.clone(),
            index: self.index,
            aborting: self.aborting,
            joined: self.joined.clone(),
        }
    }
}

/// The transaction-processing engine.
///
/// Construction wires the immutable participant table, the recovery store,
/// and the trace sink; [`start`](Self::start) spawns the worker pool and
/// [`stop`](Self::stop) drains it. [`execute`](Self::execute) drives a
/// single context on the caller's task and is what the workers themselves
/// use.
pub struct TxEngine {
    inner: Arc<EngineInner>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for TxEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxEngine")
            .field("workers", &self.inner.config.workers)
            .field("head", &self.head())
            .field("tail", &self.tail())
            .field("paused", &self.paused_count())
            .finish()
    }
}

impl TxEngine {
    /// Creates an engine over a participant table and recovery store.
    #[must_use]
    pub fn new(config: EngineConfig, table: GroupTable, store: Arc<dyn RecoveryStore>) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                table,
                store,
                sink: Arc::new(NoOpTraceSink),
                paused: PausedTable::default(),
                sequence: TxSequence::default(),
                shutdown: ShutdownToken::new(),
            }),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Replaces the trace sink.
    ///
    /// Only meaningful before [`start`](Self::start).
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.sink = sink;
        }
        self
    }

    /// Highest transaction id assigned so far.
    #[must_use]
    pub fn head(&self) -> TxId {
        self.inner.sequence.head()
    }

    /// Lowest transaction id still in flight (the head when idle).
    #[must_use]
    pub fn tail(&self) -> TxId {
        self.inner.sequence.tail()
    }

    /// Number of transactions currently in flight (including paused ones).
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.sequence.in_flight_count()
    }

    /// Returns true if the id is suspended awaiting re-admission.
    #[must_use]
    pub fn is_paused(&self, id: TxId) -> bool {
        self.inner.paused.contains(id)
    }

    /// Number of suspended transactions.
    #[must_use]
    pub fn paused_count(&self) -> usize {
        self.inner.paused.len()
    }

    /// Drives one context to resolution (or a pause point) on the caller's
    /// task.
    pub async fn execute(&self, ctx: Context) -> Result<TxOutcome, EngineError> {
        self.inner.process(ctx).await
    }

    /// Replays every unresolved snapshot left in the recovery store.
    ///
    /// Call once at cold start, before accepting new work. Each snapshot is
    /// rebuilt, offered to recovery-capable participants, and re-admitted
    /// through `intake`; the chain restarts from the beginning, which is
    /// legal because prepare is contractually idempotent. Returns how many
    /// transactions were re-admitted.
    pub async fn recover(&self, intake: &WorkQueue) -> Result<usize, EngineError> {
        self.inner.recover(intake).await
    }

    /// Spawns the worker pool against an admission source.
    pub fn start(&self, source: Arc<dyn WorkSource>) {
        let mut handles = self.handles.lock();
        for worker in 0..self.inner.config.workers {
            let inner = Arc::clone(&self.inner);
            let source = Arc::clone(&source);
            handles.push(tokio::spawn(async move {
                worker_loop(worker, &inner, source.as_ref()).await;
            }));
        }
    }

    /// Stops the worker pool.
    ///
    /// Workers finish the transaction in hand; queued and paused work stays
    /// recoverable through the store and the admission collaborator.
    pub async fn stop(&self) {
        self.inner.shutdown.trigger("engine stop");
        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.handles.lock();
            guard.drain(..).collect()
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }
    }
}

async fn worker_loop(worker: usize, inner: &EngineInner, source: &dyn WorkSource) {
    debug!(worker, "Worker started");
    loop {
        tokio::select! {
            () = inner.shutdown.wait() => break,
            maybe = source.take() => {
                let Some(ctx) = maybe else { break };
                match inner.process(ctx).await {
                    Ok(outcome) => debug!(worker, %outcome, "Transaction resolved"),
                    Err(e) => error!(worker, error = %e, "Transaction abandoned"),
                }
            }
        }
    }
    debug!(worker, "Worker stopped");
}

struct EngineInner {
    config: EngineConfig,
    table: GroupTable,
    store: Arc<dyn RecoveryStore>,
    sink: Arc<dyn TraceSink>,
    paused: PausedTable,
    sequence: TxSequence,
    shutdown: ShutdownToken,
}

impl EngineInner {
    async fn process(&self, ctx: Context) -> Result<TxOutcome, EngineError> {
        let (id, mut state) = self.admit(&ctx).await?;

        let paused = self.walk(id, &ctx, &mut state).await?;
        if paused {
            return Ok(TxOutcome::Paused);
        }

        self.finish(id, &ctx, &state).await
    }

    /// Classifies admission: paused resume, recovery replay, or new work.
    async fn admit(&self, ctx: &Context) -> Result<(TxId, ExecState), EngineError> {
        if let Some(id) = ctx.id() {
            if let Some(record) = self.paused.take(id) {
                ctx.checkpoint("resumed");
                self.sink.try_emit(
                    "tx.resumed",
                    Some(serde_json::json!({
                        "id": id,
                        "group": record.group,
                        "index": record.index,
                    })),
                );
                return Ok((id, ExecState::from_record(record)));
            }

            // Replay of a recovered snapshot: the id and the durable
            // snapshot both already exist.
            self.sequence.admit(id);
            ctx.checkpoint("replayed");
            return Ok((id, ExecState::fresh()));
        }

        let id = self.sequence.next_id();
        ctx.set_id(id);
        self.sequence.admit(id);

        if let Err(e) = self.write_snapshot(id, ctx).await {
            // Never entered the durable pipeline; take the id back out of
            // the in-flight set.
            self.sequence.resolve(id);
            return Err(e);
        }

        ctx.checkpoint("admitted");
        self.sink.try_emit(
            "tx.admitted",
            Some(serde_json::json!({
                "id": id,
                "correlation_id": ctx.correlation_id(),
            })),
        );
        Ok((id, ExecState::fresh()))
    }

    /// Walks the active chain. Returns true if the transaction paused.
    async fn walk(
        &self,
        id: TxId,
        ctx: &Context,
        state: &mut ExecState,
    ) -> Result<bool, EngineError> {
        let mut chain = self.table.chain(&state.group).ok_or_else(|| {
            EngineError::UnknownGroup {
                name: state.group.clone(),
                participant: String::new(),
            }
        })?;

        while state.index < chain.len() {
            let entry = chain[state.index].clone();

            if state.aborting {
                if entry.capabilities().contains(Capabilities::ABORT_PREPARE) {
                    let result = self.call_prepare_for_abort(&entry, id, ctx).await;
                    if result.joins() {
                        state.joined.push(entry.clone());
                    }
                    if !result.is_readonly() {
                        self.write_snapshot(id, ctx).await?;
                    }
                    if result.wants_pause() {
                        state.index += 1;
                        self.suspend(id, ctx, state);
                        return Ok(true);
                    }
                }
                state.index += 1;
                continue;
            }

            let mut result = self.call_prepare(&entry, id, ctx).await;
            let mut attempts = 0u32;
            while result.wants_retry() {
                if self.config.retry.exhausted(attempts) {
                    warn!(id, participant = entry.name(), "Retry bound exceeded, aborting");
                    self.sink.try_emit(
                        "tx.retry_exhausted",
                        Some(serde_json::json!({
                            "id": id,
                            "participant": entry.name(),
                        })),
                    );
                    result = PrepareResult::aborted();
                    break;
                }
                attempts += 1;
                tokio::time::sleep(self.config.retry.delay()).await;
                result = self.call_prepare(&entry, id, ctx).await;
            }

            if result.is_aborted() {
                debug!(id, participant = entry.name(), "Participant aborted");
                state.aborting = true;
            } else if result.joins() {
                state.joined.push(entry.clone());
            }

            if !result.is_readonly() {
                self.write_snapshot(id, ctx).await?;
            }

            if result.wants_pause() {
                state.index += 1;
                self.suspend(id, ctx, state);
                return Ok(true);
            }

            if !state.aborting && entry.capabilities().contains(Capabilities::GROUP_SELECT) {
                if let Some(name) = self.call_select_group(&entry, id, ctx).await {
                    // Re-selecting the active group would loop on the
                    // selector itself.
                    if !name.is_empty() && name != state.group {
                        if let Some(next) = self.table.chain(&name) {
                            ctx.checkpoint(format!("group:{name}"));
                            chain = next;
                            state.group = name;
                            state.index = 0;
                            continue;
                        }
                        error!(
                            id,
                            group = %name,
                            participant = entry.name(),
                            "Unknown group selected, aborting"
                        );
                        self.sink.try_emit(
                            "tx.unknown_group",
                            Some(serde_json::json!({
                                "id": id,
                                "group": name,
                                "participant": entry.name(),
                            })),
                        );
                        state.aborting = true;
                    }
                }
            }

            state.index += 1;
        }

        Ok(false)
    }

    /// Runs the commit or abort pass and removes the durable snapshot.
    async fn finish(
        &self,
        id: TxId,
        ctx: &Context,
        state: &ExecState,
    ) -> Result<TxOutcome, EngineError> {
        let outcome = if state.aborting {
            for entry in &state.joined {
                self.call_abort(entry, id, ctx).await;
            }
            ctx.checkpoint("aborted");
            TxOutcome::Aborted
        } else {
            for entry in &state.joined {
                self.call_commit(entry, id, ctx).await;
            }
            ctx.checkpoint("committed");
            TxOutcome::Committed
        };

        self.remove_snapshot(id).await?;
        self.sequence.resolve(id);

        self.sink.try_emit(
            match outcome {
                TxOutcome::Aborted => "tx.aborted",
                _ => "tx.committed",
            },
            Some(serde_json::json!({
                "id": id,
                "joined": state.joined.len(),
            })),
        );
        self.flush_trace(id, ctx);
        Ok(outcome)
    }

    fn suspend(&self, id: TxId, ctx: &Context, state: &ExecState) {
        self.paused.insert(id, state.to_record());
        ctx.checkpoint("paused");
        self.sink.try_emit(
            "tx.paused",
            Some(serde_json::json!({
                "id": id,
                "group": state.group,
                "index": state.index,
            })),
        );
    }

    async fn recover(&self, intake: &WorkQueue) -> Result<usize, EngineError> {
        let all = self.store.list_all().await?;
        let mut replayed = 0;

        for (id, bytes) in all {
            let snapshot = match ContextSnapshot::from_bytes(&bytes) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    error!(id, error = %e, "Corrupt snapshot in recovery store");
                    self.sink.try_emit(
                        "tx.recovery_corrupt",
                        Some(serde_json::json!({
                            "id": id,
                            "error": e.to_string(),
                        })),
                    );
                    continue;
                }
            };

            let ctx = snapshot.restore();
            ctx.set_id(id);
            self.sequence.admit(id);

            for entry in self.table.main_chain().iter() {
                if entry.capabilities().contains(Capabilities::RECOVER) {
                    self.call_recover(entry, id, &ctx).await;
                }
            }

            ctx.checkpoint("recovered");
            self.sink.try_emit(
                "tx.recovered",
                Some(serde_json::json!({ "id": id })),
            );
            intake.submit(ctx).await?;
            replayed += 1;
        }

        Ok(replayed)
    }

    async fn write_snapshot(&self, id: TxId, ctx: &Context) -> Result<(), EngineError> {
        let bytes = ctx.snapshot().to_bytes()?;
        let mut attempt = 0u32;
        loop {
            match self.store.put(id, &bytes).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.store_write_retries {
                        error!(id, error = %e, "Recovery store write failed");
                        self.sink.try_emit(
                            "tx.store_error",
                            Some(serde_json::json!({
                                "id": id,
                                "op": "put",
                                "error": e.to_string(),
                            })),
                        );
                        return Err(e.into());
                    }
                    warn!(id, attempt, error = %e, "Recovery store write failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.store_retry_delay_ms))
                        .await;
                }
            }
        }
    }

    async fn remove_snapshot(&self, id: TxId) -> Result<(), EngineError> {
        let mut attempt = 0u32;
        loop {
            match self.store.remove(id).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.store_write_retries {
                        error!(id, error = %e, "Recovery store remove failed");
                        self.sink.try_emit(
                            "tx.store_error",
                            Some(serde_json::json!({
                                "id": id,
                                "op": "remove",
                                "error": e.to_string(),
                            })),
                        );
                        return Err(e.into());
                    }
                    warn!(id, attempt, error = %e, "Recovery store remove failed, retrying");
                    tokio::time::sleep(Duration::from_millis(self.config.store_retry_delay_ms))
                        .await;
                }
            }
        }
    }

    async fn call_prepare(&self, entry: &ParticipantEntry, id: TxId, ctx: &Context) -> PrepareResult {
        match AssertUnwindSafe(entry.participant().prepare(id, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => {
                debug!(id, participant = entry.name(), result = %result, "prepare");
                result
            }
            Err(_) => {
                error!(id, participant = entry.name(), "Participant panicked during prepare");
                ctx.checkpoint(format!("panic:{}", entry.name()));
                PrepareResult::aborted()
            }
        }
    }

    async fn call_prepare_for_abort(
        &self,
        entry: &ParticipantEntry,
        id: TxId,
        ctx: &Context,
    ) -> PrepareResult {
        match AssertUnwindSafe(entry.participant().prepare_for_abort(id, ctx))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    id,
                    participant = entry.name(),
                    "Participant panicked during prepare_for_abort"
                );
                PrepareResult::aborted()
            }
        }
    }

    async fn call_select_group(
        &self,
        entry: &ParticipantEntry,
        id: TxId,
        ctx: &Context,
    ) -> Option<String> {
        match AssertUnwindSafe(entry.participant().select_group(id, ctx))
            .catch_unwind()
            .await
        {
            Ok(selection) => selection,
            Err(_) => {
                error!(
                    id,
                    participant = entry.name(),
                    "Participant panicked during select_group"
                );
                None
            }
        }
    }

    async fn call_commit(&self, entry: &ParticipantEntry, id: TxId, ctx: &Context) {
        if AssertUnwindSafe(entry.participant().commit(id, ctx))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(id, participant = entry.name(), "Participant panicked during commit");
        }
    }

    async fn call_abort(&self, entry: &ParticipantEntry, id: TxId, ctx: &Context) {
        if AssertUnwindSafe(entry.participant().abort(id, ctx))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(id, participant = entry.name(), "Participant panicked during abort");
        }
    }

    async fn call_recover(&self, entry: &ParticipantEntry, id: TxId, ctx: &Context) {
        if AssertUnwindSafe(entry.participant().recover(id, ctx))
            .catch_unwind()
            .await
            .is_err()
        {
            error!(id, participant = entry.name(), "Participant panicked during recover");
        }
    }

    fn flush_trace(&self, id: TxId, ctx: &Context) {
        let checkpoints = ctx.checkpoints();
        if checkpoints.is_empty() {
            return;
        }
        self.sink.try_emit(
            "tx.trace",
            Some(serde_json::json!({
                "id": id,
                "correlation_id": ctx.correlation_id(),
                "checkpoints": checkpoints,
            })),
        );
    }
}
