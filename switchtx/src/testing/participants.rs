//! Scripted participants for tests.

use crate::context::{Context, TxId};
use crate::participant::{Capabilities, Participant, PrepareResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Records cross-participant call order as `"name.op"` strings.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallRecorder {
    /// Creates a new empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a call record.
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    /// Returns all recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Clears the recorded calls.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

/// A participant that replays a configured script of prepare results.
///
/// Results are consumed front to back; once the script is exhausted the
/// fallback result is returned forever. Every call is counted and,
/// optionally, recorded into a shared [`CallRecorder`] for order
/// assertions.
#[derive(Debug)]
pub struct ScriptedParticipant {
    name: String,
    script: Mutex<VecDeque<PrepareResult>>,
    fallback: PrepareResult,
    abort_result: PrepareResult,
    capabilities: Capabilities,
    group: Mutex<Option<String>>,
    panic_on_prepare: bool,
    recorder: Option<CallRecorder>,
    prepares: AtomicUsize,
    abort_prepares: AtomicUsize,
    commits: AtomicUsize,
    aborts: AtomicUsize,
    recovers: AtomicUsize,
}

impl ScriptedParticipant {
    /// Creates a participant that always returns a plain prepared result.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            fallback: PrepareResult::prepared(),
            abort_result: PrepareResult::prepared().readonly(),
            capabilities: Capabilities::NONE,
            group: Mutex::new(None),
            panic_on_prepare: false,
            recorder: None,
            prepares: AtomicUsize::new(0),
            abort_prepares: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
            aborts: AtomicUsize::new(0),
            recovers: AtomicUsize::new(0),
        }
    }

    /// Sets the result returned by every prepare call.
    #[must_use]
    pub fn with_result(mut self, result: PrepareResult) -> Self {
        self.fallback = result;
        self
    }

    /// Queues results returned by successive prepare calls before the
    /// fallback applies.
    #[must_use]
    pub fn with_script(self, results: Vec<PrepareResult>) -> Self {
        *self.script.lock() = results.into();
        self
    }

    /// Sets the result returned by `prepare_for_abort`.
    #[must_use]
    pub fn with_abort_result(mut self, result: PrepareResult) -> Self {
        self.abort_result = result;
        self
    }

    /// Declares capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Makes `select_group` return the given group, declaring the
    /// capability.
    #[must_use]
    pub fn selecting_group(mut self, group: impl Into<String>) -> Self {
        self.capabilities = self.capabilities.with(Capabilities::GROUP_SELECT);
        *self.group.lock() = Some(group.into());
        self
    }

    /// Makes every prepare call panic.
    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.panic_on_prepare = true;
        self
    }

    /// Attaches a shared call recorder.
    #[must_use]
    pub fn with_recorder(mut self, recorder: CallRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Number of prepare calls received.
    #[must_use]
    pub fn prepare_count(&self) -> usize {
        self.prepares.load(Ordering::SeqCst)
    }

    /// Number of `prepare_for_abort` calls received.
    #[must_use]
    pub fn prepare_for_abort_count(&self) -> usize {
        self.abort_prepares.load(Ordering::SeqCst)
    }

    /// Number of commit calls received.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Number of abort calls received.
    #[must_use]
    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    /// Number of recover calls received.
    #[must_use]
    pub fn recover_count(&self) -> usize {
        self.recovers.load(Ordering::SeqCst)
    }

    fn note(&self, op: &str) {
        if let Some(recorder) = &self.recorder {
            recorder.record(format!("{}.{op}", self.name));
        }
    }
}

#[async_trait]
impl Participant for ScriptedParticipant {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn prepare(&self, _id: TxId, _ctx: &Context) -> PrepareResult {
        self.prepares.fetch_add(1, Ordering::SeqCst);
        self.note("prepare");
        if self.panic_on_prepare {
            panic!("scripted panic in {}", self.name);
        }
        self.script.lock().pop_front().unwrap_or(self.fallback)
    }

    async fn commit(&self, _id: TxId, _ctx: &Context) {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.note("commit");
    }

    async fn abort(&self, _id: TxId, _ctx: &Context) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.note("abort");
    }

    async fn prepare_for_abort(&self, _id: TxId, _ctx: &Context) -> PrepareResult {
        self.abort_prepares.fetch_add(1, Ordering::SeqCst);
        self.note("prepare_for_abort");
        self.abort_result
    }

    async fn select_group(&self, _id: TxId, _ctx: &Context) -> Option<String> {
        self.note("select_group");
        self.group.lock().clone()
    }

    async fn recover(&self, _id: TxId, _ctx: &Context) {
        self.recovers.fetch_add(1, Ordering::SeqCst);
        self.note("recover");
    }
}
