//! Single-flight job registry.
//!
//! Maps each (key, kind) slot to its currently live job handle. `try_acquire`
//! is the single-flight guarantee: under concurrent callers racing on the same
//! slot, exactly one observes success. The registry also hands out monotonic
//! run identifiers; status writes elsewhere are guarded on "is my run still
//! the latest for this slot", which is what makes best-effort cancellation
//! safe (a cancelled-but-still-running task can no longer clobber a newer
//! run's status).
//!
//! Lock discipline: one `RwLock` around the slot map, scoped to map mutation
//! only and never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::debug;

use paperflow_core::{JobKind, PaperId, PipelineError, PipelineResult};

/// Handle for one in-flight pipeline run.
///
/// The registry slot owns the canonical entry; the runner holds a clone
/// sharing the cancellation and liveness flags.
#[derive(Debug, Clone)]
pub struct JobHandle {
    key: PaperId,
    kind: JobKind,
    run_id: u64,
    started_at: DateTime<Utc>,
    cancelled: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

impl JobHandle {
    fn new(key: PaperId, kind: JobKind, run_id: u64) -> Self {
        Self {
            key,
            kind,
            run_id,
            started_at: Utc::now(),
            cancelled: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn key(&self) -> &PaperId {
        &self.key
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Cooperative cancellation flag; the running task checks this at safe
    /// points and is never preempted.
    pub fn cancel_requested(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_alive(&self) -> bool {
        !self.finished.load(Ordering::SeqCst)
    }

    fn mark_cancelled(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

struct LiveJob {
    handle: JobHandle,
    /// Attached after spawn; lets the registry reap tasks that died without
    /// releasing (panic inside the runtime, aborted task).
    task: Option<JoinHandle<()>>,
}

impl LiveJob {
    fn is_finished(&self) -> bool {
        if !self.handle.is_alive() {
            return true;
        }
        self.task.as_ref().is_some_and(|t| t.is_finished())
    }
}

#[derive(Default)]
struct Slot {
    live: Option<LiveJob>,
    /// Highest run id ever issued (or invalidated into) for this slot; the
    /// guard consulted by status writes.
    latest_run: u64,
}

type SlotKey = (PaperId, JobKind);

/// Registry of in-flight jobs, one slot per (key, kind).
///
/// Constructed once and injected into the facade; there is no process-wide
/// singleton.
#[derive(Default)]
pub struct JobRegistry {
    slots: RwLock<HashMap<SlotKey, Slot>>,
    next_run: AtomicU64,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_run_id(&self) -> u64 {
        self.next_run.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Claim the slot for (key, kind).
    ///
    /// Atomic with respect to concurrent callers: the handle is inserted
    /// under the write lock before returning. A finished-but-unreleased
    /// occupant is reaped rather than blocking the slot.
    pub fn try_acquire(&self, key: &PaperId, kind: JobKind) -> PipelineResult<JobHandle> {
        let mut slots = self.slots.write().unwrap();
        self.acquire_locked(&mut slots, key, kind)
    }

    /// Claim the Correction slot for `key`, rejecting while an Analysis job
    /// for the same key is live.
    ///
    /// Both the cross-kind check and the insert happen under one write-lock
    /// acquisition, so a concurrent `try_acquire(Analysis)` cannot slip in
    /// between them.
    pub fn try_acquire_correction(&self, key: &PaperId) -> PipelineResult<JobHandle> {
        let mut slots = self.slots.write().unwrap();
        if has_live(&mut slots, key, JobKind::Analysis) {
            return Err(PipelineError::already_running(
                key.clone(),
                JobKind::Analysis,
            ));
        }
        self.acquire_locked(&mut slots, key, JobKind::Correction)
    }

    fn acquire_locked(
        &self,
        slots: &mut HashMap<SlotKey, Slot>,
        key: &PaperId,
        kind: JobKind,
    ) -> PipelineResult<JobHandle> {
        let slot = slots.entry((key.clone(), kind)).or_default();

        if let Some(live) = &slot.live {
            if live.is_finished() {
                debug!(key = %key, kind = %kind, "reaped finished job during acquire");
                slot.live = None;
            } else {
                return Err(PipelineError::already_running(key.clone(), kind));
            }
        }

        let run_id = self.next_run_id();
        let handle = JobHandle::new(key.clone(), kind, run_id);
        slot.live = Some(LiveJob {
            handle: handle.clone(),
            task: None,
        });
        slot.latest_run = run_id;
        Ok(handle)
    }

    /// Attach the spawned task to its slot for liveness self-healing.
    ///
    /// No-op if the run already finished or was cancelled in the meantime.
    pub fn attach(&self, handle: &JobHandle, task: JoinHandle<()>) {
        let mut slots = self.slots.write().unwrap();
        if let Some(slot) = slots.get_mut(&(handle.key().clone(), handle.kind()))
            && let Some(live) = &mut slot.live
            && live.handle.run_id() == handle.run_id()
        {
            live.task = Some(task);
        }
    }

    /// Remove the live entry if it still belongs to `run_id`. Idempotent;
    /// never touches a newer run's entry.
    pub fn release(&self, key: &PaperId, kind: JobKind, run_id: u64) {
        let mut slots = self.slots.write().unwrap();
        if let Some(slot) = slots.get_mut(&(key.clone(), kind))
            && slot
                .live
                .as_ref()
                .is_some_and(|l| l.handle.run_id() == run_id)
        {
            slot.live = None;
        }
    }

    /// Liveness probe; opportunistically reaps a finished occupant so a
    /// missed `release` cannot leave the key stuck.
    pub fn is_active(&self, key: &PaperId, kind: JobKind) -> bool {
        let mut slots = self.slots.write().unwrap();
        has_live(&mut slots, key, kind)
    }

    /// Snapshot of keys with a live job of `kind`. Not linearizable with
    /// concurrent mutation, but never includes provably finished tasks.
    pub fn active_keys(&self, kind: JobKind) -> Vec<PaperId> {
        let mut slots = self.slots.write().unwrap();
        let mut keys = Vec::new();
        for ((key, slot_kind), slot) in slots.iter_mut() {
            if *slot_kind != kind {
                continue;
            }
            if slot.live.as_ref().is_some_and(|l| l.is_finished()) {
                slot.live = None;
            }
            if slot.live.is_some() {
                keys.push(key.clone());
            }
        }
        keys.sort();
        keys
    }

    /// Flag the live run for cancellation and forget it immediately.
    ///
    /// The task is not preempted; it keeps running detached. Invalidating the
    /// slot's latest run id here is what suppresses the orphan's eventual
    /// terminal status write. Returns the orphaned handle, `None` if nothing
    /// was live.
    pub fn request_cancel(&self, key: &PaperId, kind: JobKind) -> Option<JobHandle> {
        let mut slots = self.slots.write().unwrap();
        let slot = slots.get_mut(&(key.clone(), kind))?;
        let live = slot.live.take()?;
        if live.is_finished() {
            return None;
        }
        live.handle.mark_cancelled();
        slot.latest_run = self.next_run_id();
        Some(live.handle)
    }

    /// Status-write guard: is `run_id` still the latest run for this slot?
    pub fn is_current(&self, key: &PaperId, kind: JobKind, run_id: u64) -> bool {
        let slots = self.slots.read().unwrap();
        slots
            .get(&(key.clone(), kind))
            .is_some_and(|slot| slot.latest_run == run_id)
    }
}

/// Reap-then-probe for a slot's liveness, with the map lock already held.
fn has_live(slots: &mut HashMap<SlotKey, Slot>, key: &PaperId, kind: JobKind) -> bool {
    let Some(slot) = slots.get_mut(&(key.clone(), kind)) else {
        return false;
    };
    if slot.live.as_ref().is_some_and(|l| l.is_finished()) {
        slot.live = None;
    }
    slot.live.is_some()
}

/// Drop guard ensuring the registry entry is released on every exit path of
/// a pipeline task, including panics unwinding through the task body.
pub struct ReleaseGuard {
    registry: Arc<JobRegistry>,
    handle: JobHandle,
}

impl ReleaseGuard {
    pub fn new(registry: Arc<JobRegistry>, handle: JobHandle) -> Self {
        Self { registry, handle }
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.handle.mark_finished();
        self.registry
            .release(self.handle.key(), self.handle.kind(), self.handle.run_id());
    }
}
