//! Cross-thread completion handoff (§4.5 "Sync/Async thread safety", §4.8).
//!
//! A [`CompletionScheduler`] is owned by exactly one `SessionEngine`. The
//! message sink's worker threads call [`CompletionScheduler::schedule`] when
//! a previously enqueued message finishes; the session's own event-loop task
//! calls [`CompletionScheduler::drain`] to pick up everything scheduled since
//! the last drain. A single doorbell wakeup is sent on the first schedule
//! since the last drain so the session is not woken once per completion.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Opaque identifier for one [`crate::session::IncompleteRcvMsg`] registration,
/// unique within its owning session for the lifetime of that session.
pub(crate) type CompletionHandle = u64;

/// What happened to a registered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CompletionOutcome {
    Completed,
}

struct SchedulerInner {
    /// Handles cancelled before their completion was scheduled; the next
    /// `schedule` call for one of these is a silent no-op, per
    /// `IncompleteRcvMsg::cancel`'s "clears its session pointer so a
    /// concurrently-scheduled completion becomes a no-op".
    cancelled: HashSet<CompletionHandle>,
    /// Completions scheduled but not yet drained by the session's own task.
    pending: Vec<(CompletionHandle, CompletionOutcome)>,
    /// Monotonic source of fresh handles (§9 "arena ownership"). Handed out
    /// by the scheduler rather than counted per `SessionState` so a handle
    /// never gets reused across a detach/resume cycle on the same channel —
    /// a per-`SessionState` counter would restart at zero on every
    /// `attach`/`resume` and collide with a handle this scheduler already
    /// holds cancelled from the previous occupant.
    next_handle: CompletionHandle,
}

/// Cross-thread handoff queue (§4.8). `schedule` is callable from any
/// thread; `drain` must only be called from the owning session's event loop.
pub(crate) struct CompletionScheduler {
    inner: Mutex<SchedulerInner>,
    doorbell: mpsc::Sender<()>,
}

impl CompletionScheduler {
    pub(crate) fn new(doorbell: mpsc::Sender<()>) -> Self {
        Self {
            inner: Mutex::new(SchedulerInner {
                cancelled: HashSet::new(),
                pending: Vec::new(),
                next_handle: 0,
            }),
            doorbell,
        }
    }

    /// Allocates a fresh handle, unique for the lifetime of this scheduler.
    pub(crate) fn next_handle(&self) -> CompletionHandle {
        let mut inner = self.inner.lock();
        let handle = inner.next_handle;
        inner.next_handle = inner.next_handle.wrapping_add(1);
        handle
    }

    /// Record that `handle` completed. A no-op if `handle` was cancelled
    /// first. Rings the doorbell only on the first schedule since the last
    /// drain (§4.5: "the first enqueue schedules the drain; subsequent
    /// enqueues just append").
    pub(crate) fn schedule(&self, handle: CompletionHandle, outcome: CompletionOutcome) {
        let mut inner = self.inner.lock();
        if inner.cancelled.remove(&handle) {
            return;
        }
        inner.pending.push((handle, outcome));
        let should_ring = inner.pending.len() == 1;
        drop(inner);
        if should_ring {
            // Best-effort: a full doorbell channel means a wakeup is already
            // in flight, which is all we need.
            let _ = self.doorbell.try_send(());
        }
    }

    /// Cancel `handle`. Because this takes the same lock `schedule` holds
    /// for its whole critical section, a `cancel` that runs concurrently
    /// with a `schedule` for the same handle is serialised against it: the
    /// cancel either wins (observed before scheduling) or loses (the
    /// completion is already pending and will be removed here instead).
    /// This is the crate's stand-in for §4.5's "must block if the callback
    /// is currently executing".
    pub(crate) fn cancel(&self, handle: CompletionHandle) {
        let mut inner = self.inner.lock();
        let had_pending = inner.pending.iter().any(|(h, _)| *h == handle);
        inner.pending.retain(|(h, _)| *h != handle);
        if !had_pending {
            inner.cancelled.insert(handle);
        }
    }

    /// Take every completion scheduled since the last drain. Only the
    /// session's own task may call this (§5: "cleared only by the I/O
    /// thread").
    pub(crate) fn drain(&self) -> Vec<(CompletionHandle, CompletionOutcome)> {
        let mut inner = self.inner.lock();
        std::mem::take(&mut inner.pending)
    }
}
