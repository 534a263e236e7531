//! FIFO job dispatch onto the thread pool.
//!
//! A single dispatcher thread owns the submission queue. Each pass walks
//! the queue oldest-first and hands entries to the pool until it
//! saturates; entries whose admission hook defers stay queued without
//! blocking the ones behind them. The thread then sleeps until a
//! submission, a tombstone, a job completion or an explicit wakeup.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::pool::{PoolConfig, ThreadPool};
use crate::utils::try_pin_core;

/// A unit of work. Errors are captured and logged (or attached to the
/// owning operation); they never unwind into the pool worker.
pub trait Runnable: Send + Sync + 'static {
    fn run(&self) -> anyhow::Result<()>;
}

impl<F> Runnable for F
where
    F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
{
    fn run(&self) -> anyhow::Result<()> {
        self()
    }
}

/// How a queued work unit is owned.
///
/// `Shared` submissions leave a handle with the caller, which can later
/// dequeue by identity; `Owned` ones belong to the queue and drop with
/// their entry.
pub enum Submission {
    Owned(Box<dyn Runnable>),
    Shared(Arc<dyn Runnable>),
}

impl Submission {
    #[inline]
    pub fn runnable(&self) -> &dyn Runnable {
        match self {
            Submission::Owned(job) => &**job,
            Submission::Shared(job) => &**job,
        }
    }

    /// Identity match for dequeueing; owned submissions have no external
    /// identity.
    #[inline]
    pub fn matches(&self, target: &Arc<dyn Runnable>) -> bool {
        match self {
            Submission::Owned(_) => false,
            Submission::Shared(job) => Arc::ptr_eq(job, target),
        }
    }
}

impl From<Box<dyn Runnable>> for Submission {
    fn from(job: Box<dyn Runnable>) -> Self {
        Submission::Owned(job)
    }
}

impl From<Arc<dyn Runnable>> for Submission {
    fn from(job: Arc<dyn Runnable>) -> Self {
        Submission::Shared(job)
    }
}

/// Verdict of an entry's admission hook on one dispatch pass.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Admission {
    /// Hand to the pool now.
    Run,
    /// Leave queued; skip on this pass without blocking later entries.
    Defer,
    /// Drop the entry; it must not run.
    Cancel,
}

/// A queue entry as the dispatcher sees it.
///
/// `admit` and `prepare` run on the dispatcher thread; `execute` runs on
/// a pool worker. The split lets a specialization evaluate guards and
/// apply pre-execution state changes before the hand-off.
pub trait DispatchEntry: Send + 'static {
    fn admit(&mut self) -> Admission {
        Admission::Run
    }

    /// Called once, after admission succeeds and a pool permit is held,
    /// immediately before the hand-off.
    fn prepare(&mut self) {}

    /// Run the work unit on a pool worker.
    fn execute(self: Box<Self>);

    /// The entry was cancelled (admission verdict, dequeue or clear)
    /// and will never execute.
    fn cancel(self: Box<Self>) {}

    /// Identity match against a shared runnable handle.
    fn matches(&self, target: &Arc<dyn Runnable>) -> bool {
        let _ = target;
        false
    }

    fn as_any(&self) -> &dyn Any;
}

struct JobEntry {
    job: Submission,
}

impl DispatchEntry for JobEntry {
    fn execute(self: Box<Self>) {
        if let Err(e) = self.job.runnable().run() {
            tracing::error!("[JobDispatcher] job failed: {e:#}");
        }
    }

    fn matches(&self, target: &Arc<dyn Runnable>) -> bool {
        self.job.matches(target)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct Slot {
    entry: Option<Box<dyn DispatchEntry>>,
    tombstone: bool,
}

struct Queue {
    slots: VecDeque<Slot>,
    queued: usize,
    wake_pending: bool,
}

struct DispatcherShared {
    queue: Mutex<Queue>,
    wake_cv: Condvar,
    running: AtomicBool,
    term_flag: Mutex<Option<Arc<AtomicBool>>>,
    core_id: Mutex<Option<usize>>,
}

impl DispatcherShared {
    fn wakeup(&self) {
        let mut q = self.queue.lock();
        q.wake_pending = true;
        self.wake_cv.notify_all();
    }
}

/// Single-threaded FIFO dispatcher over a [`ThreadPool`].
pub struct JobDispatcher {
    shared: Arc<DispatcherShared>,
    pool: Arc<ThreadPool>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl JobDispatcher {
    pub fn new(pool: ThreadPool) -> Self {
        Self {
            shared: Arc::new(DispatcherShared {
                queue: Mutex::new(Queue {
                    slots: VecDeque::new(),
                    queued: 0,
                    wake_pending: false,
                }),
                wake_cv: Condvar::new(),
                running: AtomicBool::new(false),
                term_flag: Mutex::new(None),
                core_id: Mutex::new(None),
            }),
            pool: Arc::new(pool),
            join: Mutex::new(None),
        }
    }

    /// Dispatcher over a default-sized pool (10 workers, 2 min expiry).
    pub fn with_default_pool() -> Self {
        Self::new(ThreadPool::new(PoolConfig::default()))
    }

    #[inline]
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// Observe `flag` on every pass and stop dispatching once it is set.
    /// Wired to TERM signals by the kernel.
    pub fn set_term_flag(&self, flag: Arc<AtomicBool>) {
        *self.shared.term_flag.lock() = Some(flag);
    }

    /// Pin the dispatcher thread to a core on start.
    pub fn set_core_id(&self, core_id: usize) {
        *self.shared.core_id.lock() = Some(core_id);
    }

    /// Spawn the dispatcher thread. Idempotent while running.
    pub fn start(&self) {
        let mut join = self.join.lock();
        if join.is_some() {
            return;
        }
        self.shared.running.store(true, Ordering::Release);

        let shared = self.shared.clone();
        let pool = self.pool.clone();
        let handle = thread::Builder::new()
            .name("job-dispatcher".to_string())
            .spawn(move || dispatch_loop(shared, pool))
            .expect("failed to spawn dispatcher thread");
        *join = Some(handle);
    }

    /// Stop dispatching and join the dispatcher thread. Running jobs are
    /// not affected; queued entries stay queued.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.wakeup();
        if let Some(handle) = self.join.lock().take() {
            let _ = handle.join();
        }
    }

    pub fn is_dispatching(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Queue a specialized entry.
    pub fn queue_entry(&self, entry: Box<dyn DispatchEntry>) {
        let mut q = self.shared.queue.lock();
        q.slots.push_back(Slot {
            entry: Some(entry),
            tombstone: false,
        });
        q.queued += 1;
        q.wake_pending = true;
        self.shared.wake_cv.notify_all();
    }

    /// Queue a plain work unit.
    pub fn queue(&self, submission: impl Into<Submission>) {
        self.queue_entry(Box::new(JobEntry {
            job: submission.into(),
        }));
    }

    /// Tombstone every queued entry matching `job`. Physical removal
    /// happens on the next dispatch sweep.
    pub fn dequeue(&self, job: &Arc<dyn Runnable>) {
        self.dequeue_where(|entry| entry.matches(job));
    }

    /// Tombstone every queued entry the predicate selects.
    pub fn dequeue_where(&self, pred: impl Fn(&dyn DispatchEntry) -> bool) {
        let mut q = self.shared.queue.lock();
        for slot in q.slots.iter_mut() {
            if !slot.tombstone
                && slot.entry.as_deref().is_some_and(|entry| pred(entry))
            {
                slot.tombstone = true;
            }
        }
        q.queued = q.slots.iter().filter(|s| !s.tombstone).count();
        q.wake_pending = true;
        self.shared.wake_cv.notify_all();
    }

    /// Is a matching entry still queued (and not tombstoned)?
    pub fn is_queued(&self, job: &Arc<dyn Runnable>) -> bool {
        let q = self.shared.queue.lock();
        q.slots
            .iter()
            .any(|s| !s.tombstone && s.entry.as_deref().is_some_and(|e| e.matches(job)))
    }

    /// Drop every queued entry. Running jobs are unaffected.
    pub fn clear_queued(&self) {
        let mut q = self.shared.queue.lock();
        for slot in q.slots.iter_mut() {
            slot.tombstone = true;
        }
        q.queued = 0;
        q.wake_pending = true;
        self.shared.wake_cv.notify_all();
    }

    /// Nudge the dispatcher to re-run a pass, e.g. after an external
    /// state change that may have unblocked an admission guard.
    pub fn wakeup(&self) {
        self.shared.wakeup();
    }

    pub fn queued_jobs(&self) -> usize {
        self.shared.queue.lock().queued
    }

    /// Queued plus currently running.
    pub fn total_jobs(&self) -> usize {
        self.queued_jobs() + self.pool.running_jobs()
    }

    /// Cooperative interrupt for every running job.
    pub fn interrupt_all_running(&self) {
        self.pool.interrupt_all();
    }

    /// Interrupt and join all pool workers.
    pub fn terminate_all_running(&self) {
        self.pool.terminate_all();
    }
}

impl Drop for JobDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn dispatch_loop(shared: Arc<DispatcherShared>, pool: Arc<ThreadPool>) {
    if let Some(core_id) = *shared.core_id.lock() {
        match try_pin_core(core_id) {
            Ok(core_id) => tracing::info!("[JobDispatcher] pinned to core {core_id}"),
            Err(e) => tracing::warn!("[JobDispatcher] cannot pin core: {e}"),
        }
    }

    loop {
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        if let Some(term) = shared.term_flag.lock().as_ref()
            && term.load(Ordering::Relaxed)
        {
            tracing::warn!("[JobDispatcher] termination signal received");
            shared.running.store(false, Ordering::Release);
            break;
        }

        sweep(&shared, &pool);

        let mut q = shared.queue.lock();
        if !q.wake_pending {
            // bounded wait so the stop and term flags stay observed
            shared
                .wake_cv
                .wait_for(&mut q, Duration::from_millis(50));
        }
        q.wake_pending = false;
    }
}

/// One pass over the queue, oldest entry first.
fn sweep(shared: &Arc<DispatcherShared>, pool: &ThreadPool) {
    let mut q = shared.queue.lock();
    let mut i = 0;
    while i < q.slots.len() {
        if q.slots[i].tombstone {
            let slot = q.slots.remove(i).expect("slot index in bounds");
            if let Some(entry) = slot.entry {
                entry.cancel();
            }
            continue;
        }

        let verdict = match q.slots[i].entry.as_deref_mut() {
            None => Admission::Cancel,
            // a panicking admission hook cancels its own entry rather
            // than killing the dispatcher thread
            Some(entry) => match catch_unwind(AssertUnwindSafe(|| entry.admit())) {
                Ok(verdict) => verdict,
                Err(_) => {
                    tracing::error!("[JobDispatcher] admission hook panicked");
                    Admission::Cancel
                }
            },
        };

        match verdict {
            Admission::Defer => {
                i += 1;
            }
            Admission::Cancel => {
                let slot = q.slots.remove(i).expect("slot index in bounds");
                q.queued = q.queued.saturating_sub(1);
                if let Some(entry) = slot.entry {
                    entry.cancel();
                }
            }
            Admission::Run => {
                let Some(permit) = pool.try_permit() else {
                    // saturated; later entries wait for the next pass
                    break;
                };
                let slot = q.slots.remove(i).expect("slot index in bounds");
                q.queued = q.queued.saturating_sub(1);
                let mut entry = slot.entry.expect("admitted slot has an entry");
                if catch_unwind(AssertUnwindSafe(|| entry.prepare())).is_err() {
                    tracing::error!("[JobDispatcher] prepare hook panicked");
                    entry.cancel();
                    continue;
                }

                let waker = Arc::downgrade(shared);
                pool.run_with_permit(permit, move || {
                    entry.execute();
                    if let Some(shared) = waker.upgrade() {
                        shared.wakeup();
                    }
                });
            }
        }
    }
}
