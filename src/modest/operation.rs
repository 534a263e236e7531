use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::dispatch::Runnable;
use crate::error::RuntimeError;
use crate::modest::state::{StateMut, StateView};
use crate::utils::InterruptFlag;
use crate::utils::interrupt;

/// Admission predicates evaluated against the shared state before an
/// operation is handed to the pool.
///
/// Returning `false` from both predicates defers the operation: it stays
/// queued and is re-evaluated on the next dispatch pass. Neither call
/// may mutate the state.
pub trait OperationGuard: Send + Sync + 'static {
    /// May the operation run right now?
    fn can_execute(&self, state: &StateView<'_>, op: &Operation) -> bool;

    /// When admission fails, should the operation be cancelled instead
    /// of deferred?
    fn must_cancel_after_wait(&self, state: &StateView<'_>, op: &Operation) -> bool {
        let _ = (state, op);
        false
    }
}

/// Paired hooks applied under the state lock immediately before and
/// after the operation's runnable.
///
/// `mutate_post_execute` runs on every terminal path of a started
/// operation, including error and panic, and is followed by a dispatcher
/// wakeup since it may have unblocked another operation's guard.
pub trait StateMutator: Send + Sync + 'static {
    fn mutate_pre_execute(&self, state: &mut StateMut<'_>, op: &Operation) {
        let _ = (state, op);
    }

    fn mutate_post_execute(&self, state: &mut StateMut<'_>, op: &Operation) {
        let _ = (state, op);
    }
}

#[derive(Default)]
struct OpFlags {
    started: bool,
    interrupted: bool,
    stopped: bool,
    finished: bool,
    canceled: bool,
    // interrupt flag of the worker currently running the operation
    worker: Option<InterruptFlag>,
}

struct OperationInner {
    runnable: Arc<dyn Runnable>,
    guard: Option<Arc<dyn OperationGuard>>,
    mutator: Option<Arc<dyn StateMutator>>,
    flags: Mutex<OpFlags>,
    done_cv: Condvar,
    error: Mutex<Option<anyhow::Error>>,
}

/// A unit of work bound to an optional guard and state mutator, plus its
/// lifecycle flags.
///
/// `Operation` is a cheap clonable handle; all clones observe the same
/// lifecycle. Flag invariants: `finished` implies `stopped`; `canceled`
/// implies `stopped` and never `started`; at most one of `finished` and
/// `canceled` is ever set, and no flag regresses once `stopped`.
#[derive(Clone)]
pub struct Operation {
    inner: Arc<OperationInner>,
}

impl Operation {
    pub fn new(runnable: impl Runnable) -> Self {
        Self::with_hooks(Arc::new(runnable), None, None)
    }

    pub fn with_hooks(
        runnable: Arc<dyn Runnable>,
        guard: Option<Arc<dyn OperationGuard>>,
        mutator: Option<Arc<dyn StateMutator>>,
    ) -> Self {
        Self {
            inner: Arc::new(OperationInner {
                runnable,
                guard,
                mutator,
                flags: Mutex::new(OpFlags::default()),
                done_cv: Condvar::new(),
                error: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn runnable(&self) -> &Arc<dyn Runnable> {
        &self.inner.runnable
    }

    #[inline]
    pub(crate) fn guard(&self) -> Option<&Arc<dyn OperationGuard>> {
        self.inner.guard.as_ref()
    }

    #[inline]
    pub(crate) fn mutator(&self) -> Option<&Arc<dyn StateMutator>> {
        self.inner.mutator.as_ref()
    }

    /// Same underlying operation as `other`?
    #[inline]
    pub fn same(&self, other: &Operation) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn started(&self) -> bool {
        self.inner.flags.lock().started
    }

    pub fn stopped(&self) -> bool {
        self.inner.flags.lock().stopped
    }

    pub fn finished(&self) -> bool {
        self.inner.flags.lock().finished
    }

    pub fn canceled(&self) -> bool {
        self.inner.flags.lock().canceled
    }

    /// Interrupt the operation. If it is running, the worker thread's
    /// interrupt flag is raised; if it has not started yet, the flag is
    /// raised the moment a worker picks it up. Idempotent.
    pub fn interrupt(&self) {
        let mut flags = self.inner.flags.lock();
        if !flags.interrupted {
            flags.interrupted = true;
            if let Some(worker) = &flags.worker {
                worker.set();
            }
        }
    }

    /// Has the operation been interrupted? Syncs lazily from the worker
    /// thread's flag while the operation is running.
    pub fn is_interrupted(&self) -> bool {
        let mut flags = self.inner.flags.lock();
        if !flags.interrupted
            && let Some(worker) = &flags.worker
        {
            flags.interrupted = worker.is_set();
        }
        flags.interrupted
    }

    /// Error captured from the runnable, if it terminated with one.
    /// Takes ownership; subsequent calls return `None`.
    pub fn take_error(&self) -> Option<anyhow::Error> {
        self.inner.error.lock().take()
    }

    /// Block until the operation stops.
    ///
    /// If the calling thread is interrupted while waiting and
    /// `interruptible` is true, returns [`RuntimeError::Interrupted`]
    /// immediately with the thread's interrupt flag left set. With
    /// `interruptible` false the wait absorbs interrupts until the
    /// operation stops, then re-raises the interrupt on the caller.
    pub fn wait_for(&self, interruptible: bool) -> Result<(), RuntimeError> {
        self.wait_timeout(interruptible, 0)
    }

    /// [`wait_for`](Self::wait_for) with a bound in milliseconds; zero
    /// means no timeout. An expired wait returns
    /// [`RuntimeError::TimedOut`] and does not touch the interrupt flag.
    pub fn wait_timeout(&self, interruptible: bool, timeout_ms: u64) -> Result<(), RuntimeError> {
        let deadline =
            (timeout_ms > 0).then(|| std::time::Instant::now() + Duration::from_millis(timeout_ms));
        let mut was_interrupted = false;
        let mut timed_out = false;
        {
            let mut flags = self.inner.flags.lock();
            while !flags.stopped {
                if interrupt::interrupted() {
                    was_interrupted = true;
                    if interruptible {
                        break;
                    }
                    // absorb and keep waiting; re-raised below
                    interrupt::take_interrupted();
                }
                if let Some(deadline) = deadline
                    && std::time::Instant::now() >= deadline
                {
                    timed_out = true;
                    break;
                }
                self.inner
                    .done_cv
                    .wait_for(&mut flags, Duration::from_millis(20));
            }
        }

        if was_interrupted {
            interrupt::interrupt_current();
            if interruptible {
                return Err(RuntimeError::Interrupted);
            }
        }
        if timed_out {
            return Err(RuntimeError::TimedOut);
        }
        Ok(())
    }

    // ---- lifecycle transitions, driven by the engine ----

    /// The runnable is about to execute on the current worker thread.
    pub(crate) fn begin(&self, worker: InterruptFlag) {
        let mut flags = self.inner.flags.lock();
        flags.started = true;
        if flags.interrupted {
            worker.set();
        }
        flags.worker = Some(worker);
    }

    /// Terminal transition for an executed operation.
    pub(crate) fn finish(&self, error: Option<anyhow::Error>) {
        let mut flags = self.inner.flags.lock();
        if flags.stopped {
            return;
        }
        *self.inner.error.lock() = error;
        flags.finished = true;
        flags.stopped = true;
        flags.worker = None;
        self.inner.done_cv.notify_all();
    }

    /// Terminal transition for an operation that never ran.
    pub(crate) fn cancel(&self) {
        let mut flags = self.inner.flags.lock();
        if flags.stopped {
            return;
        }
        flags.canceled = true;
        flags.stopped = true;
        self.inner.done_cv.notify_all();
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = self.inner.flags.lock();
        f.debug_struct("Operation")
            .field("started", &flags.started)
            .field("interrupted", &flags.interrupted)
            .field("stopped", &flags.stopped)
            .field("finished", &flags.finished)
            .field("canceled", &flags.canceled)
            .finish()
    }
}
