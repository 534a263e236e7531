use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use anyhow::anyhow;

use crate::dispatch::{Admission, DispatchEntry, JobDispatcher};
use crate::modest::operation::Operation;
use crate::modest::state::State;
use crate::pool::{PoolConfig, ThreadPool};
use crate::utils::interrupt;

/// Queue entry for a guarded operation.
///
/// Admission consults the guard under the state read lock; preparation
/// applies the pre-execution mutator under the write lock, on the
/// dispatcher thread, before the hand-off; execution on the worker runs
/// the runnable and then the post-execution mutator on every terminal
/// path.
struct OperationEntry {
    op: Operation,
    state: Arc<State>,
}

impl DispatchEntry for OperationEntry {
    fn admit(&mut self) -> Admission {
        // dequeued via tombstone is handled by the dispatcher; a guard
        // only decides run/defer/cancel
        let Some(guard) = self.op.guard() else {
            return Admission::Run;
        };
        self.state.read(|view| {
            if guard.can_execute(view, &self.op) {
                Admission::Run
            } else if guard.must_cancel_after_wait(view, &self.op) {
                Admission::Cancel
            } else {
                Admission::Defer
            }
        })
    }

    fn prepare(&mut self) {
        if let Some(mutator) = self.op.mutator() {
            self.state
                .write(|state| mutator.mutate_pre_execute(state, &self.op));
        }
    }

    fn execute(self: Box<Self>) {
        self.op.begin(interrupt::current_flag());

        let outcome = catch_unwind(AssertUnwindSafe(|| self.op.runnable().run()));
        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "panic (unknown type)".into());
                Some(anyhow!("operation panicked: {msg}"))
            }
        };

        if let Some(mutator) = self.op.mutator() {
            let applied = catch_unwind(AssertUnwindSafe(|| {
                self.state
                    .write(|state| mutator.mutate_post_execute(state, &self.op));
            }));
            if applied.is_err() {
                tracing::error!("[Engine] post-execute mutator panicked");
            }
        }
        self.op.finish(error);
        // the dispatcher's completion wrapper wakes the queue, so a
        // post-mutation that unblocked some guard is re-evaluated
    }

    fn cancel(self: Box<Self>) {
        self.op.cancel();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The operation engine: a [`JobDispatcher`] specialization that runs
/// [`Operation`]s under guard predicates against a shared [`State`].
pub struct Engine {
    dispatcher: JobDispatcher,
    state: Arc<State>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Engine {
    pub fn new(pool_cfg: PoolConfig) -> Self {
        Self::with_pool(ThreadPool::new(pool_cfg))
    }

    pub fn with_pool(pool: ThreadPool) -> Self {
        Self {
            dispatcher: JobDispatcher::new(pool),
            state: Arc::new(State::new()),
        }
    }

    #[inline]
    pub fn state(&self) -> &Arc<State> {
        &self.state
    }

    #[inline]
    pub fn dispatcher(&self) -> &JobDispatcher {
        &self.dispatcher
    }

    /// Start dispatching queued operations.
    pub fn start(&self) {
        self.dispatcher.start();
    }

    /// Stop dispatching, interrupt running operations and join the pool.
    pub fn stop(&self) {
        self.dispatcher.stop();
        self.dispatcher.terminate_all_running();
    }

    /// Queue an operation. The handle stays with the caller for
    /// interruption and waiting.
    pub fn queue(&self, op: &Operation) {
        self.dispatcher.queue_entry(Box::new(OperationEntry {
            op: op.clone(),
            state: self.state.clone(),
        }));
    }

    /// Tombstone a queued operation so it will not run. It is marked
    /// canceled on the next dispatch sweep.
    pub fn dequeue(&self, op: &Operation) {
        self.dispatcher.dequeue_where(|entry| {
            entry
                .as_any()
                .downcast_ref::<OperationEntry>()
                .is_some_and(|e| e.op.same(op))
        });
    }

    /// Mutate the shared state from outside any operation and wake the
    /// dispatcher, since the change may have unblocked a guard.
    pub fn mutate_state<R>(
        &self,
        f: impl FnOnce(&mut crate::modest::state::StateMut<'_>) -> R,
    ) -> R {
        let result = self.state.write(f);
        self.dispatcher.wakeup();
        result
    }
}
