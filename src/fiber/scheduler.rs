use std::collections::{BTreeSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use ahash::AHashMap;
use anyhow::anyhow;
use parking_lot::{Condvar, Mutex};

use crate::error::RuntimeError;
use crate::fiber::{CondId, Fiber, FiberId, FiberState, StepResult};
use crate::modest::{Kernel, Operation};
use crate::utils::interrupt;

enum SlotState {
    Ready,
    Running,
    Sleeping(Instant),
    Blocked(CondId),
}

struct FiberSlot {
    // taken out of the slot while its step runs
    fiber: Option<Box<dyn Fiber>>,
    state: SlotState,
    // wake() arrived while the fiber was mid-step; overrides the next
    // sleep/block request so an eligible fiber re-enqueues promptly
    wake_pending: bool,
}

struct SchedInner {
    slots: AHashMap<FiberId, FiberSlot>,
    ready: VecDeque<FiberId>,
    sleeping: BTreeSet<(Instant, FiberId)>,
    blocked: AHashMap<CondId, Vec<FiberId>>,
    active_steps: usize,
    errors: AHashMap<FiberId, anyhow::Error>,
}

impl SchedInner {
    fn drained(&self) -> bool {
        self.slots.is_empty() && self.active_steps == 0
    }

    fn make_ready(&mut self, id: FiberId) {
        if let Some(slot) = self.slots.get_mut(&id) {
            slot.state = SlotState::Ready;
            self.ready.push_back(id);
        }
    }

    /// Move sleepers whose deadline has passed back to the ready queue.
    fn wake_due_sleepers(&mut self, now: Instant) -> bool {
        let mut woke = false;
        while let Some(&(deadline, id)) = self.sleeping.iter().next() {
            if deadline > now {
                break;
            }
            self.sleeping.remove(&(deadline, id));
            self.make_ready(id);
            woke = true;
        }
        woke
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.sleeping.iter().next().map(|&(deadline, _)| deadline)
    }
}

struct FiberShared {
    inner: Mutex<SchedInner>,
    /// Scheduler threads park here when nothing is ready.
    work_cv: Condvar,
    /// `wait_for_last_fiber_exit` callers park here.
    idle_cv: Condvar,
    running: AtomicBool,
    next_fiber: AtomicU64,
    next_cond: AtomicU64,
}

impl FiberShared {
    fn add_fiber(&self, fiber: Box<dyn Fiber>) -> FiberId {
        let id = self.next_fiber.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock();
        inner.slots.insert(
            id,
            FiberSlot {
                fiber: Some(fiber),
                state: SlotState::Ready,
                wake_pending: false,
            },
        );
        inner.ready.push_back(id);
        self.work_cv.notify_one();
        id
    }

    fn wake(&self, id: FiberId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(slot) = inner.slots.get_mut(&id) else {
            return;
        };
        match slot.state {
            SlotState::Sleeping(deadline) => {
                inner.sleeping.remove(&(deadline, id));
                slot.state = SlotState::Ready;
                inner.ready.push_back(id);
                self.work_cv.notify_one();
            }
            SlotState::Blocked(cond) => {
                if let Some(waiters) = inner.blocked.get_mut(&cond) {
                    waiters.retain(|w| *w != id);
                }
                slot.state = SlotState::Ready;
                inner.ready.push_back(id);
                self.work_cv.notify_one();
            }
            SlotState::Running => {
                slot.wake_pending = true;
            }
            SlotState::Ready => {}
        }
    }

    fn wake_all(&self, cond: CondId) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let Some(waiters) = inner.blocked.remove(&cond) else {
            return;
        };
        for id in waiters {
            inner.make_ready(id);
        }
        self.work_cv.notify_all();
    }
}

/// Round-robin scheduler for cooperative fibers.
///
/// Scheduling threads are operations submitted to the kernel engine, so
/// they ride on the thread pool like any other work; each holds a pool
/// slot for as long as the scheduler runs. Clones share one scheduler.
#[derive(Clone)]
pub struct FiberScheduler {
    shared: Arc<FiberShared>,
}

impl Default for FiberScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl FiberScheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(FiberShared {
                inner: Mutex::new(SchedInner {
                    slots: AHashMap::new(),
                    ready: VecDeque::new(),
                    sleeping: BTreeSet::new(),
                    blocked: AHashMap::new(),
                    active_steps: 0,
                    errors: AHashMap::new(),
                }),
                work_cv: Condvar::new(),
                idle_cv: Condvar::new(),
                running: AtomicBool::new(false),
                next_fiber: AtomicU64::new(1),
                next_cond: AtomicU64::new(1),
            }),
        }
    }

    /// Register a fiber. Fibers added before [`start`](Self::start) run
    /// once the scheduler threads come up.
    pub fn add_fiber(&self, fiber: impl Fiber) -> FiberId {
        self.shared.add_fiber(Box::new(fiber))
    }

    /// A fresh condition handle for [`StepResult::Block`].
    pub fn new_cond(&self) -> CondId {
        CondId(self.shared.next_cond.fetch_add(1, Ordering::Relaxed))
    }

    /// Submit `threads` scheduler loops to the kernel engine.
    pub fn start(&self, kernel: &Kernel, threads: usize) -> Vec<Operation> {
        self.shared.running.store(true, Ordering::Release);
        (0..threads.max(1))
            .map(|_| {
                kernel.submit(SchedulerWorker {
                    shared: self.shared.clone(),
                })
            })
            .collect()
    }

    /// [`start`](Self::start) sized by a [`FiberConfig`].
    pub fn start_with(&self, kernel: &Kernel, cfg: &crate::fiber::FiberConfig) -> Vec<Operation> {
        self.start(kernel, cfg.scheduler_threads)
    }

    /// Tell scheduler threads to exit after their current step.
    pub fn stop(&self) {
        self.shared.running.store(false, Ordering::Release);
        self.shared.work_cv.notify_all();
    }

    /// Move a sleeping or blocked fiber to the ready queue. A wake that
    /// races with the fiber's own step is remembered and applied to the
    /// step's parking request.
    pub fn wake(&self, id: FiberId) {
        self.shared.wake(id);
    }

    /// Ready every fiber blocked on `cond`.
    pub fn wake_all(&self, cond: CondId) {
        self.shared.wake_all(cond);
    }

    /// Fibers not yet dead.
    pub fn fiber_count(&self) -> usize {
        self.shared.inner.lock().slots.len()
    }

    pub fn state_of(&self, id: FiberId) -> FiberState {
        let inner = self.shared.inner.lock();
        match inner.slots.get(&id) {
            None => FiberState::Dead,
            Some(slot) => match slot.state {
                SlotState::Ready => FiberState::Ready,
                SlotState::Running => FiberState::Running,
                SlotState::Sleeping(_) => FiberState::Sleeping,
                SlotState::Blocked(_) => FiberState::Blocked,
            },
        }
    }

    /// Error captured from a fiber whose step panicked. Takes ownership.
    pub fn take_error(&self, id: FiberId) -> Option<anyhow::Error> {
        self.shared.inner.lock().errors.remove(&id)
    }

    /// Block the caller until the ready, sleeping and blocked sets are
    /// all empty. With `drain_sleepers` false, currently sleeping fibers
    /// are cancelled instead of awaited. Interruptible.
    pub fn wait_for_last_fiber_exit(&self, drain_sleepers: bool) -> Result<(), RuntimeError> {
        let mut guard = self.shared.inner.lock();
        if !drain_sleepers {
            let inner = &mut *guard;
            for (_, id) in std::mem::take(&mut inner.sleeping) {
                inner.slots.remove(&id);
            }
            self.shared.work_cv.notify_all();
        }
        loop {
            if guard.drained() {
                return Ok(());
            }
            if interrupt::interrupted() {
                return Err(RuntimeError::Interrupted);
            }
            self.shared
                .idle_cv
                .wait_for(&mut guard, Duration::from_millis(20));
        }
    }
}

/// The body of one scheduler thread, run as a kernel operation.
struct SchedulerWorker {
    shared: Arc<FiberShared>,
}

impl crate::dispatch::Runnable for SchedulerWorker {
    fn run(&self) -> anyhow::Result<()> {
        let shared = &self.shared;
        loop {
            if !shared.running.load(Ordering::Acquire) || interrupt::interrupted() {
                return Ok(());
            }

            let mut guard = shared.inner.lock();
            let now = Instant::now();
            guard.wake_due_sleepers(now);

            let Some(id) = guard.ready.pop_front() else {
                // idle until the next sleep deadline or an external wake;
                // capped so stop and interrupt stay observed
                let wait = guard
                    .next_deadline()
                    .map(|deadline| deadline.saturating_duration_since(now))
                    .unwrap_or(Duration::from_millis(50))
                    .clamp(Duration::from_millis(1), Duration::from_millis(50));
                shared.work_cv.wait_for(&mut guard, wait);
                continue;
            };

            let Some(slot) = guard.slots.get_mut(&id) else {
                continue;
            };
            slot.state = SlotState::Running;
            slot.wake_pending = false;
            let mut fiber = slot.fiber.take().expect("ready fiber has a body");
            guard.active_steps += 1;
            drop(guard);

            let cx = FiberCx { id, shared };
            let outcome = catch_unwind(AssertUnwindSafe(|| fiber.step(&cx)));

            let mut guard = shared.inner.lock();
            guard.active_steps -= 1;
            match outcome {
                Err(payload) => {
                    let msg = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "panic (unknown type)".into());
                    tracing::error!("[FiberScheduler] fiber {id} panicked: {msg}");
                    guard.errors.insert(id, anyhow!("fiber panicked: {msg}"));
                    guard.slots.remove(&id);
                }
                Ok(StepResult::Exit) => {
                    guard.slots.remove(&id);
                }
                Ok(request) => {
                    let inner = &mut *guard;
                    let slot = inner.slots.get_mut(&id).expect("running fiber has a slot");
                    slot.fiber = Some(fiber);
                    let woken = std::mem::take(&mut slot.wake_pending);
                    match request {
                        StepResult::Yield => {
                            slot.state = SlotState::Ready;
                            inner.ready.push_back(id);
                        }
                        StepResult::Sleep(_) | StepResult::Block(_) if woken => {
                            slot.state = SlotState::Ready;
                            inner.ready.push_back(id);
                        }
                        StepResult::Sleep(duration) => {
                            let deadline = Instant::now() + duration;
                            slot.state = SlotState::Sleeping(deadline);
                            inner.sleeping.insert((deadline, id));
                        }
                        StepResult::Block(cond) => {
                            slot.state = SlotState::Blocked(cond);
                            inner.blocked.entry(cond).or_default().push(id);
                        }
                        StepResult::Exit => unreachable!("handled above"),
                    }
                    shared.work_cv.notify_one();
                }
            }
            if guard.drained() {
                shared.idle_cv.notify_all();
            }
        }
    }
}

/// Scheduler context handed to each fiber step.
pub struct FiberCx<'a> {
    id: FiberId,
    shared: &'a Arc<FiberShared>,
}

impl FiberCx<'_> {
    #[inline]
    pub fn id(&self) -> FiberId {
        self.id
    }

    /// Add a fiber from within a step.
    pub fn spawn(&self, fiber: impl Fiber) -> FiberId {
        self.shared.add_fiber(Box::new(fiber))
    }

    /// Ready another fiber.
    pub fn wake(&self, id: FiberId) {
        self.shared.wake(id);
    }

    /// Ready every fiber blocked on `cond`.
    pub fn wake_all(&self, cond: CondId) {
        self.shared.wake_all(cond);
    }

    /// Cooperative interrupt status of the scheduler thread.
    pub fn interrupted(&self) -> bool {
        interrupt::interrupted()
    }
}
