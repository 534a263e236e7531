//! Cooperative, stackless fibers multiplexed onto the operation engine.
//!
//! A fiber is a bounded step function re-invoked by a scheduler thread;
//! the scheduler is the stack. Each step returns what to do next: yield
//! to the back of the ready queue, sleep until a deadline, block on a
//! condition, or exit. A fiber step must never call into blocking pool
//! primitives; it yields instead.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use scheduler::{FiberCx, FiberScheduler};

mod scheduler;

/// Per-fiber integer id, assigned on add.
pub type FiberId = u64;

/// Handle for a wait condition created by
/// [`FiberScheduler::new_cond`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CondId(pub(crate) u64);

/// What a fiber asks for when its step returns.
#[derive(Debug)]
pub enum StepResult {
    /// Re-enqueue at the ready tail.
    Yield,
    /// Park until the deadline elapses (or an explicit wake).
    Sleep(Duration),
    /// Park until the condition is signalled.
    Block(CondId),
    /// The fiber is done.
    Exit,
}

/// Lifecycle state of a fiber, as observed from outside.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FiberState {
    Ready,
    Running,
    Sleeping,
    Blocked,
    Dead,
}

/// A cooperative stackless task.
///
/// `step` executes one bounded increment and returns to the scheduler.
/// Panics inside a step terminate the fiber and land in its error slot.
pub trait Fiber: Send + 'static {
    fn step(&mut self, cx: &FiberCx<'_>) -> StepResult;
}

fn default_scheduler_threads() -> usize {
    1
}

/// Sizing knobs for a [`FiberScheduler`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiberConfig {
    /// Scheduler threads run as long-lived operations on the kernel and
    /// hold a pool slot each for their lifetime.
    #[serde(default = "default_scheduler_threads")]
    pub scheduler_threads: usize,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            scheduler_threads: default_scheduler_threads(),
        }
    }
}
