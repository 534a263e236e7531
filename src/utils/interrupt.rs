use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam::utils::CachePadded;

/// Cheaply clonable cooperative interrupt flag.
///
/// Wraps an `AtomicBool` in `Arc<CachePadded<...>>` to avoid false
/// sharing between a polling worker and the thread that interrupts it.
/// Interruption never preempts: running code observes the flag at its
/// next check and blocking primitives in this crate poll it.
#[derive(Clone)]
#[repr(transparent)]
pub struct InterruptFlag(Arc<CachePadded<AtomicBool>>);

impl InterruptFlag {
    #[inline]
    pub fn new() -> Self {
        Self(Arc::new(CachePadded::new(AtomicBool::new(false))))
    }

    /// Raise the flag. Idempotent.
    #[inline]
    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Lower the flag.
    #[inline]
    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    /// Peek without clearing.
    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Read and clear in one step. Returns the prior value.
    #[inline]
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }

    /// Two handles to the same underlying flag?
    #[inline]
    pub fn same(&self, other: &InterruptFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for InterruptFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for InterruptFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptFlag")
            .field("set", &self.is_set())
            .finish()
    }
}

thread_local! {
    // Lazily assigned per-thread flag. Pool workers install their own
    // long-lived flag on spawn; any other thread gets a private one on
    // first use.
    static CURRENT: RefCell<InterruptFlag> = RefCell::new(InterruptFlag::new());
}

/// The calling thread's interrupt flag.
pub fn current_flag() -> InterruptFlag {
    CURRENT.with(|c| c.borrow().clone())
}

/// Install `flag` as the calling thread's interrupt flag, returning the
/// previous one. Pool workers use this so external interrupters can
/// reach the thread a job is running on.
pub fn install_current(flag: InterruptFlag) -> InterruptFlag {
    CURRENT.with(|c| std::mem::replace(&mut *c.borrow_mut(), flag))
}

/// Has the calling thread been interrupted? The flag stays set, so a
/// subsequent interruptible wait returns immediately.
#[inline]
pub fn interrupted() -> bool {
    CURRENT.with(|c| c.borrow().is_set())
}

/// Read and clear the calling thread's interrupt status.
#[inline]
pub fn take_interrupted() -> bool {
    CURRENT.with(|c| c.borrow().take())
}

/// Interrupt the calling thread. Re-interruption is a no-op.
#[inline]
pub fn interrupt_current() {
    CURRENT.with(|c| c.borrow().set());
}
