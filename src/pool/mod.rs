//! Bounded pool of long-lived worker threads with idle expiry.
//!
//! Admission is permit-based: at most `max_threads` jobs run at once.
//! Workers hang around after a job waiting for more work and retire on
//! their own once idle longer than the configured expiry.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use ahash::AHashMap;
use crossbeam::channel::{self as cbchan, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::utils::InterruptFlag;
use crate::utils::interrupt;

fn default_max_threads() -> usize {
    10
}

fn default_idle_expiry_ms() -> u64 {
    120_000
}

/// Sizing knobs for a [`ThreadPool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Upper bound on concurrently running jobs and live workers.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,

    /// Idle workers retire after this long without work.
    #[serde(default = "default_idle_expiry_ms")]
    pub idle_expiry_ms: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: default_max_threads(),
            idle_expiry_ms: default_idle_expiry_ms(),
        }
    }
}

type PoolJob = Box<dyn FnOnce() + Send + 'static>;

enum WorkerMsg {
    Job(PoolJob),
    Exit,
}

struct Workers {
    flags: AHashMap<usize, InterruptFlag>,
    handles: AHashMap<usize, thread::JoinHandle<()>>,
    live: usize,
    idle: usize,
    next_seq: usize,
}

impl Workers {
    fn retire(&mut self, seq: usize) {
        self.flags.remove(&seq);
        // dropping our own handle detaches the exiting thread
        self.handles.remove(&seq);
        self.live -= 1;
        self.idle -= 1;
    }
}

struct PoolShared {
    cfg: PoolConfig,
    available: Mutex<usize>,
    admit_cv: Condvar,
    workers: Mutex<Workers>,
    job_tx: Sender<WorkerMsg>,
    job_rx: Receiver<WorkerMsg>,
    running: AtomicUsize,
}

impl PoolShared {
    fn release_permit(&self) {
        let mut available = self.available.lock();
        *available += 1;
        self.admit_cv.notify_one();
    }
}

/// One admission permit, held while a job is queued or running. Dropping
/// an unused permit returns it to the pool.
pub struct PoolPermit {
    shared: Arc<PoolShared>,
    armed: bool,
}

impl Drop for PoolPermit {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release_permit();
        }
    }
}

/// Fixed-capacity worker-thread pool.
///
/// `try_run_job` fails fast when saturated; `run_job` blocks until a
/// permit frees up or the calling thread is interrupted. Interruption of
/// running jobs is cooperative through each worker's [`InterruptFlag`]
/// (`utils::interrupt::interrupted()` from inside the job).
pub struct ThreadPool {
    shared: Arc<PoolShared>,
}

impl ThreadPool {
    pub fn new(cfg: PoolConfig) -> Self {
        let (job_tx, job_rx) = cbchan::unbounded();
        let max = cfg.max_threads.max(1);
        Self {
            shared: Arc::new(PoolShared {
                cfg: PoolConfig {
                    max_threads: max,
                    ..cfg
                },
                available: Mutex::new(max),
                admit_cv: Condvar::new(),
                workers: Mutex::new(Workers {
                    flags: AHashMap::new(),
                    handles: AHashMap::new(),
                    live: 0,
                    idle: 0,
                    next_seq: 0,
                }),
                job_tx,
                job_rx,
                running: AtomicUsize::new(0),
            }),
        }
    }

    #[inline]
    pub fn max_threads(&self) -> usize {
        self.shared.cfg.max_threads
    }

    /// Permits currently free.
    pub fn free_slots(&self) -> usize {
        *self.shared.available.lock()
    }

    /// Jobs currently executing on workers.
    pub fn running_jobs(&self) -> usize {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Live worker threads (busy or idle). Mostly interesting to tests
    /// and diagnostics.
    pub fn live_workers(&self) -> usize {
        self.shared.workers.lock().live
    }

    /// Non-blocking admission: take a permit if one is free.
    pub fn try_permit(&self) -> Option<PoolPermit> {
        let mut available = self.shared.available.lock();
        if *available == 0 {
            return None;
        }
        *available -= 1;
        Some(PoolPermit {
            shared: self.shared.clone(),
            armed: true,
        })
    }

    /// Blocking admission. Returns [`RuntimeError::Interrupted`] if the
    /// calling thread's interrupt flag is raised while waiting; the flag
    /// is left set.
    pub fn acquire_permit(&self) -> Result<PoolPermit, RuntimeError> {
        let mut available = self.shared.available.lock();
        loop {
            if interrupt::interrupted() {
                return Err(RuntimeError::Interrupted);
            }
            if *available > 0 {
                *available -= 1;
                return Ok(PoolPermit {
                    shared: self.shared.clone(),
                    armed: true,
                });
            }
            // bounded slice so an interrupt is observed promptly
            self.shared
                .admit_cv
                .wait_for(&mut available, Duration::from_millis(20));
        }
    }

    /// Hand `job` to a worker under a permit already held. The permit is
    /// released when the job finishes.
    pub fn run_with_permit(&self, mut permit: PoolPermit, job: impl FnOnce() + Send + 'static) {
        debug_assert!(Arc::ptr_eq(&permit.shared, &self.shared));
        permit.armed = false;
        let mut workers = self.shared.workers.lock();
        if workers.idle == 0 && workers.live < self.shared.cfg.max_threads {
            self.spawn_worker(&mut workers);
        }
        // sent under the workers lock so an expiring worker cannot
        // retire between the idle check and the send
        self.shared
            .job_tx
            .send(WorkerMsg::Job(Box::new(job)))
            .expect("pool job channel closed");
    }

    /// Run `job` if a permit is free, without blocking.
    pub fn try_run_job(&self, job: impl FnOnce() + Send + 'static) -> Result<(), RuntimeError> {
        match self.try_permit() {
            Some(permit) => {
                self.run_with_permit(permit, job);
                Ok(())
            }
            None => Err(RuntimeError::PoolSaturated),
        }
    }

    /// Run `job`, blocking until the pool admits it.
    pub fn run_job(&self, job: impl FnOnce() + Send + 'static) -> Result<(), RuntimeError> {
        let permit = self.acquire_permit()?;
        self.run_with_permit(permit, job);
        Ok(())
    }

    /// Raise the interrupt flag of every live worker. Running jobs
    /// observe it at their next cooperative check.
    pub fn interrupt_all(&self) {
        let workers = self.shared.workers.lock();
        for flag in workers.flags.values() {
            flag.set();
        }
    }

    /// Interrupt everything and join every worker. In-flight jobs run to
    /// completion (cooperatively cut short by the interrupt).
    pub fn terminate_all(&self) {
        self.interrupt_all();
        let handles: Vec<_> = {
            let mut workers = self.shared.workers.lock();
            for _ in 0..workers.live {
                self.shared
                    .job_tx
                    .send(WorkerMsg::Exit)
                    .expect("pool job channel closed");
            }
            workers.handles.drain().map(|(_, h)| h).collect()
        };
        for handle in handles {
            let _ = handle.join();
        }
    }

    fn spawn_worker(&self, workers: &mut Workers) {
        let seq = workers.next_seq;
        workers.next_seq += 1;

        let flag = InterruptFlag::new();
        let shared = self.shared.clone();
        let worker_flag = flag.clone();

        let handle = thread::Builder::new()
            .name(format!("pool-worker-{seq}"))
            .spawn(move || worker_loop(shared, seq, worker_flag))
            .expect("failed to spawn pool worker");

        workers.flags.insert(seq, flag);
        workers.handles.insert(seq, handle);
        workers.live += 1;
        workers.idle += 1;
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.terminate_all();
    }
}

fn worker_loop(shared: Arc<PoolShared>, seq: usize, flag: InterruptFlag) {
    interrupt::install_current(flag.clone());
    let expiry = Duration::from_millis(shared.cfg.idle_expiry_ms.max(1));

    loop {
        let msg = match shared.job_rx.recv_timeout(expiry) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => {
                let mut workers = shared.workers.lock();
                // a submitter holding the lock may have just sent work
                match shared.job_rx.try_recv() {
                    Ok(msg) => {
                        drop(workers);
                        msg
                    }
                    Err(_) => {
                        workers.retire(seq);
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                shared.workers.lock().retire(seq);
                return;
            }
        };

        match msg {
            WorkerMsg::Exit => {
                shared.workers.lock().retire(seq);
                return;
            }
            WorkerMsg::Job(job) => {
                shared.workers.lock().idle -= 1;
                // stale interrupts must not leak into the next job
                flag.clear();
                shared.running.fetch_add(1, Ordering::AcqRel);
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    tracing::error!("[ThreadPool] worker {seq}: job panicked");
                }
                shared.running.fetch_sub(1, Ordering::AcqRel);
                shared.release_permit();
                shared.workers.lock().idle += 1;
            }
        }
    }
}
