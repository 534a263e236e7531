#[cfg(test)]
mod tests {
    use crate::config::{ConfigManager, Tier};
    use crate::fiber::{Fiber, FiberCx, FiberScheduler, StepResult};
    use crate::modest::{Kernel, KernelConfig, Operation};
    use crate::pool::PoolConfig;
    use crate::utils::interrupt;
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        cond()
    }

    #[test]
    fn kernel_enforces_pool_capacity_across_operations() {
        let kernel = Kernel::with_config(KernelConfig {
            pool: PoolConfig {
                max_threads: 2,
                idle_expiry_ms: 5_000,
            },
            ..KernelConfig::default()
        })
        .unwrap();
        kernel.start();

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let ops: Vec<Operation> = (0..3)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                kernel.submit(move || -> anyhow::Result<()> {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(60));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for op in &ops {
            op.wait_for(true).unwrap();
            assert!(op.finished());
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        kernel.stop();
    }

    #[test]
    fn waiting_on_an_operation_is_interruptible() {
        let kernel = Kernel::new();
        kernel.start();

        let release = Arc::new(AtomicUsize::new(0));
        let hold = release.clone();
        let op = kernel.submit(move || -> anyhow::Result<()> {
            while hold.load(Ordering::Acquire) == 0 {
                thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        });

        let (flag_tx, flag_rx) = crossbeam::channel::bounded(1);
        let waiter = {
            let op = op.clone();
            thread::spawn(move || {
                flag_tx.send(interrupt::current_flag()).unwrap();
                let result = op.wait_for(true);
                (result, interrupt::interrupted())
            })
        };

        let waiter_flag = flag_rx.recv().unwrap();
        thread::sleep(Duration::from_millis(30));
        waiter_flag.set();

        let (result, flag_still_set) = waiter.join().unwrap();
        assert_eq!(result, Err(crate::error::RuntimeError::Interrupted));
        assert!(flag_still_set);

        release.store(1, Ordering::Release);
        op.wait_for(true).unwrap();
        kernel.stop();
    }

    #[test]
    fn kernel_config_comes_from_layered_config_files() {
        let dir = tempfile::tempdir().unwrap();
        let defaults = dir.path().join("00-defaults.config");
        let overlay = dir.path().join("10-site.config");
        std::fs::File::create(&defaults)
            .unwrap()
            .write_all(br#"{"pool": {"max_threads": 10, "idle_expiry_ms": 120000}}"#)
            .unwrap();
        std::fs::File::create(&overlay)
            .unwrap()
            .write_all(br#"{"pool": {"max_threads": 3}}"#)
            .unwrap();

        let mgr = ConfigManager::new();
        mgr.add_file(&defaults, Tier::Default).unwrap();
        mgr.add_file(&overlay, Tier::User).unwrap();

        let cfg: KernelConfig = serde_json::from_value(mgr.get_merged().to_json()).unwrap();
        assert_eq!(cfg.pool.max_threads, 3);
        assert_eq!(cfg.pool.idle_expiry_ms, 120_000);

        let kernel = Kernel::with_config(cfg).unwrap();
        kernel.start();
        let op = kernel.submit(|| Ok(()));
        op.wait_for(true).unwrap();
        assert!(op.finished());
        kernel.stop();
    }

    #[test]
    fn fibers_and_operations_share_one_engine() {
        let kernel = Kernel::with_config(KernelConfig {
            pool: PoolConfig {
                max_threads: 4,
                idle_expiry_ms: 5_000,
            },
            ..KernelConfig::default()
        })
        .unwrap();
        kernel.start();

        let scheduler = FiberScheduler::new();
        let yields = Arc::new(AtomicUsize::new(0));

        struct Spinner {
            remaining: usize,
            yields: Arc<AtomicUsize>,
        }

        impl Fiber for Spinner {
            fn step(&mut self, _cx: &FiberCx<'_>) -> StepResult {
                if self.remaining == 0 {
                    return StepResult::Exit;
                }
                self.remaining -= 1;
                self.yields.fetch_add(1, Ordering::SeqCst);
                StepResult::Yield
            }
        }

        for _ in 0..4 {
            scheduler.add_fiber(Spinner {
                remaining: 25,
                yields: yields.clone(),
            });
        }
        scheduler.start(&kernel, 1);

        // plain operations keep flowing while the scheduler holds a slot
        let done_ops = Arc::new(AtomicUsize::new(0));
        for _ in 0..6 {
            let done_ops = done_ops.clone();
            kernel.submit(move || -> anyhow::Result<()> {
                done_ops.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        scheduler.wait_for_last_fiber_exit(true).unwrap();
        assert_eq!(yields.load(Ordering::SeqCst), 100);
        assert!(wait_until(Duration::from_secs(2), || {
            done_ops.load(Ordering::SeqCst) == 6
        }));

        scheduler.stop();
        kernel.stop();
    }
}
