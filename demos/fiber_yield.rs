//! Ten cooperative fibers, ten yields each, on one scheduler thread.

use std::time::Instant;

use monarch_rt::prelude::*;
use monarch_rt::utils::logger::LogConfig;

struct YieldingFiber {
    remaining: usize,
}

impl Fiber for YieldingFiber {
    fn step(&mut self, cx: &FiberCx<'_>) -> StepResult {
        if self.remaining == 0 {
            tracing::info!("fiber {} done", cx.id());
            return StepResult::Exit;
        }
        self.remaining -= 1;
        StepResult::Yield
    }
}

fn main() -> anyhow::Result<()> {
    let _guard = LogConfig::from_env().init()?;

    let kernel = Kernel::new();
    kernel.start();

    let scheduler = FiberScheduler::new();
    for _ in 0..10 {
        scheduler.add_fiber(YieldingFiber { remaining: 10 });
    }

    let start = Instant::now();
    scheduler.start(&kernel, 1);
    scheduler.wait_for_last_fiber_exit(true)?;
    println!("time={:?}", start.elapsed());

    scheduler.stop();
    kernel.stop();
    Ok(())
}
