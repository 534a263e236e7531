//! A guarded operation deferred until another operation's post-mutator
//! flips the shared state.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use monarch_rt::prelude::*;
use monarch_rt::utils::logger::LogConfig;

struct NotBusy;

impl OperationGuard for NotBusy {
    fn can_execute(&self, state: &StateView<'_>, _op: &Operation) -> bool {
        state.get_bool("busy") != Some(true)
    }
}

struct ClearBusy;

impl StateMutator for ClearBusy {
    fn mutate_post_execute(&self, state: &mut StateMut<'_>, _op: &Operation) {
        state.set("busy", false);
    }
}

fn main() -> anyhow::Result<()> {
    let _guard = LogConfig::from_env().init()?;

    let kernel = Kernel::new();
    kernel.engine().mutate_state(|s| s.set("busy", true));
    kernel.start();

    let deferred = kernel.submit_guarded(
        Arc::new(|| -> anyhow::Result<()> {
            println!("deferred operation finally ran");
            Ok(())
        }),
        Some(Arc::new(NotBusy)),
        None,
    );

    let busy_worker = kernel.submit_guarded(
        Arc::new(|| -> anyhow::Result<()> {
            println!("busy worker running");
            thread::sleep(Duration::from_millis(200));
            Ok(())
        }),
        None,
        Some(Arc::new(ClearBusy)),
    );

    busy_worker.wait_for(true)?;
    deferred.wait_for(true)?;
    println!(
        "deferred: finished={} canceled={}",
        deferred.finished(),
        deferred.canceled()
    );

    kernel.stop();
    Ok(())
}
