use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;

use crate::dispatch::Runnable;
use crate::modest::engine::Engine;
use crate::modest::operation::{Operation, OperationGuard, StateMutator};
use crate::modest::state::State;
use crate::pool::PoolConfig;

/// Kernel lifecycle and placement knobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KernelConfig {
    #[serde(default)]
    pub pool: PoolConfig,

    /// Stop dispatching when the process receives a TERM signal.
    #[serde(default)]
    pub trap_term_signals: bool,

    /// Pin the dispatcher thread to this core.
    #[serde(default)]
    pub core_id: Option<usize>,
}

/// Facade over the operation engine and its shared state.
///
/// Collaborators submit `Runnable`-shaped work here; guards and mutators
/// are optional per submission.
pub struct Kernel {
    engine: Engine,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub fn new() -> Self {
        Self {
            engine: Engine::new(PoolConfig::default()),
        }
    }

    pub fn with_config(cfg: KernelConfig) -> anyhow::Result<Self> {
        let engine = Engine::new(cfg.pool);
        if let Some(core_id) = cfg.core_id {
            engine.dispatcher().set_core_id(core_id);
        }
        if cfg.trap_term_signals {
            let term = Arc::new(AtomicBool::new(false));
            for sig in TERM_SIGNALS {
                flag::register(*sig, term.clone())
                    .with_context(|| format!("failed to register signal {sig}"))?;
            }
            engine.dispatcher().set_term_flag(term);
        }
        Ok(Self { engine })
    }

    #[inline]
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    #[inline]
    pub fn state(&self) -> &Arc<State> {
        self.engine.state()
    }

    pub fn start(&self) {
        tracing::info!("[Kernel] starting engine");
        self.engine.start();
    }

    pub fn stop(&self) {
        tracing::info!("[Kernel] stopping engine");
        self.engine.stop();
    }

    /// Queue a bare work unit and return its operation handle.
    pub fn submit(&self, runnable: impl Runnable) -> Operation {
        let op = Operation::new(runnable);
        self.engine.queue(&op);
        op
    }

    /// Queue a work unit with an admission guard and/or state mutator.
    pub fn submit_guarded(
        &self,
        runnable: Arc<dyn Runnable>,
        guard: Option<Arc<dyn OperationGuard>>,
        mutator: Option<Arc<dyn StateMutator>>,
    ) -> Operation {
        let op = Operation::with_hooks(runnable, guard, mutator);
        self.engine.queue(&op);
        op
    }

    /// Queue an already-built operation.
    pub fn queue(&self, op: &Operation) {
        self.engine.queue(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn submit_runs_work_to_completion() {
        let kernel = Kernel::new();
        kernel.start();

        let hits = Arc::new(AtomicUsize::new(0));
        let ops: Vec<Operation> = (0..8)
            .map(|_| {
                let hits = hits.clone();
                kernel.submit(move || -> anyhow::Result<()> {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();

        for op in &ops {
            op.wait_for(true).unwrap();
            assert!(op.finished());
        }
        assert_eq!(hits.load(Ordering::SeqCst), 8);
        kernel.stop();
    }

    #[test]
    fn config_defaults_deserialize() {
        let cfg: KernelConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.pool.max_threads, 10);
        assert_eq!(cfg.pool.idle_expiry_ms, 120_000);
        assert!(!cfg.trap_term_signals);
        assert_eq!(cfg.core_id, None);
    }
}
