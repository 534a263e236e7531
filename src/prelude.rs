pub use crate::config::{
    ConfigChangeListener, ConfigId, ConfigManager, ConfigValue, Tier, TierFilter,
};
pub use crate::dispatch::{Admission, DispatchEntry, JobDispatcher, Runnable, Submission};
pub use crate::error::{ConfigError, RuntimeError};
pub use crate::fiber::{
    CondId, Fiber, FiberConfig, FiberCx, FiberId, FiberScheduler, FiberState, StepResult,
};
pub use crate::modest::{
    Engine, Kernel, KernelConfig, Operation, OperationGuard, State, StateMut, StateMutator,
    StateValue, StateView,
};
pub use crate::pool::{PoolConfig, PoolPermit, ThreadPool};
pub use crate::utils::InterruptFlag;
pub use crate::utils::interrupt;
