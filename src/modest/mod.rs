//! The Modest kernel: operations with admission guards and state
//! mutators, dispatched over the thread pool against a shared typed
//! state.

pub use engine::Engine;
pub use kernel::{Kernel, KernelConfig};
pub use operation::{Operation, OperationGuard, StateMutator};
pub use state::{State, StateMut, StateValue, StateView};

mod engine;
mod kernel;
mod operation;
mod state;
