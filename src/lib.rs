//! Cooperative operation/fiber runtime core.
//!
//! Work units are dispatched FIFO onto a bounded thread pool with idle
//! expiry. The Modest kernel specializes dispatch with admission guards
//! evaluated against a shared typed state, with pre/post state mutators
//! applied under the state lock. Stackless fibers ride on top of the
//! kernel as round-robin-scheduled step functions. A layered
//! configuration manager with deterministic merge/diff semantics and
//! change listeners sits alongside for every collaborator to consume.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod fiber;
pub mod modest;
pub mod pool;
pub mod prelude;
mod test;
pub mod utils;
