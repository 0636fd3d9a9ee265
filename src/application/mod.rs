//! Application layer - Commands, Queries, and Handlers.
//!
//! Handlers load a subscription through the ports, run domain logic on an
//! owned copy and write it back through [`AtomicUpdater`]. Provider calls
//! happen outside the update closure.

mod atomic_update;
pub mod handlers;

pub use atomic_update::{AtomicUpdater, DEFAULT_MAX_UPDATE_ATTEMPTS};
pub use handlers::*;
