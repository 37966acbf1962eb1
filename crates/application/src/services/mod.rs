//! Application Services
//!
//! Use cases invoked by the background jobs. Every service reaches storage and
//! the external services through the ports in [`crate::ports`].

mod analytics;
mod grading;
mod inventory;

pub use analytics::*;
pub use grading::*;
pub use inventory::*;
