//! Repository implementations for data persistence.
//!
//! PostgreSQL-backed implementations of the application ports, reading the
//! tables the platform already owns. Derived fields are written with plain
//! `UPDATE ... SET`, never incremented in place.

mod grading_repository;
mod inventory_repository;
mod question_repository;
mod user_repository;

pub use grading_repository::*;
pub use inventory_repository::*;
pub use question_repository::*;
pub use user_repository::*;
