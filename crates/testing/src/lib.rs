//! Testing utilities for the LMS recompute pipeline
//!
//! This crate provides:
//! - Fluent builders for answers, attempts, questions, products, lots and users
//! - Fixtures that seed an [`InMemoryStore`](lms_pipeline_infrastructure::InMemoryStore)
//!   with the scenarios the pipeline is tested against
//! - Scripted mocks of the external collaborators (scoring agent, prediction
//!   pipeline, analytics)
//!
//! # Examples
//!
//! ```
//! use lms_pipeline_testing::builders::*;
//!
//! let answer = AnswerBuilder::new()
//!     .with_id(10)
//!     .with_words(501)
//!     .build();
//! assert_eq!(answer.current_word_count(), 501);
//! ```

pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;
