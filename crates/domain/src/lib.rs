//! LMS Recompute Pipeline Domain Types
//!
//! This crate provides the domain model shared by the background recomputation
//! pipeline of the education platform and its inventory module. The entities are
//! persisted elsewhere; the pipeline only reads them and overwrites derived fields.
//!
//! ## Architecture
//!
//! - **identifiers**: Strongly-typed integer identifiers for all entities
//! - **grading**: Answers, attempts, evaluations, scoring results and attempt metrics
//! - **question**: Question bank items, per-evaluation analytics and difficulty rules
//! - **inventory**: Products and stock lots with low-stock / near-expiry predicates
//! - **notification**: Append-only notification records and dedup keys
//! - **user**: Users, roles and student cluster assignments
//! - **errors**: Domain validation errors
//!
//! ## Usage
//!
//! ```rust
//! use lms_pipeline_domain::grading::{AttemptMetrics, AnswerScore};
//!
//! let answers = [
//!     AnswerScore { confidence: Some(0.8), points_awarded: 10.0 },
//!     AnswerScore { confidence: None, points_awarded: 0.0 },
//!     AnswerScore { confidence: Some(0.6), points_awarded: 5.0 },
//! ];
//! let metrics = AttemptMetrics::compute(&answers, 20.0);
//! assert_eq!(metrics.total_points, 15.0);
//! assert_eq!(metrics.percentage, 75.0);
//! ```

#![warn(clippy::all)]

pub mod errors;
pub mod grading;
pub mod identifiers;
pub mod inventory;
pub mod notification;
pub mod question;
pub mod user;

pub use errors::{DomainError, DomainResult};
pub use identifiers::*;

/// Round to a fixed number of decimal places, half away from zero.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
