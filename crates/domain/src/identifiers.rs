//! Strongly-typed identifier types for the pipeline domain.
//!
//! Every row the pipeline touches is keyed by a relational integer id. Wrapping
//! them in distinct newtypes prevents passing an attempt id where an answer id
//! is expected, which matters because every queued job carries nothing but an id.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wrap a raw database id
            #[inline]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Get the raw database id
            #[inline]
            pub const fn value(&self) -> i64 {
                self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl std::str::FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.trim().parse()?))
            }
        }
    };
}

define_id!(AnswerId, "Identifier of one student's answer to one question");

define_id!(AttemptId, "Identifier of one student's run through an evaluation");

define_id!(EvaluationId, "Identifier of an evaluation");

define_id!(QuestionId, "Identifier of a question bank item");

define_id!(CourseId, "Identifier of a course");

define_id!(UserId, "Identifier of a user (students included)");

define_id!(ProductId, "Identifier of an inventory product");

define_id!(StockItemId, "Identifier of a stock lot");

define_id!(WarehouseId, "Identifier of a warehouse");

define_id!(NotificationId, "Identifier of a notification record");
