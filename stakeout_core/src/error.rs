// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error taxonomy for job operations.
//!
//! Every variant is a *local, recoverable* outcome returned to the caller of
//! the operation that detected it — nothing in the core panics across an API
//! boundary or aborts a job. A failed wire leaves the graph untouched; a
//! failed execution leaves the previous derived value in place with
//! `is_solved` cleared.

use alloc::string::String;
use core::fmt;

use crate::feature::{ElementId, FeatureKind};

/// A recoverable failure of a job operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobError {
    /// A feature with this name already exists in the colliding scope.
    DuplicateName {
        /// The rejected name.
        name: String,
    },
    /// Removal was blocked because a dependent function requires the element
    /// as a mandatory input (pass `force` to sever anyway).
    InUse {
        /// The element that could not be removed.
        id: ElementId,
    },
    /// Wiring this input would create a dependency cycle, or an element was
    /// wired to itself.
    CycleDetected {
        /// The rejected producer.
        producer: ElementId,
        /// The owner of the consuming function.
        consumer: ElementId,
    },
    /// A mandatory input slot had no (or too many) usable elements.
    MissingInput {
        /// The violated slot position.
        position: u32,
    },
    /// The function does not apply to the target feature's kind.
    NotApplicable {
        /// The target's kind.
        kind: FeatureKind,
    },
    /// The kind-specific computation failed numerically (degenerate input,
    /// non-convergence within the iteration bound).
    NumericFailure {
        /// Short description of the failure.
        reason: &'static str,
    },
    /// Supplied parameters had an invalid shape or inconsistent values; prior
    /// state is unchanged.
    InvalidParameters {
        /// Short description of the rejection.
        reason: &'static str,
    },
    /// The referenced element does not exist (or no longer exists) in this
    /// job.
    UnknownElement {
        /// The unresolved id.
        id: ElementId,
    },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "name {name:?} is already in use"),
            Self::InUse { id } => {
                write!(f, "element {id} is a mandatory input of another feature")
            }
            Self::CycleDetected { producer, consumer } => write!(
                f,
                "wiring {producer} into a function of {consumer} would create a cycle"
            ),
            Self::MissingInput { position } => {
                write!(f, "input slot {position} is not satisfied")
            }
            Self::NotApplicable { kind } => {
                write!(f, "function is not applicable to a {}", kind.as_str())
            }
            Self::NumericFailure { reason } => write!(f, "numeric failure: {reason}"),
            Self::InvalidParameters { reason } => write!(f, "invalid parameters: {reason}"),
            Self::UnknownElement { id } => write!(f, "element {id} does not exist"),
        }
    }
}

impl core::error::Error for JobError {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_is_human_readable() {
        let err = JobError::CycleDetected {
            producer: ElementId::from_raw(1),
            consumer: ElementId::from_raw(2),
        };
        assert_eq!(
            err.to_string(),
            "wiring #1 into a function of #2 would create a cycle"
        );
    }
}
