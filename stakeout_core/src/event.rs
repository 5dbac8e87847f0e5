// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Egress notifications.
//!
//! Every mutating [`Job`](crate::job::Job) command appends typed
//! [`Notification`] values to an ordered queue that collaborators (UI,
//! persistence) drain after the command returns. The queue preserves emission
//! order, which is how the recalculation ordering guarantee (producers
//! reported strictly before their consumers) reaches the outside — the core
//! never blocks waiting for a consumer.

use alloc::string::String;

use crate::feature::ElementId;

/// Severity classification for human-readable messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Progress or bookkeeping information.
    Info,
    /// A recoverable problem the user should know about.
    Warning,
    /// An operation failed outright.
    Fatal,
}

/// A single egress event.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// The set of features changed (one or more added or removed).
    FeatureSetChanged,
    /// A feature was renamed.
    FeatureRenamed {
        /// The renamed feature.
        id: ElementId,
        /// Its previous name.
        old_name: String,
    },
    /// A feature moved to a different group.
    FeatureGroupChanged {
        /// The moved feature.
        id: ElementId,
        /// Its previous group.
        old_group: String,
    },
    /// The active feature changed.
    ActiveFeatureChanged(ElementId),
    /// The active station changed.
    ActiveStationChanged(ElementId),
    /// The active coordinate system changed.
    ActiveCoordinateSystemChanged(ElementId),
    /// The active group changed.
    ActiveGroupChanged,
    /// Graph wiring changed (an input element was added or removed).
    GraphStructureChanged,
    /// A wire was rejected because it would have created a cycle.
    CycleRejected {
        /// The rejected producer.
        producer: ElementId,
        /// The owner of the consuming function.
        consumer: ElementId,
    },
    /// A feature's functions were re-executed (successfully or not).
    FeatureRecalculated(ElementId),
    /// A recalculation request finished.
    RecalculationFinished {
        /// Number of features attempted.
        attempted: u32,
    },
    /// A human-readable message.
    Message {
        /// Severity classification.
        severity: Severity,
        /// Message text.
        text: String,
    },
}

impl Notification {
    /// Convenience constructor for a [`Notification::Message`].
    #[must_use]
    pub fn message(severity: Severity, text: impl Into<String>) -> Self {
        Self::Message {
            severity,
            text: text.into(),
        }
    }
}
