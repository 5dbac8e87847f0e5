// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Job-wide element identity.

use core::fmt;

/// A handle to an element of a job: a feature, a function, or an observation.
///
/// Ids are allocated from a single monotonically increasing counter owned by
/// the [`FeatureStore`](super::FeatureStore) and are never reused for the
/// lifetime of a job, so a stale id never aliases a newer element — resolving
/// it simply fails.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(transparent))]
pub struct ElementId(pub(crate) u32);

impl ElementId {
    /// Reconstructs an id from its raw value.
    ///
    /// Intended for persistence collaborators that restore a saved job; new
    /// ids inside a live job always come from the store's allocator.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId({})", self.0)
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
