// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Features and their store.
//!
//! A [`Feature`] is one named element of a job: a geometry, a scalar, a
//! station, a coordinate system, or a set of transformation parameters. Its
//! derived [`FeatureValue`] is produced by the ordered list of functions it
//! owns; everything else on the struct is descriptive state (name, group,
//! nominal links) maintained by [`Job`](crate::job::Job) commands.
//!
//! The [`FeatureStore`] owns every feature and observation of a job, keyed by
//! [`ElementId`], and is the single id allocator.

mod id;
mod kind;
mod store;

use alloc::string::String;
use alloc::vec::Vec;

pub use id::ElementId;
pub use kind::{CoordinateSystemData, FeatureKind, FeatureValue};
pub use store::FeatureStore;

use crate::function::Function;

/// A single named element of a job.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    pub(crate) id: ElementId,
    pub(crate) name: String,
    pub(crate) group: String,
    pub(crate) comment: String,
    /// Whether the most recent execution of the function list succeeded.
    pub(crate) is_solved: bool,
    /// Whether this feature is a nominal (designed) geometry rather than an
    /// actual (measured) one.
    pub(crate) is_nominal: bool,
    /// The coordinate system a nominal geometry is defined in.
    pub(crate) nominal_system: Option<ElementId>,
    /// For a nominal geometry: the actual counterpart it is compared against.
    pub(crate) actual: Option<ElementId>,
    /// For an actual geometry: all nominal counterparts of the same kind.
    pub(crate) nominals: Vec<ElementId>,
    pub(crate) value: FeatureValue,
    /// Ordered function list; the first function creates the value, later
    /// ones refine or check it.
    pub(crate) functions: Vec<Function>,
}

impl Feature {
    pub(crate) fn new(id: ElementId, name: String, kind: FeatureKind) -> Self {
        Self {
            id,
            name,
            group: String::new(),
            comment: String::new(),
            is_solved: false,
            is_nominal: false,
            nominal_system: None,
            actual: None,
            nominals: Vec::new(),
            value: FeatureValue::default_for(kind),
            functions: Vec::new(),
        }
    }

    /// This feature's job-wide id.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    /// The feature's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The feature's group (empty string when ungrouped).
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Free-form comment.
    #[must_use]
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// The kind tag of this feature's value.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        self.value.kind()
    }

    /// The current derived value.
    #[must_use]
    pub const fn value(&self) -> &FeatureValue {
        &self.value
    }

    /// Whether the most recent execution of the function list succeeded.
    ///
    /// `false` either means the feature was never computed or that its last
    /// recalculation failed; in the latter case [`value`](Self::value) still
    /// holds the previous result.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        self.is_solved
    }

    /// Whether this is a nominal (designed) geometry.
    #[must_use]
    pub const fn is_nominal(&self) -> bool {
        self.is_nominal
    }

    /// The coordinate system a nominal geometry is defined in.
    #[must_use]
    pub const fn nominal_system(&self) -> Option<ElementId> {
        self.nominal_system
    }

    /// The actual counterpart of a nominal geometry.
    #[must_use]
    pub const fn actual(&self) -> Option<ElementId> {
        self.actual
    }

    /// The nominal counterparts of an actual geometry.
    #[must_use]
    pub fn nominals(&self) -> &[ElementId] {
        &self.nominals
    }

    /// The ordered function list.
    #[must_use]
    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub(crate) fn function(&self, function_id: ElementId) -> Option<&Function> {
        self.functions.iter().find(|f| f.id() == function_id)
    }

    pub(crate) fn function_mut(&mut self, function_id: ElementId) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.id() == function_id)
    }
}
