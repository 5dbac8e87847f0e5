// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Feature and observation storage.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{ElementId, Feature, FeatureKind};
use crate::error::JobError;
use crate::observation::Observation;

/// Owns every feature and observation of a job and allocates all ids.
///
/// Storage is keyed by [`ElementId`] in ordered maps, so every iteration over
/// the store — lookups, recalculation tie-breaks, persistence — visits
/// elements in ascending id order. Ids come from a single monotonically
/// increasing counter shared by features, functions, and observations, and
/// are never reused.
#[derive(Clone, Debug, Default)]
pub struct FeatureStore {
    pub(crate) features: BTreeMap<ElementId, Feature>,
    pub(crate) observations: BTreeMap<ElementId, Observation>,
    /// Function id → id of the feature owning it.
    pub(crate) function_owner: BTreeMap<ElementId, ElementId>,
    next_id: u32,
}

impl FeatureStore {
    /// Allocates a fresh job-wide id.
    pub(crate) fn allocate_id(&mut self) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Bumps the allocator so it never hands out `id` or anything below it.
    ///
    /// Used when restoring a saved job whose elements keep their stored ids.
    pub(crate) fn reserve_through(&mut self, id: ElementId) {
        if id.0 >= self.next_id {
            self.next_id = id.0 + 1;
        }
    }

    pub(crate) fn insert(&mut self, feature: Feature) {
        self.features.insert(feature.id, feature);
    }

    /// Looks up a feature by id.
    #[must_use]
    pub fn feature(&self, id: ElementId) -> Option<&Feature> {
        self.features.get(&id)
    }

    pub(crate) fn feature_mut(&mut self, id: ElementId) -> Option<&mut Feature> {
        self.features.get_mut(&id)
    }

    /// Looks up an observation by id.
    #[must_use]
    pub fn observation(&self, id: ElementId) -> Option<&Observation> {
        self.observations.get(&id)
    }

    /// The feature owning a function, if the function id is known.
    #[must_use]
    pub fn function_owner(&self, function_id: ElementId) -> Option<ElementId> {
        self.function_owner.get(&function_id).copied()
    }

    /// Iterates all features in ascending id order.
    pub fn features(&self) -> impl Iterator<Item = &Feature> {
        self.features.values()
    }

    /// Iterates all observations in ascending id order.
    pub fn observations(&self) -> impl Iterator<Item = &Observation> {
        self.observations.values()
    }

    /// Number of features in the store.
    #[must_use]
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Number of features of one kind.
    #[must_use]
    pub fn count_of_kind(&self, kind: FeatureKind) -> usize {
        self.features.values().filter(|f| f.kind() == kind).count()
    }

    /// Looks up features by exact name, in ascending id order.
    pub fn features_by_name<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features.values().filter(move |f| f.name == name)
    }

    /// Looks up features by group, in ascending id order.
    pub fn features_by_group<'a>(&'a self, group: &'a str) -> impl Iterator<Item = &'a Feature> {
        self.features.values().filter(move |f| f.group == group)
    }

    /// Looks up features by kind, in ascending id order.
    pub fn features_of_kind(&self, kind: FeatureKind) -> impl Iterator<Item = &Feature> {
        self.features.values().filter(move |f| f.kind() == kind)
    }

    /// All non-empty group names, deduplicated, in sorted order.
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        let mut groups: Vec<String> = self
            .features
            .values()
            .filter(|f| !f.group.is_empty())
            .map(|f| f.group.to_string())
            .collect();
        groups.sort_unstable();
        groups.dedup();
        groups
    }

    /// Checks that `name` is free within its collision scope.
    ///
    /// Two features collide only if they agree on name, kind, *and* nominal
    /// system — an actual and a nominal point may share a name, as may a
    /// point and a plane. Names are compared case-sensitively. `skip` exempts
    /// one feature (the one being renamed).
    pub(crate) fn validate_name(
        &self,
        name: &str,
        kind: FeatureKind,
        nominal_system: Option<ElementId>,
        skip: Option<ElementId>,
    ) -> Result<(), JobError> {
        let taken = self.features.values().any(|f| {
            Some(f.id) != skip
                && f.name == name
                && f.kind() == kind
                && f.nominal_system == nominal_system
        });
        if taken {
            return Err(JobError::DuplicateName {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Links a nominal geometry to its actual counterpart (both directions).
    ///
    /// Both features must exist, be geometries, and share the same kind; a
    /// previous actual link on the nominal is replaced, and the nominal is
    /// appended to the actual's list if not already present.
    pub(crate) fn link_actual(
        &mut self,
        nominal: ElementId,
        actual: ElementId,
    ) -> Result<(), JobError> {
        let nominal_kind = self
            .feature(nominal)
            .ok_or(JobError::UnknownElement { id: nominal })?
            .kind();
        let actual_kind = self
            .feature(actual)
            .ok_or(JobError::UnknownElement { id: actual })?
            .kind();
        if nominal_kind != actual_kind || !nominal_kind.is_geometry() {
            return Err(JobError::InvalidParameters {
                reason: "actual and nominal must be geometries of the same kind",
            });
        }
        let previous = self
            .features
            .get_mut(&nominal)
            .map(|f| f.actual.replace(actual));
        if let Some(Some(prev)) = previous
            && prev != actual
            && let Some(f) = self.features.get_mut(&prev)
        {
            f.nominals.retain(|n| *n != nominal);
        }
        if let Some(f) = self.features.get_mut(&actual)
            && !f.nominals.contains(&nominal)
        {
            f.nominals.push(nominal);
        }
        Ok(())
    }

    /// Adds a nominal counterpart to an actual geometry (both directions).
    pub(crate) fn link_nominal(
        &mut self,
        actual: ElementId,
        nominal: ElementId,
    ) -> Result<(), JobError> {
        self.link_actual(nominal, actual)
    }

    /// Severs every master-geometry link touching `id`.
    pub(crate) fn unlink_master_geometry(&mut self, id: ElementId) {
        let Some(feature) = self.features.get(&id) else {
            return;
        };
        let actual = feature.actual;
        let nominals = feature.nominals.clone();
        if let Some(actual) = actual
            && let Some(f) = self.features.get_mut(&actual)
        {
            f.nominals.retain(|n| *n != id);
        }
        for nominal in nominals {
            if let Some(f) = self.features.get_mut(&nominal)
                && f.actual == Some(id)
            {
                f.actual = None;
            }
        }
        if let Some(f) = self.features.get_mut(&id) {
            f.actual = None;
            f.nominals.clear();
        }
    }
}
