// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The job: command surface over the store, the graph, and the executor.
//!
//! A [`Job`] owns one measurement project end to end: the feature store, the
//! dependency graph, the active-element state, and the pending notification
//! queue. Every mutation goes through a command method here, which keeps the
//! three invariants the rest of the crate relies on:
//!
//! - ids are unique for the lifetime of the job and never reused,
//! - the dependency graph stays acyclic (offending wires are rejected whole),
//! - a feature's derived value only changes through its own function list.
//!
//! Recalculation lives in [`recalc`](crate::recalc) as a second `impl Job`
//! block; commands here only *request* it.

use alloc::collections::{BTreeSet, VecDeque};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::error::JobError;
use crate::event::Notification;
use crate::feature::{ElementId, Feature, FeatureKind, FeatureStore, FeatureValue};
use crate::function::{ElementKind, Function, InputElement};
use crate::graph::{Consumer, DependencyGraph};
use crate::observation::Observation;
use crate::transform::Transform3d;

/// One measurement project.
#[derive(Clone, Debug, Default)]
pub struct Job {
    name: String,
    /// Version string of the document this job was loaded from, if any.
    loaded_version: Option<String>,
    store: FeatureStore,
    graph: DependencyGraph,
    active_feature: Option<ElementId>,
    active_station: Option<ElementId>,
    active_coordinate_system: Option<ElementId>,
    active_group: Option<String>,
    /// The first coordinate system added; everything nominal is ultimately
    /// expressed relative to it.
    reference_system: Option<ElementId>,
    pending: Vec<Notification>,
    pub(crate) recalc_queue: VecDeque<BTreeSet<ElementId>>,
    pub(crate) recalc_in_progress: bool,
}

impl Job {
    /// Creates an empty job.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The job's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read access to the feature store.
    #[must_use]
    pub const fn store(&self) -> &FeatureStore {
        &self.store
    }

    /// Read access to the dependency graph.
    #[must_use]
    pub const fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub(crate) const fn store_mut(&mut self) -> &mut FeatureStore {
        &mut self.store
    }

    /// Version string of the document this job was loaded from.
    #[must_use]
    pub fn loaded_version(&self) -> Option<&str> {
        self.loaded_version.as_deref()
    }

    /// Records the document version this job was restored from.
    pub fn set_loaded_version(&mut self, version: impl Into<String>) {
        self.loaded_version = Some(version.into());
    }

    /// Takes all pending notifications, oldest first.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        core::mem::take(&mut self.pending)
    }

    pub(crate) fn notify(&mut self, notification: Notification) {
        self.pending.push(notification);
    }

    // --- feature lifecycle -------------------------------------------------

    /// Adds an actual (measured) feature and returns its id.
    pub fn add_feature(
        &mut self,
        name: impl Into<String>,
        kind: FeatureKind,
    ) -> Result<ElementId, JobError> {
        self.add_feature_inner(None, name.into(), kind, None)
    }

    /// Adds a nominal (designed) feature defined in `nominal_system`.
    pub fn add_nominal_feature(
        &mut self,
        name: impl Into<String>,
        kind: FeatureKind,
        nominal_system: ElementId,
    ) -> Result<ElementId, JobError> {
        let system = self
            .store
            .feature(nominal_system)
            .ok_or(JobError::UnknownElement { id: nominal_system })?;
        if system.kind() != FeatureKind::CoordinateSystem {
            return Err(JobError::InvalidParameters {
                reason: "a nominal system must be a coordinate system",
            });
        }
        self.add_feature_inner(None, name.into(), kind, Some(nominal_system))
    }

    /// Adds a feature under a caller-chosen id, bumping the allocator past
    /// it. Used when restoring a saved job.
    pub fn add_feature_with_id(
        &mut self,
        id: ElementId,
        name: impl Into<String>,
        kind: FeatureKind,
        nominal_system: Option<ElementId>,
    ) -> Result<ElementId, JobError> {
        self.add_feature_inner(Some(id), name.into(), kind, nominal_system)
    }

    fn add_feature_inner(
        &mut self,
        id: Option<ElementId>,
        name: String,
        kind: FeatureKind,
        nominal_system: Option<ElementId>,
    ) -> Result<ElementId, JobError> {
        self.store.validate_name(&name, kind, nominal_system, None)?;
        let id = match id {
            Some(id) => {
                check_restorable_id(id)?;
                if self.store.feature(id).is_some() || self.store.observation(id).is_some() {
                    return Err(JobError::InvalidParameters {
                        reason: "id is already taken",
                    });
                }
                self.store.reserve_through(id);
                id
            }
            None => self.store.allocate_id(),
        };
        let mut feature = Feature::new(id, name, kind);
        feature.is_nominal = nominal_system.is_some();
        feature.nominal_system = nominal_system;
        self.store.insert(feature);
        if kind == FeatureKind::CoordinateSystem && self.reference_system.is_none() {
            self.reference_system = Some(id);
        }
        self.notify(Notification::FeatureSetChanged);
        Ok(id)
    }

    /// Removes a feature.
    ///
    /// Without `force` the removal is blocked with [`JobError::InUse`] only
    /// when it would leave a consuming function's mandatory slot
    /// unsatisfiable: the sole element of a single slot, or an infinite
    /// slot's element at its declared minimum. An element a consumer can do
    /// without (optional slot, infinite slot above its minimum) is removed
    /// outright. Either way every reference is severed — input elements,
    /// master-geometry links, system/trafo links, active-element state — and
    /// the dependents are recalculated so nothing dangles.
    pub fn remove_feature(&mut self, id: ElementId, force: bool) -> Result<(), JobError> {
        if self.store.feature(id).is_none() {
            return Err(JobError::UnknownElement { id });
        }
        if !force && self.removal_starves_a_consumer(id) {
            return Err(JobError::InUse { id });
        }
        let dependents = self.graph.dependent_owners(id);
        self.sever_feature(id);
        self.store.features.remove(&id);
        self.notify(Notification::FeatureSetChanged);
        if !dependents.is_empty() {
            self.recalc_feature_set(dependents);
        }
        Ok(())
    }

    /// Removes several features at once (all-or-nothing is *not* implied;
    /// each removal is attempted independently and the first error aborts).
    pub fn remove_features(&mut self, ids: &[ElementId], force: bool) -> Result<(), JobError> {
        for id in ids {
            self.remove_feature(*id, force)?;
        }
        Ok(())
    }

    /// Whether removing `id` would leave some consuming function's mandatory
    /// slot below what it needs to execute.
    fn removal_starves_a_consumer(&self, id: ElementId) -> bool {
        self.graph.consumers_of(id).any(|consumer| {
            let Some(function) = self
                .store
                .feature(consumer.owner)
                .and_then(|f| f.function(consumer.function))
            else {
                return false;
            };
            let Some(slot) = function.needed_elements().get(consumer.position as usize) else {
                return false;
            };
            if slot.optional {
                return false;
            }
            let remaining = function
                .input_elements(consumer.position)
                .iter()
                .filter(|e| e.id != id)
                .count() as u32;
            if slot.infinite {
                remaining < slot.min_count
            } else {
                remaining == 0
            }
        })
    }

    /// Cuts every link between `id` and the rest of the job.
    fn sever_feature(&mut self, id: ElementId) {
        // Input elements of consuming functions.
        let severed = self.graph.unwire_all_of(id);
        for consumer in severed {
            if let Some(owner) = self.store.feature_mut(consumer.owner)
                && let Some(function) = owner.function_mut(consumer.function)
            {
                function.remove_input_element(consumer.position, id);
            }
        }
        // Master geometry.
        self.store.unlink_master_geometry(id);
        // System/trafo cross references.
        let kind = self.store.feature(id).map(Feature::kind);
        match kind {
            Some(FeatureKind::TrafoParam) => self.sever_trafo_param(id),
            Some(FeatureKind::CoordinateSystem) => self.sever_coordinate_system(id),
            _ => {}
        }
        // Function ownership and active-element state.
        if let Some(feature) = self.store.feature(id) {
            let function_ids: Vec<ElementId> =
                feature.functions.iter().map(Function::id).collect();
            for function_id in function_ids {
                self.store.function_owner.remove(&function_id);
            }
        }
        if self.active_feature == Some(id) {
            self.active_feature = None;
        }
        if self.active_station == Some(id) {
            self.active_station = None;
        }
        if self.active_coordinate_system == Some(id) {
            self.active_coordinate_system = None;
        }
        if self.reference_system == Some(id) {
            self.reference_system = None;
        }
    }

    fn sever_trafo_param(&mut self, id: ElementId) {
        let Some(FeatureValue::TrafoParam(data)) = self.store.feature(id).map(Feature::value)
        else {
            return;
        };
        let from = data.from_system;
        let to = data.to_system;
        let parent = data.bundle_parent;
        let children = data.bundle_children.clone();
        for system in [from, to].into_iter().flatten() {
            if let Some(FeatureValue::CoordinateSystem(sys)) =
                self.store.feature_mut(system).map(|f| &mut f.value)
            {
                sys.outgoing_trafos.retain(|t| *t != id);
                sys.incoming_trafos.retain(|t| *t != id);
            }
        }
        if let Some(parent) = parent
            && let Some(FeatureValue::TrafoParam(p)) =
                self.store.feature_mut(parent).map(|f| &mut f.value)
        {
            p.bundle_children.retain(|c| *c != id);
        }
        for child in children {
            if let Some(FeatureValue::TrafoParam(c)) =
                self.store.feature_mut(child).map(|f| &mut f.value)
            {
                c.bundle_parent = None;
            }
        }
    }

    fn sever_coordinate_system(&mut self, id: ElementId) {
        let trafos: Vec<ElementId> = self
            .store
            .features()
            .filter_map(|f| match f.value() {
                FeatureValue::TrafoParam(t)
                    if t.from_system == Some(id) || t.to_system == Some(id) =>
                {
                    Some(f.id())
                }
                _ => None,
            })
            .collect();
        for trafo in trafos {
            if let Some(FeatureValue::TrafoParam(t)) =
                self.store.feature_mut(trafo).map(|f| &mut f.value)
            {
                if t.from_system == Some(id) {
                    t.from_system = None;
                }
                if t.to_system == Some(id) {
                    t.to_system = None;
                }
            }
        }
        let nominals: Vec<ElementId> = self
            .store
            .features()
            .filter(|f| f.nominal_system() == Some(id))
            .map(Feature::id)
            .collect();
        for nominal in nominals {
            if let Some(f) = self.store.feature_mut(nominal) {
                f.nominal_system = None;
            }
        }
    }

    /// Renames a feature within its collision scope.
    pub fn rename_feature(
        &mut self,
        id: ElementId,
        new_name: impl Into<String>,
    ) -> Result<(), JobError> {
        let new_name = new_name.into();
        let (kind, nominal_system, old_name) = {
            let feature = self
                .store
                .feature(id)
                .ok_or(JobError::UnknownElement { id })?;
            (feature.kind(), feature.nominal_system(), feature.name.clone())
        };
        if old_name == new_name {
            return Ok(());
        }
        self.store
            .validate_name(&new_name, kind, nominal_system, Some(id))?;
        if let Some(feature) = self.store.feature_mut(id) {
            feature.name = new_name;
        }
        self.notify(Notification::FeatureRenamed { id, old_name });
        Ok(())
    }

    /// Moves a feature to a group.
    pub fn set_group(&mut self, id: ElementId, group: impl Into<String>) -> Result<(), JobError> {
        let feature = self
            .store
            .feature_mut(id)
            .ok_or(JobError::UnknownElement { id })?;
        let group = group.into();
        if feature.group == group {
            return Ok(());
        }
        let old_group = core::mem::replace(&mut feature.group, group);
        self.notify(Notification::FeatureGroupChanged { id, old_group });
        Ok(())
    }

    /// Sets a feature's free-form comment.
    pub fn set_comment(
        &mut self,
        id: ElementId,
        comment: impl Into<String>,
    ) -> Result<(), JobError> {
        let feature = self
            .store
            .feature_mut(id)
            .ok_or(JobError::UnknownElement { id })?;
        feature.comment = comment.into();
        Ok(())
    }

    /// Overwrites a feature's derived value and solved flag, bypassing the
    /// function list. The value's kind must match the feature's kind.
    ///
    /// This is the restore path for persistence and the entry point for
    /// user-entered nominal values; recalculation of dependents is the
    /// caller's decision.
    pub fn restore_value(
        &mut self,
        id: ElementId,
        value: FeatureValue,
        is_solved: bool,
    ) -> Result<(), JobError> {
        let feature = self
            .store
            .feature_mut(id)
            .ok_or(JobError::UnknownElement { id })?;
        if feature.kind() != value.kind() {
            return Err(JobError::InvalidParameters {
                reason: "value kind does not match the feature's kind",
            });
        }
        feature.value = value;
        feature.is_solved = is_solved;
        Ok(())
    }

    // --- active elements ---------------------------------------------------

    /// The active feature, if any.
    #[must_use]
    pub const fn active_feature(&self) -> Option<ElementId> {
        self.active_feature
    }

    /// The active station, if any.
    #[must_use]
    pub const fn active_station(&self) -> Option<ElementId> {
        self.active_station
    }

    /// The active coordinate system, if any.
    #[must_use]
    pub const fn active_coordinate_system(&self) -> Option<ElementId> {
        self.active_coordinate_system
    }

    /// The active group filter, if any.
    #[must_use]
    pub fn active_group(&self) -> Option<&str> {
        self.active_group.as_deref()
    }

    /// The job's reference coordinate system, if any.
    #[must_use]
    pub const fn reference_system(&self) -> Option<ElementId> {
        self.reference_system
    }

    /// Makes a feature the active one.
    pub fn set_active_feature(&mut self, id: ElementId) -> Result<(), JobError> {
        if self.store.feature(id).is_none() {
            return Err(JobError::UnknownElement { id });
        }
        if self.active_feature != Some(id) {
            self.active_feature = Some(id);
            self.notify(Notification::ActiveFeatureChanged(id));
        }
        Ok(())
    }

    /// Makes a station the active one.
    pub fn set_active_station(&mut self, id: ElementId) -> Result<(), JobError> {
        let feature = self
            .store
            .feature(id)
            .ok_or(JobError::UnknownElement { id })?;
        if feature.kind() != FeatureKind::Station {
            return Err(JobError::InvalidParameters {
                reason: "active station must be a station",
            });
        }
        if self.active_station != Some(id) {
            self.active_station = Some(id);
            self.notify(Notification::ActiveStationChanged(id));
        }
        Ok(())
    }

    /// Makes a coordinate system the active display system.
    pub fn set_active_coordinate_system(&mut self, id: ElementId) -> Result<(), JobError> {
        let feature = self
            .store
            .feature(id)
            .ok_or(JobError::UnknownElement { id })?;
        if feature.kind() != FeatureKind::CoordinateSystem {
            return Err(JobError::InvalidParameters {
                reason: "active coordinate system must be a coordinate system",
            });
        }
        if self.active_coordinate_system != Some(id) {
            self.active_coordinate_system = Some(id);
            self.notify(Notification::ActiveCoordinateSystemChanged(id));
        }
        Ok(())
    }

    /// Sets (or clears) the active group filter.
    pub fn set_active_group(&mut self, group: Option<String>) {
        if self.active_group != group {
            self.active_group = group;
            self.notify(Notification::ActiveGroupChanged);
        }
    }

    // --- functions and wiring ----------------------------------------------

    /// Attaches a function to a feature. The builder receives the freshly
    /// allocated function id; the built function must be applicable to the
    /// feature's kind.
    pub fn add_function<F>(
        &mut self,
        feature_id: ElementId,
        build: F,
    ) -> Result<ElementId, JobError>
    where
        F: FnOnce(ElementId) -> Result<Function, JobError>,
    {
        let kind = self
            .store
            .feature(feature_id)
            .ok_or(JobError::UnknownElement { id: feature_id })?
            .kind();
        let function_id = self.store.allocate_id();
        let function = build(function_id)?;
        if !function.is_applicable_to(kind) {
            return Err(JobError::NotApplicable { kind });
        }
        self.store.function_owner.insert(function_id, feature_id);
        if let Some(feature) = self.store.feature_mut(feature_id) {
            feature.functions.push(function);
        }
        Ok(function_id)
    }

    /// Attaches an already-built function under its stored id (restore path).
    ///
    /// Input elements already wired into the function are entered into the
    /// dependency graph; every referenced producer must exist and the edges
    /// must keep the graph acyclic, otherwise the whole attachment is rolled
    /// back.
    pub fn add_function_with_id(
        &mut self,
        feature_id: ElementId,
        function: Function,
    ) -> Result<(), JobError> {
        let kind = self
            .store
            .feature(feature_id)
            .ok_or(JobError::UnknownElement { id: feature_id })?
            .kind();
        if !function.is_applicable_to(kind) {
            return Err(JobError::NotApplicable { kind });
        }
        let function_id = function.id();
        check_restorable_id(function_id)?;
        let mut wired = Vec::new();
        let mut wiring_error = None;
        for (position, element) in function.all_input_elements() {
            let exists = match element.kind {
                ElementKind::Observation => self.store.observation(element.id).is_some(),
                _ => self.store.feature(element.id).is_some(),
            };
            if !exists {
                wiring_error = Some(JobError::UnknownElement { id: element.id });
                break;
            }
            let consumer = Consumer {
                owner: feature_id,
                function: function_id,
                position,
            };
            match self.graph.wire(element.id, consumer) {
                Ok(()) => wired.push((element.id, consumer)),
                Err(err) => {
                    wiring_error = Some(err);
                    break;
                }
            }
        }
        if let Some(err) = wiring_error {
            for (producer, consumer) in wired {
                self.graph.unwire(producer, consumer);
            }
            return Err(err);
        }
        self.store.reserve_through(function_id);
        self.store.function_owner.insert(function_id, feature_id);
        if let Some(feature) = self.store.feature_mut(feature_id) {
            feature.functions.push(function);
        }
        Ok(())
    }

    /// Wires a feature into a function slot of another feature.
    ///
    /// A wire that would close a dependency cycle is rejected whole: no graph
    /// edge, no input element, and a [`Notification::CycleRejected`] on the
    /// queue alongside the returned error.
    pub fn add_input_feature(
        &mut self,
        feature_id: ElementId,
        function_id: ElementId,
        position: u32,
        producer_id: ElementId,
    ) -> Result<(), JobError> {
        let producer_kind = self
            .store
            .feature(producer_id)
            .ok_or(JobError::UnknownElement { id: producer_id })?
            .kind();
        self.add_input_inner(
            feature_id,
            function_id,
            position,
            InputElement::feature(producer_id, producer_kind),
        )
    }

    /// Wires an observation into a function slot.
    pub fn add_input_observation(
        &mut self,
        feature_id: ElementId,
        function_id: ElementId,
        position: u32,
        observation_id: ElementId,
    ) -> Result<(), JobError> {
        if self.store.observation(observation_id).is_none() {
            return Err(JobError::UnknownElement { id: observation_id });
        }
        self.add_input_inner(
            feature_id,
            function_id,
            position,
            InputElement::observation(observation_id),
        )
    }

    fn add_input_inner(
        &mut self,
        feature_id: ElementId,
        function_id: ElementId,
        position: u32,
        element: InputElement,
    ) -> Result<(), JobError> {
        let producer_id = element.id;
        if self.store.feature(feature_id).is_none() {
            return Err(JobError::UnknownElement { id: feature_id });
        }
        let consumer = Consumer {
            owner: feature_id,
            function: function_id,
            position,
        };
        if let Err(err) = self.graph.wire(producer_id, consumer) {
            self.notify(Notification::CycleRejected {
                producer: producer_id,
                consumer: feature_id,
            });
            return Err(err);
        }
        let result = self
            .store
            .feature_mut(feature_id)
            .and_then(|f| f.function_mut(function_id))
            .ok_or(JobError::UnknownElement { id: function_id })
            .and_then(|f| f.add_input_element(position, element));
        if let Err(err) = result {
            self.graph.unwire(producer_id, consumer);
            return Err(err);
        }
        self.notify(Notification::GraphStructureChanged);
        Ok(())
    }

    /// Unwires an element from a function slot. Idempotent on the graph
    /// side; fails only when feature or function are unknown.
    pub fn remove_input_element(
        &mut self,
        feature_id: ElementId,
        function_id: ElementId,
        position: u32,
        element_id: ElementId,
    ) -> Result<(), JobError> {
        let function = self
            .store
            .feature_mut(feature_id)
            .and_then(|f| f.function_mut(function_id))
            .ok_or(JobError::UnknownElement { id: function_id })?;
        let removed = function.remove_input_element(position, element_id);
        self.graph.unwire(
            element_id,
            Consumer {
                owner: feature_id,
                function: function_id,
                position,
            },
        );
        if removed {
            self.notify(Notification::GraphStructureChanged);
        }
        Ok(())
    }

    /// Marks user intent for one wired element and optionally recalculates
    /// the owning feature (and everything downstream of it).
    pub fn set_should_be_used(
        &mut self,
        feature_id: ElementId,
        function_id: ElementId,
        element_id: ElementId,
        should_be_used: bool,
        recalc: bool,
    ) -> Result<(), JobError> {
        let function = self
            .store
            .feature_mut(feature_id)
            .and_then(|f| f.function_mut(function_id))
            .ok_or(JobError::UnknownElement { id: function_id })?;
        if !function.set_should_be_used(element_id, should_be_used) {
            return Err(JobError::UnknownElement { id: element_id });
        }
        if recalc {
            self.recalc_feature(feature_id);
        }
        Ok(())
    }

    // --- observations ------------------------------------------------------

    /// Adds an observation, attaches it to the target feature's first
    /// function slot that takes observations, and recalculates the target.
    pub fn add_observation(
        &mut self,
        target: ElementId,
        observation: Observation,
    ) -> Result<ElementId, JobError> {
        let slot = self.observation_slot(target)?;
        let id = self.store.allocate_id();
        let mut observation = observation;
        observation.id = id;
        self.store.observations.insert(id, observation);
        let (function_id, position) = slot;
        self.add_input_inner(target, function_id, position, InputElement::observation(id))?;
        self.recalc_feature(target);
        Ok(id)
    }

    /// Inserts an observation under its stored id without attaching it
    /// anywhere (restore path; wiring is restored separately).
    pub fn add_observation_with_id(&mut self, observation: Observation) -> Result<(), JobError> {
        let id = observation.id();
        check_restorable_id(id)?;
        if self.store.observation(id).is_some() || self.store.feature(id).is_some() {
            return Err(JobError::InvalidParameters {
                reason: "id is already taken",
            });
        }
        self.store.reserve_through(id);
        self.store.observations.insert(id, observation);
        Ok(())
    }

    fn observation_slot(&self, target: ElementId) -> Result<(ElementId, u32), JobError> {
        let feature = self
            .store
            .feature(target)
            .ok_or(JobError::UnknownElement { id: target })?;
        for function in &feature.functions {
            for (position, slot) in function.needed_elements().iter().enumerate() {
                if slot.kind == ElementKind::Observation {
                    return Ok((function.id(), position as u32));
                }
            }
        }
        Err(JobError::InvalidParameters {
            reason: "feature has no function taking observations",
        })
    }

    /// Removes observations and recalculates every feature that consumed
    /// them.
    pub fn remove_observations(&mut self, ids: &[ElementId]) -> Result<(), JobError> {
        let mut dependents = Vec::new();
        for id in ids {
            if self.store.observation(*id).is_none() {
                return Err(JobError::UnknownElement { id: *id });
            }
        }
        for id in ids {
            dependents.extend(self.graph.dependent_owners(*id));
            let severed = self.graph.unwire_all_of(*id);
            for consumer in severed {
                if let Some(owner) = self.store.feature_mut(consumer.owner)
                    && let Some(function) = owner.function_mut(consumer.function)
                {
                    function.remove_input_element(consumer.position, *id);
                }
            }
            self.store.observations.remove(id);
        }
        self.notify(Notification::GraphStructureChanged);
        if !dependents.is_empty() {
            self.recalc_feature_set(dependents);
        }
        Ok(())
    }

    /// Re-enables observations in every consuming function, then
    /// recalculates the consumers.
    pub fn enable_observations(&mut self, ids: &[ElementId]) -> Result<(), JobError> {
        self.toggle_observations(ids, true)
    }

    /// Disables observations in every consuming function without removing
    /// them, then recalculates the consumers.
    pub fn disable_observations(&mut self, ids: &[ElementId]) -> Result<(), JobError> {
        self.toggle_observations(ids, false)
    }

    fn toggle_observations(
        &mut self,
        ids: &[ElementId],
        should_be_used: bool,
    ) -> Result<(), JobError> {
        let mut dependents = Vec::new();
        for id in ids {
            if self.store.observation(*id).is_none() {
                return Err(JobError::UnknownElement { id: *id });
            }
        }
        for id in ids {
            let consumers: Vec<Consumer> = self.graph.consumers_of(*id).copied().collect();
            for consumer in consumers {
                if let Some(owner) = self.store.feature_mut(consumer.owner)
                    && let Some(function) = owner.function_mut(consumer.function)
                {
                    function.set_should_be_used(*id, should_be_used);
                    dependents.push(consumer.owner);
                }
            }
        }
        if !dependents.is_empty() {
            self.recalc_feature_set(dependents);
        }
        Ok(())
    }

    // --- master geometry ---------------------------------------------------

    /// Links a nominal counterpart to an actual geometry.
    pub fn add_nominal(&mut self, actual: ElementId, nominal: ElementId) -> Result<(), JobError> {
        self.store.link_nominal(actual, nominal)?;
        self.notify(Notification::FeatureSetChanged);
        Ok(())
    }

    /// Sets the actual counterpart of a nominal geometry.
    pub fn set_actual(&mut self, nominal: ElementId, actual: ElementId) -> Result<(), JobError> {
        self.store.link_actual(nominal, actual)?;
        self.notify(Notification::FeatureSetChanged);
        Ok(())
    }

    // --- coordinate systems and trafo params -------------------------------

    /// Assigns the start and destination systems of a trafo param, keeping
    /// both systems' trafo lists in sync.
    pub fn set_trafo_systems(
        &mut self,
        trafo: ElementId,
        from: ElementId,
        to: ElementId,
    ) -> Result<(), JobError> {
        for system in [from, to] {
            let feature = self
                .store
                .feature(system)
                .ok_or(JobError::UnknownElement { id: system })?;
            if feature.kind() != FeatureKind::CoordinateSystem {
                return Err(JobError::InvalidParameters {
                    reason: "trafo endpoints must be coordinate systems",
                });
            }
        }
        let (old_from, old_to) = {
            let feature = self
                .store
                .feature(trafo)
                .ok_or(JobError::UnknownElement { id: trafo })?;
            let FeatureValue::TrafoParam(data) = feature.value() else {
                return Err(JobError::InvalidParameters {
                    reason: "feature is not a trafo param",
                });
            };
            (data.from_system, data.to_system)
        };
        for system in [old_from, old_to].into_iter().flatten() {
            if let Some(FeatureValue::CoordinateSystem(sys)) =
                self.store.feature_mut(system).map(|f| &mut f.value)
            {
                sys.outgoing_trafos.retain(|t| *t != trafo);
                sys.incoming_trafos.retain(|t| *t != trafo);
            }
        }
        if let Some(FeatureValue::TrafoParam(data)) =
            self.store.feature_mut(trafo).map(|f| &mut f.value)
        {
            data.from_system = Some(from);
            data.to_system = Some(to);
        }
        if let Some(FeatureValue::CoordinateSystem(sys)) =
            self.store.feature_mut(from).map(|f| &mut f.value)
            && !sys.outgoing_trafos.contains(&trafo)
        {
            sys.outgoing_trafos.push(trafo);
        }
        if let Some(FeatureValue::CoordinateSystem(sys)) =
            self.store.feature_mut(to).map(|f| &mut f.value)
            && !sys.incoming_trafos.contains(&trafo)
        {
            sys.incoming_trafos.push(trafo);
        }
        Ok(())
    }

    /// Sets (or clears) the bundle parent of a trafo param.
    ///
    /// Datum trafos stay out of bundle chains on both sides, and a parent
    /// assignment that would close a parent loop is rejected.
    pub fn set_bundle_parent(
        &mut self,
        child: ElementId,
        parent: Option<ElementId>,
    ) -> Result<(), JobError> {
        let child_is_datum = {
            let feature = self
                .store
                .feature(child)
                .ok_or(JobError::UnknownElement { id: child })?;
            let FeatureValue::TrafoParam(data) = feature.value() else {
                return Err(JobError::InvalidParameters {
                    reason: "feature is not a trafo param",
                });
            };
            data.is_datum_trafo
        };
        if child_is_datum {
            return Err(JobError::InvalidParameters {
                reason: "datum trafos take no part in bundle chains",
            });
        }
        if let Some(parent) = parent {
            let feature = self
                .store
                .feature(parent)
                .ok_or(JobError::UnknownElement { id: parent })?;
            let FeatureValue::TrafoParam(data) = feature.value() else {
                return Err(JobError::InvalidParameters {
                    reason: "feature is not a trafo param",
                });
            };
            if data.is_datum_trafo {
                return Err(JobError::InvalidParameters {
                    reason: "datum trafos take no part in bundle chains",
                });
            }
            // Walk up from the new parent; finding the child means a loop.
            let mut current = Some(parent);
            let mut visited = BTreeSet::new();
            while let Some(id) = current {
                if id == child || !visited.insert(id) {
                    return Err(JobError::CycleDetected {
                        producer: parent,
                        consumer: child,
                    });
                }
                current = match self.store.feature(id).map(Feature::value) {
                    Some(FeatureValue::TrafoParam(data)) => data.bundle_parent,
                    _ => None,
                };
            }
        }
        let old_parent = {
            let Some(FeatureValue::TrafoParam(data)) =
                self.store.feature_mut(child).map(|f| &mut f.value)
            else {
                return Err(JobError::UnknownElement { id: child });
            };
            core::mem::replace(&mut data.bundle_parent, parent)
        };
        if let Some(old_parent) = old_parent
            && let Some(FeatureValue::TrafoParam(p)) =
                self.store.feature_mut(old_parent).map(|f| &mut f.value)
        {
            p.bundle_children.retain(|c| *c != child);
        }
        if let Some(parent) = parent
            && let Some(FeatureValue::TrafoParam(p)) =
                self.store.feature_mut(parent).map(|f| &mut f.value)
            && !p.bundle_children.contains(&child)
        {
            p.bundle_children.push(child);
        }
        Ok(())
    }

    /// Sets a trafo param's parameters from three 3-vectors and recalculates
    /// everything derived from it.
    pub fn set_transformation_vectors(
        &mut self,
        trafo: ElementId,
        rotation: &[f64],
        translation: &[f64],
        scale: &[f64],
    ) -> Result<(), JobError> {
        self.with_trafo_data(trafo, |data| data.set_vectors(rotation, translation, scale))
    }

    /// Sets a trafo param's parameters from component matrices.
    pub fn set_transformation_matrices(
        &mut self,
        trafo: ElementId,
        rotation: &Transform3d,
        translation: &Transform3d,
        scale: &Transform3d,
    ) -> Result<(), JobError> {
        self.with_trafo_data(trafo, |data| data.set_matrices(rotation, translation, scale))
    }

    /// Sets a trafo param's parameters from a single homogeneous matrix.
    pub fn set_transformation_homogeneous(
        &mut self,
        trafo: ElementId,
        matrix: &Transform3d,
    ) -> Result<(), JobError> {
        self.with_trafo_data(trafo, |data| data.set_homogeneous(matrix))
    }

    fn with_trafo_data<F>(&mut self, trafo: ElementId, apply: F) -> Result<(), JobError>
    where
        F: FnOnce(&mut crate::trafo::TrafoParamData) -> Result<(), JobError>,
    {
        {
            let feature = self
                .store
                .feature_mut(trafo)
                .ok_or(JobError::UnknownElement { id: trafo })?;
            let FeatureValue::TrafoParam(data) = &mut feature.value else {
                return Err(JobError::InvalidParameters {
                    reason: "feature is not a trafo param",
                });
            };
            apply(data)?;
            feature.is_solved = true;
        }
        let dependents: Vec<ElementId> =
            self.graph.transitive_dependents(trafo).into_iter().collect();
        if !dependents.is_empty() {
            self.recalc_feature_set(dependents);
        }
        Ok(())
    }
}

/// The highest raw id is the placeholder of an observation not yet added to a
/// job; restoring an element under it would also overflow the allocator bump.
fn check_restorable_id(id: ElementId) -> Result<(), JobError> {
    if id.raw() == u32::MAX {
        return Err(JobError::InvalidParameters {
            reason: "id is reserved",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Notification;

    #[test]
    fn add_feature_allocates_unique_ids() {
        let mut job = Job::new("test");
        let a = job.add_feature("p1", FeatureKind::Point).unwrap();
        let b = job.add_feature("p2", FeatureKind::Point).unwrap();
        assert_ne!(a, b);
        assert_eq!(job.store().feature_count(), 2);
    }

    #[test]
    fn duplicate_names_are_scoped() {
        let mut job = Job::new("test");
        job.add_feature("x", FeatureKind::Point).unwrap();
        // Same kind and scope: rejected.
        assert!(matches!(
            job.add_feature("x", FeatureKind::Point),
            Err(JobError::DuplicateName { .. })
        ));
        // Different kind: fine.
        job.add_feature("x", FeatureKind::Plane).unwrap();
    }

    #[test]
    fn id_of_removed_feature_is_never_reused() {
        let mut job = Job::new("test");
        let a = job.add_feature("p1", FeatureKind::Point).unwrap();
        job.remove_feature(a, false).unwrap();
        let b = job.add_feature("p2", FeatureKind::Point).unwrap();
        assert!(b > a);
    }

    #[test]
    fn rename_emits_old_name() {
        let mut job = Job::new("test");
        let id = job.add_feature("before", FeatureKind::Point).unwrap();
        job.drain_notifications();
        job.rename_feature(id, "after").unwrap();
        let notifications = job.drain_notifications();
        assert!(notifications.iter().any(|n| matches!(
            n,
            Notification::FeatureRenamed { old_name, .. } if old_name == "before"
        )));
        assert_eq!(job.store().feature(id).unwrap().name(), "after");
    }

    #[test]
    fn cycle_rejection_leaves_graph_and_functions_untouched() {
        let mut job = Job::new("test");
        let p1 = job.add_feature("p1", FeatureKind::Point).unwrap();
        let p2 = job.add_feature("p2", FeatureKind::Point).unwrap();
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();
        let fit = job
            .add_function(p1, |id| Function::best_fit(id, FeatureKind::Point))
            .unwrap();
        job.drain_notifications();
        // d already depends on p1; wiring d back into p1 would close a loop.
        let err = job.add_input_feature(p1, fit, 0, d);
        assert!(matches!(err, Err(JobError::CycleDetected { .. })));
        let notifications = job.drain_notifications();
        assert!(notifications
            .iter()
            .any(|n| matches!(n, Notification::CycleRejected { .. })));
        assert!(!job.graph().has_consumers(d));
        // The accepted wires are still in place.
        assert!(job.graph().has_consumers(p1));
        assert!(job.graph().has_consumers(p2));
    }

    #[test]
    fn remove_feature_is_blocked_while_in_use() {
        let mut job = Job::new("test");
        let p1 = job.add_feature("p1", FeatureKind::Point).unwrap();
        let p2 = job.add_feature("p2", FeatureKind::Point).unwrap();
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();

        assert!(matches!(
            job.remove_feature(p1, false),
            Err(JobError::InUse { .. })
        ));

        // Forced removal severs the input element and leaves no dangling id.
        job.remove_feature(p1, true).unwrap();
        let feature = job.store().feature(d).unwrap();
        let function = &feature.functions()[0];
        assert!(function.input_elements(0).is_empty());
        assert_eq!(function.input_elements(1).len(), 1);
        // The dependent was recalculated and is now unsolved.
        assert!(!feature.is_solved());
    }

    #[test]
    fn element_above_an_infinite_slot_minimum_is_removable_without_force() {
        let mut job = Job::new("test");
        let trafo = job.add_feature("t", FeatureKind::TrafoParam).unwrap();
        let f = job
            .add_function(trafo, |id| Ok(Function::trafo_from_points(id)))
            .unwrap();
        let mut starts = Vec::new();
        for i in 0..4 {
            let p = job
                .add_feature(alloc::format!("s{i}"), FeatureKind::Point)
                .unwrap();
            job.add_input_feature(trafo, f, 0, p).unwrap();
            starts.push(p);
        }

        // Four wired into a slot needing three: one is expendable.
        job.remove_feature(starts[0], false).unwrap();
        let feature = job.store().feature(trafo).unwrap();
        assert_eq!(feature.functions()[0].input_elements(0).len(), 3);

        // At the minimum the next removal needs `force` again.
        assert!(matches!(
            job.remove_feature(starts[1], false),
            Err(JobError::InUse { .. })
        ));
    }

    #[test]
    fn active_station_must_be_a_station() {
        let mut job = Job::new("test");
        let p = job.add_feature("p", FeatureKind::Point).unwrap();
        let s = job.add_feature("s", FeatureKind::Station).unwrap();
        assert!(job.set_active_station(p).is_err());
        job.set_active_station(s).unwrap();
        assert_eq!(job.active_station(), Some(s));
    }

    #[test]
    fn first_coordinate_system_becomes_the_reference() {
        let mut job = Job::new("test");
        let a = job.add_feature("sys a", FeatureKind::CoordinateSystem).unwrap();
        let _b = job.add_feature("sys b", FeatureKind::CoordinateSystem).unwrap();
        assert_eq!(job.reference_system(), Some(a));
    }

    #[test]
    fn trafo_systems_stay_in_sync() {
        let mut job = Job::new("test");
        let part = job.add_feature("part", FeatureKind::CoordinateSystem).unwrap();
        let world = job.add_feature("world", FeatureKind::CoordinateSystem).unwrap();
        let trafo = job.add_feature("part->world", FeatureKind::TrafoParam).unwrap();
        job.set_trafo_systems(trafo, part, world).unwrap();

        let FeatureValue::CoordinateSystem(sys) = job.store().feature(part).unwrap().value()
        else {
            panic!("wrong variant");
        };
        assert_eq!(sys.outgoing_trafos, [trafo]);

        // Removing the trafo cleans the lists.
        job.remove_feature(trafo, true).unwrap();
        let FeatureValue::CoordinateSystem(sys) = job.store().feature(part).unwrap().value()
        else {
            panic!("wrong variant");
        };
        assert!(sys.outgoing_trafos.is_empty());
    }

    #[test]
    fn bundle_parent_loop_is_rejected() {
        let mut job = Job::new("test");
        let a = job.add_feature("a", FeatureKind::TrafoParam).unwrap();
        let b = job.add_feature("b", FeatureKind::TrafoParam).unwrap();
        job.set_bundle_parent(b, Some(a)).unwrap();
        let err = job.set_bundle_parent(a, Some(b)).unwrap_err();
        assert!(matches!(err, JobError::CycleDetected { .. }));
    }

    #[test]
    fn datum_trafo_cannot_join_a_bundle() {
        let mut job = Job::new("test");
        let a = job.add_feature("a", FeatureKind::TrafoParam).unwrap();
        let b = job.add_feature("b", FeatureKind::TrafoParam).unwrap();
        if let Some(f) = job.store.feature_mut(a)
            && let FeatureValue::TrafoParam(data) = &mut f.value
        {
            data.is_datum_trafo = true;
        }
        assert!(job.set_bundle_parent(a, Some(b)).is_err());
        assert!(job.set_bundle_parent(b, Some(a)).is_err());
    }

    #[test]
    fn placeholder_id_is_rejected_on_restore() {
        let mut job = Job::new("test");
        // An observation that was never added to a job still carries the
        // placeholder id; restoring it as-is must fail, not bump the
        // allocator past its range.
        let err = job
            .add_observation_with_id(Observation::cartesian([0.0; 3]))
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameters { .. }));
        assert!(job
            .add_feature_with_id(
                ElementId::from_raw(u32::MAX),
                "p",
                FeatureKind::Point,
                None,
            )
            .is_err());
        // The allocator still works afterwards.
        job.add_feature("p", FeatureKind::Point).unwrap();
    }

    #[test]
    fn restore_value_checks_the_kind() {
        let mut job = Job::new("test");
        let p = job.add_feature("p", FeatureKind::Point).unwrap();
        assert!(job
            .restore_value(p, FeatureValue::ScalarDistance { value: 1.0 }, true)
            .is_err());
        job.restore_value(p, FeatureValue::Point { xyz: [1.0, 2.0, 3.0] }, true)
            .unwrap();
        assert!(job.store().feature(p).unwrap().is_solved());
    }
}
