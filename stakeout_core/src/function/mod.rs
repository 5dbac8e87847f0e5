// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The function model: declared inputs, wired elements, parameters, results.
//!
//! A [`Function`] is a recipe attached to a feature. It *declares* what it
//! needs as a list of [`NeededElement`] slots (fixed metadata chosen at
//! construction) and *receives* concrete [`InputElement`]s wired into those
//! slots by job commands. Execution itself lives in
//! [`executor`](crate::function::executor); this module only models the
//! contract.
//!
//! ```text
//!             declares                      wired at runtime
//!   Function ──────────▶ [NeededElement] ◀───────────────── [InputElement]
//!      │                   slot 0: ≥3 observations             #12, #13, #14
//!      │                   slot 1: 1 plane (optional)           —
//!      ▼ produces
//!   FeatureValue + Statistic + result protocol
//! ```

pub(crate) mod executor;
pub(crate) mod fit;

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::JobError;
use crate::feature::{ElementId, FeatureKind};

/// What a needed-element slot accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementKind {
    /// A raw observation.
    Observation,
    /// A feature of exactly this kind.
    Feature(FeatureKind),
    /// Any feature whose kind [is a geometry](FeatureKind::is_geometry).
    AnyGeometry,
}

impl ElementKind {
    /// Whether an element of `kind` may be wired into a slot of this kind.
    /// `None` stands for a raw observation.
    #[must_use]
    pub const fn admits(self, kind: Option<FeatureKind>) -> bool {
        match (self, kind) {
            (Self::Observation, None) => true,
            (Self::Feature(wanted), Some(kind)) => wanted as u32 == kind as u32,
            (Self::AnyGeometry, Some(kind)) => kind.is_geometry(),
            _ => false,
        }
    }
}

/// One declared input slot of a function.
#[derive(Clone, Debug, PartialEq)]
pub struct NeededElement {
    /// What the slot accepts.
    pub kind: ElementKind,
    /// Whether the slot takes arbitrarily many elements (a fit's observation
    /// list) instead of exactly one.
    pub infinite: bool,
    /// For an infinite slot: the minimum number of *usable* elements required
    /// at execution time. Ignored for single slots (which require exactly 1).
    pub min_count: u32,
    /// Whether the slot may be left empty entirely.
    pub optional: bool,
    /// Short description shown to the user when wiring inputs.
    pub description: &'static str,
}

impl NeededElement {
    const fn one(kind: ElementKind, description: &'static str) -> Self {
        Self {
            kind,
            infinite: false,
            min_count: 1,
            optional: false,
            description,
        }
    }

    const fn many(kind: ElementKind, min_count: u32, description: &'static str) -> Self {
        Self {
            kind,
            infinite: true,
            min_count,
            optional: false,
            description,
        }
    }
}

/// A geometry parameter that can be fixed or excluded per input element.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GeometryParameter {
    /// X component of the characteristic position.
    CenterX,
    /// Y component of the characteristic position.
    CenterY,
    /// Z component of the characteristic position.
    CenterZ,
    /// I component of the characteristic direction.
    DirectionI,
    /// J component of the characteristic direction.
    DirectionJ,
    /// K component of the characteristic direction.
    DirectionK,
    /// Primary radius.
    Radius,
    /// Secondary radius (torus tube, ellipse semi-minor).
    RadiusB,
    /// Cone aperture angle.
    Aperture,
    /// Slotted-hole length.
    Length,
}

/// A parameter held constant during execution instead of being estimated.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FixedParameter {
    /// Which parameter is fixed.
    pub parameter: GeometryParameter,
    /// The value it is pinned to.
    pub value: f64,
}

/// A concrete element wired into a needed-element slot.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InputElement {
    /// The wired element (observation or feature id).
    pub id: ElementId,
    /// The element's resolved kind at wiring time.
    pub kind: ElementKind,
    /// User intent: whether this element *should* contribute.
    pub should_be_used: bool,
    /// Execution result: whether the last run actually consumed it.
    pub is_used: bool,
    /// Parameters of the *target* feature this element must not influence.
    pub ignored_target_params: BTreeSet<GeometryParameter>,
    /// Parameters of this element the function must not read.
    pub ignored_source_params: BTreeSet<GeometryParameter>,
}

impl InputElement {
    /// Wires a raw observation.
    #[must_use]
    pub fn observation(id: ElementId) -> Self {
        Self::new(id, ElementKind::Observation)
    }

    /// Wires a feature of the given kind.
    #[must_use]
    pub fn feature(id: ElementId, kind: FeatureKind) -> Self {
        Self::new(id, ElementKind::Feature(kind))
    }

    fn new(id: ElementId, kind: ElementKind) -> Self {
        Self {
            id,
            kind,
            should_be_used: true,
            is_used: false,
            ignored_target_params: BTreeSet::new(),
            ignored_source_params: BTreeSet::new(),
        }
    }
}

/// One weighted deviation of an input element from the fitted value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Residual {
    /// The element this residual belongs to.
    pub element_id: ElementId,
    /// Deviation along x.
    pub vx: f64,
    /// Deviation along y.
    pub vy: f64,
    /// Deviation along z.
    pub vz: f64,
    /// Scalar deviation (signed distance to the fitted geometry).
    pub v: f64,
}

/// Quality numbers of the most recent execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Statistic {
    /// Whether these numbers describe a *successful* execution.
    pub is_valid: bool,
    /// Standard deviation a posteriori.
    pub stdev: f64,
    /// Degrees of freedom of the adjustment.
    pub dof: u32,
    /// Per-element residuals.
    pub residuals: Vec<Residual>,
}

/// Recipe tag, fixed at construction. One variant per constructor, so a
/// function's recipe is recoverable from the tag alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    /// Least-squares fit of a geometry from observations.
    BestFit,
    /// Point-to-point distance.
    Distance,
    /// Line-to-line angle.
    Angle,
    /// Mean temperature out of a measurement series.
    TemperatureMean,
    /// Estimation of transformation parameters from two point groups.
    TrafoFromPoints,
    /// Derivation of a coordinate system from a trafo param.
    SystemFromTrafo,
}

/// A recipe producing a feature's value from wired input elements.
#[derive(Clone, Debug, PartialEq)]
pub struct Function {
    pub(crate) id: ElementId,
    kind: FunctionKind,
    name: &'static str,
    needed_elements: Vec<NeededElement>,
    applicable_for: Vec<FeatureKind>,
    pub(crate) fixed_parameters: Vec<FixedParameter>,
    pub(crate) integer_parameters: BTreeMap<String, i64>,
    pub(crate) double_parameters: BTreeMap<String, f64>,
    pub(crate) string_parameters: BTreeMap<String, String>,
    /// Wired elements, keyed by slot position.
    pub(crate) input_elements: BTreeMap<u32, Vec<InputElement>>,
    /// Human-readable log lines of the most recent execution.
    pub(crate) result_protocol: Vec<String>,
    pub(crate) statistic: Statistic,
}

/// Minimum usable observations for a best-fit of each geometry kind.
const fn min_observations(kind: FeatureKind) -> u32 {
    match kind {
        FeatureKind::Point | FeatureKind::Station => 3,
        FeatureKind::Line => 2,
        FeatureKind::Plane | FeatureKind::Circle => 3,
        FeatureKind::Sphere | FeatureKind::Nurbs => 4,
        FeatureKind::Cylinder | FeatureKind::Ellipse | FeatureKind::SlottedHole => 5,
        FeatureKind::Cone | FeatureKind::Paraboloid => 6,
        FeatureKind::Torus => 7,
        FeatureKind::Hyperboloid => 8,
        FeatureKind::Ellipsoid => 9,
        FeatureKind::PointCloud => 1,
        _ => u32::MAX,
    }
}

impl Function {
    /// A least-squares fit of `target` from a single infinite observation
    /// slot.
    ///
    /// Fails with [`JobError::NotApplicable`] for kinds that have no fit
    /// (scalars, coordinate systems, trafo params).
    pub fn best_fit(id: ElementId, target: FeatureKind) -> Result<Self, JobError> {
        let min_count = min_observations(target);
        if min_count == u32::MAX {
            return Err(JobError::NotApplicable { kind: target });
        }
        Ok(Self::new(
            id,
            FunctionKind::BestFit,
            "best fit",
            alloc::vec![NeededElement::many(
                ElementKind::Observation,
                min_count,
                "observations to fit",
            )],
            alloc::vec![target],
        ))
    }

    /// The point-to-point distance construction.
    #[must_use]
    pub fn distance(id: ElementId) -> Self {
        Self::new(
            id,
            FunctionKind::Distance,
            "distance between points",
            alloc::vec![
                NeededElement::one(ElementKind::Feature(FeatureKind::Point), "first point"),
                NeededElement::one(ElementKind::Feature(FeatureKind::Point), "second point"),
            ],
            alloc::vec![FeatureKind::ScalarDistance],
        )
    }

    /// The line-to-line angle construction.
    #[must_use]
    pub fn angle(id: ElementId) -> Self {
        Self::new(
            id,
            FunctionKind::Angle,
            "angle between lines",
            alloc::vec![
                NeededElement::one(ElementKind::Feature(FeatureKind::Line), "first line"),
                NeededElement::one(ElementKind::Feature(FeatureKind::Line), "second line"),
            ],
            alloc::vec![FeatureKind::ScalarAngle],
        )
    }

    /// Mean temperature out of a measurement series.
    #[must_use]
    pub fn temperature_mean(id: ElementId) -> Self {
        Self::new(
            id,
            FunctionKind::TemperatureMean,
            "mean of measurement series",
            alloc::vec![NeededElement::one(
                ElementKind::Feature(FeatureKind::ScalarMeasurementSeries),
                "measurement series",
            )],
            alloc::vec![FeatureKind::ScalarTemperature],
        )
    }

    /// Derives a coordinate system's origin from a trafo param's effective
    /// transform.
    #[must_use]
    pub fn system_from_trafo(id: ElementId) -> Self {
        Self::new(
            id,
            FunctionKind::SystemFromTrafo,
            "system from transformation",
            alloc::vec![NeededElement::one(
                ElementKind::Feature(FeatureKind::TrafoParam),
                "transformation parameters",
            )],
            alloc::vec![FeatureKind::CoordinateSystem],
        )
    }

    /// Estimates transformation parameters from two corresponding point
    /// groups (start system, then destination system).
    #[must_use]
    pub fn trafo_from_points(id: ElementId) -> Self {
        Self::new(
            id,
            FunctionKind::TrafoFromPoints,
            "transformation from points",
            alloc::vec![
                NeededElement::many(
                    ElementKind::Feature(FeatureKind::Point),
                    3,
                    "points in the start system",
                ),
                NeededElement::many(
                    ElementKind::Feature(FeatureKind::Point),
                    3,
                    "points in the destination system",
                ),
            ],
            alloc::vec![FeatureKind::TrafoParam],
        )
    }

    fn new(
        id: ElementId,
        kind: FunctionKind,
        name: &'static str,
        needed_elements: Vec<NeededElement>,
        applicable_for: Vec<FeatureKind>,
    ) -> Self {
        Self {
            id,
            kind,
            name,
            needed_elements,
            applicable_for,
            fixed_parameters: Vec::new(),
            integer_parameters: BTreeMap::new(),
            double_parameters: BTreeMap::new(),
            string_parameters: BTreeMap::new(),
            input_elements: BTreeMap::new(),
            result_protocol: Vec::new(),
            statistic: Statistic::default(),
        }
    }

    /// This function's job-wide id.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    /// The execution strategy tag.
    #[must_use]
    pub const fn kind(&self) -> FunctionKind {
        self.kind
    }

    /// Display name of the recipe.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// The declared input slots.
    #[must_use]
    pub fn needed_elements(&self) -> &[NeededElement] {
        &self.needed_elements
    }

    /// Whether the function may be attached to a feature of `kind`.
    #[must_use]
    pub fn is_applicable_to(&self, kind: FeatureKind) -> bool {
        self.applicable_for.contains(&kind)
    }

    /// The elements wired into slot `position`.
    #[must_use]
    pub fn input_elements(&self, position: u32) -> &[InputElement] {
        self.input_elements
            .get(&position)
            .map_or(&[], Vec::as_slice)
    }

    /// All wired elements across all slots, with their slot positions.
    pub fn all_input_elements(&self) -> impl Iterator<Item = (u32, &InputElement)> {
        self.input_elements
            .iter()
            .flat_map(|(pos, list)| list.iter().map(move |e| (*pos, e)))
    }

    /// Wires an element into slot `position`.
    ///
    /// The slot must exist, must admit the element's kind, and — for a single
    /// slot — must still be empty. Wiring the same id twice into one slot is
    /// rejected as [`JobError::InvalidParameters`].
    pub fn add_input_element(
        &mut self,
        position: u32,
        element: InputElement,
    ) -> Result<(), JobError> {
        let slot = self
            .needed_elements
            .get(position as usize)
            .ok_or(JobError::MissingInput { position })?;
        let element_kind = match element.kind {
            ElementKind::Observation => None,
            ElementKind::Feature(kind) => Some(kind),
            ElementKind::AnyGeometry => {
                return Err(JobError::InvalidParameters {
                    reason: "a wired element must have a concrete kind",
                });
            }
        };
        if !slot.kind.admits(element_kind) {
            return Err(JobError::InvalidParameters {
                reason: "element kind is not admitted by this input slot",
            });
        }
        let list = self.input_elements.entry(position).or_default();
        if list.iter().any(|e| e.id == element.id) {
            return Err(JobError::InvalidParameters {
                reason: "element is already wired into this slot",
            });
        }
        if !slot.infinite && !list.is_empty() {
            return Err(JobError::InvalidParameters {
                reason: "input slot takes exactly one element",
            });
        }
        list.push(element);
        Ok(())
    }

    /// Unwires an element from slot `position`. Returns whether it was wired.
    pub fn remove_input_element(&mut self, position: u32, id: ElementId) -> bool {
        let Some(list) = self.input_elements.get_mut(&position) else {
            return false;
        };
        let before = list.len();
        list.retain(|e| e.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.input_elements.remove(&position);
        }
        removed
    }

    /// Marks user intent for one wired element.
    pub fn set_should_be_used(&mut self, id: ElementId, should_be_used: bool) -> bool {
        for list in self.input_elements.values_mut() {
            if let Some(e) = list.iter_mut().find(|e| e.id == id) {
                e.should_be_used = should_be_used;
                return true;
            }
        }
        false
    }

    pub(crate) fn set_is_used(&mut self, id: ElementId, is_used: bool) {
        for list in self.input_elements.values_mut() {
            if let Some(e) = list.iter_mut().find(|e| e.id == id) {
                e.is_used = is_used;
                return;
            }
        }
    }

    /// Pins a geometry parameter to a constant, replacing an earlier pin of
    /// the same parameter.
    pub fn fix_parameter(&mut self, parameter: GeometryParameter, value: f64) {
        self.unfix_parameter(parameter);
        self.fixed_parameters.push(FixedParameter { parameter, value });
    }

    /// Releases a pinned parameter. Returns whether it was pinned.
    pub fn unfix_parameter(&mut self, parameter: GeometryParameter) -> bool {
        let before = self.fixed_parameters.len();
        self.fixed_parameters.retain(|p| p.parameter != parameter);
        before != self.fixed_parameters.len()
    }

    /// The currently pinned parameters.
    #[must_use]
    pub fn fixed_parameters(&self) -> &[FixedParameter] {
        &self.fixed_parameters
    }

    /// Log lines of the most recent execution.
    #[must_use]
    pub fn result_protocol(&self) -> &[String] {
        &self.result_protocol
    }

    /// Quality numbers of the most recent execution.
    #[must_use]
    pub const fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    /// Discards the results of the most recent execution (protocol,
    /// statistic, per-element usage marks). Wiring is untouched.
    pub fn clear_results(&mut self) {
        self.result_protocol.clear();
        self.statistic = Statistic::default();
        for list in self.input_elements.values_mut() {
            for e in list.iter_mut() {
                e.is_used = false;
            }
        }
    }
}
