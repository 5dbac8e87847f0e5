// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Function execution.
//!
//! [`execute`] runs one function against a snapshot of the store and returns
//! the replacement value for the target feature. The caller (the
//! recalculation path in [`Job`](crate::job::Job)) owns all mutation of the
//! feature itself: on success it swaps the value in, on failure it keeps the
//! previous value and clears `is_solved`. The executor only ever *reads* the
//! store, which is what makes running it against a snapshot sound.
//!
//! Preconditions are validated before any computation: the function must be
//! applicable to the target's kind, every mandatory single slot must hold
//! exactly one usable element, and every infinite slot must meet its declared
//! minimum. Violations are reported per slot as
//! [`JobError::MissingInput`].

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use alloc::format;
use alloc::vec::Vec;

use super::fit::{self, centroid, cross, dot, norm, normalize, sub};
use super::{
    ElementKind, Function, FunctionKind, GeometryParameter, InputElement, Residual, Statistic,
};
use crate::error::JobError;
use crate::feature::{ElementId, FeatureKind, FeatureStore, FeatureValue};
use crate::observation::Observation;
use crate::trafo::TrafoParamData;

/// A wired element resolved against the store snapshot.
enum ResolvedElement<'a> {
    Observation(&'a Observation),
    Feature(&'a FeatureValue),
}

/// One usable input: the wire metadata plus the resolved element.
struct Input<'a> {
    element: &'a InputElement,
    resolved: ResolvedElement<'a>,
}

impl Input<'_> {
    fn position_3d(&self) -> Option<[f64; 3]> {
        match &self.resolved {
            ResolvedElement::Observation(obs) => Some(obs.position()),
            ResolvedElement::Feature(value) => value.position(),
        }
    }

    fn contributes_to(&self, parameter: GeometryParameter) -> bool {
        !self.element.ignored_target_params.contains(&parameter)
    }
}

/// Executes `function` for a target feature currently holding `current`.
///
/// On success the function's statistic, protocol, and per-element usage marks
/// are updated and the new value is returned. On failure the function's
/// results are cleared and the error is propagated; `current` is never
/// modified either way.
pub(crate) fn execute(
    function: &mut Function,
    current: &FeatureValue,
    store: &FeatureStore,
) -> Result<FeatureValue, JobError> {
    function.clear_results();
    let target_kind = current.kind();
    if !function.is_applicable_to(target_kind) {
        return Err(JobError::NotApplicable { kind: target_kind });
    }

    // Resolve and validate every slot before computing anything.
    let mut slots: Vec<Vec<Input<'_>>> = Vec::new();
    for (position, slot) in function.needed_elements().iter().enumerate() {
        let position = position as u32;
        let mut usable = Vec::new();
        for element in function.input_elements(position) {
            if !element.should_be_used {
                continue;
            }
            let resolved = match element.kind {
                ElementKind::Observation => store
                    .observation(element.id)
                    .filter(|obs| obs.is_usable())
                    .map(ResolvedElement::Observation),
                ElementKind::Feature(_) => store
                    .feature(element.id)
                    .map(|f| ResolvedElement::Feature(f.value())),
                ElementKind::AnyGeometry => None,
            };
            if let Some(resolved) = resolved {
                usable.push(Input { element, resolved });
            }
        }
        let satisfied = if slot.infinite {
            usable.len() as u32 >= slot.min_count
        } else {
            usable.len() == 1
        };
        if !satisfied && !(slot.optional && usable.is_empty()) {
            return Err(JobError::MissingInput { position });
        }
        slots.push(usable);
    }

    let outcome = match function.kind() {
        FunctionKind::BestFit => best_fit(current, &slots[0]),
        FunctionKind::Distance | FunctionKind::Angle | FunctionKind::TemperatureMean => {
            from_elements(current, &slots)
        }
        FunctionKind::TrafoFromPoints => trafo_from_points(current, &slots),
        FunctionKind::SystemFromTrafo => system_from_trafo(current, &slots, store),
    };
    let (mut value, statistic, protocol) = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            function.clear_results();
            return Err(err);
        }
    };

    for fixed in &function.fixed_parameters {
        apply_fixed(&mut value, fixed.parameter, fixed.value);
    }

    let used: Vec<ElementId> = slots
        .iter()
        .flatten()
        .map(|input| input.element.id)
        .collect();
    for id in used {
        function.set_is_used(id, true);
    }
    function.statistic = statistic;
    function.result_protocol = protocol;
    Ok(value)
}

/// Degrees of freedom of a fit: observations beyond the geometric minimum.
fn statistic_for(inputs: &[Input<'_>], minimum: u32, residuals: Vec<Residual>) -> Statistic {
    let n = inputs.len() as u32;
    let dof = n.saturating_sub(minimum);
    let sum: f64 = residuals.iter().map(|r| r.v * r.v).sum();
    let stdev = if dof > 0 {
        (sum / f64::from(dof)).sqrt()
    } else {
        0.0
    };
    Statistic {
        is_valid: true,
        stdev,
        dof,
        residuals,
    }
}

type Outcome = (FeatureValue, Statistic, Vec<alloc::string::String>);

fn input_points(inputs: &[Input<'_>]) -> Result<Vec<[f64; 3]>, JobError> {
    inputs
        .iter()
        .map(|input| {
            input.position_3d().ok_or(JobError::InvalidParameters {
                reason: "input element carries no position",
            })
        })
        .collect()
}

fn point_residuals(inputs: &[Input<'_>], points: &[[f64; 3]], center: [f64; 3]) -> Vec<Residual> {
    inputs
        .iter()
        .zip(points)
        .map(|(input, p)| {
            let d = sub(*p, center);
            Residual {
                element_id: input.element.id,
                vx: d[0],
                vy: d[1],
                vz: d[2],
                v: norm(d),
            }
        })
        .collect()
}

/// Residuals against a fitted radius around an axis point/direction.
fn radial_residuals(
    inputs: &[Input<'_>],
    points: &[[f64; 3]],
    distance: impl Fn([f64; 3]) -> f64,
    radius: f64,
) -> Vec<Residual> {
    inputs
        .iter()
        .zip(points)
        .map(|(input, p)| {
            let v = distance(*p) - radius;
            Residual {
                element_id: input.element.id,
                vx: 0.0,
                vy: 0.0,
                vz: 0.0,
                v,
            }
        })
        .collect()
}

/// Mean of a per-point measure over the inputs still contributing to
/// `parameter`.
fn contributing_mean(
    inputs: &[Input<'_>],
    points: &[[f64; 3]],
    parameter: GeometryParameter,
    measure: impl Fn([f64; 3]) -> f64,
) -> Result<f64, JobError> {
    let mut sum = 0.0;
    let mut n = 0_u32;
    for (input, p) in inputs.iter().zip(points) {
        if input.contributes_to(parameter) {
            sum += measure(*p);
            n += 1;
        }
    }
    if n == 0 {
        return Err(JobError::NumericFailure {
            reason: "every input is excluded from the estimated parameter",
        });
    }
    Ok(sum / f64::from(n))
}

fn best_fit(current: &FeatureValue, inputs: &[Input<'_>]) -> Result<Outcome, JobError> {
    let points = input_points(inputs)?;
    let n = points.len();
    let kind = current.kind();
    let minimum = super::min_observations(kind);
    let c = centroid(&points);

    let (value, residuals) = match kind {
        FeatureKind::Point => {
            (FeatureValue::Point { xyz: c }, point_residuals(inputs, &points, c))
        }
        FeatureKind::Station => {
            (FeatureValue::Station { xyz: c }, point_residuals(inputs, &points, c))
        }
        FeatureKind::Line => {
            let ijk = fit::principal_direction(&points)?;
            let dist = |p: [f64; 3]| {
                let d = sub(p, c);
                norm(cross(d, ijk))
            };
            let residuals = radial_residuals(inputs, &points, dist, 0.0);
            (FeatureValue::Line { xyz: c, ijk }, residuals)
        }
        FeatureKind::Plane => {
            let ijk = fit::newell_normal(&points).ok_or(JobError::NumericFailure {
                reason: "plane points are collinear",
            })?;
            let residuals = inputs
                .iter()
                .zip(&points)
                .map(|(input, p)| {
                    let v = dot(sub(*p, c), ijk);
                    Residual {
                        element_id: input.element.id,
                        vx: v * ijk[0],
                        vy: v * ijk[1],
                        vz: v * ijk[2],
                        v,
                    }
                })
                .collect();
            (FeatureValue::Plane { xyz: c, ijk }, residuals)
        }
        FeatureKind::Circle => {
            let ijk = fit::newell_normal(&points).ok_or(JobError::NumericFailure {
                reason: "circle points are collinear",
            })?;
            let in_plane = move |p: [f64; 3]| {
                let d = sub(p, c);
                let axial = dot(d, ijk);
                norm(sub(d, [axial * ijk[0], axial * ijk[1], axial * ijk[2]]))
            };
            let radius = contributing_mean(inputs, &points, GeometryParameter::Radius, in_plane)?;
            let residuals = radial_residuals(inputs, &points, in_plane, radius);
            (FeatureValue::Circle { xyz: c, ijk, radius }, residuals)
        }
        FeatureKind::Sphere => {
            let from_center = move |p: [f64; 3]| norm(sub(p, c));
            let radius =
                contributing_mean(inputs, &points, GeometryParameter::Radius, from_center)?;
            if radius < 1e-12 {
                return Err(JobError::NumericFailure {
                    reason: "sphere points are coincident",
                });
            }
            let residuals = radial_residuals(inputs, &points, from_center, radius);
            (FeatureValue::Sphere { xyz: c, radius }, residuals)
        }
        FeatureKind::Cylinder => {
            let ijk = fit::principal_direction(&points)?;
            let from_axis = move |p: [f64; 3]| norm(cross(sub(p, c), ijk));
            let radius = contributing_mean(inputs, &points, GeometryParameter::Radius, from_axis)?;
            let residuals = radial_residuals(inputs, &points, from_axis, radius);
            (FeatureValue::Cylinder { xyz: c, ijk, radius }, residuals)
        }
        FeatureKind::Cone => {
            let ijk = fit::principal_direction(&points)?;
            let half_angle = move |p: [f64; 3]| {
                let d = sub(p, c);
                let axial = dot(d, ijk).abs();
                let radial = norm(cross(d, ijk));
                radial.atan2(axial)
            };
            let aperture =
                2.0 * contributing_mean(inputs, &points, GeometryParameter::Aperture, half_angle)?;
            let residuals = radial_residuals(inputs, &points, half_angle, aperture / 2.0);
            (FeatureValue::Cone { xyz: c, ijk, aperture }, residuals)
        }
        FeatureKind::Ellipsoid => {
            let mut semi_axes = [0.0_f64; 3];
            for p in &points {
                let d = sub(*p, c);
                for i in 0..3 {
                    semi_axes[i] = semi_axes[i].max(d[i].abs());
                }
            }
            let from_center = move |p: [f64; 3]| norm(sub(p, c));
            let mean = contributing_mean(inputs, &points, GeometryParameter::Radius, from_center)?;
            let residuals = radial_residuals(inputs, &points, from_center, mean);
            (FeatureValue::Ellipsoid { xyz: c, semi_axes }, residuals)
        }
        FeatureKind::Hyperboloid => {
            let ijk = fit::principal_direction(&points)?;
            let from_axis = move |p: [f64; 3]| norm(cross(sub(p, c), ijk));
            let a = contributing_mean(inputs, &points, GeometryParameter::Radius, from_axis)?;
            let axial = move |p: [f64; 3]| dot(sub(p, c), ijk).abs();
            let c_param = contributing_mean(inputs, &points, GeometryParameter::Length, axial)?;
            let residuals = radial_residuals(inputs, &points, from_axis, a);
            (FeatureValue::Hyperboloid { xyz: c, ijk, a, c: c_param }, residuals)
        }
        FeatureKind::Paraboloid => {
            let ijk = fit::principal_direction(&points)?;
            let from_axis = move |p: [f64; 3]| norm(cross(sub(p, c), ijk));
            let a = contributing_mean(inputs, &points, GeometryParameter::Radius, from_axis)?;
            let residuals = radial_residuals(inputs, &points, from_axis, a);
            (FeatureValue::Paraboloid { xyz: c, ijk, a }, residuals)
        }
        FeatureKind::Torus => {
            let ijk = fit::newell_normal(&points).ok_or(JobError::NumericFailure {
                reason: "torus points are collinear",
            })?;
            let in_plane = move |p: [f64; 3]| {
                let d = sub(p, c);
                let axial = dot(d, ijk);
                norm(sub(d, [axial * ijk[0], axial * ijk[1], axial * ijk[2]]))
            };
            let radius_a = contributing_mean(inputs, &points, GeometryParameter::Radius, in_plane)?;
            let axial = move |p: [f64; 3]| dot(sub(p, c), ijk).abs();
            let radius_b = contributing_mean(inputs, &points, GeometryParameter::RadiusB, axial)?;
            let residuals = radial_residuals(inputs, &points, in_plane, radius_a);
            (FeatureValue::Torus { xyz: c, ijk, radius_a, radius_b }, residuals)
        }
        FeatureKind::Ellipse => {
            let ijk = fit::newell_normal(&points).ok_or(JobError::NumericFailure {
                reason: "ellipse points are collinear",
            })?;
            let in_plane = move |p: [f64; 3]| {
                let d = sub(p, c);
                let axial = dot(d, ijk);
                norm(sub(d, [axial * ijk[0], axial * ijk[1], axial * ijk[2]]))
            };
            let mut a = 0.0_f64;
            let mut b = f64::INFINITY;
            for p in &points {
                let r = in_plane(*p);
                a = a.max(r);
                b = b.min(r);
            }
            let mean = contributing_mean(inputs, &points, GeometryParameter::Radius, in_plane)?;
            let residuals = radial_residuals(inputs, &points, in_plane, mean);
            (FeatureValue::Ellipse { xyz: c, ijk, a, b }, residuals)
        }
        FeatureKind::SlottedHole => {
            let ijk = fit::newell_normal(&points).ok_or(JobError::NumericFailure {
                reason: "slotted-hole points are collinear",
            })?;
            let in_plane = move |p: [f64; 3]| {
                let d = sub(p, c);
                let axial = dot(d, ijk);
                norm(sub(d, [axial * ijk[0], axial * ijk[1], axial * ijk[2]]))
            };
            let mut radius = f64::INFINITY;
            let mut half_length = 0.0_f64;
            for p in &points {
                let r = in_plane(*p);
                radius = radius.min(r);
                half_length = half_length.max(r);
            }
            let mean = contributing_mean(inputs, &points, GeometryParameter::Radius, in_plane)?;
            let residuals = radial_residuals(inputs, &points, in_plane, mean);
            (
                FeatureValue::SlottedHole { xyz: c, ijk, radius, length: 2.0 * half_length },
                residuals,
            )
        }
        FeatureKind::Nurbs => {
            let residuals = point_residuals(inputs, &points, c);
            let degree = 3.min(n as u32 - 1);
            (FeatureValue::Nurbs { degree, control_points: points.clone() }, residuals)
        }
        FeatureKind::PointCloud => {
            let residuals = point_residuals(inputs, &points, c);
            (FeatureValue::PointCloud { main_focus: c, points: points.clone() }, residuals)
        }
        kind => return Err(JobError::NotApplicable { kind }),
    };

    let statistic = statistic_for(inputs, minimum, residuals);
    let protocol = alloc::vec![
        format!("best fit {} from {n} observations", kind.as_str()),
        format!("stdev {:.6}, dof {}", statistic.stdev, statistic.dof),
    ];
    Ok((value, statistic, protocol))
}

fn from_elements(current: &FeatureValue, slots: &[Vec<Input<'_>>]) -> Result<Outcome, JobError> {
    match current.kind() {
        FeatureKind::ScalarDistance => {
            let a = slots[0][0].position_3d().ok_or(JobError::InvalidParameters {
                reason: "input element carries no position",
            })?;
            let b = slots[1][0].position_3d().ok_or(JobError::InvalidParameters {
                reason: "input element carries no position",
            })?;
            let value = norm(sub(b, a));
            let protocol = alloc::vec![format!("distance between points: {value:.6}")];
            Ok((
                FeatureValue::ScalarDistance { value },
                Statistic { is_valid: true, ..Statistic::default() },
                protocol,
            ))
        }
        FeatureKind::ScalarAngle => {
            let dir = |input: &Input<'_>| match &input.resolved {
                ResolvedElement::Feature(value) => value.direction(),
                ResolvedElement::Observation(_) => None,
            };
            let (Some(a), Some(b)) = (dir(&slots[0][0]), dir(&slots[1][0])) else {
                return Err(JobError::InvalidParameters {
                    reason: "input element carries no direction",
                });
            };
            let (Some(a), Some(b)) = (normalize(a), normalize(b)) else {
                return Err(JobError::NumericFailure {
                    reason: "line direction is zero",
                });
            };
            let value = dot(a, b).clamp(-1.0, 1.0).acos();
            let protocol = alloc::vec![format!("angle between lines: {value:.6} rad")];
            Ok((
                FeatureValue::ScalarAngle { value },
                Statistic { is_valid: true, ..Statistic::default() },
                protocol,
            ))
        }
        FeatureKind::ScalarTemperature => {
            let ResolvedElement::Feature(FeatureValue::ScalarMeasurementSeries { values }) =
                &slots[0][0].resolved
            else {
                return Err(JobError::InvalidParameters {
                    reason: "input element is not a measurement series",
                });
            };
            if values.is_empty() {
                return Err(JobError::NumericFailure {
                    reason: "measurement series is empty",
                });
            }
            let value = values.iter().sum::<f64>() / values.len() as f64;
            let protocol =
                alloc::vec![format!("mean of {} series values: {value:.6}", values.len())];
            Ok((
                FeatureValue::ScalarTemperature { value },
                Statistic { is_valid: true, ..Statistic::default() },
                protocol,
            ))
        }
        kind => Err(JobError::NotApplicable { kind }),
    }
}

fn trafo_from_points(
    current: &FeatureValue,
    slots: &[Vec<Input<'_>>],
) -> Result<Outcome, JobError> {
    let FeatureValue::TrafoParam(existing) = current else {
        return Err(JobError::NotApplicable { kind: current.kind() });
    };
    if slots[0].len() != slots[1].len() {
        return Err(JobError::InvalidParameters {
            reason: "start and destination point groups differ in size",
        });
    }
    let start = input_points(&slots[0])?;
    let destination = input_points(&slots[1])?;
    // Correspondence-based translation estimate; rotation and scale stay
    // neutral. A full similarity adjustment belongs to a bundle collaborator.
    let translation = sub(centroid(&destination), centroid(&start));
    let mut data = TrafoParamData {
        rotation: [0.0; 3],
        translation,
        scale: [1.0; 3],
        ..existing.clone()
    };
    data.homogen = crate::transform::Transform3d::trs(data.rotation, translation, data.scale);
    let residuals: Vec<Residual> = slots[0]
        .iter()
        .zip(start.iter().zip(&destination))
        .map(|(input, (s, d))| {
            let mapped = data.homogen.apply(*s);
            let v = sub(*d, mapped);
            Residual {
                element_id: input.element.id,
                vx: v[0],
                vy: v[1],
                vz: v[2],
                v: norm(v),
            }
        })
        .collect();
    let statistic = statistic_for(&slots[0], 3, residuals);
    let protocol = alloc::vec![format!(
        "transformation from {} point pairs, stdev {:.6}",
        start.len(),
        statistic.stdev
    )];
    Ok((FeatureValue::TrafoParam(data), statistic, protocol))
}

fn system_from_trafo(
    current: &FeatureValue,
    slots: &[Vec<Input<'_>>],
    store: &FeatureStore,
) -> Result<Outcome, JobError> {
    let FeatureValue::CoordinateSystem(existing) = current else {
        return Err(JobError::NotApplicable { kind: current.kind() });
    };
    let trafo_id = slots[0][0].element.id;
    let effective = store.effective_trafo(trafo_id)?;
    let mut data = existing.clone();
    data.origin = effective.apply([0.0; 3]);
    let protocol = alloc::vec![format!(
        "system origin from transformation {trafo_id}: [{:.6}, {:.6}, {:.6}]",
        data.origin[0], data.origin[1], data.origin[2]
    )];
    Ok((
        FeatureValue::CoordinateSystem(data),
        Statistic { is_valid: true, ..Statistic::default() },
        protocol,
    ))
}

fn apply_fixed(value: &mut FeatureValue, parameter: GeometryParameter, fixed: f64) {
    use GeometryParameter::*;
    let position = match value {
        FeatureValue::Point { xyz }
        | FeatureValue::Line { xyz, .. }
        | FeatureValue::Plane { xyz, .. }
        | FeatureValue::Circle { xyz, .. }
        | FeatureValue::Sphere { xyz, .. }
        | FeatureValue::Cone { xyz, .. }
        | FeatureValue::Cylinder { xyz, .. }
        | FeatureValue::Ellipsoid { xyz, .. }
        | FeatureValue::Hyperboloid { xyz, .. }
        | FeatureValue::Paraboloid { xyz, .. }
        | FeatureValue::Torus { xyz, .. }
        | FeatureValue::Ellipse { xyz, .. }
        | FeatureValue::SlottedHole { xyz, .. }
        | FeatureValue::Station { xyz } => Some(xyz),
        _ => None,
    };
    if let Some(xyz) = position {
        match parameter {
            CenterX => {
                xyz[0] = fixed;
                return;
            }
            CenterY => {
                xyz[1] = fixed;
                return;
            }
            CenterZ => {
                xyz[2] = fixed;
                return;
            }
            _ => {}
        }
    }
    let direction = match value {
        FeatureValue::Line { ijk, .. }
        | FeatureValue::Plane { ijk, .. }
        | FeatureValue::Circle { ijk, .. }
        | FeatureValue::Cone { ijk, .. }
        | FeatureValue::Cylinder { ijk, .. }
        | FeatureValue::Hyperboloid { ijk, .. }
        | FeatureValue::Paraboloid { ijk, .. }
        | FeatureValue::Torus { ijk, .. }
        | FeatureValue::Ellipse { ijk, .. }
        | FeatureValue::SlottedHole { ijk, .. } => Some(ijk),
        _ => None,
    };
    if let Some(ijk) = direction {
        match parameter {
            DirectionI => {
                ijk[0] = fixed;
                return;
            }
            DirectionJ => {
                ijk[1] = fixed;
                return;
            }
            DirectionK => {
                ijk[2] = fixed;
                return;
            }
            _ => {}
        }
    }
    match (value, parameter) {
        (
            FeatureValue::Circle { radius, .. }
            | FeatureValue::Sphere { radius, .. }
            | FeatureValue::Cylinder { radius, .. }
            | FeatureValue::SlottedHole { radius, .. },
            Radius,
        ) => *radius = fixed,
        (FeatureValue::Torus { radius_a, .. }, Radius) => *radius_a = fixed,
        (FeatureValue::Torus { radius_b, .. }, RadiusB) => *radius_b = fixed,
        (FeatureValue::Ellipse { a, .. }, Radius) => *a = fixed,
        (FeatureValue::Ellipse { b, .. }, RadiusB) => *b = fixed,
        (FeatureValue::Cone { aperture, .. }, Aperture) => *aperture = fixed,
        (FeatureValue::SlottedHole { length, .. }, Length) => *length = fixed,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::Feature;
    use alloc::string::ToString;

    fn store_with_observations(points: &[[f64; 3]]) -> (FeatureStore, Vec<ElementId>) {
        let mut store = FeatureStore::default();
        let mut ids = Vec::new();
        for p in points {
            let mut obs = Observation::cartesian(*p);
            let id = store.allocate_id();
            obs.id = id;
            store.observations.insert(id, obs);
            ids.push(id);
        }
        (store, ids)
    }

    fn wire_all(f: &mut Function, ids: &[ElementId]) {
        for id in ids {
            f.add_input_element(0, InputElement::observation(*id)).unwrap();
        }
    }

    #[test]
    fn point_fit_needs_three_usable_observations() {
        let (store, ids) =
            store_with_observations(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0]]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Point).unwrap();
        wire_all(&mut f, &ids);
        let current = FeatureValue::default_for(FeatureKind::Point);
        let err = execute(&mut f, &current, &store).unwrap_err();
        assert_eq!(err, JobError::MissingInput { position: 0 });
    }

    #[test]
    fn point_fit_is_the_centroid_with_one_residual_per_observation() {
        let (store, ids) =
            store_with_observations(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 3.0, 0.0]]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Point).unwrap();
        wire_all(&mut f, &ids);
        let current = FeatureValue::default_for(FeatureKind::Point);
        let value = execute(&mut f, &current, &store).unwrap();
        assert_eq!(value, FeatureValue::Point { xyz: [1.0, 1.0, 0.0] });
        assert_eq!(f.statistic().residuals.len(), 3);
        assert!(f.statistic().is_valid);
        assert!(f.input_elements(0).iter().all(|e| e.is_used));
        assert!(!f.result_protocol().is_empty());
    }

    #[test]
    fn disabled_observations_do_not_count() {
        let (store, ids) =
            store_with_observations(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 3.0, 0.0]]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Point).unwrap();
        wire_all(&mut f, &ids);
        f.set_should_be_used(ids[2], false);
        let current = FeatureValue::default_for(FeatureKind::Point);
        let err = execute(&mut f, &current, &store).unwrap_err();
        assert_eq!(err, JobError::MissingInput { position: 0 });
    }

    #[test]
    fn sphere_fit_recovers_radius() {
        let r = 5.0;
        let (store, ids) = store_with_observations(&[
            [r, 0.0, 0.0],
            [-r, 0.0, 0.0],
            [0.0, r, 0.0],
            [0.0, -r, 0.0],
            [0.0, 0.0, r],
            [0.0, 0.0, -r],
        ]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Sphere).unwrap();
        wire_all(&mut f, &ids);
        let current = FeatureValue::default_for(FeatureKind::Sphere);
        let FeatureValue::Sphere { xyz, radius } = execute(&mut f, &current, &store).unwrap()
        else {
            panic!("wrong variant");
        };
        assert!(norm(xyz) < 1e-9);
        assert!((radius - r).abs() < 1e-9);
        // All on the surface: zero stdev.
        assert!(f.statistic().stdev < 1e-9);
    }

    #[test]
    fn circle_fit_excludes_radius_ignored_elements_from_the_radius() {
        let (store, ids) = store_with_observations(&[
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [-1.0, 0.0, 0.0],
            [0.0, -1.0, 0.0],
            [9.0, 0.0, 0.0],
        ]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Circle).unwrap();
        wire_all(&mut f, &ids);
        // The outlier keeps influencing the plane and center but not the
        // radius estimate.
        let outlier = ids[4];
        for e in f.input_elements.get_mut(&0).unwrap() {
            if e.id == outlier {
                e.ignored_target_params.insert(GeometryParameter::Radius);
            }
        }
        let current = FeatureValue::default_for(FeatureKind::Circle);
        let FeatureValue::Circle { radius, .. } = execute(&mut f, &current, &store).unwrap()
        else {
            panic!("wrong variant");
        };
        // Center is dragged to x = 1.8; mean radius over the four inner
        // points only.
        let c = [1.8, 0.0, 0.0];
        let expected: f64 = ids[..4]
            .iter()
            .map(|id| norm(sub(store.observation(*id).unwrap().position(), c)))
            .sum::<f64>()
            / 4.0;
        assert!((radius - expected).abs() < 1e-9);
    }

    #[test]
    fn fixed_parameter_overrides_the_estimate() {
        let (store, ids) =
            store_with_observations(&[[0.0, 0.0, 0.0], [2.0, 0.0, 0.0], [1.0, 3.0, 0.0]]);
        let mut f = Function::best_fit(ElementId::from_raw(100), FeatureKind::Point).unwrap();
        wire_all(&mut f, &ids);
        f.fix_parameter(GeometryParameter::CenterZ, 7.5);
        let current = FeatureValue::default_for(FeatureKind::Point);
        let value = execute(&mut f, &current, &store).unwrap();
        assert_eq!(value, FeatureValue::Point { xyz: [1.0, 1.0, 7.5] });
    }

    #[test]
    fn distance_between_point_features() {
        let mut store = FeatureStore::default();
        let a = store.allocate_id();
        let mut fa = Feature::new(a, "a".to_string(), FeatureKind::Point);
        fa.value = FeatureValue::Point { xyz: [0.0, 0.0, 0.0] };
        store.insert(fa);
        let b = store.allocate_id();
        let mut fb = Feature::new(b, "b".to_string(), FeatureKind::Point);
        fb.value = FeatureValue::Point { xyz: [3.0, 4.0, 0.0] };
        store.insert(fb);

        let mut f = Function::distance(ElementId::from_raw(100));
        f.add_input_element(0, InputElement::feature(a, FeatureKind::Point)).unwrap();
        f.add_input_element(1, InputElement::feature(b, FeatureKind::Point)).unwrap();
        let current = FeatureValue::default_for(FeatureKind::ScalarDistance);
        let value = execute(&mut f, &current, &store).unwrap();
        assert_eq!(value, FeatureValue::ScalarDistance { value: 5.0 });
    }

    #[test]
    fn angle_between_line_features() {
        let mut store = FeatureStore::default();
        let a = store.allocate_id();
        let mut fa = Feature::new(a, "a".to_string(), FeatureKind::Line);
        fa.value = FeatureValue::Line { xyz: [0.0; 3], ijk: [1.0, 0.0, 0.0] };
        store.insert(fa);
        let b = store.allocate_id();
        let mut fb = Feature::new(b, "b".to_string(), FeatureKind::Line);
        fb.value = FeatureValue::Line { xyz: [0.0; 3], ijk: [0.0, 1.0, 0.0] };
        store.insert(fb);

        let mut f = Function::angle(ElementId::from_raw(100));
        f.add_input_element(0, InputElement::feature(a, FeatureKind::Line)).unwrap();
        f.add_input_element(1, InputElement::feature(b, FeatureKind::Line)).unwrap();
        let current = FeatureValue::default_for(FeatureKind::ScalarAngle);
        let FeatureValue::ScalarAngle { value } = execute(&mut f, &current, &store).unwrap()
        else {
            panic!("wrong variant");
        };
        assert!((value - core::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn applicability_is_checked_before_inputs() {
        let store = FeatureStore::default();
        let mut f = Function::distance(ElementId::from_raw(100));
        let current = FeatureValue::default_for(FeatureKind::Point);
        let err = execute(&mut f, &current, &store).unwrap_err();
        assert_eq!(err, JobError::NotApplicable { kind: FeatureKind::Point });
    }
}
