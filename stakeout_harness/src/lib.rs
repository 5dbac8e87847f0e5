// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reusable scenario builders and notification capture for job tests.
//!
//! The builders create fully wired jobs (features, fit functions, synthetic
//! observation sets) so integration tests can exercise the recalculation and
//! transformation paths without repeating setup boilerplate, and
//! [`NotificationLog`] captures drained notifications for order assertions.

#![no_std]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use stakeout_core::event::Notification;
use stakeout_core::feature::{ElementId, FeatureKind};
use stakeout_core::function::Function;
use stakeout_core::job::Job;
use stakeout_core::observation::Observation;

/// Points on a regular axis-aligned grid in the `z = height` plane.
#[must_use]
pub fn grid_points(nx: usize, ny: usize, spacing: f64, height: f64) -> Vec<[f64; 3]> {
    let mut points = Vec::with_capacity(nx * ny);
    for i in 0..nx {
        for j in 0..ny {
            points.push([i as f64 * spacing, j as f64 * spacing, height]);
        }
    }
    points
}

/// `n` points evenly spaced on a circle around `center` in the plane
/// `z = center[2]`.
#[must_use]
pub fn circle_points(center: [f64; 3], radius: f64, n: usize) -> Vec<[f64; 3]> {
    let mut points = Vec::with_capacity(n);
    for i in 0..n {
        let angle = core::f64::consts::TAU * i as f64 / n as f64;
        points.push([
            center[0] + radius * angle.cos(),
            center[1] + radius * angle.sin(),
            center[2],
        ]);
    }
    points
}

/// Six octahedral points on a sphere surface.
#[must_use]
pub fn sphere_points(center: [f64; 3], radius: f64) -> Vec<[f64; 3]> {
    let [x, y, z] = center;
    alloc::vec![
        [x + radius, y, z],
        [x - radius, y, z],
        [x, y + radius, z],
        [x, y - radius, z],
        [x, y, z + radius],
        [x, y, z - radius],
    ]
}

/// `n` points marching from `origin` along `direction` in unit steps.
#[must_use]
pub fn line_points(origin: [f64; 3], direction: [f64; 3], n: usize) -> Vec<[f64; 3]> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            [
                origin[0] + t * direction[0],
                origin[1] + t * direction[1],
                origin[2] + t * direction[2],
            ]
        })
        .collect()
}

/// Adds a feature with a best-fit function and one observation per point.
///
/// # Panics
///
/// Panics when the job rejects the setup; builders are for tests, where that
/// is the failure we want to see.
pub fn fit_feature(
    job: &mut Job,
    name: &str,
    kind: FeatureKind,
    points: &[[f64; 3]],
) -> ElementId {
    let id = job
        .add_feature(String::from(name), kind)
        .expect("feature name should be free");
    job.add_function(id, |fid| Function::best_fit(fid, kind))
        .expect("kind should have a best fit");
    for p in points {
        job.add_observation(id, Observation::cartesian(*p))
            .expect("observation should attach");
    }
    id
}

/// A drained-notification capture with order helpers.
#[derive(Clone, Debug, Default)]
pub struct NotificationLog {
    entries: Vec<Notification>,
}

impl NotificationLog {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Drains the job's pending notifications into the log.
    pub fn capture(&mut self, job: &mut Job) {
        self.entries.extend(job.drain_notifications());
    }

    /// Every captured notification, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    /// The ids of recalculated features in emission order.
    #[must_use]
    pub fn recalculated_order(&self) -> Vec<ElementId> {
        self.entries
            .iter()
            .filter_map(|n| match n {
                Notification::FeatureRecalculated(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    /// Whether `producer` was reported recalculated before `consumer`.
    ///
    /// # Panics
    ///
    /// Panics when either id was never reported.
    #[must_use]
    pub fn recalculated_before(&self, producer: ElementId, consumer: ElementId) -> bool {
        let order = self.recalculated_order();
        let position = |id| {
            order
                .iter()
                .position(|x| *x == id)
                .expect("feature should have been recalculated")
        };
        position(producer) < position(consumer)
    }

    /// Whether any cycle rejection was captured.
    #[must_use]
    pub fn saw_cycle_rejection(&self) -> bool {
        self.entries
            .iter()
            .any(|n| matches!(n, Notification::CycleRejected { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakeout_core::error::JobError;
    use stakeout_core::feature::FeatureValue;
    use stakeout_core::transform::Transform3d;

    #[test]
    fn every_element_gets_a_distinct_id() {
        let mut job = Job::new("ids");
        let mut ids = Vec::new();
        ids.push(fit_feature(&mut job, "p", FeatureKind::Point, &grid_points(2, 2, 1.0, 0.0)));
        ids.push(fit_feature(
            &mut job,
            "s",
            FeatureKind::Sphere,
            &sphere_points([0.0; 3], 2.0),
        ));
        for feature in job.store().features() {
            for function in feature.functions() {
                ids.push(function.id());
            }
        }
        ids.extend(job.store().observations().map(|o| o.id()));
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len(), "ids must never collide");
    }

    #[test]
    fn circle_fit_recovers_the_synthetic_circle() {
        let mut job = Job::new("circle");
        let id = fit_feature(
            &mut job,
            "c",
            FeatureKind::Circle,
            &circle_points([2.0, -1.0, 3.0], 4.0, 8),
        );
        let feature = job.store().feature(id).unwrap();
        assert!(feature.is_solved());
        let FeatureValue::Circle { xyz, radius, .. } = feature.value() else {
            panic!("wrong variant");
        };
        assert!((xyz[0] - 2.0).abs() < 1e-9);
        assert!((xyz[1] + 1.0).abs() < 1e-9);
        assert!((radius - 4.0).abs() < 1e-9);
    }

    #[test]
    fn recalculation_reports_producers_before_consumers() {
        let mut job = Job::new("order");
        let p1 = fit_feature(&mut job, "p1", FeatureKind::Point, &[[0.0; 3]; 3]);
        let p2 = fit_feature(
            &mut job,
            "p2",
            FeatureKind::Point,
            &[[6.0, 0.0, 0.0]; 3],
        );
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();
        let _ = job.drain_notifications();

        job.recalc_feature_set([p1, p2]);
        let mut log = NotificationLog::new();
        log.capture(&mut job);
        assert!(log.recalculated_before(p1, d));
        assert!(log.recalculated_before(p2, d));
        assert_eq!(
            job.store().feature(d).unwrap().value(),
            &FeatureValue::ScalarDistance { value: 6.0 }
        );
    }

    #[test]
    fn mutual_dependency_is_impossible_to_build() {
        let mut job = Job::new("cycles");
        let p1 = fit_feature(&mut job, "p1", FeatureKind::Point, &[[0.0; 3]; 3]);
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();

        // d now depends on p1; feeding d back into p1 must fail whole.
        let fit_id = job.store().feature(p1).unwrap().functions()[0].id();
        let mut log = NotificationLog::new();
        log.capture(&mut job);
        let err = job.add_input_feature(p1, fit_id, 0, d);
        assert!(matches!(err, Err(JobError::CycleDetected { .. })));
        log.capture(&mut job);
        assert!(log.saw_cycle_rejection());
        assert!(!job.graph().has_consumers(d));
    }

    #[test]
    fn forced_removal_leaves_no_dangling_references() {
        let mut job = Job::new("removal");
        let p1 = fit_feature(&mut job, "p1", FeatureKind::Point, &[[0.0; 3]; 3]);
        let p2 = fit_feature(&mut job, "p2", FeatureKind::Point, &[[1.0; 3]; 3]);
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();

        assert!(matches!(job.remove_feature(p1, false), Err(JobError::InUse { .. })));
        job.remove_feature(p1, true).unwrap();

        assert!(job.store().feature(p1).is_none());
        let function = &job.store().feature(d).unwrap().functions()[0];
        assert!(function
            .all_input_elements()
            .all(|(_, element)| element.id != p1));
        assert!(!job.store().feature(d).unwrap().is_solved());
    }

    #[test]
    fn third_observation_completes_the_fit() {
        let mut job = Job::new("staged");
        let id = job.add_feature("p", FeatureKind::Point).unwrap();
        job.add_function(id, |fid| Function::best_fit(fid, FeatureKind::Point))
            .unwrap();
        job.add_observation(id, Observation::cartesian([0.0, 0.0, 0.0])).unwrap();
        job.add_observation(id, Observation::cartesian([2.0, 0.0, 0.0])).unwrap();
        assert!(!job.store().feature(id).unwrap().is_solved());

        job.add_observation(id, Observation::cartesian([1.0, 3.0, 0.0])).unwrap();
        let feature = job.store().feature(id).unwrap();
        assert!(feature.is_solved());
        assert_eq!(feature.functions()[0].statistic().residuals.len(), 3);
    }

    #[test]
    fn bundle_chain_composes_root_to_leaf() {
        let mut job = Job::new("bundle");
        let a = job.add_feature("a", FeatureKind::TrafoParam).unwrap();
        let b = job.add_feature("b", FeatureKind::TrafoParam).unwrap();
        let c = job.add_feature("c", FeatureKind::TrafoParam).unwrap();
        job.set_transformation_vectors(a, &[0.0; 3], &[1.0, 0.0, 0.0], &[1.0; 3])
            .unwrap();
        job.set_transformation_vectors(b, &[0.0; 3], &[0.0, 2.0, 0.0], &[1.0; 3])
            .unwrap();
        job.set_transformation_vectors(c, &[0.0; 3], &[0.0, 0.0, 3.0], &[1.0; 3])
            .unwrap();
        job.set_bundle_parent(b, Some(a)).unwrap();
        job.set_bundle_parent(c, Some(b)).unwrap();

        let effective = job.store().effective_trafo(c).unwrap();
        assert_eq!(effective.translation(), [1.0, 2.0, 3.0]);
        // The root composes nothing above itself.
        let root = job.store().effective_trafo(a).unwrap();
        assert_eq!(root.translation(), [1.0, 0.0, 0.0]);
    }

    #[test]
    fn derived_system_follows_its_trafo() {
        let mut job = Job::new("derived");
        let part = job.add_feature("part", FeatureKind::CoordinateSystem).unwrap();
        let world = job.add_feature("world", FeatureKind::CoordinateSystem).unwrap();
        let trafo = job.add_feature("part->world", FeatureKind::TrafoParam).unwrap();
        job.set_trafo_systems(trafo, part, world).unwrap();
        job.set_transformation_vectors(trafo, &[0.0; 3], &[5.0, -2.0, 1.0], &[1.0; 3])
            .unwrap();
        let f = job
            .add_function(world, |id| Ok(Function::system_from_trafo(id)))
            .unwrap();
        job.add_input_feature(world, f, 0, trafo).unwrap();
        job.recalc_feature(world);
        let FeatureValue::CoordinateSystem(data) =
            job.store().feature(world).unwrap().value()
        else {
            panic!("wrong variant");
        };
        assert_eq!(data.origin, [5.0, -2.0, 1.0]);

        // Changing the trafo parameters recalculates the derived system.
        job.set_transformation_vectors(trafo, &[0.0; 3], &[7.0, 0.0, 0.0], &[1.0; 3])
            .unwrap();
        let FeatureValue::CoordinateSystem(data) =
            job.store().feature(world).unwrap().value()
        else {
            panic!("wrong variant");
        };
        assert_eq!(data.origin, [7.0, 0.0, 0.0]);

        let m = Transform3d::from_translation([0.0, 4.0, 0.0]);
        job.set_transformation_homogeneous(trafo, &m).unwrap();
        let FeatureValue::CoordinateSystem(data) =
            job.store().feature(world).unwrap().value()
        else {
            panic!("wrong variant");
        };
        assert_eq!(data.origin, [0.0, 4.0, 0.0]);
    }
}
