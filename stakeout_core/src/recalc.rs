// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ordered recalculation.
//!
//! A recalculation request names seed features; the affected set is the seeds
//! plus everything transitively downstream of them in the dependency graph.
//! The affected set is executed in topological order with ascending-id
//! tie-breaking, so a producer is always recomputed strictly before any of
//! its consumers and the order is deterministic for a given graph.
//!
//! ```text
//!   request(seeds) ──▶ affected = seeds ∪ dependents*
//!                            │ Kahn's algorithm, BTreeSet ready set
//!                            ▼
//!                      execute features in order
//!                            │ per feature: run its function list
//!                            ▼
//!            FeatureRecalculated × n, RecalculationFinished
//! ```
//!
//! Requests issued *while* a run is in progress (a command handler reacting
//! to a drained notification, say) are queued and processed after the
//! current run completes; the job is single-writer, so there is never a
//! second run racing the first.

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::format;
use alloc::vec::Vec;

use crate::event::{Notification, Severity};
use crate::feature::ElementId;
use crate::function::executor;
use crate::job::Job;

impl Job {
    /// Recalculates one feature and everything downstream of it.
    pub fn recalc_feature(&mut self, id: ElementId) {
        self.request(BTreeSet::from([id]));
    }

    /// Recalculates a set of features and everything downstream of them.
    pub fn recalc_feature_set(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        self.request(ids.into_iter().collect());
    }

    /// Recalculates every feature of the job.
    pub fn recalc_job(&mut self) {
        let all: BTreeSet<ElementId> = self.store().features().map(|f| f.id()).collect();
        self.request(all);
    }

    fn request(&mut self, seeds: BTreeSet<ElementId>) {
        if seeds.is_empty() {
            return;
        }
        self.recalc_queue.push_back(seeds);
        if self.recalc_in_progress {
            return;
        }
        self.recalc_in_progress = true;
        while let Some(seeds) = self.recalc_queue.pop_front() {
            self.run(seeds);
        }
        self.recalc_in_progress = false;
    }

    fn run(&mut self, seeds: BTreeSet<ElementId>) {
        // Seeds may name elements removed since the request was queued;
        // those are skipped, not errors.
        let mut affected = BTreeSet::new();
        for seed in seeds {
            if self.store().feature(seed).is_some() {
                affected.insert(seed);
            }
            for dependent in self.graph().transitive_dependents(seed) {
                if self.store().feature(dependent).is_some() {
                    affected.insert(dependent);
                }
            }
        }

        // Kahn's algorithm over the affected subgraph. Producers outside the
        // affected set are up to date and contribute no in-degree.
        let mut indegree: BTreeMap<ElementId, u32> =
            affected.iter().map(|id| (*id, 0)).collect();
        for (_, owner) in self.graph().edges_within(&affected) {
            if let Some(count) = indegree.get_mut(&owner) {
                *count += 1;
            }
        }
        let mut ready: BTreeSet<ElementId> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(id, _)| *id)
            .collect();

        let mut attempted = 0_u32;
        while let Some(id) = ready.pop_first() {
            if self.execute_feature(id) {
                attempted += 1;
                self.notify(Notification::FeatureRecalculated(id));
            }
            let downstream: Vec<ElementId> = self
                .graph()
                .consumers_of(id)
                .map(|c| c.owner)
                .filter(|owner| affected.contains(owner))
                .collect();
            for owner in downstream {
                if let Some(count) = indegree.get_mut(&owner) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(owner);
                    }
                }
            }
        }
        self.notify(Notification::RecalculationFinished { attempted });
    }

    /// Runs one feature's function list. Returns whether an execution was
    /// attempted (features without functions are sources and stay untouched).
    ///
    /// The feature is taken out of the store for the duration of the run so
    /// the executor can read the rest of the store freely; self-wires are
    /// rejected at wiring time, so no function ever needs its own feature.
    fn execute_feature(&mut self, id: ElementId) -> bool {
        let Some(mut feature) = self.store_mut().features.remove(&id) else {
            return false;
        };
        if feature.functions.is_empty() {
            self.store_mut().features.insert(id, feature);
            return false;
        }
        let mut candidate = feature.value.clone();
        let mut failure = None;
        for function in &mut feature.functions {
            match executor::execute(function, &candidate, self.store()) {
                Ok(value) => candidate = value,
                Err(err) => {
                    // Keep the previous derived value; later functions in
                    // the list are not run against a half-updated input.
                    failure = Some((function.name(), err));
                    break;
                }
            }
        }
        match failure {
            None => {
                feature.value = candidate;
                feature.is_solved = true;
            }
            Some((name, err)) => {
                feature.is_solved = false;
                let text = format!("{name} of feature {id} failed: {err}");
                self.store_mut().features.insert(id, feature);
                self.notify(Notification::message(Severity::Warning, text));
                return true;
            }
        }
        self.store_mut().features.insert(id, feature);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureKind, FeatureValue};
    use crate::function::Function;
    use crate::observation::Observation;

    fn fit_point(job: &mut Job, name: &str, points: &[[f64; 3]]) -> ElementId {
        let id = job.add_feature(name, FeatureKind::Point).unwrap();
        job.add_function(id, |fid| Function::best_fit(fid, FeatureKind::Point))
            .unwrap();
        for p in points {
            job.add_observation(id, Observation::cartesian(*p)).unwrap();
        }
        id
    }

    #[test]
    fn adding_the_third_observation_turns_the_fit_solvable() {
        let mut job = Job::new("test");
        let id = job.add_feature("p", FeatureKind::Point).unwrap();
        job.add_function(id, |fid| Function::best_fit(fid, FeatureKind::Point))
            .unwrap();
        job.add_observation(id, Observation::cartesian([0.0, 0.0, 0.0]))
            .unwrap();
        job.add_observation(id, Observation::cartesian([2.0, 0.0, 0.0]))
            .unwrap();
        assert!(!job.store().feature(id).unwrap().is_solved());

        job.add_observation(id, Observation::cartesian([1.0, 3.0, 0.0]))
            .unwrap();
        let feature = job.store().feature(id).unwrap();
        assert!(feature.is_solved());
        assert_eq!(feature.value(), &FeatureValue::Point { xyz: [1.0, 1.0, 0.0] });
        assert_eq!(feature.functions()[0].statistic().residuals.len(), 3);
    }

    #[test]
    fn producers_are_recalculated_before_consumers() {
        let mut job = Job::new("test");
        let p1 = fit_point(&mut job, "p1", &[[0.0; 3], [0.0; 3], [0.0; 3]]);
        let p2 = fit_point(
            &mut job,
            "p2",
            &[[4.0, 0.0, 0.0], [4.0, 0.0, 0.0], [4.0, 0.0, 0.0]],
        );
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();
        job.drain_notifications();

        job.recalc_feature_set([p1, p2]);

        assert_eq!(
            job.store().feature(d).unwrap().value(),
            &FeatureValue::ScalarDistance { value: 4.0 }
        );
        let notifications = job.drain_notifications();
        let order: Vec<ElementId> = notifications
            .iter()
            .filter_map(|n| match n {
                Notification::FeatureRecalculated(id) => Some(*id),
                _ => None,
            })
            .collect();
        let pos = |id| order.iter().position(|x| *x == id).unwrap();
        assert!(pos(p1) < pos(d));
        assert!(pos(p2) < pos(d));
        assert!(notifications.iter().any(|n| matches!(
            n,
            Notification::RecalculationFinished { attempted: 3 }
        )));
    }

    #[test]
    fn failed_producer_keeps_its_value_and_dependents_still_run() {
        let mut job = Job::new("test");
        let p1 = fit_point(&mut job, "p1", &[[0.0; 3], [0.0; 3], [0.0; 3]]);
        let p2 = fit_point(
            &mut job,
            "p2",
            &[[3.0, 0.0, 0.0], [3.0, 0.0, 0.0], [3.0, 0.0, 0.0]],
        );
        let d = job.add_feature("d", FeatureKind::ScalarDistance).unwrap();
        let f = job.add_function(d, |id| Ok(Function::distance(id))).unwrap();
        job.add_input_feature(d, f, 0, p1).unwrap();
        job.add_input_feature(d, f, 1, p2).unwrap();
        job.recalc_feature_set([p1, p2]);
        assert!(job.store().feature(d).unwrap().is_solved());

        // Starve p1 below its minimum; its fit now fails, the previous value
        // stays, and d still recomputes from that previous value.
        let obs: Vec<ElementId> = job
            .store()
            .feature(p1)
            .unwrap()
            .functions()[0]
            .input_elements(0)
            .iter()
            .map(|e| e.id)
            .take(2)
            .collect();
        job.disable_observations(&obs).unwrap();

        let feature = job.store().feature(p1).unwrap();
        assert!(!feature.is_solved());
        assert_eq!(feature.value(), &FeatureValue::Point { xyz: [0.0; 3] });
        let d_feature = job.store().feature(d).unwrap();
        assert!(d_feature.is_solved());
        assert_eq!(d_feature.value(), &FeatureValue::ScalarDistance { value: 3.0 });
    }

    #[test]
    fn removed_seed_is_skipped_without_error() {
        let mut job = Job::new("test");
        let p = fit_point(&mut job, "p", &[[0.0; 3], [0.0; 3], [0.0; 3]]);
        job.remove_feature(p, false).unwrap();
        job.drain_notifications();
        job.recalc_feature(p);
        let notifications = job.drain_notifications();
        assert!(notifications.iter().any(|n| matches!(
            n,
            Notification::RecalculationFinished { attempted: 0 }
        )));
    }
}
