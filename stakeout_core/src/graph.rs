// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The dependency graph between producers and consuming functions.
//!
//! Every wired input element is an edge from a *producer* (a feature or an
//! observation) to a *consumer* (a function slot on another feature). The
//! graph is the single source of truth for recalculation ordering and for
//! removal side effects, and it is kept acyclic by construction: a wire that
//! would close a cycle is rejected before any edge is inserted.
//!
//! ```text
//!   producer #3 ──▶ { (owner #7, function #8, slot 0),
//!                     (owner #9, function #11, slot 1) }
//! ```

use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;

use crate::error::JobError;
use crate::feature::ElementId;

/// One consuming endpoint of a dependency edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Consumer {
    /// The feature owning the consuming function.
    pub owner: ElementId,
    /// The consuming function.
    pub function: ElementId,
    /// The slot the producer is wired into.
    pub position: u32,
}

/// An acyclic element-dependency graph.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    /// Producer id → consumers of that producer.
    edges: BTreeMap<ElementId, BTreeSet<Consumer>>,
}

impl DependencyGraph {
    /// Adds an edge from `producer` to a function slot on `consumer`.
    ///
    /// Fails with [`JobError::CycleDetected`] — leaving the graph unchanged —
    /// if `producer == consumer.owner` or if `consumer.owner` already
    /// (transitively) produces into `producer`.
    pub fn wire(&mut self, producer: ElementId, consumer: Consumer) -> Result<(), JobError> {
        if producer == consumer.owner || self.reaches(consumer.owner, producer) {
            return Err(JobError::CycleDetected {
                producer,
                consumer: consumer.owner,
            });
        }
        self.edges.entry(producer).or_default().insert(consumer);
        Ok(())
    }

    /// Removes one edge. Idempotent.
    pub fn unwire(&mut self, producer: ElementId, consumer: Consumer) {
        if let Some(consumers) = self.edges.get_mut(&producer) {
            consumers.remove(&consumer);
            if consumers.is_empty() {
                self.edges.remove(&producer);
            }
        }
    }

    /// Removes every edge that mentions `id`, as producer or as consumer
    /// owner, and returns the consumers that were severed on the producer
    /// side (so the caller can unwire the matching input elements).
    pub fn unwire_all_of(&mut self, id: ElementId) -> Vec<Consumer> {
        let severed = self
            .edges
            .remove(&id)
            .map(|consumers| consumers.into_iter().collect())
            .unwrap_or_default();
        self.edges.retain(|_, consumers| {
            consumers.retain(|c| c.owner != id);
            !consumers.is_empty()
        });
        severed
    }

    /// The consumers directly wired to `producer`, in deterministic order.
    pub fn consumers_of(&self, producer: ElementId) -> impl Iterator<Item = &Consumer> {
        self.edges.get(&producer).into_iter().flatten()
    }

    /// Whether any consumer is wired to `producer`.
    #[must_use]
    pub fn has_consumers(&self, producer: ElementId) -> bool {
        self.edges.get(&producer).is_some_and(|c| !c.is_empty())
    }

    /// Owner features directly consuming `producer`, deduplicated, in
    /// ascending id order.
    #[must_use]
    pub fn dependent_owners(&self, producer: ElementId) -> Vec<ElementId> {
        let mut owners: Vec<ElementId> = self
            .consumers_of(producer)
            .map(|c| c.owner)
            .collect();
        owners.dedup();
        owners
    }

    /// Every feature transitively downstream of `start` (excluding `start`
    /// itself unless it is part of a path through another feature, which the
    /// acyclicity invariant rules out).
    #[must_use]
    pub fn transitive_dependents(&self, start: ElementId) -> BTreeSet<ElementId> {
        let mut out = BTreeSet::new();
        let mut stack = alloc::vec![start];
        while let Some(id) = stack.pop() {
            for consumer in self.consumers_of(id) {
                if out.insert(consumer.owner) {
                    stack.push(consumer.owner);
                }
            }
        }
        out
    }

    /// Direct producer → owner adjacency restricted to a feature set, used by
    /// the recalculation scheduler for its topological ordering.
    pub(crate) fn edges_within<'a>(
        &'a self,
        features: &'a BTreeSet<ElementId>,
    ) -> impl Iterator<Item = (ElementId, ElementId)> + 'a {
        self.edges.iter().flat_map(move |(producer, consumers)| {
            consumers
                .iter()
                .filter(move |c| features.contains(producer) && features.contains(&c.owner))
                .map(move |c| (*producer, c.owner))
        })
    }

    fn reaches(&self, from: ElementId, to: ElementId) -> bool {
        if from == to {
            return true;
        }
        let mut seen = BTreeSet::new();
        let mut stack = alloc::vec![from];
        while let Some(id) = stack.pop() {
            for consumer in self.consumers_of(id) {
                if consumer.owner == to {
                    return true;
                }
                if seen.insert(consumer.owner) {
                    stack.push(consumer.owner);
                }
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u32) -> ElementId {
        ElementId::from_raw(raw)
    }

    fn consumer(owner: u32, function: u32, position: u32) -> Consumer {
        Consumer {
            owner: id(owner),
            function: id(function),
            position,
        }
    }

    #[test]
    fn wire_and_unwire() {
        let mut graph = DependencyGraph::default();
        graph.wire(id(1), consumer(2, 20, 0)).unwrap();
        assert!(graph.has_consumers(id(1)));
        graph.unwire(id(1), consumer(2, 20, 0));
        assert!(!graph.has_consumers(id(1)));
        // Unwiring again is a no-op.
        graph.unwire(id(1), consumer(2, 20, 0));
    }

    #[test]
    fn self_wire_is_rejected() {
        let mut graph = DependencyGraph::default();
        let err = graph.wire(id(1), consumer(1, 10, 0)).unwrap_err();
        assert!(matches!(err, JobError::CycleDetected { .. }));
    }

    #[test]
    fn two_step_cycle_is_rejected_without_partial_edges() {
        let mut graph = DependencyGraph::default();
        // 1 → 2 → 3 is fine; 3 → 1 closes the loop.
        graph.wire(id(1), consumer(2, 20, 0)).unwrap();
        graph.wire(id(2), consumer(3, 30, 0)).unwrap();
        let err = graph.wire(id(3), consumer(1, 10, 0)).unwrap_err();
        assert_eq!(
            err,
            JobError::CycleDetected {
                producer: id(3),
                consumer: id(1),
            }
        );
        assert!(!graph.has_consumers(id(3)));
        // The rejected wire left the accepted edges alone.
        assert!(graph.has_consumers(id(1)));
        assert!(graph.has_consumers(id(2)));
    }

    #[test]
    fn unwire_all_of_severs_both_directions() {
        let mut graph = DependencyGraph::default();
        graph.wire(id(1), consumer(2, 20, 0)).unwrap();
        graph.wire(id(2), consumer(3, 30, 0)).unwrap();
        graph.wire(id(0), consumer(2, 21, 1)).unwrap();

        let severed = graph.unwire_all_of(id(2));
        // As producer: 2 → 3 was severed and reported.
        assert_eq!(severed, [consumer(3, 30, 0)]);
        // As consumer: 1 → 2 and 0 → 2 are gone.
        assert!(!graph.has_consumers(id(1)));
        assert!(!graph.has_consumers(id(0)));
    }

    #[test]
    fn transitive_dependents_follow_chains() {
        let mut graph = DependencyGraph::default();
        graph.wire(id(1), consumer(2, 20, 0)).unwrap();
        graph.wire(id(2), consumer(3, 30, 0)).unwrap();
        graph.wire(id(2), consumer(4, 40, 0)).unwrap();
        let dependents = graph.transitive_dependents(id(1));
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            [id(2), id(3), id(4)]
        );
        assert!(graph.transitive_dependents(id(4)).is_empty());
    }
}
