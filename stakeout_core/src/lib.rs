// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Core measurement-job model: features, functions, and recalculation.
//!
//! `stakeout_core` is the headless heart of a dimensional-metrology project.
//! It owns the features of a job (geometries, scalars, stations, coordinate
//! systems, transformation parameters), the functions that derive their
//! values from observations and from other features, and the dependency
//! graph that keeps derived values consistent when inputs change. It is
//! `no_std` compatible (with `alloc`); sensors, persistence, and UI are
//! collaborators on top.
//!
//! # Architecture
//!
//! Every mutation enters through a [`Job`](job::Job) command and leaves as a
//! batch of drained notifications:
//!
//! ```text
//!   Job command (add/remove/wire/observe)
//!       │
//!       ▼
//!   FeatureStore ──► DependencyGraph::wire() ── cycle? ──► rejected whole
//!       │                      │
//!       │                      ▼
//!       │             recalc request ──► topological order
//!       │                      │
//!       ▼                      ▼
//!   FeatureValue ◄── executor::execute() per function
//!       │
//!       ▼
//!   Notification queue ──► drained by UI / persistence
//! ```
//!
//! **[`feature`]** — Features, the closed [`FeatureKind`](feature::FeatureKind)
//! set with its per-kind [`FeatureValue`](feature::FeatureValue) variants, and
//! the id-keyed [`FeatureStore`](feature::FeatureStore).
//!
//! **[`function`]** — The function contract: declared needed elements, wired
//! input elements, fixed parameters, statistics, and the executor that
//! dispatches exhaustively over the value variants.
//!
//! **[`graph`]** — The acyclic producer/consumer dependency graph.
//!
//! **[`recalc`]** — Ordered recalculation (producers strictly before
//! consumers, ascending-id tie-break).
//!
//! **[`trafo`]** — Transformation parameters and bundle-chain composition.
//!
//! **[`transform`]** — Column-major homogeneous 4×4 transform with the fixed
//! `T · R · S` parameter convention.
//!
//! **[`observation`]** — Ready-made measurement records consumed by fits.
//!
//! **[`job`]** — The command surface tying the pieces together, plus the
//! active-element state and the notification queue in [`event`].
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies.
//! - `serde` (disabled by default): Serialization for ids, values, and
//!   transformation parameters.

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;

pub mod error;
pub mod event;
pub mod feature;
pub mod function;
pub mod graph;
pub mod job;
pub mod observation;
pub mod recalc;
pub mod trafo;
pub mod transform;
