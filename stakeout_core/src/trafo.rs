// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transformation parameters and bundle composition.
//!
//! A trafo param links a start coordinate system to a destination system. Its
//! parameter vectors `(rotation, translation, scale)` and the cached
//! [`homogen`](TrafoParamData::homogen) matrix are kept mutually consistent
//! by every setter: whichever representation the caller supplies, the other
//! is re-derived under the fixed `T · R · S` composition order, and an
//! invalid input leaves *both* untouched.
//!
//! Bundle trafo params form a tree: a child's effective transform is its
//! parent's effective transform composed with its own parameters. Datum
//! trafos are a terminal correction — they never participate in bundle
//! chains, neither as parent nor as child.

use alloc::collections::BTreeSet;
use alloc::vec::Vec;

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::error::JobError;
use crate::feature::{ElementId, FeatureStore, FeatureValue};
use crate::transform::Transform3d;

/// Parameters of a transformation between two coordinate systems.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrafoParamData {
    /// Start system, if assigned.
    pub from_system: Option<ElementId>,
    /// Destination system, if assigned.
    pub to_system: Option<ElementId>,
    /// Whether this trafo param participates in transformations at all.
    pub is_used: bool,
    /// Whether this is a datum transformation (terminal correction, excluded
    /// from bundle composition).
    pub is_datum_trafo: bool,
    /// Whether this trafo param describes a movement over time.
    pub is_movement: bool,
    /// Whether this trafo param came out of a bundle adjustment.
    pub is_bundle: bool,
    /// Timestamp tick deciding which observations a movement applies to.
    pub valid_time: u64,
    /// Bundle parent, if any (weak reference by id).
    pub bundle_parent: Option<ElementId>,
    /// Bundle children (weak references by id).
    pub bundle_children: Vec<ElementId>,
    /// Euler rotation angles `[rx, ry, rz]` in radians.
    pub rotation: [f64; 3],
    /// Translation vector.
    pub translation: [f64; 3],
    /// Per-axis scale factors.
    pub scale: [f64; 3],
    /// Cached homogeneous matrix, always equal to
    /// `Transform3d::trs(rotation, translation, scale)`.
    pub homogen: Transform3d,
}

impl Default for TrafoParamData {
    fn default() -> Self {
        Self {
            from_system: None,
            to_system: None,
            is_used: true,
            is_datum_trafo: false,
            is_movement: false,
            is_bundle: false,
            valid_time: 0,
            bundle_parent: None,
            bundle_children: Vec::new(),
            rotation: [0.0; 3],
            translation: [0.0; 3],
            scale: [1.0; 3],
            homogen: Transform3d::IDENTITY,
        }
    }
}

impl TrafoParamData {
    /// Sets the parameters from three 3-vectors and re-derives the
    /// homogeneous matrix.
    ///
    /// Slices of any length other than 3 fail with
    /// [`JobError::InvalidParameters`] without touching prior state.
    pub fn set_vectors(
        &mut self,
        rotation: &[f64],
        translation: &[f64],
        scale: &[f64],
    ) -> Result<(), JobError> {
        let (Ok(r), Ok(t), Ok(s)) = (
            <[f64; 3]>::try_from(rotation),
            <[f64; 3]>::try_from(translation),
            <[f64; 3]>::try_from(scale),
        ) else {
            return Err(JobError::InvalidParameters {
                reason: "transformation parameter vectors must have length 3",
            });
        };
        self.rotation = r;
        self.translation = t;
        self.scale = s;
        self.homogen = Transform3d::trs(r, t, s);
        Ok(())
    }

    /// Sets the parameters from three component matrices (a rotation, a pure
    /// translation, and a diagonal scale) and re-derives the vectors.
    pub fn set_matrices(
        &mut self,
        rotation: &Transform3d,
        translation: &Transform3d,
        scale: &Transform3d,
    ) -> Result<(), JobError> {
        let invalid = JobError::InvalidParameters {
            reason: "component matrices carry no recoverable parameter set",
        };
        let Some((r, r_t, r_s)) = rotation.decompose() else {
            return Err(invalid.clone());
        };
        if r_t != [0.0; 3] || !uniform_unit(r_s) {
            return Err(invalid.clone());
        }
        let s = [scale.cols[0][0], scale.cols[1][1], scale.cols[2][2]];
        if s.iter().any(|v| !v.is_finite() || v.abs() < 1e-12) {
            return Err(invalid.clone());
        }
        let t = translation.translation();
        if !translation.is_finite() {
            return Err(invalid);
        }
        self.rotation = r;
        self.translation = t;
        self.scale = s;
        self.homogen = Transform3d::trs(r, t, s);
        Ok(())
    }

    /// Sets the parameters from a single homogeneous matrix and re-derives
    /// the vectors by decomposition.
    pub fn set_homogeneous(&mut self, matrix: &Transform3d) -> Result<(), JobError> {
        let Some((r, t, s)) = matrix.decompose() else {
            return Err(JobError::InvalidParameters {
                reason: "homogeneous matrix carries no recoverable parameter set",
            });
        };
        self.rotation = r;
        self.translation = t;
        self.scale = s;
        // Rebuild rather than store the input so both representations agree
        // exactly under the fixed composition order.
        self.homogen = Transform3d::trs(r, t, s);
        Ok(())
    }
}

fn uniform_unit(scale: [f64; 3]) -> bool {
    scale.iter().all(|s| (s - 1.0).abs() < 1e-9)
}

impl FeatureStore {
    /// Returns the effective transform of a trafo param: its own parameters
    /// composed under its bundle-parent chain (`parent_effective · own`).
    ///
    /// A trafo param without a parent — and every datum trafo — has
    /// `effective = own`. The parent chain is finite and acyclic by the
    /// wiring invariant; a corrupted chain is reported as
    /// [`JobError::CycleDetected`] rather than looping.
    pub fn effective_trafo(&self, id: ElementId) -> Result<Transform3d, JobError> {
        // Collect the chain child → root.
        let mut chain = Vec::new();
        let mut visited = BTreeSet::new();
        let mut current = Some(id);
        while let Some(tp_id) = current {
            let feature = self
                .feature(tp_id)
                .ok_or(JobError::UnknownElement { id: tp_id })?;
            let FeatureValue::TrafoParam(data) = feature.value() else {
                return Err(JobError::UnknownElement { id: tp_id });
            };
            if !visited.insert(tp_id) {
                return Err(JobError::CycleDetected {
                    producer: tp_id,
                    consumer: id,
                });
            }
            chain.push(data.homogen);
            current = if data.is_datum_trafo {
                None
            } else {
                data.bundle_parent
            };
        }
        // Fold root-first: effective = own(root) · … · own(child).
        let mut effective = Transform3d::IDENTITY;
        for own in chain.iter().rev() {
            effective = effective * *own;
        }
        Ok(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_representations_agree() {
        let data = TrafoParamData::default();
        assert_eq!(data.homogen, Transform3d::IDENTITY);
        assert_eq!(
            data.homogen,
            Transform3d::trs(data.rotation, data.translation, data.scale)
        );
    }

    #[test]
    fn set_vectors_rederives_matrix() {
        let mut data = TrafoParamData::default();
        data.set_vectors(&[0.1, 0.2, 0.3], &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0])
            .unwrap();
        assert_eq!(
            data.homogen,
            Transform3d::trs([0.1, 0.2, 0.3], [1.0, 2.0, 3.0], [1.0, 1.0, 1.0])
        );
    }

    #[test]
    fn set_vectors_rejects_wrong_length() {
        let mut data = TrafoParamData::default();
        let before = data.clone();
        let err = data
            .set_vectors(&[0.1, 0.2], &[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameters { .. }));
        assert_eq!(data, before);
    }

    #[test]
    fn set_homogeneous_rederives_vectors() {
        let mut data = TrafoParamData::default();
        let m = Transform3d::trs([0.2, -0.1, 0.4], [5.0, 6.0, 7.0], [2.0, 2.0, 2.0]);
        data.set_homogeneous(&m).unwrap();
        let eps = 1e-9;
        assert!((data.rotation[0] - 0.2).abs() < eps);
        assert!((data.translation[2] - 7.0).abs() < eps);
        assert!((data.scale[1] - 2.0).abs() < eps);
        for (a, b) in data
            .homogen
            .cols
            .iter()
            .flatten()
            .zip(m.cols.iter().flatten())
        {
            assert!((a - b).abs() < eps, "matrix not rebuilt consistently");
        }
    }

    #[test]
    fn set_homogeneous_rejects_degenerate_matrix() {
        let mut data = TrafoParamData::default();
        let before = data.clone();
        let err = data
            .set_homogeneous(&Transform3d::from_scale([1.0, 0.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, JobError::InvalidParameters { .. }));
        assert_eq!(data, before);
    }

    #[test]
    fn set_matrices_composes_and_rederives() {
        let mut data = TrafoParamData::default();
        let r = Transform3d::from_rotation_z(0.5);
        let t = Transform3d::from_translation([1.0, 0.0, 0.0]);
        let s = Transform3d::from_scale([2.0, 3.0, 4.0]);
        data.set_matrices(&r, &t, &s).unwrap();
        let eps = 1e-9;
        assert!((data.rotation[2] - 0.5).abs() < eps);
        assert_eq!(data.translation, [1.0, 0.0, 0.0]);
        assert_eq!(data.scale, [2.0, 3.0, 4.0]);
    }
}
