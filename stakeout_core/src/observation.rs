// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Ready-made observation records.
//!
//! An [`Observation`] is the core's ingestion boundary: the conversion from
//! raw polar/cartesian sensor readings — including error propagation into the
//! sigma vectors — happens entirely outside, in the sensor collaborator. The
//! core only consumes the finished record. Positions and directions are
//! stored homogeneous (`w` component last) to match the transform pipeline.

use crate::feature::ElementId;

/// A resolved, validated measurement consumed by fit functions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Observation {
    pub(crate) id: ElementId,
    /// Measured position, homogeneous (`[x, y, z, 1]`).
    pub xyz: [f64; 4],
    /// Standard deviations of the position components.
    pub sigma_xyz: [f64; 4],
    /// Measured direction, homogeneous (`[i, j, k, 1]`).
    pub ijk: [f64; 4],
    /// Standard deviations of the direction components.
    pub sigma_ijk: [f64; 4],
    /// Whether the sensor collaborator marked this observation usable.
    pub is_valid: bool,
    /// Whether this is a dummy point (placeholder, excluded from fits).
    pub is_dummy_point: bool,
    /// Whether the direction components carry meaning.
    pub has_direction: bool,
}

impl Observation {
    /// Creates a plain cartesian observation with unit weight and no
    /// direction. The id is assigned when the observation is added to a job.
    #[must_use]
    pub fn cartesian(xyz: [f64; 3]) -> Self {
        Self {
            id: ElementId::from_raw(u32::MAX),
            xyz: [xyz[0], xyz[1], xyz[2], 1.0],
            sigma_xyz: [0.0, 0.0, 0.0, 1.0],
            ijk: [0.0, 0.0, 0.0, 1.0],
            sigma_ijk: [0.0, 0.0, 0.0, 1.0],
            is_valid: true,
            is_dummy_point: false,
            has_direction: false,
        }
    }

    /// Returns this observation's job-wide id.
    #[must_use]
    pub const fn id(&self) -> ElementId {
        self.id
    }

    /// The cartesian position part.
    #[must_use]
    pub const fn position(&self) -> [f64; 3] {
        [self.xyz[0], self.xyz[1], self.xyz[2]]
    }

    /// Whether a fit may consume this observation at all.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.is_valid && !self.is_dummy_point
    }
}
