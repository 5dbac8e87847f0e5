// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Minimal column-major 4×4 homogeneous transform.
//!
//! This type covers the subset of 3-D affine transforms the core actually
//! needs (build from rotation/translation/scale, multiply, apply to points,
//! decompose back into parameters) without pulling in a full linear-algebra
//! crate. The composition order is fixed everywhere in the crate: a
//! transformation parameter set `(rotation, translation, scale)` always maps
//! to `T · R · S` applied to column vectors — scale first, then rotate, then
//! translate.

use core::ops::Mul;
#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

/// A column-major 4×4 homogeneous transform stored as `[[f64; 4]; 4]`.
///
/// Each inner array is one *column* of the matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transform3d {
    /// Four columns, each a 4-element array `[x, y, z, w]`.
    pub cols: [[f64; 4]; 4],
}

impl Transform3d {
    /// The 4×4 identity matrix.
    pub const IDENTITY: Self = Self {
        cols: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Creates a transform from a column-major 2-D array.
    #[inline]
    #[must_use]
    pub const fn from_cols_array_2d(cols: [[f64; 4]; 4]) -> Self {
        Self { cols }
    }

    /// Returns the columns as a 2-D array.
    #[inline]
    #[must_use]
    pub const fn to_cols_array_2d(self) -> [[f64; 4]; 4] {
        self.cols
    }

    /// Returns column `i` (0-based).
    ///
    /// # Panics
    ///
    /// Panics if `i >= 4`.
    #[inline]
    #[must_use]
    pub const fn col(self, i: usize) -> [f64; 4] {
        self.cols[i]
    }

    /// Creates a pure translation transform.
    #[inline]
    #[must_use]
    pub const fn from_translation(t: [f64; 3]) -> Self {
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [t[0], t[1], t[2], 1.0],
            ],
        }
    }

    /// Creates a non-uniform scale transform.
    #[inline]
    #[must_use]
    pub const fn from_scale(s: [f64; 3]) -> Self {
        Self {
            cols: [
                [s[0], 0.0, 0.0, 0.0],
                [0.0, s[1], 0.0, 0.0],
                [0.0, 0.0, s[2], 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the X axis (radians).
    #[must_use]
    pub fn from_rotation_x(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [1.0, 0.0, 0.0, 0.0],
                [0.0, c, s, 0.0],
                [0.0, -s, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Y axis (radians).
    #[must_use]
    pub fn from_rotation_y(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [c, 0.0, -s, 0.0],
                [0.0, 1.0, 0.0, 0.0],
                [s, 0.0, c, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation around the Z axis (radians).
    #[must_use]
    pub fn from_rotation_z(radians: f64) -> Self {
        let (s, c) = sin_cos(radians);
        Self {
            cols: [
                [c, s, 0.0, 0.0],
                [-s, c, 0.0, 0.0],
                [0.0, 0.0, 1.0, 0.0],
                [0.0, 0.0, 0.0, 1.0],
            ],
        }
    }

    /// Creates a rotation from three Euler angles `[rx, ry, rz]` (radians),
    /// composed as `Rz · Ry · Rx`.
    #[must_use]
    pub fn from_rotation_xyz(r: [f64; 3]) -> Self {
        Self::from_rotation_z(r[2]) * Self::from_rotation_y(r[1]) * Self::from_rotation_x(r[0])
    }

    /// Builds the homogeneous matrix for a transformation parameter set.
    ///
    /// The composition order is `T · R · S`: a column vector is scaled, then
    /// rotated, then translated. Every producer and consumer of homogeneous
    /// matrices in this crate uses this order.
    #[must_use]
    pub fn trs(rotation: [f64; 3], translation: [f64; 3], scale: [f64; 3]) -> Self {
        Self::from_translation(translation)
            * Self::from_rotation_xyz(rotation)
            * Self::from_scale(scale)
    }

    /// Returns the translation component (fourth column).
    #[inline]
    #[must_use]
    pub const fn translation(&self) -> [f64; 3] {
        [self.cols[3][0], self.cols[3][1], self.cols[3][2]]
    }

    /// Applies the transform to a point (`w = 1`).
    #[must_use]
    pub fn apply(&self, p: [f64; 3]) -> [f64; 3] {
        let c = &self.cols;
        [
            c[0][0] * p[0] + c[1][0] * p[1] + c[2][0] * p[2] + c[3][0],
            c[0][1] * p[0] + c[1][1] * p[1] + c[2][1] * p[2] + c[3][1],
            c[0][2] * p[0] + c[1][2] * p[1] + c[2][2] * p[2] + c[3][2],
        ]
    }

    /// Decomposes the transform back into `(rotation, translation, scale)`
    /// under the fixed `T · R · S` convention.
    ///
    /// Scale factors are recovered as the norms of the three basis columns
    /// and Euler angles from the normalized rotation block (`Rz · Ry · Rx`
    /// order). Returns `None` if any scale factor is (numerically) zero or a
    /// matrix entry is not finite — such a matrix carries no recoverable
    /// parameter set.
    #[must_use]
    pub fn decompose(&self) -> Option<([f64; 3], [f64; 3], [f64; 3])> {
        if !self.is_finite() {
            return None;
        }
        let c = &self.cols;
        let mut scale = [0.0; 3];
        for (i, s) in scale.iter_mut().enumerate() {
            *s = (c[i][0] * c[i][0] + c[i][1] * c[i][1] + c[i][2] * c[i][2]).sqrt();
            if *s < 1e-12 {
                return None;
            }
        }
        // Normalized rotation block, r[col][row].
        let r = |col: usize, row: usize| c[col][row] / scale[col];
        // R = Rz(rz) · Ry(ry) · Rx(rx):
        //   row 2 = [-sin(ry), cos(ry)sin(rx), cos(ry)cos(rx)]
        //   col 0 = [cos(rz)cos(ry), sin(rz)cos(ry), -sin(ry)]
        let ry = (-r(0, 2)).asin();
        let rx = r(1, 2).atan2(r(2, 2));
        let rz = r(0, 1).atan2(r(0, 0));
        Some(([rx, ry, rz], self.translation(), scale))
    }

    /// Is every entry of this transform [finite]?
    ///
    /// [finite]: f64::is_finite
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        let c = &self.cols;
        let mut i = 0;
        while i < 4 {
            let mut j = 0;
            while j < 4 {
                if !c[i][j].is_finite() {
                    return false;
                }
                j += 1;
            }
            i += 1;
        }
        true
    }
}

impl Default for Transform3d {
    #[inline]
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform3d {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        let a = &self.cols;
        let b = &rhs.cols;
        let mut out = [[0.0_f64; 4]; 4];
        let mut j = 0;
        while j < 4 {
            let mut i = 0;
            while i < 4 {
                out[j][i] =
                    a[0][i] * b[j][0] + a[1][i] * b[j][1] + a[2][i] * b[j][2] + a[3][i] * b[j][3];
                i += 1;
            }
            j += 1;
        }
        Self { cols: out }
    }
}

#[inline]
fn sin_cos(radians: f64) -> (f64, f64) {
    #[cfg(feature = "std")]
    {
        radians.sin_cos()
    }
    #[cfg(not(feature = "std"))]
    {
        (radians.sin(), radians.cos())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < EPS, "{a} != {b}");
    }

    #[test]
    fn default_is_identity() {
        assert_eq!(Transform3d::default(), Transform3d::IDENTITY);
    }

    #[test]
    fn trs_of_neutral_parameters_is_identity() {
        let t = Transform3d::trs([0.0; 3], [0.0; 3], [1.0; 3]);
        assert_eq!(t, Transform3d::IDENTITY);
    }

    #[test]
    fn identity_multiply() {
        let t = Transform3d::from_translation([1.0, 2.0, 3.0]);
        assert_eq!(Transform3d::IDENTITY * t, t);
        assert_eq!(t * Transform3d::IDENTITY, t);
    }

    #[test]
    fn trs_scales_before_rotating_before_translating() {
        // Half-turn around Z, double scale, then shift in X.
        let t = Transform3d::trs(
            [0.0, 0.0, core::f64::consts::PI],
            [10.0, 0.0, 0.0],
            [2.0, 2.0, 2.0],
        );
        let p = t.apply([1.0, 0.0, 0.0]);
        assert_close(p[0], 8.0);
        assert_close(p[1], 0.0);
        assert_close(p[2], 0.0);
    }

    #[test]
    fn rotation_z_quarter_turn() {
        let r = Transform3d::from_rotation_z(core::f64::consts::FRAC_PI_2);
        let p = r.apply([1.0, 0.0, 0.0]);
        assert_close(p[0], 0.0);
        assert_close(p[1], 1.0);
    }

    #[test]
    fn decompose_round_trips() {
        let rotation = [0.3, -0.2, 0.7];
        let translation = [4.0, -1.0, 2.5];
        let scale = [1.5, 0.75, 2.0];
        let t = Transform3d::trs(rotation, translation, scale);
        let (r2, t2, s2) = t.decompose().unwrap();
        for i in 0..3 {
            assert_close(r2[i], rotation[i]);
            assert_close(t2[i], translation[i]);
            assert_close(s2[i], scale[i]);
        }
    }

    #[test]
    fn decompose_rejects_collapsed_scale() {
        let t = Transform3d::from_scale([1.0, 0.0, 1.0]);
        assert!(t.decompose().is_none());
    }

    #[test]
    fn decompose_rejects_non_finite() {
        let mut t = Transform3d::IDENTITY;
        t.cols[1][2] = f64::NAN;
        assert!(t.decompose().is_none());
    }

    #[test]
    fn apply_translation() {
        let t = Transform3d::from_translation([1.0, 2.0, 3.0]);
        assert_eq!(t.apply([0.0, 0.0, 0.0]), [1.0, 2.0, 3.0]);
    }
}
