// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small-vector numerics shared by the fit computations.

#[cfg(not(feature = "std"))]
use kurbo::common::FloatFuncs as _;

use crate::error::JobError;

pub(crate) fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

pub(crate) fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

pub(crate) fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

pub(crate) fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

/// Normalizes `a`, or returns `None` for a (numerically) zero vector.
pub(crate) fn normalize(a: [f64; 3]) -> Option<[f64; 3]> {
    let n = norm(a);
    if n < 1e-12 {
        return None;
    }
    Some([a[0] / n, a[1] / n, a[2] / n])
}

/// Arithmetic mean of a non-empty point set.
pub(crate) fn centroid(points: &[[f64; 3]]) -> [f64; 3] {
    let mut sum = [0.0; 3];
    for p in points {
        sum[0] += p[0];
        sum[1] += p[1];
        sum[2] += p[2];
    }
    let n = points.len() as f64;
    [sum[0] / n, sum[1] / n, sum[2] / n]
}

/// Plane normal of a point loop by Newell's method.
///
/// Robust against collinear triples inside the loop; returns `None` only when
/// the whole set is (numerically) collinear.
pub(crate) fn newell_normal(points: &[[f64; 3]]) -> Option<[f64; 3]> {
    let mut n = [0.0; 3];
    for (i, a) in points.iter().enumerate() {
        let b = &points[(i + 1) % points.len()];
        n[0] += (a[1] - b[1]) * (a[2] + b[2]);
        n[1] += (a[2] - b[2]) * (a[0] + b[0]);
        n[2] += (a[0] - b[0]) * (a[1] + b[1]);
    }
    normalize(n)
}

const POWER_ITERATIONS: u32 = 64;

/// Dominant eigenvector of the scatter matrix of `points` about their
/// centroid — the direction of largest extent.
///
/// Estimated by power iteration with a fixed iteration bound; failure to
/// converge (or a degenerate scatter) is a [`JobError::NumericFailure`].
pub(crate) fn principal_direction(points: &[[f64; 3]]) -> Result<[f64; 3], JobError> {
    let c = centroid(points);
    // Scatter matrix, symmetric 3×3.
    let mut m = [[0.0_f64; 3]; 3];
    for p in points {
        let d = sub(*p, c);
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] += d[i] * d[j];
            }
        }
    }
    let mut v = [1.0, 1.0, 1.0];
    let mut previous = [0.0; 3];
    let mut iteration = 0;
    loop {
        let next = [
            dot(m[0], v),
            dot(m[1], v),
            dot(m[2], v),
        ];
        let Some(next) = normalize(next) else {
            return Err(JobError::NumericFailure {
                reason: "point scatter has no principal direction",
            });
        };
        // Eigenvectors are sign-ambiguous; compare up to sign.
        let delta = dot(sub(next, previous), sub(next, previous))
            .min(dot(
                [next[0] + previous[0], next[1] + previous[1], next[2] + previous[2]],
                [next[0] + previous[0], next[1] + previous[1], next[2] + previous[2]],
            ));
        previous = next;
        v = next;
        iteration += 1;
        if delta < 1e-24 {
            return Ok(v);
        }
        if iteration >= POWER_ITERATIONS {
            return Err(JobError::NumericFailure {
                reason: "principal direction estimate did not converge",
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centroid_of_square() {
        let pts = [
            [0.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [2.0, 2.0, 0.0],
            [0.0, 2.0, 0.0],
        ];
        assert_eq!(centroid(&pts), [1.0, 1.0, 0.0]);
    }

    #[test]
    fn newell_normal_of_xy_square() {
        let pts = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
        ];
        let n = newell_normal(&pts).unwrap();
        assert!(n[2].abs() > 0.999);
        assert!(n[0].abs() < 1e-12 && n[1].abs() < 1e-12);
    }

    #[test]
    fn newell_normal_rejects_collinear_points() {
        let pts = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [2.0, 0.0, 0.0]];
        assert!(newell_normal(&pts).is_none());
    }

    #[test]
    fn principal_direction_of_points_along_x() {
        let pts = [
            [0.0, 0.01, 0.0],
            [1.0, -0.01, 0.0],
            [2.0, 0.0, 0.01],
            [3.0, 0.0, -0.01],
        ];
        let d = principal_direction(&pts).unwrap();
        assert!(d[0].abs() > 0.999);
    }

    #[test]
    fn principal_direction_rejects_coincident_points() {
        let pts = [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0]];
        assert!(principal_direction(&pts).is_err());
    }

    #[test]
    fn normalize_rejects_zero() {
        assert!(normalize([0.0, 0.0, 0.0]).is_none());
        assert_eq!(normalize([0.0, 3.0, 0.0]), Some([0.0, 1.0, 0.0]));
    }
}
