// Copyright 2026 the Stakeout Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed set of feature kinds and their derived values.
//!
//! Every feature carries a [`FeatureValue`] — a tagged variant over the
//! geometry, scalar, and organizational kinds the core knows about. Function
//! execution matches this variant exhaustively, so adding a kind is a
//! compile-time-checked change at every dispatch site rather than a new
//! virtual override.

use alloc::vec::Vec;

use super::id::ElementId;
use crate::trafo::TrafoParamData;

/// Tag identifying the kind of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureKind {
    /// A single 3-D point.
    Point,
    /// An infinite line (position + direction).
    Line,
    /// An infinite plane (position + normal).
    Plane,
    /// A circle lying in a plane.
    Circle,
    /// A sphere.
    Sphere,
    /// A cone (apex + axis + aperture).
    Cone,
    /// A cylinder (axis point + axis + radius).
    Cylinder,
    /// An axis-aligned ellipsoid.
    Ellipsoid,
    /// A hyperboloid of revolution.
    Hyperboloid,
    /// A NURBS curve skeleton (control points only).
    Nurbs,
    /// A paraboloid of revolution.
    Paraboloid,
    /// A torus (major + minor radius).
    Torus,
    /// An ellipse lying in a plane.
    Ellipse,
    /// A slotted hole (stadium shape) lying in a plane.
    SlottedHole,
    /// An unstructured point cloud.
    PointCloud,
    /// A scalar distance value.
    ScalarDistance,
    /// A scalar angle value (radians).
    ScalarAngle,
    /// A scalar temperature value.
    ScalarTemperature,
    /// An ordered series of scalar measurements.
    ScalarMeasurementSeries,
    /// A measurement station (instrument standpoint).
    Station,
    /// A coordinate system.
    CoordinateSystem,
    /// A set of transformation parameters between two coordinate systems.
    TrafoParam,
}

impl FeatureKind {
    /// Whether this kind is a measurable geometry (as opposed to a station,
    /// coordinate system, or transformation parameter set).
    #[must_use]
    pub const fn is_geometry(self) -> bool {
        !matches!(self, Self::Station | Self::CoordinateSystem | Self::TrafoParam)
    }

    /// Short lower-case label used in result protocols and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Point => "point",
            Self::Line => "line",
            Self::Plane => "plane",
            Self::Circle => "circle",
            Self::Sphere => "sphere",
            Self::Cone => "cone",
            Self::Cylinder => "cylinder",
            Self::Ellipsoid => "ellipsoid",
            Self::Hyperboloid => "hyperboloid",
            Self::Nurbs => "nurbs",
            Self::Paraboloid => "paraboloid",
            Self::Torus => "torus",
            Self::Ellipse => "ellipse",
            Self::SlottedHole => "slotted hole",
            Self::PointCloud => "point cloud",
            Self::ScalarDistance => "distance",
            Self::ScalarAngle => "angle",
            Self::ScalarTemperature => "temperature",
            Self::ScalarMeasurementSeries => "measurement series",
            Self::Station => "station",
            Self::CoordinateSystem => "coordinate system",
            Self::TrafoParam => "transformation parameters",
        }
    }
}

/// Per-system data carried by a [`FeatureValue::CoordinateSystem`].
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CoordinateSystemData {
    /// Origin of the system, expressed in the job's reference system.
    pub origin: [f64; 3],
    /// Trafo params whose start system is this system.
    pub outgoing_trafos: Vec<ElementId>,
    /// Trafo params whose destination system is this system.
    pub incoming_trafos: Vec<ElementId>,
}

/// The derived value of a feature, replaced wholesale by each successful
/// function execution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FeatureValue {
    /// See [`FeatureKind::Point`].
    Point {
        /// Position.
        xyz: [f64; 3],
    },
    /// See [`FeatureKind::Line`].
    Line {
        /// A point on the line.
        xyz: [f64; 3],
        /// Unit direction.
        ijk: [f64; 3],
    },
    /// See [`FeatureKind::Plane`].
    Plane {
        /// A point on the plane.
        xyz: [f64; 3],
        /// Unit normal.
        ijk: [f64; 3],
    },
    /// See [`FeatureKind::Circle`].
    Circle {
        /// Center.
        xyz: [f64; 3],
        /// Unit normal of the carrier plane.
        ijk: [f64; 3],
        /// Radius.
        radius: f64,
    },
    /// See [`FeatureKind::Sphere`].
    Sphere {
        /// Center.
        xyz: [f64; 3],
        /// Radius.
        radius: f64,
    },
    /// See [`FeatureKind::Cone`].
    Cone {
        /// Apex.
        xyz: [f64; 3],
        /// Unit axis, pointing from the apex into the cone.
        ijk: [f64; 3],
        /// Full aperture angle in radians.
        aperture: f64,
    },
    /// See [`FeatureKind::Cylinder`].
    Cylinder {
        /// A point on the axis.
        xyz: [f64; 3],
        /// Unit axis.
        ijk: [f64; 3],
        /// Radius.
        radius: f64,
    },
    /// See [`FeatureKind::Ellipsoid`].
    Ellipsoid {
        /// Center.
        xyz: [f64; 3],
        /// Semi-axis lengths along x, y, z.
        semi_axes: [f64; 3],
    },
    /// See [`FeatureKind::Hyperboloid`].
    Hyperboloid {
        /// Center.
        xyz: [f64; 3],
        /// Unit axis.
        ijk: [f64; 3],
        /// Waist radius.
        a: f64,
        /// Axial scale parameter.
        c: f64,
    },
    /// See [`FeatureKind::Nurbs`].
    Nurbs {
        /// Curve degree.
        degree: u32,
        /// Control points.
        control_points: Vec<[f64; 3]>,
    },
    /// See [`FeatureKind::Paraboloid`].
    Paraboloid {
        /// Apex.
        xyz: [f64; 3],
        /// Unit axis.
        ijk: [f64; 3],
        /// Focal-scale parameter.
        a: f64,
    },
    /// See [`FeatureKind::Torus`].
    Torus {
        /// Center.
        xyz: [f64; 3],
        /// Unit normal of the equatorial plane.
        ijk: [f64; 3],
        /// Major (ring) radius.
        radius_a: f64,
        /// Minor (tube) radius.
        radius_b: f64,
    },
    /// See [`FeatureKind::Ellipse`].
    Ellipse {
        /// Center.
        xyz: [f64; 3],
        /// Unit normal of the carrier plane.
        ijk: [f64; 3],
        /// Semi-major axis length.
        a: f64,
        /// Semi-minor axis length.
        b: f64,
    },
    /// See [`FeatureKind::SlottedHole`].
    SlottedHole {
        /// Center.
        xyz: [f64; 3],
        /// Unit normal of the carrier plane.
        ijk: [f64; 3],
        /// End-cap radius.
        radius: f64,
        /// Overall length including the caps.
        length: f64,
    },
    /// See [`FeatureKind::PointCloud`].
    PointCloud {
        /// Centroid of the cloud.
        main_focus: [f64; 3],
        /// All member points.
        points: Vec<[f64; 3]>,
    },
    /// See [`FeatureKind::ScalarDistance`].
    ScalarDistance {
        /// Distance value.
        value: f64,
    },
    /// See [`FeatureKind::ScalarAngle`].
    ScalarAngle {
        /// Angle in radians.
        value: f64,
    },
    /// See [`FeatureKind::ScalarTemperature`].
    ScalarTemperature {
        /// Temperature value.
        value: f64,
    },
    /// See [`FeatureKind::ScalarMeasurementSeries`].
    ScalarMeasurementSeries {
        /// Ordered measurement values.
        values: Vec<f64>,
    },
    /// See [`FeatureKind::Station`].
    Station {
        /// Standpoint position.
        xyz: [f64; 3],
    },
    /// See [`FeatureKind::CoordinateSystem`].
    CoordinateSystem(CoordinateSystemData),
    /// See [`FeatureKind::TrafoParam`].
    TrafoParam(TrafoParamData),
}

impl FeatureValue {
    /// Returns the kind tag for this value.
    #[must_use]
    pub const fn kind(&self) -> FeatureKind {
        match self {
            Self::Point { .. } => FeatureKind::Point,
            Self::Line { .. } => FeatureKind::Line,
            Self::Plane { .. } => FeatureKind::Plane,
            Self::Circle { .. } => FeatureKind::Circle,
            Self::Sphere { .. } => FeatureKind::Sphere,
            Self::Cone { .. } => FeatureKind::Cone,
            Self::Cylinder { .. } => FeatureKind::Cylinder,
            Self::Ellipsoid { .. } => FeatureKind::Ellipsoid,
            Self::Hyperboloid { .. } => FeatureKind::Hyperboloid,
            Self::Nurbs { .. } => FeatureKind::Nurbs,
            Self::Paraboloid { .. } => FeatureKind::Paraboloid,
            Self::Torus { .. } => FeatureKind::Torus,
            Self::Ellipse { .. } => FeatureKind::Ellipse,
            Self::SlottedHole { .. } => FeatureKind::SlottedHole,
            Self::PointCloud { .. } => FeatureKind::PointCloud,
            Self::ScalarDistance { .. } => FeatureKind::ScalarDistance,
            Self::ScalarAngle { .. } => FeatureKind::ScalarAngle,
            Self::ScalarTemperature { .. } => FeatureKind::ScalarTemperature,
            Self::ScalarMeasurementSeries { .. } => FeatureKind::ScalarMeasurementSeries,
            Self::Station { .. } => FeatureKind::Station,
            Self::CoordinateSystem(_) => FeatureKind::CoordinateSystem,
            Self::TrafoParam(_) => FeatureKind::TrafoParam,
        }
    }

    /// Returns the default (unsolved) value for a kind.
    #[must_use]
    pub fn default_for(kind: FeatureKind) -> Self {
        let o = [0.0; 3];
        match kind {
            FeatureKind::Point => Self::Point { xyz: o },
            FeatureKind::Line => Self::Line { xyz: o, ijk: o },
            FeatureKind::Plane => Self::Plane { xyz: o, ijk: o },
            FeatureKind::Circle => Self::Circle { xyz: o, ijk: o, radius: 0.0 },
            FeatureKind::Sphere => Self::Sphere { xyz: o, radius: 0.0 },
            FeatureKind::Cone => Self::Cone { xyz: o, ijk: o, aperture: 0.0 },
            FeatureKind::Cylinder => Self::Cylinder { xyz: o, ijk: o, radius: 0.0 },
            FeatureKind::Ellipsoid => Self::Ellipsoid { xyz: o, semi_axes: o },
            FeatureKind::Hyperboloid => Self::Hyperboloid { xyz: o, ijk: o, a: 0.0, c: 0.0 },
            FeatureKind::Nurbs => Self::Nurbs { degree: 3, control_points: Vec::new() },
            FeatureKind::Paraboloid => Self::Paraboloid { xyz: o, ijk: o, a: 0.0 },
            FeatureKind::Torus => Self::Torus { xyz: o, ijk: o, radius_a: 0.0, radius_b: 0.0 },
            FeatureKind::Ellipse => Self::Ellipse { xyz: o, ijk: o, a: 0.0, b: 0.0 },
            FeatureKind::SlottedHole => {
                Self::SlottedHole { xyz: o, ijk: o, radius: 0.0, length: 0.0 }
            }
            FeatureKind::PointCloud => Self::PointCloud { main_focus: o, points: Vec::new() },
            FeatureKind::ScalarDistance => Self::ScalarDistance { value: 0.0 },
            FeatureKind::ScalarAngle => Self::ScalarAngle { value: 0.0 },
            FeatureKind::ScalarTemperature => Self::ScalarTemperature { value: 0.0 },
            FeatureKind::ScalarMeasurementSeries => {
                Self::ScalarMeasurementSeries { values: Vec::new() }
            }
            FeatureKind::Station => Self::Station { xyz: o },
            FeatureKind::CoordinateSystem => Self::CoordinateSystem(CoordinateSystemData::default()),
            FeatureKind::TrafoParam => Self::TrafoParam(TrafoParamData::default()),
        }
    }

    /// Returns the characteristic position of this value, if it has one.
    #[must_use]
    pub fn position(&self) -> Option<[f64; 3]> {
        match self {
            Self::Point { xyz }
            | Self::Line { xyz, .. }
            | Self::Plane { xyz, .. }
            | Self::Circle { xyz, .. }
            | Self::Sphere { xyz, .. }
            | Self::Cone { xyz, .. }
            | Self::Cylinder { xyz, .. }
            | Self::Ellipsoid { xyz, .. }
            | Self::Hyperboloid { xyz, .. }
            | Self::Paraboloid { xyz, .. }
            | Self::Torus { xyz, .. }
            | Self::Ellipse { xyz, .. }
            | Self::SlottedHole { xyz, .. }
            | Self::Station { xyz } => Some(*xyz),
            Self::PointCloud { main_focus, .. } => Some(*main_focus),
            Self::CoordinateSystem(data) => Some(data.origin),
            Self::TrafoParam(data) => Some(data.translation),
            Self::Nurbs { .. }
            | Self::ScalarDistance { .. }
            | Self::ScalarAngle { .. }
            | Self::ScalarTemperature { .. }
            | Self::ScalarMeasurementSeries { .. } => None,
        }
    }

    /// Returns the characteristic direction (axis or normal), if any.
    #[must_use]
    pub fn direction(&self) -> Option<[f64; 3]> {
        match self {
            Self::Line { ijk, .. }
            | Self::Plane { ijk, .. }
            | Self::Circle { ijk, .. }
            | Self::Cone { ijk, .. }
            | Self::Cylinder { ijk, .. }
            | Self::Hyperboloid { ijk, .. }
            | Self::Paraboloid { ijk, .. }
            | Self::Torus { ijk, .. }
            | Self::Ellipse { ijk, .. }
            | Self::SlottedHole { ijk, .. } => Some(*ijk),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_matches_kind() {
        let kinds = [
            FeatureKind::Point,
            FeatureKind::Sphere,
            FeatureKind::Nurbs,
            FeatureKind::ScalarAngle,
            FeatureKind::CoordinateSystem,
            FeatureKind::TrafoParam,
        ];
        for kind in kinds {
            assert_eq!(FeatureValue::default_for(kind).kind(), kind);
        }
    }

    #[test]
    fn geometry_classification() {
        assert!(FeatureKind::Point.is_geometry());
        assert!(FeatureKind::SlottedHole.is_geometry());
        assert!(!FeatureKind::Station.is_geometry());
        assert!(!FeatureKind::CoordinateSystem.is_geometry());
        assert!(!FeatureKind::TrafoParam.is_geometry());
    }

    #[test]
    fn position_and_direction_access() {
        let circle = FeatureValue::Circle {
            xyz: [1.0, 2.0, 3.0],
            ijk: [0.0, 0.0, 1.0],
            radius: 5.0,
        };
        assert_eq!(circle.position(), Some([1.0, 2.0, 3.0]));
        assert_eq!(circle.direction(), Some([0.0, 0.0, 1.0]));

        let dist = FeatureValue::ScalarDistance { value: 7.0 };
        assert_eq!(dist.position(), None);
        assert_eq!(dist.direction(), None);
    }
}
