//! Structural comparison of geometry trees.
//!
//! Geometries from any backend are lowered into a [`GeometryNode`] tree and then
//! compared positionally: type name, child count and point count must match at every
//! level before any coordinate is looked at. Rings or points stored in a different
//! order are reported as a mismatch.

use std::fmt::{self, Display, Formatter};

use geo_types::{Coord, Geometry, LineString, Point, Polygon};

use crate::errors::{ConformanceError, Result};

/// An `(x, y, z)` coordinate. 2D geometries report `z = 0`.
pub type Coord3 = (f64, f64, f64);

/// Owned, backend-independent view of a geometry tree.
///
/// Internal nodes (polygons, multi-geometries, collections) carry children; leaves
/// (points, line strings, rings) carry points.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryNode {
    pub name: String,
    pub children: Vec<GeometryNode>,
    pub points: Vec<Coord3>,
}

impl GeometryNode {
    pub fn leaf(name: &str, points: Vec<Coord3>) -> Self {
        Self {
            name: name.to_string(),
            children: Vec::new(),
            points,
        }
    }

    pub fn branch(name: &str, children: Vec<GeometryNode>) -> Self {
        Self {
            name: name.to_string(),
            children,
            points: Vec::new(),
        }
    }

    /// Iterate over every point of the tree, depth first.
    pub fn all_points(&self) -> Box<dyn Iterator<Item = &Coord3> + '_> {
        Box::new(
            self.points
                .iter()
                .chain(self.children.iter().flat_map(|c| c.all_points())),
        )
    }
}

impl Display for GeometryNode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.children.is_empty() {
            write!(f, " ({} part(s))", self.children.len())?;
        } else {
            write!(f, " ({} point(s))", self.points.len())?;
        }
        Ok(())
    }
}

/// Lowers a backend geometry into a [`GeometryNode`] tree.
pub trait IntoGeometryNode {
    fn to_geometry_node(&self) -> GeometryNode;
}

impl IntoGeometryNode for GeometryNode {
    fn to_geometry_node(&self) -> GeometryNode {
        self.clone()
    }
}

fn coord(c: &Coord<f64>) -> Coord3 {
    (c.x, c.y, 0.0)
}

fn point_node(p: &Point<f64>) -> GeometryNode {
    GeometryNode::leaf("POINT", vec![coord(&p.0)])
}

fn line_string_node(name: &str, ls: &LineString<f64>) -> GeometryNode {
    GeometryNode::leaf(name, ls.0.iter().map(coord).collect())
}

fn polygon_node(polygon: &Polygon<f64>) -> GeometryNode {
    // An empty exterior means an empty polygon, which has no rings at all.
    if polygon.exterior().0.is_empty() {
        return GeometryNode::branch("POLYGON", Vec::new());
    }
    let rings = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .map(|ring| line_string_node("LINEARRING", ring))
        .collect();
    GeometryNode::branch("POLYGON", rings)
}

impl IntoGeometryNode for Geometry<f64> {
    fn to_geometry_node(&self) -> GeometryNode {
        match self {
            Geometry::Point(p) => point_node(p),
            Geometry::Line(line) => {
                GeometryNode::leaf("LINESTRING", vec![coord(&line.start), coord(&line.end)])
            }
            Geometry::LineString(ls) => line_string_node("LINESTRING", ls),
            Geometry::Polygon(polygon) => polygon_node(polygon),
            Geometry::MultiPoint(mp) => {
                GeometryNode::branch("MULTIPOINT", mp.0.iter().map(point_node).collect())
            }
            Geometry::MultiLineString(mls) => GeometryNode::branch(
                "MULTILINESTRING",
                mls.0
                    .iter()
                    .map(|ls| line_string_node("LINESTRING", ls))
                    .collect(),
            ),
            Geometry::MultiPolygon(mp) => {
                GeometryNode::branch("MULTIPOLYGON", mp.0.iter().map(polygon_node).collect())
            }
            Geometry::GeometryCollection(gc) => GeometryNode::branch(
                "GEOMETRYCOLLECTION",
                gc.0.iter().map(|g| g.to_geometry_node()).collect(),
            ),
            Geometry::Rect(rect) => polygon_node(&rect.to_polygon()),
            Geometry::Triangle(triangle) => polygon_node(&triangle.to_polygon()),
        }
    }
}

/// Compare `actual` to `expected`, allowing `max_error` per axis on every coordinate.
///
/// Either side may be absent; absence on exactly one side fails with a message
/// saying which one.
pub fn compare_geometry<A, E>(actual: Option<&A>, expected: Option<&E>, max_error: f64) -> Result<()>
where
    A: IntoGeometryNode + ?Sized,
    E: IntoGeometryNode + ?Sized,
{
    match (actual, expected) {
        (None, None) => Ok(()),
        (None, Some(expected)) => Err(ConformanceError::MissingGeometry {
            expected: expected.to_geometry_node().to_string(),
        }),
        (Some(actual), None) => Err(ConformanceError::UnexpectedGeometry {
            actual: actual.to_geometry_node().to_string(),
        }),
        (Some(actual), Some(expected)) => compare_nodes(
            &actual.to_geometry_node(),
            &expected.to_geometry_node(),
            max_error,
            "root",
        ),
    }
}

/// Recursive positional comparison of two lowered trees.
pub fn compare_nodes(
    actual: &GeometryNode,
    expected: &GeometryNode,
    max_error: f64,
    path: &str,
) -> Result<()> {
    if actual.name != expected.name {
        return Err(ConformanceError::GeometryTypeMismatch {
            path: path.to_string(),
            expected: expected.name.clone(),
            actual: actual.name.clone(),
        });
    }
    if actual.children.len() != expected.children.len() {
        return Err(ConformanceError::GeometryCountMismatch {
            path: path.to_string(),
            expected: expected.children.len(),
            actual: actual.children.len(),
        });
    }
    if actual.points.len() != expected.points.len() {
        return Err(ConformanceError::PointCountMismatch {
            path: path.to_string(),
            expected: expected.points.len(),
            actual: actual.points.len(),
        });
    }

    if !expected.children.is_empty() {
        for (i, (a, e)) in actual.children.iter().zip(&expected.children).enumerate() {
            compare_nodes(a, e, max_error, &format!("{path}/{i}"))?;
        }
        return Ok(());
    }

    for (point, (a, e)) in actual.points.iter().zip(&expected.points).enumerate() {
        for (axis, av, ev) in [('x', a.0, e.0), ('y', a.1, e.1), ('z', a.2, e.2)] {
            if (av - ev).abs() > max_error {
                return Err(ConformanceError::CoordinateMismatch {
                    path: path.to_string(),
                    point,
                    axis,
                    expected: ev,
                    actual: av,
                    max_error,
                });
            }
        }
    }
    Ok(())
}

/// Parse WKT into a `geo_types` geometry.
pub fn geometry_from_wkt(wkt: &str) -> Result<Geometry<f64>> {
    use wkt::TryFromWkt;

    Geometry::<f64>::try_from_wkt_str(wkt).map_err(|err| ConformanceError::InvalidWkt {
        wkt: wkt.to_string(),
        msg: format!("{err:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wkt(s: &str) -> Geometry<f64> {
        geometry_from_wkt(s).unwrap()
    }

    #[test]
    fn test_reflexive_on_clone() {
        for s in [
            "POINT (1 2)",
            "LINESTRING (0 0, 1 1, 2 2)",
            "POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (1 1, 2 1, 2 2, 1 1))",
            "MULTIPOLYGON (((0 0, 1 0, 1 1, 0 0)), ((5 5, 6 5, 6 6, 5 5)))",
            "GEOMETRYCOLLECTION (POINT (1 1), LINESTRING (0 0, 3 4))",
        ] {
            let g = wkt(s);
            let clone = g.clone();
            compare_geometry(Some(&g), Some(&clone), 0.0).unwrap();
        }
    }

    #[test]
    fn test_point_count_checked_before_coordinates() {
        let actual = wkt("LINESTRING (0 0, 1 1)");
        let expected = wkt("LINESTRING (100 100, 1 1, 2 2)");
        let err = compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap_err();
        assert_eq!(
            err,
            ConformanceError::PointCountMismatch {
                path: "root".to_string(),
                expected: 3,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let actual = wkt("LINESTRING (0 0, 1 1)");
        let expected = wkt("MULTIPOINT ((0 0), (1 1))");
        let err = compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap_err();
        assert!(matches!(err, ConformanceError::GeometryTypeMismatch { .. }));
    }

    #[test]
    fn test_ring_count_mismatch() {
        let actual = wkt("POLYGON ((0 0, 10 0, 10 10, 0 0))");
        let expected = wkt("POLYGON ((0 0, 10 0, 10 10, 0 0), (1 1, 2 1, 2 2, 1 1))");
        let err = compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap_err();
        assert!(matches!(
            err,
            ConformanceError::GeometryCountMismatch {
                expected: 2,
                actual: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_coordinate_tolerance() {
        let actual = wkt("LINESTRING (0 0, 1.00005 1)");
        let expected = wkt("LINESTRING (0 0, 1 1)");
        compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap();

        let actual = wkt("LINESTRING (0 0, 1 1.0002)");
        let err = compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap_err();
        match err {
            ConformanceError::CoordinateMismatch { point, axis, .. } => {
                assert_eq!(point, 1);
                assert_eq!(axis, 'y');
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_order_sensitive() {
        let actual = wkt("MULTIPOINT ((1 1), (0 0))");
        let expected = wkt("MULTIPOINT ((0 0), (1 1))");
        let err = compare_geometry(Some(&actual), Some(&expected), 0.0001).unwrap_err();
        match err {
            ConformanceError::CoordinateMismatch { path, .. } => assert_eq!(path, "root/0"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_presence() {
        let g = wkt("POINT (1 2)");
        let err = compare_geometry::<Geometry<f64>, _>(None, Some(&g), 0.0001).unwrap_err();
        assert!(matches!(err, ConformanceError::MissingGeometry { .. }));
        let err = compare_geometry::<_, Geometry<f64>>(Some(&g), None, 0.0001).unwrap_err();
        assert!(matches!(err, ConformanceError::UnexpectedGeometry { .. }));
        compare_geometry::<Geometry<f64>, Geometry<f64>>(None, None, 0.0001).unwrap();
    }

    #[test]
    fn test_invalid_wkt() {
        assert!(matches!(
            geometry_from_wkt("LINESTRING (0 0,"),
            Err(ConformanceError::InvalidWkt { .. })
        ));
    }
}
