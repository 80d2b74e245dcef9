use geo::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon};

use crate::kml::geometry::{RawCoord, RawGeometry, RawPolygon};

/// Coarse shape category. Each family is written to its own output dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GeometryFamily {
    Point,
    Line,
    Polygon,
}

impl GeometryFamily {
    pub const ALL: [GeometryFamily; 3] = [
        GeometryFamily::Point,
        GeometryFamily::Line,
        GeometryFamily::Polygon,
    ];

    /// Suffix of the output file names, e.g. `input_points.shp`.
    pub fn file_suffix(&self) -> &'static str {
        match self {
            GeometryFamily::Point => "points",
            GeometryFamily::Line => "lines",
            GeometryFamily::Polygon => "polygons",
        }
    }
}

/// A geometry promoted to the multi-variant of its family and flattened to 2D.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedGeometry {
    MultiPoint(MultiPoint),
    MultiLineString(MultiLineString),
    MultiPolygon(MultiPolygon),
}

impl NormalizedGeometry {
    pub fn family(&self) -> GeometryFamily {
        match self {
            NormalizedGeometry::MultiPoint(_) => GeometryFamily::Point,
            NormalizedGeometry::MultiLineString(_) => GeometryFamily::Line,
            NormalizedGeometry::MultiPolygon(_) => GeometryFamily::Polygon,
        }
    }
}

/// Map a source geometry to its family, `None` if it has no Shapefile counterpart.
pub fn classify(geometry: &RawGeometry) -> Option<GeometryFamily> {
    match geometry {
        RawGeometry::Point(_) | RawGeometry::MultiPoint(_) => Some(GeometryFamily::Point),
        RawGeometry::LineString(_) | RawGeometry::MultiLineString(_) => Some(GeometryFamily::Line),
        RawGeometry::Polygon(_) | RawGeometry::MultiPolygon(_) => Some(GeometryFamily::Polygon),
        RawGeometry::LinearRing(_) | RawGeometry::GeometryCollection(_) | RawGeometry::Other(_) => {
            None
        }
    }
}

fn flatten_coord(coord: &RawCoord) -> Coord {
    Coord {
        x: coord.x,
        y: coord.y,
    }
}

fn flatten_line(coords: &[RawCoord]) -> LineString {
    coords.iter().map(flatten_coord).collect()
}

fn flatten_polygon(polygon: &RawPolygon) -> Polygon {
    Polygon::new(
        flatten_line(&polygon.exterior),
        polygon.interiors.iter().map(|ring| flatten_line(ring)).collect(),
    )
}

/// Wrap `geometry` in the multi-container of `family` and drop altitudes. Vertex order is kept
/// as is. Returns `None` when `geometry` does not belong to `family`.
pub fn normalize(geometry: &RawGeometry, family: GeometryFamily) -> Option<NormalizedGeometry> {
    let normalized = match (geometry, family) {
        (RawGeometry::Point(coord), GeometryFamily::Point) => {
            NormalizedGeometry::MultiPoint(MultiPoint(vec![Point::from(flatten_coord(coord))]))
        }
        (RawGeometry::MultiPoint(coords), GeometryFamily::Point) => NormalizedGeometry::MultiPoint(
            MultiPoint(coords.iter().map(|c| Point::from(flatten_coord(c))).collect()),
        ),
        (RawGeometry::LineString(coords), GeometryFamily::Line) => {
            NormalizedGeometry::MultiLineString(MultiLineString(vec![flatten_line(coords)]))
        }
        (RawGeometry::MultiLineString(lines), GeometryFamily::Line) => {
            NormalizedGeometry::MultiLineString(MultiLineString(
                lines.iter().map(|line| flatten_line(line)).collect(),
            ))
        }
        (RawGeometry::Polygon(polygon), GeometryFamily::Polygon) => {
            NormalizedGeometry::MultiPolygon(MultiPolygon(vec![flatten_polygon(polygon)]))
        }
        (RawGeometry::MultiPolygon(polygons), GeometryFamily::Polygon) => {
            NormalizedGeometry::MultiPolygon(MultiPolygon(
                polygons.iter().map(flatten_polygon).collect(),
            ))
        }
        _ => return None,
    };
    Some(normalized)
}
