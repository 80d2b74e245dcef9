use log::warn;

/// A KML coordinate tuple. KML stores longitude first, altitude is optional.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawCoord {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl RawCoord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }

    pub fn with_z(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z: Some(z) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawPolygon {
    pub exterior: Vec<RawCoord>,
    pub interiors: Vec<Vec<RawCoord>>,
}

/// Geometry as decoded from KML, before classification. Altitudes are kept.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeometry {
    Point(RawCoord),
    LineString(Vec<RawCoord>),
    Polygon(RawPolygon),
    MultiPoint(Vec<RawCoord>),
    MultiLineString(Vec<Vec<RawCoord>>),
    MultiPolygon(Vec<RawPolygon>),
    LinearRing(Vec<RawCoord>),
    GeometryCollection(Vec<RawGeometry>),
    /// `Model`, `gx:Track` and other KML geometries with no vector counterpart.
    Other(String),
}

impl RawGeometry {
    pub fn type_name(&self) -> &str {
        match self {
            RawGeometry::Point(_) => "Point",
            RawGeometry::LineString(_) => "LineString",
            RawGeometry::Polygon(_) => "Polygon",
            RawGeometry::MultiPoint(_) => "MultiPoint",
            RawGeometry::MultiLineString(_) => "MultiLineString",
            RawGeometry::MultiPolygon(_) => "MultiPolygon",
            RawGeometry::LinearRing(_) => "LinearRing",
            RawGeometry::GeometryCollection(_) => "GeometryCollection",
            RawGeometry::Other(name) => name,
        }
    }

    /// Merge the members of a KML `MultiGeometry`. Homogeneous members become the matching
    /// multi-geometry, nested multi-geometries of the same kind are flattened, anything else
    /// is a collection.
    pub fn from_members(members: Vec<RawGeometry>) -> Self {
        let merged = match members.first() {
            Some(RawGeometry::Point(_) | RawGeometry::MultiPoint(_)) => members
                .iter()
                .try_fold(Vec::new(), |mut points, member| {
                    match member {
                        RawGeometry::Point(coord) => points.push(*coord),
                        RawGeometry::MultiPoint(coords) => points.extend_from_slice(coords),
                        _ => return None,
                    }
                    Some(points)
                })
                .map(RawGeometry::MultiPoint),
            Some(RawGeometry::LineString(_) | RawGeometry::MultiLineString(_)) => members
                .iter()
                .try_fold(Vec::new(), |mut lines, member| {
                    match member {
                        RawGeometry::LineString(line) => lines.push(line.clone()),
                        RawGeometry::MultiLineString(more) => lines.extend_from_slice(more),
                        _ => return None,
                    }
                    Some(lines)
                })
                .map(RawGeometry::MultiLineString),
            Some(RawGeometry::Polygon(_) | RawGeometry::MultiPolygon(_)) => members
                .iter()
                .try_fold(Vec::new(), |mut polygons, member| {
                    match member {
                        RawGeometry::Polygon(polygon) => polygons.push(polygon.clone()),
                        RawGeometry::MultiPolygon(more) => polygons.extend_from_slice(more),
                        _ => return None,
                    }
                    Some(polygons)
                })
                .map(RawGeometry::MultiPolygon),
            _ => None,
        };
        merged.unwrap_or(RawGeometry::GeometryCollection(members))
    }
}

/// Parse the text of a KML `<coordinates>` element.
///
/// Tuples are separated by whitespace, ordinates by commas: `lon,lat[,alt]`.
/// Tuples that do not parse are skipped with a warning.
pub fn parse_coordinates(text: &str) -> Vec<RawCoord> {
    normalize_tuple_separators(text)
        .split_whitespace()
        .filter_map(|tuple| {
            let coord = parse_tuple(tuple);
            if coord.is_none() {
                warn!("Skipping malformed KML coordinate tuple '{}'", tuple);
            }
            coord
        })
        .collect()
}

/// Drop whitespace around commas so that only whitespace between tuples remains.
/// Some producers write `lon, lat` or `lon ,lat`.
fn normalize_tuple_separators(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && ch != ',' && !normalized.is_empty() && !normalized.ends_with(',') {
            normalized.push(' ');
        }
        pending_space = false;
        normalized.push(ch);
    }
    normalized
}

fn parse_tuple(tuple: &str) -> Option<RawCoord> {
    let ordinates: Result<Vec<f64>, _> = tuple
        .split(',')
        .filter(|part| !part.is_empty())
        .map(str::parse::<f64>)
        .collect();
    match ordinates.ok()?.as_slice() {
        [x, y] => Some(RawCoord::new(*x, *y)),
        [x, y, z] => Some(RawCoord::with_z(*x, *y, *z)),
        _ => None,
    }
}
