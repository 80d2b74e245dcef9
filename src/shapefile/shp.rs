//! Geometry (`.shp`) and index (`.shx`) encoding.
//!
//! Both files start with the same 100 byte header:
//!   00 : i32 BE  file code = 9994
//!   04 : i32 BE  x5 unused
//!   24 : i32 BE  file length in 16-bit words, header included
//!   28 : i32 LE  version = 1000
//!   32 : i32 LE  shape type
//!   36 : f64 LE  x4 Xmin, Ymin, Xmax, Ymax
//!   68 : f64 LE  x4 Zmin, Zmax, Mmin, Mmax (always 0)
//!
//! A `.shp` record is an 8 byte header (record number, content length in words, both BE)
//! followed by the little-endian content. A `.shx` record is the offset of the `.shp` record
//! and its content length, both in words, both BE.

use std::io::{self, Write};

use geo::{LineString, Winding};

use crate::convert::classify::{GeometryFamily, NormalizedGeometry};

pub const FILE_CODE: i32 = 9994;
pub const VERSION: i32 = 1000;
pub const HEADER_LENGTH: u64 = 100;
pub const RECORD_HEADER_LENGTH: u64 = 8;
pub const INDEX_RECORD_LENGTH: u64 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ShapeType {
    Null = 0,
    PolyLine = 3,
    Polygon = 5,
    MultiPoint = 8,
}

impl ShapeType {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<GeometryFamily> for ShapeType {
    fn from(family: GeometryFamily) -> Self {
        match family {
            GeometryFamily::Point => ShapeType::MultiPoint,
            GeometryFamily::Line => ShapeType::PolyLine,
            GeometryFamily::Polygon => ShapeType::Polygon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn from_coords<'a>(coords: impl IntoIterator<Item = &'a geo::Coord>) -> Option<Self> {
        coords.into_iter().fold(None, |bbox: Option<BoundingBox>, c| {
            Some(match bbox {
                None => BoundingBox {
                    min_x: c.x,
                    min_y: c.y,
                    max_x: c.x,
                    max_y: c.y,
                },
                Some(b) => BoundingBox {
                    min_x: b.min_x.min(c.x),
                    min_y: b.min_y.min(c.y),
                    max_x: b.max_x.max(c.x),
                    max_y: b.max_y.max(c.y),
                },
            })
        })
    }

    pub fn union(self, other: BoundingBox) -> Self {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for value in [self.min_x, self.min_y, self.max_x, self.max_y] {
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Encoded content of one `.shp` record, without the record header.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordContent {
    pub bytes: Vec<u8>,
    pub bbox: Option<BoundingBox>,
}

impl RecordContent {
    /// Content length in 16-bit words.
    pub fn length_in_words(&self) -> u64 {
        self.bytes.len() as u64 / 2
    }
}

/// Write the 100 byte main file / index header.
pub fn write_header<W: Write>(
    out: &mut W,
    shape_type: ShapeType,
    file_length_bytes: u64,
    bbox: Option<BoundingBox>,
) -> io::Result<()> {
    let file_length_words = i32::try_from(file_length_bytes / 2).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "shapefile length exceeds 2GB")
    })?;
    let mut header = Vec::with_capacity(HEADER_LENGTH as usize);
    header.extend_from_slice(&FILE_CODE.to_be_bytes());
    header.extend_from_slice(&[0u8; 20]);
    header.extend_from_slice(&file_length_words.to_be_bytes());
    header.extend_from_slice(&VERSION.to_le_bytes());
    header.extend_from_slice(&shape_type.code().to_le_bytes());
    // An empty dataset has no extent, write zeros like other producers do.
    bbox.unwrap_or(BoundingBox {
        min_x: 0.0,
        min_y: 0.0,
        max_x: 0.0,
        max_y: 0.0,
    })
    .write_to(&mut header);
    header.extend_from_slice(&[0u8; 32]);
    out.write_all(&header)
}

pub fn write_record_header<W: Write>(
    out: &mut W,
    record_number: i32,
    content_length_words: i32,
) -> io::Result<()> {
    out.write_all(&record_number.to_be_bytes())?;
    out.write_all(&content_length_words.to_be_bytes())
}

pub fn write_index_record<W: Write>(
    out: &mut W,
    offset_words: i32,
    content_length_words: i32,
) -> io::Result<()> {
    out.write_all(&offset_words.to_be_bytes())?;
    out.write_all(&content_length_words.to_be_bytes())
}

fn null_content() -> RecordContent {
    RecordContent {
        bytes: ShapeType::Null.code().to_le_bytes().to_vec(),
        bbox: None,
    }
}

fn write_points(out: &mut Vec<u8>, coords: &[geo::Coord]) {
    for coord in coords {
        out.extend_from_slice(&coord.x.to_le_bytes());
        out.extend_from_slice(&coord.y.to_le_bytes());
    }
}

/// Encode parts (lines or rings) as PolyLine/Polygon content.
fn encode_parts(shape_type: ShapeType, parts: &[Vec<geo::Coord>]) -> RecordContent {
    let parts: Vec<&Vec<geo::Coord>> = parts.iter().filter(|part| !part.is_empty()).collect();
    let bbox = BoundingBox::from_coords(parts.iter().flat_map(|part| part.iter()));
    let Some(bbox) = bbox else {
        return null_content();
    };
    let num_points: usize = parts.iter().map(|part| part.len()).sum();

    let mut bytes = Vec::with_capacity(44 + 4 * parts.len() + 16 * num_points);
    bytes.extend_from_slice(&shape_type.code().to_le_bytes());
    bbox.write_to(&mut bytes);
    bytes.extend_from_slice(&(parts.len() as i32).to_le_bytes());
    bytes.extend_from_slice(&(num_points as i32).to_le_bytes());
    let mut start = 0i32;
    for part in &parts {
        bytes.extend_from_slice(&start.to_le_bytes());
        start += part.len() as i32;
    }
    for part in &parts {
        write_points(&mut bytes, part);
    }
    RecordContent {
        bytes,
        bbox: Some(bbox),
    }
}

/// Rings as the format wants them: closed, outer ring clockwise, holes counter-clockwise.
fn oriented_ring(ring: &LineString, clockwise: bool) -> Vec<geo::Coord> {
    let mut ring = ring.clone();
    ring.close();
    if clockwise {
        ring.make_cw_winding();
    } else {
        ring.make_ccw_winding();
    }
    ring.0
}

/// Encode a normalized geometry as the content of one `.shp` record. Geometries without any
/// vertex are written as Null shapes.
pub fn encode_geometry(geometry: &NormalizedGeometry) -> RecordContent {
    match geometry {
        NormalizedGeometry::MultiPoint(multi_point) => {
            let coords: Vec<geo::Coord> = multi_point.0.iter().map(|p| p.0).collect();
            let Some(bbox) = BoundingBox::from_coords(coords.iter()) else {
                return null_content();
            };
            let mut bytes = Vec::with_capacity(40 + 16 * coords.len());
            bytes.extend_from_slice(&ShapeType::MultiPoint.code().to_le_bytes());
            bbox.write_to(&mut bytes);
            bytes.extend_from_slice(&(coords.len() as i32).to_le_bytes());
            write_points(&mut bytes, &coords);
            RecordContent {
                bytes,
                bbox: Some(bbox),
            }
        }
        NormalizedGeometry::MultiLineString(lines) => {
            let parts: Vec<Vec<geo::Coord>> = lines.0.iter().map(|line| line.0.clone()).collect();
            encode_parts(ShapeType::PolyLine, &parts)
        }
        NormalizedGeometry::MultiPolygon(polygons) => {
            let mut rings = Vec::new();
            for polygon in &polygons.0 {
                if polygon.exterior().0.is_empty() {
                    continue;
                }
                rings.push(oriented_ring(polygon.exterior(), true));
                for interior in polygon.interiors() {
                    if !interior.0.is_empty() {
                        rings.push(oriented_ring(interior, false));
                    }
                }
            }
            encode_parts(ShapeType::Polygon, &rings)
        }
    }
}
