//! Reads back datasets written by `ShapefileWriter`, checking the structural invariants on the
//! way. Only used by tests.

use std::{collections::HashMap, fs};

use anyhow::{anyhow, Context};
use geo::{Coord, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon, Winding};

use super::{
    shp::{ShapeType, FILE_CODE, HEADER_LENGTH, VERSION},
    writer::ArtifactPaths,
};
use crate::convert::classify::NormalizedGeometry;

#[derive(Debug)]
pub struct ReadRecord {
    pub geometry: Option<NormalizedGeometry>,
    pub attributes: HashMap<String, String>,
}

#[derive(Debug)]
pub struct ReadDataset {
    pub shape_type: ShapeType,
    pub bbox: [f64; 4],
    pub field_names: Vec<String>,
    /// `(offset, content length)` in words, from the `.shx`.
    pub index: Vec<(i32, i32)>,
    pub records: Vec<ReadRecord>,
}

fn shape_type_from_code(code: i32) -> Option<ShapeType> {
    match code {
        0 => Some(ShapeType::Null),
        3 => Some(ShapeType::PolyLine),
        5 => Some(ShapeType::Polygon),
        8 => Some(ShapeType::MultiPoint),
        _ => None,
    }
}

fn be_i32(bytes: &[u8], at: usize) -> anyhow::Result<i32> {
    let slice = bytes
        .get(at..at + 4)
        .ok_or_else(|| anyhow!("Unexpected end of data at {}", at))?;
    Ok(i32::from_be_bytes(slice.try_into()?))
}

fn le_i32(bytes: &[u8], at: usize) -> anyhow::Result<i32> {
    let slice = bytes
        .get(at..at + 4)
        .ok_or_else(|| anyhow!("Unexpected end of data at {}", at))?;
    Ok(i32::from_le_bytes(slice.try_into()?))
}

fn le_f64(bytes: &[u8], at: usize) -> anyhow::Result<f64> {
    let slice = bytes
        .get(at..at + 8)
        .ok_or_else(|| anyhow!("Unexpected end of data at {}", at))?;
    Ok(f64::from_le_bytes(slice.try_into()?))
}

fn read_header(bytes: &[u8]) -> anyhow::Result<(ShapeType, [f64; 4])> {
    if bytes.len() < HEADER_LENGTH as usize {
        return Err(anyhow!("File shorter than its header"));
    }
    if be_i32(bytes, 0)? != FILE_CODE {
        return Err(anyhow!("Bad file code"));
    }
    if le_i32(bytes, 28)? != VERSION {
        return Err(anyhow!("Bad version"));
    }
    let declared_length = be_i32(bytes, 24)? as usize * 2;
    if declared_length != bytes.len() {
        return Err(anyhow!(
            "Header declares {} bytes, file has {}",
            declared_length,
            bytes.len()
        ));
    }
    let shape_type = shape_type_from_code(le_i32(bytes, 32)?)
        .ok_or_else(|| anyhow!("Unknown shape type"))?;
    Ok((
        shape_type,
        [
            le_f64(bytes, 36)?,
            le_f64(bytes, 44)?,
            le_f64(bytes, 52)?,
            le_f64(bytes, 60)?,
        ],
    ))
}

fn read_points(content: &[u8], at: usize, count: usize) -> anyhow::Result<Vec<Coord>> {
    (0..count)
        .map(|i| {
            Ok(Coord {
                x: le_f64(content, at + 16 * i)?,
                y: le_f64(content, at + 16 * i + 8)?,
            })
        })
        .collect()
}

fn read_parts(content: &[u8]) -> anyhow::Result<Vec<LineString>> {
    let num_parts = le_i32(content, 36)? as usize;
    let num_points = le_i32(content, 40)? as usize;
    let mut starts = Vec::with_capacity(num_parts);
    for i in 0..num_parts {
        starts.push(le_i32(content, 44 + 4 * i)? as usize);
    }
    let points = read_points(content, 44 + 4 * num_parts, num_points)?;
    let mut parts = Vec::with_capacity(num_parts);
    for (i, start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(num_points);
        parts.push(LineString::new(points[*start..end].to_vec()));
    }
    Ok(parts)
}

fn decode_geometry(content: &[u8]) -> anyhow::Result<Option<NormalizedGeometry>> {
    let shape_type =
        shape_type_from_code(le_i32(content, 0)?).ok_or_else(|| anyhow!("Unknown shape type"))?;
    let geometry = match shape_type {
        ShapeType::Null => return Ok(None),
        ShapeType::MultiPoint => {
            let count = le_i32(content, 36)? as usize;
            let points = read_points(content, 40, count)?;
            NormalizedGeometry::MultiPoint(MultiPoint(points.into_iter().map(Point::from).collect()))
        }
        ShapeType::PolyLine => NormalizedGeometry::MultiLineString(MultiLineString(read_parts(content)?)),
        ShapeType::Polygon => {
            // A clockwise ring opens a polygon, counter-clockwise rings are its holes.
            let mut polygons: Vec<(LineString, Vec<LineString>)> = Vec::new();
            for ring in read_parts(content)? {
                if ring.is_cw() {
                    polygons.push((ring, Vec::new()));
                } else {
                    let (_, holes) = polygons
                        .last_mut()
                        .ok_or_else(|| anyhow!("Hole before any outer ring"))?;
                    holes.push(ring);
                }
            }
            NormalizedGeometry::MultiPolygon(MultiPolygon(
                polygons
                    .into_iter()
                    .map(|(exterior, holes)| Polygon::new(exterior, holes))
                    .collect(),
            ))
        }
    };
    Ok(Some(geometry))
}

fn read_dbf(bytes: &[u8]) -> anyhow::Result<(Vec<String>, Vec<HashMap<String, String>>)> {
    let record_count = u32::from_le_bytes(bytes.get(4..8).context("Short dbf")?.try_into()?);
    let header_length = u16::from_le_bytes(bytes.get(8..10).context("Short dbf")?.try_into()?);
    let record_length = u16::from_le_bytes(bytes.get(10..12).context("Short dbf")?.try_into()?);
    let field_count = (header_length as usize - 33) / 32;

    let mut fields = Vec::with_capacity(field_count);
    for i in 0..field_count {
        let descriptor = bytes
            .get(32 + 32 * i..64 + 32 * i)
            .context("Short field descriptor")?;
        let name_end = descriptor[..11].iter().position(|b| *b == 0).unwrap_or(11);
        let name = String::from_utf8(descriptor[..name_end].to_vec())?;
        fields.push((name, descriptor[16] as usize));
    }
    if bytes.get(header_length as usize - 1) != Some(&0x0D) {
        return Err(anyhow!("Missing header terminator"));
    }

    let mut records = Vec::with_capacity(record_count as usize);
    for i in 0..record_count as usize {
        let start = header_length as usize + i * record_length as usize;
        let record = bytes
            .get(start..start + record_length as usize)
            .context("Short record")?;
        let mut values = HashMap::new();
        let mut at = 1;
        for (name, width) in &fields {
            let raw = std::str::from_utf8(&record[at..at + width])?;
            values.insert(name.clone(), raw.trim().to_string());
            at += width;
        }
        records.push(values);
    }
    let end = header_length as usize + record_count as usize * record_length as usize;
    if bytes.get(end) != Some(&0x1A) || bytes.len() != end + 1 {
        return Err(anyhow!("Missing end of file marker"));
    }
    Ok((fields.into_iter().map(|(name, _)| name).collect(), records))
}

pub fn read_dataset(paths: &ArtifactPaths) -> anyhow::Result<ReadDataset> {
    let shp = fs::read(&paths.shp).with_context(|| format!("Reading {:?}", paths.shp))?;
    let shx = fs::read(&paths.shx).with_context(|| format!("Reading {:?}", paths.shx))?;
    let dbf = fs::read(&paths.dbf).with_context(|| format!("Reading {:?}", paths.dbf))?;
    if !paths.prj.exists() {
        return Err(anyhow!("Missing {:?}", paths.prj));
    }

    let (shape_type, bbox) = read_header(&shp)?;
    let (index_shape_type, index_bbox) = read_header(&shx)?;
    if shape_type != index_shape_type || bbox != index_bbox {
        return Err(anyhow!("Index header does not match main file header"));
    }

    let mut index = Vec::new();
    let mut at = HEADER_LENGTH as usize;
    while at < shx.len() {
        index.push((be_i32(&shx, at)?, be_i32(&shx, at + 4)?));
        at += 8;
    }

    let mut geometries = Vec::new();
    let mut at = HEADER_LENGTH as usize;
    while at < shp.len() {
        let record_number = be_i32(&shp, at)?;
        let content_words = be_i32(&shp, at + 4)?;
        if record_number as usize != geometries.len() + 1 {
            return Err(anyhow!("Record number {} out of sequence", record_number));
        }
        if index.get(geometries.len()) != Some(&((at / 2) as i32, content_words)) {
            return Err(anyhow!("Index entry of record {} is wrong", record_number));
        }
        let content = shp
            .get(at + 8..at + 8 + content_words as usize * 2)
            .context("Short record")?;
        geometries.push(decode_geometry(content)?);
        at += 8 + content_words as usize * 2;
    }

    let (field_names, rows) = read_dbf(&dbf)?;
    if rows.len() != geometries.len() || index.len() != geometries.len() {
        return Err(anyhow!(
            "Record counts differ: shp {}, shx {}, dbf {}",
            geometries.len(),
            index.len(),
            rows.len()
        ));
    }

    Ok(ReadDataset {
        shape_type,
        bbox,
        field_names,
        index,
        records: geometries
            .into_iter()
            .zip(rows)
            .map(|(geometry, attributes)| ReadRecord {
                geometry,
                attributes,
            })
            .collect(),
    })
}
