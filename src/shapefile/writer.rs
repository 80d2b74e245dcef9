use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use log::{debug, info};

use super::{
    dbf::DbfWriter,
    prj::write_prj,
    shp::{
        encode_geometry, write_header, write_index_record, write_record_header, BoundingBox,
        ShapeType, HEADER_LENGTH, INDEX_RECORD_LENGTH, RECORD_HEADER_LENGTH,
    },
};
use crate::convert::{
    attributes::{AttributeValues, ATTRIBUTE_SCHEMA},
    classify::{GeometryFamily, NormalizedGeometry},
};
use crate::error::{CreateError, WriteError};

pub const EXTENSIONS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

/// The four files of one dataset, sharing a path stem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub shp: PathBuf,
    pub shx: PathBuf,
    pub dbf: PathBuf,
    pub prj: PathBuf,
}

impl ArtifactPaths {
    pub fn from_stem(stem: &Path) -> Self {
        // Appended rather than `with_extension`, the stem may itself contain dots.
        let with_extension = |extension: &str| {
            let mut path = OsString::from(stem.as_os_str());
            path.push(".");
            path.push(extension);
            PathBuf::from(path)
        };
        Self {
            shp: with_extension(EXTENSIONS[0]),
            shx: with_extension(EXTENSIONS[1]),
            dbf: with_extension(EXTENSIONS[2]),
            prj: with_extension(EXTENSIONS[3]),
        }
    }

    pub fn all(&self) -> [&Path; 4] {
        [&self.shp, &self.shx, &self.dbf, &self.prj]
    }
}

/// One feature as written: geometry plus its attribute row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub geometry: NormalizedGeometry,
    pub attributes: AttributeValues,
}

/// Writes one dataset (`.shp`, `.shx`, `.dbf`, `.prj`) of a single geometry family.
///
/// The three record-bearing files grow in lockstep: each `append` adds exactly one record to
/// each of them. Headers carry placeholders until `finalize` patches in lengths, extent and
/// record count.
pub struct ShapefileWriter {
    family: GeometryFamily,
    shape_type: ShapeType,
    paths: ArtifactPaths,
    shp: BufWriter<File>,
    shx: BufWriter<File>,
    dbf: DbfWriter<BufWriter<File>>,
    bbox: Option<BoundingBox>,
    record_count: usize,
    shp_length: u64,
}

fn create_file(path: &Path) -> Result<BufWriter<File>, CreateError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|source| CreateError::Create {
            path: path.to_path_buf(),
            source,
        })
}

impl ShapefileWriter {
    /// Create a fresh artifact set at `stem`, destroying any existing one.
    pub fn create(stem: &Path, family: GeometryFamily) -> Result<Self, CreateError> {
        let paths = ArtifactPaths::from_stem(stem);
        for path in paths.all() {
            if path.exists() {
                debug!("Removing existing {:?}", path);
                fs::remove_file(path).map_err(|source| CreateError::RemoveExisting {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }

        let shape_type = ShapeType::from(family);
        let mut shp = create_file(&paths.shp)?;
        let mut shx = create_file(&paths.shx)?;
        let dbf = create_file(&paths.dbf)?;
        write_header(&mut shp, shape_type, HEADER_LENGTH, None).map_err(|source| {
            CreateError::Create {
                path: paths.shp.clone(),
                source,
            }
        })?;
        write_header(&mut shx, shape_type, HEADER_LENGTH, None).map_err(|source| {
            CreateError::Create {
                path: paths.shx.clone(),
                source,
            }
        })?;
        write_prj(&paths.prj).map_err(|source| CreateError::Create {
            path: paths.prj.clone(),
            source,
        })?;

        debug!("Created {:?} dataset at {:?}", family, paths.shp);
        Ok(Self {
            family,
            shape_type,
            paths,
            shp,
            shx,
            dbf: DbfWriter::new(dbf),
            bbox: None,
            record_count: 0,
            shp_length: HEADER_LENGTH,
        })
    }

    pub fn family(&self) -> GeometryFamily {
        self.family
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    /// Write the attribute table header. Exactly once, before the first `append`.
    pub fn declare_schema(&mut self) -> Result<(), WriteError> {
        self.dbf.declare_fields(&ATTRIBUTE_SCHEMA)
    }

    pub fn append(&mut self, record: &OutputRecord) -> Result<(), WriteError> {
        if !self.dbf.is_declared() {
            return Err(WriteError::SchemaNotDeclared);
        }
        let found = record.geometry.family();
        if found != self.family {
            return Err(WriteError::FamilyMismatch {
                expected: self.family,
                found,
            });
        }

        let content = encode_geometry(&record.geometry);
        let record_number = i32::try_from(self.record_count + 1)
            .map_err(|_| WriteError::TooManyRecords(self.record_count))?;
        let offset_words =
            i32::try_from(self.shp_length / 2).map_err(|_| WriteError::FileTooLarge)?;
        let content_words =
            i32::try_from(content.length_in_words()).map_err(|_| WriteError::FileTooLarge)?;
        let new_length = self.shp_length + RECORD_HEADER_LENGTH + content.bytes.len() as u64;
        if new_length / 2 > i32::MAX as u64 {
            return Err(WriteError::FileTooLarge);
        }

        self.dbf.write_record(&record.attributes.field_values())?;
        write_record_header(&mut self.shp, record_number, content_words)?;
        self.shp.write_all(&content.bytes)?;
        write_index_record(&mut self.shx, offset_words, content_words)?;

        self.shp_length = new_length;
        self.record_count += 1;
        if let Some(record_bbox) = content.bbox {
            self.bbox = Some(match self.bbox {
                Some(bbox) => bbox.union(record_bbox),
                None => record_bbox,
            });
        }
        Ok(())
    }

    /// Patch headers and flush all four files. The dataset is complete afterwards.
    pub fn finalize(mut self) -> Result<ArtifactPaths, WriteError> {
        self.dbf.finish()?;

        self.shp.seek(SeekFrom::Start(0))?;
        write_header(&mut self.shp, self.shape_type, self.shp_length, self.bbox)?;
        self.shp.flush()?;

        let shx_length = HEADER_LENGTH + INDEX_RECORD_LENGTH * self.record_count as u64;
        self.shx.seek(SeekFrom::Start(0))?;
        write_header(&mut self.shx, self.shape_type, shx_length, self.bbox)?;
        self.shx.flush()?;

        info!(
            "Wrote {} {:?} record(s) to {:?}",
            self.record_count, self.family, self.paths.shp
        );
        Ok(self.paths)
    }
}
