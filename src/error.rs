use std::path::PathBuf;

use thiserror::Error;

use crate::convert::classify::GeometryFamily;

/// Failures while opening a KMZ source. Fatal for the whole conversion.
#[derive(Debug, Error)]
pub enum OpenError {
    #[error("KMZ file {0:?} not found")]
    NotFound(PathBuf),

    #[error("I/O error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("{path:?} is not a valid zip archive: {source}")]
    InvalidArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error("{0:?} does not contain a KML document")]
    NoKmlDocument(PathBuf),

    #[error("Invalid KML in {entry}: {message}")]
    InvalidKml { entry: String, message: String },

    #[error("{0:?} contains no vector layer")]
    NoLayers(PathBuf),
}

/// Failures while creating the artifact set of one output dataset.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("Could not remove existing artifact {path:?}: {source}")]
    RemoveExisting {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not create {path:?}: {source}")]
    Create {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Misuse of a shapefile writer or I/O failures while writing records.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Attribute schema has not been declared")]
    SchemaNotDeclared,

    #[error("Attribute schema was already declared")]
    SchemaAlreadyDeclared,

    #[error("Cannot append a {found:?} geometry to a {expected:?} dataset")]
    FamilyMismatch {
        expected: GeometryFamily,
        found: GeometryFamily,
    },

    #[error("Too many records for a shapefile: {0}")]
    TooManyRecords(usize),

    #[error("Shapefile exceeds the maximum file size")]
    FileTooLarge,
}

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Top-level failure of one conversion run. No partial archive is produced.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Only .kmz input files are supported, got {0:?}")]
    UnsupportedInput(PathBuf),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Create(#[from] CreateError),

    #[error("Writing {family:?} dataset failed: {source}")]
    Write {
        family: GeometryFamily,
        source: WriteError,
    },

    #[error(transparent)]
    Package(#[from] PackageError),
}
