use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use indicatif::ProgressBar;
use log::{debug, info};

use super::{
    attributes::{project, FeatureCounter},
    classify::{classify, normalize, GeometryFamily},
};
use crate::archive::packager::{clean_up_datasets, package_datasets};
use crate::error::ConversionError;
use crate::kml::kmz_reader::{self, SourceHandle};
use crate::shapefile::writer::{ArtifactPaths, OutputRecord, ShapefileWriter};

pub const DEFAULT_ARCHIVE_NAME: &str = "output.zip";

#[derive(Debug, Clone)]
pub struct ConversionOptions {
    /// Where intermediates and the archive are written. Defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    pub archive_name: String,
    pub keep_intermediate_files: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            output_dir: None,
            archive_name: DEFAULT_ARCHIVE_NAME.to_string(),
            keep_intermediate_files: false,
        }
    }
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub archive_path: PathBuf,
    pub archive_entries: Vec<String>,
    pub datasets: Vec<ArtifactPaths>,
    pub record_counts: HashMap<GeometryFamily, usize>,
    /// Features without a supported geometry. They still consumed an id.
    pub dropped_features: usize,
}

/// Path stem of the dataset of `family`, `<dir>/<input stem>_<family>`.
pub fn output_stem(input: &Path, output_dir: &Path, family: GeometryFamily) -> PathBuf {
    let input_stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    output_dir.join(format!("{}_{}", input_stem, family.file_suffix()))
}

fn is_kmz(path: &Path) -> bool {
    path.extension()
        .map(|extension| extension.eq_ignore_ascii_case("kmz"))
        .unwrap_or(false)
}

/// Convert a KMZ archive into a zip of three shapefile datasets (points, lines, polygons).
///
/// Nothing is packaged unless every dataset was written and finalized.
pub fn convert_kmz(
    input: &Path,
    options: &ConversionOptions,
) -> Result<ConversionOutcome, ConversionError> {
    if !is_kmz(input) {
        return Err(ConversionError::UnsupportedInput(input.to_path_buf()));
    }
    let source = kmz_reader::open(input)?;
    for layer in source.layers() {
        debug!("Layer '{}': {} feature(s)", layer.name, layer.features.len());
    }

    let output_dir = match &options.output_dir {
        Some(dir) => dir.clone(),
        None => input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default(),
    };

    let mut writers = FamilyWriters::create(input, &output_dir)?;
    let dropped_features = write_features(&source, &mut writers)?;

    let mut record_counts = HashMap::new();
    let mut datasets = Vec::with_capacity(GeometryFamily::ALL.len());
    for writer in writers.into_writers() {
        let family = writer.family();
        record_counts.insert(family, writer.record_count());
        datasets.push(
            writer
                .finalize()
                .map_err(|source| ConversionError::Write { family, source })?,
        );
    }
    info!(
        "Converted {:?}: {} record(s) written, {} feature(s) dropped",
        input,
        record_counts.values().sum::<usize>(),
        dropped_features
    );

    let archive_path = output_dir.join(&options.archive_name);
    let archive_entries = package_datasets(&datasets, &archive_path)?;
    if !options.keep_intermediate_files {
        clean_up_datasets(&datasets);
    }

    Ok(ConversionOutcome {
        archive_path,
        archive_entries,
        datasets,
        record_counts,
        dropped_features,
    })
}

/// One writer per geometry family, with its schema declared.
struct FamilyWriters {
    points: ShapefileWriter,
    lines: ShapefileWriter,
    polygons: ShapefileWriter,
}

impl FamilyWriters {
    fn create(input: &Path, output_dir: &Path) -> Result<Self, ConversionError> {
        let create = |family| -> Result<ShapefileWriter, ConversionError> {
            let mut writer =
                ShapefileWriter::create(&output_stem(input, output_dir, family), family)?;
            writer
                .declare_schema()
                .map_err(|source| ConversionError::Write { family, source })?;
            Ok(writer)
        };
        Ok(Self {
            points: create(GeometryFamily::Point)?,
            lines: create(GeometryFamily::Line)?,
            polygons: create(GeometryFamily::Polygon)?,
        })
    }

    fn get_mut(&mut self, family: GeometryFamily) -> &mut ShapefileWriter {
        match family {
            GeometryFamily::Point => &mut self.points,
            GeometryFamily::Line => &mut self.lines,
            GeometryFamily::Polygon => &mut self.polygons,
        }
    }

    /// The writers in `GeometryFamily::ALL` order.
    fn into_writers(self) -> [ShapefileWriter; 3] {
        [self.points, self.lines, self.polygons]
    }
}

/// Route every source feature to the writer of its family. Returns the number of dropped
/// features.
fn write_features(
    source: &SourceHandle,
    writers: &mut FamilyWriters,
) -> Result<usize, ConversionError> {
    let mut counter = FeatureCounter::new();
    let mut dropped = 0;
    let bar = ProgressBar::new(source.feature_count() as u64);

    for (layer_name, feature) in source.iterate() {
        bar.inc(1);
        // The id is taken before classification, dropped features leave a gap.
        let sequence_id = counter.next_id();

        let Some(geometry) = &feature.geometry else {
            debug!("Dropping feature {} without geometry", sequence_id);
            dropped += 1;
            continue;
        };
        let Some(family) = classify(geometry) else {
            debug!(
                "Dropping feature {} with unsupported geometry {}",
                sequence_id,
                geometry.type_name()
            );
            dropped += 1;
            continue;
        };
        let Some(normalized) = normalize(geometry, family) else {
            dropped += 1;
            continue;
        };

        let record = OutputRecord {
            geometry: normalized,
            attributes: project(feature, sequence_id, layer_name),
        };
        writers
            .get_mut(family)
            .append(&record)
            .map_err(|source| ConversionError::Write { family, source })?;
    }
    bar.finish_and_clear();
    Ok(dropped)
}
