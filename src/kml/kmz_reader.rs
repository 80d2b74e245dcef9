use std::{fs::File, io::Read, path::Path};

use log::{debug, info};

use super::parser::{parse_kml_document, Layer};
use crate::error::OpenError;
use crate::geofile::feature::SourceFeature;

const ROOT_DOCUMENT_NAME: &str = "doc.kml";

/// An opened KMZ source: all decoded layers of all KML documents in the archive.
#[derive(Debug)]
pub struct SourceHandle {
    layers: Vec<Layer>,
}

/// Open a KMZ archive and decode every KML document inside it.
///
/// The root document (`doc.kml`) is read first if present, the remaining `.kml` entries follow
/// in archive order.
pub fn open(path: &Path) -> Result<SourceHandle, OpenError> {
    if !path.exists() {
        return Err(OpenError::NotFound(path.to_path_buf()));
    }
    let file = File::open(path).map_err(|source| OpenError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|source| OpenError::InvalidArchive {
            path: path.to_path_buf(),
            source,
        })?;

    let mut kml_entries = Vec::new();
    for idx in 0..archive.len() {
        let entry = archive
            .by_index(idx)
            .map_err(|source| OpenError::InvalidArchive {
                path: path.to_path_buf(),
                source,
            })?;
        if entry.is_file() && entry.name().to_ascii_lowercase().ends_with(".kml") {
            kml_entries.push(entry.name().to_string());
        }
    }
    if kml_entries.is_empty() {
        return Err(OpenError::NoKmlDocument(path.to_path_buf()));
    }
    if let Some(root_idx) = kml_entries
        .iter()
        .position(|name| name.eq_ignore_ascii_case(ROOT_DOCUMENT_NAME))
    {
        let root = kml_entries.remove(root_idx);
        kml_entries.insert(0, root);
    }

    let mut layers = Vec::new();
    for entry_name in &kml_entries {
        debug!("Reading KML document {} from {:?}", entry_name, path);
        let mut entry = archive
            .by_name(entry_name)
            .map_err(|source| OpenError::InvalidArchive {
                path: path.to_path_buf(),
                source,
            })?;
        let mut content = String::new();
        entry
            .read_to_string(&mut content)
            .map_err(|source| OpenError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        layers.extend(parse_kml_document(&content, entry_name)?);
    }

    if layers.is_empty() {
        return Err(OpenError::NoLayers(path.to_path_buf()));
    }
    info!(
        "Opened {:?}: {} KML document(s), {} layer(s)",
        path,
        kml_entries.len(),
        layers.len()
    );
    Ok(SourceHandle { layers })
}

impl SourceHandle {
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn feature_count(&self) -> usize {
        self.layers.iter().map(|layer| layer.features.len()).sum()
    }

    /// All features of layer 0 in file order, then layer 1, and so on. Nothing is filtered here.
    pub fn iterate(&self) -> impl Iterator<Item = (&str, &SourceFeature)> + '_ {
        self.layers.iter().flat_map(|layer| {
            layer
                .features
                .iter()
                .map(move |feature| (layer.name.as_str(), feature))
        })
    }
}
