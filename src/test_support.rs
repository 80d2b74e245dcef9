//! KMZ fixtures and archive helpers shared by the tests.

use std::{
    fs::{self, File},
    io::{self, Write},
    path::Path,
};

use zip::{write::FileOptions, CompressionMethod, ZipWriter};

pub fn placemark(name: &str, geometry: &str) -> String {
    format!("<Placemark><name>{}</name>{}</Placemark>", name, geometry)
}

/// Write a KMZ whose `doc.kml` holds one folder per `(layer name, placemarks)` pair.
pub fn write_kmz(path: &Path, layers: &[(&str, Vec<String>)]) {
    let folders: String = layers
        .iter()
        .map(|(name, placemarks)| {
            format!("<Folder><name>{}</name>{}</Folder>", name, placemarks.concat())
        })
        .collect();
    let kml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:gx="http://www.google.com/kml/ext/2.2">
<Document>{}</Document>
</kml>"#,
        folders
    );
    write_kmz_entries(path, &[("doc.kml", kml.as_str())]);
}

pub fn write_kmz_entries(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    for (name, contents) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(contents.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

pub fn extract_zip(zip_path: &Path, output_dir: &Path) {
    fs::create_dir_all(output_dir).unwrap();
    let mut archive = zip::ZipArchive::new(File::open(zip_path).unwrap()).unwrap();
    for idx in 0..archive.len() {
        let mut entry = archive.by_index(idx).unwrap();
        assert!(!entry.name().contains('/'), "Nested entry {}", entry.name());
        let mut out = File::create(output_dir.join(entry.name())).unwrap();
        io::copy(&mut entry, &mut out).unwrap();
    }
}
