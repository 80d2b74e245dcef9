use std::{
    fs::{self, File},
    io,
    path::Path,
};

use log::{debug, info, warn};
use zip::{write::FileOptions, CompressionMethod, ZipWriter};

use crate::error::PackageError;
use crate::shapefile::writer::ArtifactPaths;

/// Bundle the finalized datasets into one deflate-compressed zip with flat entry names.
/// Artifacts missing on disk are skipped. Returns the entry names in archive order.
///
/// On failure the partially written archive is removed.
pub fn package_datasets(
    datasets: &[ArtifactPaths],
    zip_path: &Path,
) -> Result<Vec<String>, PackageError> {
    let entries = match write_archive(datasets, zip_path) {
        Ok(entries) => entries,
        Err(err) => {
            if zip_path.exists() {
                if let Err(remove_err) = fs::remove_file(zip_path) {
                    warn!(
                        "Error deleting incomplete archive {:?}: {}",
                        zip_path, remove_err
                    );
                }
            }
            return Err(err);
        }
    };
    info!("Packaged {} file(s) into {:?}", entries.len(), zip_path);
    Ok(entries)
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> PackageError {
    let path = path.to_path_buf();
    move |source| PackageError::Io { path, source }
}

fn write_archive(datasets: &[ArtifactPaths], zip_path: &Path) -> Result<Vec<String>, PackageError> {
    let zip_file = File::create(zip_path).map_err(io_error(zip_path))?;
    let mut zip = ZipWriter::new(zip_file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = Vec::new();
    for path in datasets.iter().flat_map(|paths| paths.all()) {
        if !path.exists() {
            debug!("Skipping missing artifact {:?}", path);
            continue;
        }
        let Some(entry_name) = path.file_name().map(|name| name.to_string_lossy().into_owned())
        else {
            continue;
        };
        zip.start_file(entry_name.as_str(), options)?;
        let mut source = File::open(path).map_err(io_error(path))?;
        io::copy(&mut source, &mut zip).map_err(io_error(path))?;
        entries.push(entry_name);
    }
    zip.finish()?;
    Ok(entries)
}

/// Delete the intermediate artifacts. Failures are logged, not returned.
pub fn clean_up_datasets(datasets: &[ArtifactPaths]) {
    for path in datasets.iter().flat_map(|paths| paths.all()) {
        if path.exists() {
            if let Err(err) = fs::remove_file(path) {
                warn!("Error deleting intermediate file {:?}: {}", path, err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use rstest::rstest;
    use testdir::testdir;

    use super::{clean_up_datasets, package_datasets};
    use crate::error::PackageError;
    use crate::shapefile::writer::ArtifactPaths;

    #[rstest]
    fn test_package_flat_deflated_entries() {
        let dir = testdir!();
        let nested = dir.join("work");
        std::fs::create_dir_all(&nested).unwrap();
        let paths = ArtifactPaths::from_stem(&nested.join("in_points"));
        for path in paths.all() {
            std::fs::write(path, b"contents contents contents").unwrap();
        }
        let missing = ArtifactPaths::from_stem(&nested.join("in_lines"));

        let zip_path = dir.join("output.zip");
        let entries = package_datasets(&[paths.clone(), missing], &zip_path).unwrap();
        assert_eq!(
            entries,
            vec![
                "in_points.shp",
                "in_points.shx",
                "in_points.dbf",
                "in_points.prj"
            ]
        );

        let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 4);
        let mut entry = archive.by_name("in_points.prj").unwrap();
        assert_eq!(entry.compression(), zip::CompressionMethod::Deflated);
        let mut contents = String::new();
        entry.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "contents contents contents");
        drop(entry);

        clean_up_datasets(&[paths.clone()]);
        assert!(paths.all().iter().all(|path| !path.exists()));
        assert!(zip_path.exists());
    }

    #[rstest]
    fn test_failed_packaging_leaves_no_archive() {
        let dir = testdir!();
        let paths = ArtifactPaths::from_stem(&dir.join("in_points"));
        std::fs::write(&paths.shp, b"shapes").unwrap();
        // A directory in place of the index cannot be copied into the archive.
        std::fs::create_dir_all(&paths.shx).unwrap();

        let zip_path = dir.join("output.zip");
        let result = package_datasets(&[paths], &zip_path);
        assert!(matches!(result, Err(PackageError::Io { .. })));
        assert!(!zip_path.exists());
    }
}
