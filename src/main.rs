extern crate log;
pub mod archive;
pub mod convert;
pub mod error;
pub mod geofile;
pub mod kml;
pub mod shapefile;
#[cfg(test)]
mod test_support;

use crate::convert::classify::GeometryFamily;
use crate::convert::pipeline::{convert_kmz, ConversionOptions, DEFAULT_ARCHIVE_NAME};
use anyhow::anyhow;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::{fs::read_to_string, path::Path};

/// Convert a KMZ file into zipped point, line and polygon shapefiles.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input KMZ file.
    input: PathBuf,

    /// Path of the output zip. Defaults to `output.zip` next to the input.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to an optional YAML config file.
    #[arg(short, long)]
    config_filepath: Option<String>,

    /// Keep the intermediate shapefiles next to the archive.
    #[arg(short, long)]
    keep_intermediate_files: bool,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct Config {
    output_dir: Option<PathBuf>,
    archive_name: Option<String>,
    keep_intermediate_files: bool,
}

fn read_config(config_filepath: &str) -> anyhow::Result<Config> {
    if !Path::new(config_filepath).exists() {
        return Err(anyhow!("Config file {} not found", config_filepath));
    }
    let config_contents = read_to_string(config_filepath)?;
    Ok(serde_yaml::from_str(&config_contents)?)
}

fn conversion_options(args: &Args, config: Config) -> anyhow::Result<ConversionOptions> {
    let mut options = ConversionOptions {
        output_dir: config.output_dir,
        archive_name: config
            .archive_name
            .unwrap_or_else(|| DEFAULT_ARCHIVE_NAME.to_string()),
        keep_intermediate_files: config.keep_intermediate_files || args.keep_intermediate_files,
    };
    if let Some(output) = &args.output {
        let archive_name = output
            .file_name()
            .ok_or_else(|| anyhow!("Output path {:?} has no file name", output))?;
        options.archive_name = archive_name.to_string_lossy().into_owned();
        options.output_dir = output
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .or_else(|| Some(PathBuf::from(".")));
    }
    Ok(options)
}

fn try_main() -> anyhow::Result<()> {
    let args = Args::try_parse()?;
    let config = match &args.config_filepath {
        Some(config_filepath) => read_config(config_filepath)?,
        None => Config::default(),
    };
    let options = conversion_options(&args, config)?;
    log::debug!("Conversion options: {:?}", options);

    log::info!("Converting {:?}", &args.input);
    let outcome = convert_kmz(&args.input, &options)?;
    for family in GeometryFamily::ALL {
        log::info!(
            "{} {} record(s)",
            outcome.record_counts.get(&family).copied().unwrap_or(0),
            family.file_suffix()
        );
    }
    if outcome.dropped_features > 0 {
        log::info!(
            "{} feature(s) without a point, line or polygon geometry were dropped",
            outcome.dropped_features
        );
    }
    if options.keep_intermediate_files {
        for dataset in &outcome.datasets {
            log::info!("Kept {:?}", dataset.shp);
        }
    }
    log::info!(
        "Wrote {} file(s) to {:?}",
        outcome.archive_entries.len(),
        outcome.archive_path
    );
    println!("{}", outcome.archive_path.display());
    Ok(())
}

fn main() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    env_logger::init();
    if let Err(e) = try_main() {
        eprintln!("Error: {:?}", e);
        std::process::exit(1)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use rstest::rstest;
    use testdir::testdir;

    use super::{conversion_options, read_config, Args, Config};

    #[rstest]
    fn test_read_config() {
        let path = testdir!().join("config.yaml");
        std::fs::write(
            &path,
            "output_dir: /tmp/out\nkeep_intermediate_files: true\n",
        )
        .unwrap();
        let config = read_config(path.to_str().unwrap()).unwrap();
        assert_eq!(config.output_dir, Some(PathBuf::from("/tmp/out")));
        assert_eq!(config.archive_name, None);
        assert!(config.keep_intermediate_files);
    }

    #[rstest]
    fn test_missing_config() {
        assert!(read_config("/definitely/not/here.yaml").is_err());
    }

    #[rstest]
    #[case(vec!["kmz2shp", "in.kmz"], None, "output.zip")]
    #[case(vec!["kmz2shp", "in.kmz", "--output", "/data/result.zip"], Some("/data"), "result.zip")]
    #[case(vec!["kmz2shp", "in.kmz", "-o", "result.zip"], Some("."), "result.zip")]
    fn test_conversion_options(
        #[case] argv: Vec<&str>,
        #[case] expected_dir: Option<&str>,
        #[case] expected_name: &str,
    ) {
        let args = Args::try_parse_from(argv).unwrap();
        let options = conversion_options(&args, Config::default()).unwrap();
        assert_eq!(options.output_dir, expected_dir.map(PathBuf::from));
        assert_eq!(options.archive_name, expected_name);
        assert!(!options.keep_intermediate_files);
    }

    #[rstest]
    fn test_cli_overrides_config() {
        let args = Args::try_parse_from(["kmz2shp", "in.kmz", "-o", "/x/y.zip", "-k"]).unwrap();
        let config = Config {
            output_dir: Some(PathBuf::from("/config/dir")),
            archive_name: Some("config.zip".to_string()),
            keep_intermediate_files: false,
        };
        let options = conversion_options(&args, config).unwrap();
        assert_eq!(options.output_dir, Some(PathBuf::from("/x")));
        assert_eq!(options.archive_name, "y.zip");
        assert!(options.keep_intermediate_files);
    }
}
