use std::{fs, io, path::Path};

/// ESRI WKT of the geographic WGS84 reference system (EPSG:4326). All output is declared in it,
/// nothing is reprojected.
pub const WGS84_WKT: &str = concat!(
    r#"GEOGCS["GCS_WGS_1984","#,
    r#"DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],"#,
    r#"PRIMEM["Greenwich",0.0],"#,
    r#"UNIT["Degree",0.0174532925199433]]"#
);

pub fn write_prj(path: &Path) -> io::Result<()> {
    fs::write(path, WGS84_WKT)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use testdir::testdir;

    use super::{write_prj, WGS84_WKT};

    #[rstest]
    fn test_write_prj() {
        let path = testdir!().join("out.prj");
        write_prj(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, WGS84_WKT);
        assert!(contents.starts_with("GEOGCS[\"GCS_WGS_1984\""));
        assert!(contents.contains("6378137.0,298.257223563"));
    }
}
