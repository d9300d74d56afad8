//! Common fixtures for rezoning tests.

use std::path::Path;

/// Tile fill colors.
pub mod colors {
    /// Default filter tile color.
    pub const FILTER: &str = "45,39,88,178";
    pub const FILTER_RGBA: [u8; 4] = [45, 39, 88, 178];
    pub const TRANSPARENT: [u8; 4] = [0, 0, 0, 0];
}

/// Filter query strings in the wire syntax.
pub mod queries {
    pub const GRID_RANGE: &str = "f_grid=0,50000";
    pub const SLOPE_THRESHOLD: &str = "f_slope=20";
    pub const PROTECTED_FLAG: &str = "f_protected_areas=true";
}

/// A rectangular test country.
pub mod country {
    /// Country id used by fixtures.
    pub const ID: &str = "TST";

    /// Boundary extent (min_x, min_y, max_x, max_y).
    pub const BOUNDS: (f64, f64, f64, f64) = (0.0, 0.0, 10.0, 10.0);

    /// Statistics table, including keys of the reserved atlas families.
    pub const MIN_MAX_JSON: &str = r#"{
        "grid": {"min": 0, "max": 150000},
        "slope": {"min": 0, "max": 45},
        "population": {"min": 0, "max": 12000},
        "gwa_speed_100": {"min": 3.1, "max": 9.8},
        "gsa_gti": {"min": 1500, "max": 2400},
        "gsa_pvout": {"min": 1200, "max": 1900}
    }"#;

    /// Keys of [`MIN_MAX_JSON`] without a reserved prefix.
    pub const PUBLIC_KEYS: [&str; 3] = ["grid", "population", "slope"];
}

/// GeoJSON Feature wrapping `geometry`.
pub fn feature(geometry: serde_json::Value) -> serde_json::Value {
    serde_json::json!({
        "type": "Feature",
        "properties": {},
        "geometry": geometry,
    })
}

/// Write the test country's boundary and statistics under
/// `{root}/{prefix}/` in the layout the country store reads.
pub fn write_country_files(root: &Path, prefix: &str) -> std::io::Result<()> {
    let dir = root.join(prefix);
    std::fs::create_dir_all(&dir)?;
    let (min_x, min_y, max_x, max_y) = country::BOUNDS;
    let boundary = feature(crate::rect_geojson(min_x, min_y, max_x, max_y));
    std::fs::write(dir.join(format!("{}.geojson", country::ID)), boundary.to_string())?;
    std::fs::write(
        dir.join(format!("{}.minmax.json", country::ID)),
        country::MIN_MAX_JSON,
    )?;
    Ok(())
}

/// Temporary data directory holding the test country.
pub fn country_data_dir(prefix: &str) -> std::io::Result<tempfile::TempDir> {
    let dir = tempfile::tempdir()?;
    write_country_files(dir.path(), prefix)?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_fixture_parses() {
        let table: serde_json::Value = serde_json::from_str(country::MIN_MAX_JSON).unwrap();
        assert_eq!(table.as_object().unwrap().len(), 6);
    }

    #[test]
    fn test_country_data_dir_layout() {
        let dir = country_data_dir("countries").unwrap();
        assert!(dir.path().join("countries/TST.geojson").exists());
        assert!(dir.path().join("countries/TST.minmax.json").exists());
    }
}
