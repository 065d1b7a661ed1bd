//! Run configuration
//!
//! A delineation run is described by one JSON file rather than flags, since
//! the same configuration gets re-run against updated outlet lists. Paths
//! are interpreted relative to the working directory.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// `single`: one direction/accumulation raster covers all points.
/// `partial`: per-watershed tiles in directories, plus a boundary layer
/// mapping points (and tile adjacency) to watershed names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Single,
    Partial,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub mode: Mode,
    /// CSV of outlet points (id, name, long, lat, area[km2])
    pub outlets: PathBuf,
    /// D8 drainage-direction GeoTIFF (single) or directory of them (partial)
    pub drainage_direction: PathBuf,
    /// Flow-accumulation GeoTIFF or directory; snapping degrades to the
    /// containing cell without it
    #[serde(default)]
    pub flow_accumulation: Option<PathBuf>,
    /// River network GeoJSON or directory of per-watershed files
    #[serde(default)]
    pub rivers: Option<PathBuf>,
    /// Watershed boundary GeoJSON, required in partial mode
    #[serde(default)]
    pub watersheds: Option<PathBuf>,
    /// Attribute naming the watershed in the boundary layer
    #[serde(default = "default_watershed_field")]
    pub watershed_field: String,
    #[serde(default = "default_results")]
    pub results: PathBuf,
    /// Snap search radius in cells
    #[serde(default = "default_snap_radius")]
    pub snap_radius: usize,
    /// Reaches below this Strahler order are dropped from clipped rivers
    #[serde(default = "default_min_strahler")]
    pub min_strahler: i64,
    #[serde(default = "default_strahler_field")]
    pub strahler_field: String,
    /// Cap on tiles loaded while tracing a single point
    #[serde(default = "default_max_tile_loads")]
    pub max_tile_loads: usize,
}

fn default_watershed_field() -> String {
    "Watershed_ID".into()
}

fn default_results() -> PathBuf {
    PathBuf::from("results")
}

fn default_snap_radius() -> usize {
    1
}

fn default_min_strahler() -> i64 {
    1
}

fn default_strahler_field() -> String {
    "strahler".into()
}

fn default_max_tile_loads() -> usize {
    64
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&text)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check path shapes against the mode and create the results layout.
    fn validate(&self) -> Result<()> {
        if !self.outlets.is_file() {
            bail!("outlets must be a CSV file: {}", self.outlets.display());
        }

        match self.mode {
            Mode::Single => {
                self.expect_file("drainage_direction", &self.drainage_direction)?;
                if let Some(acc) = &self.flow_accumulation {
                    self.expect_file("flow_accumulation", acc)?;
                }
                if let Some(rivers) = &self.rivers {
                    self.expect_file("rivers", rivers)?;
                }
            }
            Mode::Partial => {
                self.expect_dir("drainage_direction", &self.drainage_direction)?;
                if let Some(acc) = &self.flow_accumulation {
                    self.expect_dir("flow_accumulation", acc)?;
                }
                if let Some(rivers) = &self.rivers {
                    self.expect_dir("rivers", rivers)?;
                }
                match &self.watersheds {
                    Some(path) if path.is_file() => {}
                    Some(path) => bail!(
                        "watersheds must point to a boundary GeoJSON file: {}",
                        path.display()
                    ),
                    None => bail!("partial mode requires a watersheds boundary layer"),
                }
            }
        }

        if self.snap_radius >= 6 {
            warn!(
                radius = self.snap_radius,
                "snap_radius is unusually large; outlets may snap to the wrong stream"
            );
        }

        if !self.results.exists() {
            warn!(path = %self.results.display(), "results directory does not exist, creating it");
        }
        fs::create_dir_all(self.watershed_dir())?;
        fs::create_dir_all(self.river_dir())?;

        Ok(())
    }

    pub fn watershed_dir(&self) -> PathBuf {
        self.results.join("watershed")
    }

    pub fn river_dir(&self) -> PathBuf {
        self.results.join("river")
    }

    fn expect_file(&self, what: &str, path: &Path) -> Result<()> {
        if !path.is_file() {
            bail!(
                "in single mode {} must be a file, not a directory: {}",
                what,
                path.display()
            );
        }
        Ok(())
    }

    fn expect_dir(&self, what: &str, path: &Path) -> Result<()> {
        if !path.is_dir() {
            bail!(
                "in partial mode {} must be a directory, not a file: {}",
                what,
                path.display()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn write_config(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("run.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_single_mode_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("outlets.csv")).unwrap();
        File::create(dir.path().join("dir.tif")).unwrap();

        let body = format!(
            r#"{{
                "mode": "single",
                "outlets": "{0}/outlets.csv",
                "drainage_direction": "{0}/dir.tif",
                "results": "{0}/results",
                "snap_radius": 3
            }}"#,
            dir.path().display()
        );
        let path = write_config(dir.path(), &body);

        let config = RunConfig::load(&path).unwrap();
        assert_eq!(config.mode, Mode::Single);
        assert_eq!(config.snap_radius, 3);
        assert_eq!(config.min_strahler, 1);
        assert!(config.watershed_dir().is_dir());
        assert!(config.river_dir().is_dir());
    }

    #[test]
    fn test_partial_mode_requires_watersheds() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("outlets.csv")).unwrap();
        fs::create_dir(dir.path().join("directions")).unwrap();

        let body = format!(
            r#"{{
                "mode": "partial",
                "outlets": "{0}/outlets.csv",
                "drainage_direction": "{0}/directions"
            }}"#,
            dir.path().display()
        );
        let path = write_config(dir.path(), &body);

        assert!(RunConfig::load(&path).is_err());
    }

    #[test]
    fn test_single_mode_rejects_directory_paths() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("outlets.csv")).unwrap();
        fs::create_dir(dir.path().join("directions")).unwrap();

        let body = format!(
            r#"{{
                "mode": "single",
                "outlets": "{0}/outlets.csv",
                "drainage_direction": "{0}/directions"
            }}"#,
            dir.path().display()
        );
        let path = write_config(dir.path(), &body);

        assert!(RunConfig::load(&path).is_err());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{ "mode": "single", "outlets": "x.csv", "drainage_direction": "y.tif", "MAX_STRAHLER": 2 }"#;
        let path = write_config(dir.path(), body);
        assert!(RunConfig::load(&path).is_err());
    }
}
