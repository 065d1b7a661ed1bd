//! Coordinate Reference System handling
//!
//! basin does not reproject; the CRS read from input rasters is carried
//! through to output products and checked for consistency across tiles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CRS {
    epsg: u32,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self { epsg: code }
    }

    /// WGS84 geographic CRS (EPSG:4326), the working CRS of the delineator
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// The EPSG code
    pub fn epsg(&self) -> u32 {
        self.epsg
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg)
    }
}
