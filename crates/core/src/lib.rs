//! # basin-core
//!
//! Core types and I/O for the basin watershed delineator.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced raster grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS`: Coordinate Reference System handling
//! - `d8`: D8 flow-direction codec (power-of-two codes)
//! - GeoTIFF reading/writing (native, via the `tiff` crate)
//! - Vector features and GeoJSON I/O

pub mod crs;
pub mod d8;
pub mod error;
pub mod geodesy;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::CRS;
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
