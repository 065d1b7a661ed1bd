//! Error types for basin

use thiserror::Error;

/// Main error type for basin operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid raster dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Raster size mismatch: expected ({er}, {ec}), got ({ar}, {ac})")]
    SizeMismatch { er: usize, ec: usize, ar: usize, ac: usize },

    #[error("Coordinate ({x}, {y}) is outside every loaded tile")]
    OutOfBounds { x: f64, y: f64 },

    #[error("Pour point '{id}' could not be resolved: {reason}")]
    UnresolvedPourPoint { id: String, reason: String },

    #[error("Traversal needs tile '{tile}' which is not loaded")]
    MissingAdjacentTile { tile: String },

    #[error("Tiles '{a}' and '{b}' have inconsistent geometry: {reason}")]
    TileGeometryMismatch { a: String, b: String, reason: String },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for basin operations
pub type Result<T> = std::result::Result<T, Error>;
