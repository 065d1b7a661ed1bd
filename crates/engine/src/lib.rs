//! Watershed delineation over D8 flow-direction rasters.
//!
//! The pipeline runs in grid space from start to finish: a pour point is
//! snapped onto the stream network ([`snap`]), its upstream area collected
//! by reverse breadth-first search ([`trace`]), rasterized into a mask
//! ([`mask`]), traced into a boundary polygon ([`polygonize`]) and, when a
//! river layer is present, paired with its clipped reaches ([`clip`]).
//! [`batch`] ties the stages together and runs points in parallel; the
//! [`mosaic`] layer makes a tiled domain look like one grid throughout.

pub mod batch;
pub mod clip;
pub mod mask;
pub mod mosaic;
pub mod polygonize;
pub mod snap;
pub mod tile;
pub mod trace;

pub use batch::{BatchParams, BatchReport, Delineation, Delineator, PointOutcome, TileSource};
pub use clip::{ClipFeedback, ClipStatus, RiverFilter};
pub use mask::WatershedMask;
pub use mosaic::Mosaic;
pub use snap::{PourPoint, SnappedPoint};
pub use tile::{CellAddress, FlowTile, TileCatalog, TileId};
pub use trace::TraceResult;
