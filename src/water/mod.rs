//! Land/water classification of the map.
//!
//! [`WaterIndex`] answers which parts of a region are land, water or coast.
//! The generator side turns raw coastline ways into that index: segments are
//! merged, optionally cut against the polygons bounding the imported data,
//! and rasterized per magnification level by [`WaterIndexGenerator`].

mod coast;
pub mod geometry;
mod ground_tile;
mod processor;
mod state_map;
mod water_index;
mod writer;

pub use coast::{Coast, CoastPoint, CoastState};
pub use ground_tile::{GroundCoord, GroundTile, GroundTileType};
pub use processor::{merge_coastlines, synthesize_coastlines};
pub use state_map::StateMap;
pub use water_index::{WATER_LEVEL_OFFSET, WaterIndex, WaterLevel};
pub use writer::WaterIndexGenerator;
