//! Tile caches: rendered image tiles for the map view and data tiles filled
//! from the database indexes.

mod data_tile;
mod data_tile_cache;
mod tile_cache;

pub use data_tile::{Tile, TileData, TileObject, TileRef, TileState};
pub use data_tile_cache::DataTileCache;
pub use tile_cache::{TileCache, TileCacheKey, TileCacheVal, TileRange};
