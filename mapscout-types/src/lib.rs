//! # mapscout-types
//!
//! Geographic primitives shared by the mapscout index readers, generators and
//! tile loaders:
//!
//! - **Coordinates**: `GeoCoord` (latitude/longitude in degrees)
//! - **Boxes**: `GeoBox`, with a distinguished invalid state
//! - **Tiles**: `Magnification`, `TileId`, `TileKey`, `TileIdBox`, `OsmTile`
//! - **Cells**: `Pixel`, `CellDimension`
//!
//! All types are serializable with Serde and convert to and from the `geo`
//! crate's primitives where a counterpart exists.
//!
//! ## Examples
//!
//! ```rust
//! use mapscout_types::{GeoBox, GeoCoord, Magnification, TileId};
//!
//! let berlin = GeoCoord::new(52.52, 13.40);
//! let tile = TileId::from_coord(Magnification::CITY.level(), &berlin);
//! let bbox = tile.bounding_box(Magnification::CITY.level());
//! assert!(bbox.contains(&berlin));
//! ```

pub mod coord;
pub mod geo_box;
pub mod pixel;
pub mod tile;

pub use coord::GeoCoord;
pub use geo_box::GeoBox;
pub use pixel::Pixel;
pub use tile::{
    CellDimension, MAX_LEVEL, Magnification, MagnificationLevel, OsmTile, TileId, TileIdBox,
    TileKey, cell_dimension,
};
