//! Spatial indexes and tile loading for offline vector maps.
//!
//! ```rust,no_run
//! use mapscout::{DBInstance, DBLoadJob, DatabaseConfig, GeoBox, Magnification};
//! use mapscout::{MapData, MapServiceConfig, TypeDefinition};
//! use std::time::Duration;
//!
//! # fn main() -> mapscout::Result<()> {
//! let instance = DBInstance::open("maps/prague", &DatabaseConfig::default(), MapServiceConfig::default())?;
//! let type_config = instance.database.type_config()?;
//! let types = TypeDefinition::from_type_config(&type_config);
//!
//! let mut job = DBLoadJob::new(
//!     Magnification::CITY,
//!     GeoBox::from_bounds(50.05, 14.35, 50.12, 14.50),
//!     4,
//!     true,
//!     false,
//! );
//! job.run(&[instance], &types);
//! job.wait_finished(Duration::from_secs(5));
//!
//! let mut data = MapData::new();
//! job.add_tile_data_to_map_data(&mut data);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod progress;
pub mod render;
pub mod service;
pub mod tiles;
pub mod types;
pub mod water;

pub use config::{
    AreaIndexConfig, Config, DatabaseConfig, MapServiceConfig, TileCacheConfig, WaterIndexConfig,
};
pub use error::{MapscoutError, Result};

pub use mapscout_types::{
    GeoBox, GeoCoord, Magnification, MagnificationLevel, OsmTile, TileId, TileIdBox, TileKey,
};

pub use index::{AreaAreaIndex, AreaAreaIndexGenerator, AreaIndex, AreaIndexGenerator, IndexEntry};
pub use progress::{LogProgress, Progress, SilentProgress};
pub use service::{
    AreaSearchParameter, Breaker, BreakerRef, DBInstance, DBLoadJob, Database, JobEvent, MapData,
    MapService, ThreadedBreaker, TypeDefinition,
};
pub use tiles::{DataTileCache, Tile, TileCache, TileCacheKey, TileObject, TileRef, TileState};
pub use types::{TypeConfig, TypeId, TypeInfo, TypeInfoSet};
pub use water::{
    Coast, CoastState, GroundTile, GroundTileType, WaterIndex, WaterIndexGenerator,
    merge_coastlines, synthesize_coastlines,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{MapscoutError, Result};

    pub use crate::{
        Config, DatabaseConfig, MapServiceConfig, TileCacheConfig, WaterIndexConfig,
    };

    pub use crate::{GeoBox, GeoCoord, Magnification, TileId, TileKey};

    pub use crate::{AreaAreaIndex, AreaIndex, WaterIndex};

    pub use crate::{DBInstance, DBLoadJob, JobEvent, MapData, MapService, TypeDefinition};

    pub use crate::{TileCache, TileRef, TileState};
}
