//! Query time side: open databases, load their data tiles and orchestrate
//! loading across several databases.

mod breaker;
mod database;
mod load_job;
mod map_service;

pub use breaker::{Breaker, BreakerRef, ThreadedBreaker};
pub use database::{
    AREA_AREA_INDEX_FILE, AREA_NODE_INDEX_FILE, AREA_WAY_INDEX_FILE, BOUNDING_BOX_FILE, Database,
    TYPES_FILE, WATER_INDEX_FILE, read_bounding_box, write_bounding_box,
};
pub use load_job::{DBInstance, DBLoadJob, JobEvent, TileMap};
pub use map_service::{
    AreaSearchParameter, CallbackId, MapData, MapService, TileStateCallback, TypeDefinition,
};
