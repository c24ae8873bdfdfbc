use mapscout_types::{GeoBox, MagnificationLevel, TileKey};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::io::FileOffset;
use crate::types::{TypeId, TypeInfoSet};
use crate::water::GroundTile;

/// Life cycle of a tile, both for rendered tiles and data tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TileState {
    /// Not known to the cache
    Absent,
    /// Requested, nothing loaded yet
    Pending,
    /// Loading started or partially done
    InProgress,
    Complete,
}

/// An object found by an index lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileObject {
    pub type_id: TypeId,
    pub offset: FileOffset,
}

impl TileObject {
    pub const fn new(type_id: TypeId, offset: FileOffset) -> Self {
        Self { type_id, offset }
    }
}

/// Data of one kind held by a tile.
///
/// Prefill data is copied from a parent tile while the tile itself is still
/// loading; `data` is what was loaded for the tile.
#[derive(Debug, Clone)]
pub struct TileData<T> {
    types: TypeInfoSet,
    prefill_data: Vec<T>,
    data: Vec<T>,
    complete: bool,
}

impl<T> Default for TileData<T> {
    fn default() -> Self {
        Self {
            types: TypeInfoSet::new(),
            prefill_data: Vec::new(),
            data: Vec::new(),
            complete: false,
        }
    }
}

impl<T: Clone> TileData<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty() && self.prefill_data.is_empty() && self.data.is_empty()
    }

    /// Mark for reloading; loaded data stays available meanwhile.
    pub fn invalidate(&mut self) {
        self.complete = false;
    }

    pub fn add_prefill_data(&mut self, types: &TypeInfoSet, data: Vec<T>) {
        self.types.extend_from(types);
        if self.prefill_data.is_empty() {
            self.prefill_data = data;
        } else {
            self.prefill_data.extend(data);
        }
        self.complete = false;
    }

    pub fn add_data(&mut self, types: &TypeInfoSet, data: Vec<T>) {
        self.data.extend(data);
        self.types.extend_from(types);
        self.complete = true;
    }

    pub fn set_data(&mut self, types: TypeInfoSet, data: Vec<T>) {
        self.data = data;
        self.types = types;
        self.complete = true;
    }

    pub fn set_complete(&mut self) {
        self.complete = true;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn types(&self) -> &TypeInfoSet {
        &self.types
    }

    pub fn data_size(&self) -> usize {
        self.prefill_data.len() + self.data.len()
    }

    /// Prefill data followed by loaded data.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.prefill_data.iter().chain(self.data.iter())
    }
}

/// Data loaded for one tile of the equirectangular grid.
#[derive(Debug)]
pub struct Tile {
    key: TileKey,
    bounding_box: GeoBox,
    node_data: RwLock<TileData<TileObject>>,
    way_data: RwLock<TileData<TileObject>>,
    area_data: RwLock<TileData<TileObject>>,
    ground_data: RwLock<TileData<GroundTile>>,
}

pub type TileRef = Arc<Tile>;

impl Tile {
    pub fn new(key: TileKey) -> Self {
        Self {
            key,
            bounding_box: key.bounding_box(),
            node_data: RwLock::new(TileData::new()),
            way_data: RwLock::new(TileData::new()),
            area_data: RwLock::new(TileData::new()),
            ground_data: RwLock::new(TileData::new()),
        }
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn level(&self) -> MagnificationLevel {
        self.key.level
    }

    pub fn bounding_box(&self) -> GeoBox {
        self.bounding_box
    }

    pub fn node_data(&self) -> &RwLock<TileData<TileObject>> {
        &self.node_data
    }

    pub fn way_data(&self) -> &RwLock<TileData<TileObject>> {
        &self.way_data
    }

    pub fn area_data(&self) -> &RwLock<TileData<TileObject>> {
        &self.area_data
    }

    pub fn ground_data(&self) -> &RwLock<TileData<GroundTile>> {
        &self.ground_data
    }

    fn parts_complete(&self) -> [bool; 4] {
        [
            self.node_data.read().is_complete(),
            self.way_data.read().is_complete(),
            self.area_data.read().is_complete(),
            self.ground_data.read().is_complete(),
        ]
    }

    pub fn is_complete(&self) -> bool {
        self.parts_complete().iter().all(|complete| *complete)
    }

    pub fn is_empty(&self) -> bool {
        self.node_data.read().is_empty()
            && self.way_data.read().is_empty()
            && self.area_data.read().is_empty()
            && self.ground_data.read().is_empty()
    }

    pub fn state(&self) -> TileState {
        let parts = self.parts_complete();
        if parts.iter().all(|complete| *complete) {
            TileState::Complete
        } else if parts.iter().any(|complete| *complete) || !self.is_empty() {
            TileState::InProgress
        } else {
            TileState::Pending
        }
    }

    pub fn invalidate(&self) {
        self.node_data.write().invalidate();
        self.way_data.write().invalidate();
        self.area_data.write().invalidate();
        self.ground_data.write().invalidate();
    }
}
