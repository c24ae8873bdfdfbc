use mapscout_types::{GeoBox, Magnification, TileIdBox, TileKey};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::data_tile::{Tile, TileData, TileObject, TileRef};
use crate::types::TypeInfoSet;

#[derive(Debug)]
struct CacheEntry {
    tile: TileRef,
    last_used: u64,
}

/// Size limited cache of data tiles, least recently used tiles go first.
#[derive(Debug)]
pub struct DataTileCache {
    cache_size: usize,
    tiles: BTreeMap<TileKey, CacheEntry>,
    clock: u64,
}

impl DataTileCache {
    pub fn new(cache_size: usize) -> Self {
        Self {
            cache_size,
            tiles: BTreeMap::new(),
            clock: 0,
        }
    }

    /// Change the size limit, cleaning up at once if it shrank.
    pub fn set_size(&mut self, cache_size: usize) {
        let shrunk = cache_size < self.cache_size;
        self.cache_size = cache_size;
        if shrunk {
            self.cleanup_cache();
        }
    }

    pub fn size(&self) -> usize {
        self.cache_size
    }

    pub fn current_size(&self) -> usize {
        self.tiles.len()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// The cached tile, if any, marked as recently used.
    pub fn get_cached_tile(&mut self, key: &TileKey) -> Option<TileRef> {
        let now = self.tick();
        self.tiles.get_mut(key).map(|entry| {
            entry.last_used = now;
            Arc::clone(&entry.tile)
        })
    }

    /// The cached tile, or a new empty one that is added to the cache.
    pub fn get_tile(&mut self, key: &TileKey) -> TileRef {
        let now = self.tick();
        let entry = self.tiles.entry(*key).or_insert_with(|| CacheEntry {
            tile: Arc::new(Tile::new(*key)),
            last_used: now,
        });
        entry.last_used = now;
        Arc::clone(&entry.tile)
    }

    /// All tiles of the magnification's level covering `bbox`, row by row.
    pub fn get_tiles_for_bounding_box(
        &mut self,
        magnification: &Magnification,
        bbox: &GeoBox,
    ) -> Vec<TileRef> {
        let level = magnification.level();
        TileIdBox::from_geo_box(level, bbox)
            .iter()
            .map(|id| self.get_tile(&TileKey::new(level, id)))
            .collect()
    }

    /// Copy data of the given types from the cached parent tile into `tile`
    /// as prefill data.
    pub fn prefill_data_from_cache(
        &mut self,
        tile: &Tile,
        node_types: &TypeInfoSet,
        way_types: &TypeInfoSet,
        area_types: &TypeInfoSet,
    ) {
        let Some(parent_key) = tile.key().parent() else {
            return;
        };
        let Some(parent) = self.get_cached_tile(&parent_key) else {
            return;
        };

        resolve_from_parent(tile.node_data(), parent.node_data(), node_types);
        resolve_from_parent(tile.way_data(), parent.way_data(), way_types);
        resolve_from_parent(tile.area_data(), parent.area_data(), area_types);
    }

    /// Drop least recently used tiles until the cache fits its size again.
    /// Tiles still referenced outside the cache are kept.
    pub fn cleanup_cache(&mut self) {
        if self.tiles.len() <= self.cache_size {
            return;
        }

        let mut candidates: Vec<(u64, TileKey)> = self
            .tiles
            .iter()
            .filter(|(_, entry)| Arc::strong_count(&entry.tile) == 1)
            .map(|(key, entry)| (entry.last_used, *key))
            .collect();
        candidates.sort_unstable();

        let excess = self.tiles.len() - self.cache_size;
        for (_, key) in candidates.into_iter().take(excess) {
            self.tiles.remove(&key);
        }

        log::debug!(
            "Data tile cache cleaned to {}/{} tiles",
            self.tiles.len(),
            self.cache_size
        );
    }

    /// Mark every cached tile incomplete so that it is loaded again.
    pub fn invalidate(&mut self) {
        for entry in self.tiles.values() {
            entry.tile.invalidate();
        }
    }
}

fn resolve_from_parent(
    data: &RwLock<TileData<TileObject>>,
    parent: &RwLock<TileData<TileObject>>,
    types: &TypeInfoSet,
) {
    let parent = parent.read();
    if !types.intersects(parent.types()) {
        return;
    }

    let mut data = data.write();
    let mut subset = types.clone();
    subset.remove_all(data.types());
    subset.retain_common(parent.types());
    if subset.is_empty() {
        return;
    }

    let objects: Vec<TileObject> = parent
        .iter()
        .filter(|object| subset.contains(object.type_id))
        .copied()
        .collect();
    data.add_prefill_data(&subset, objects);
}
