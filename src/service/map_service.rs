//! Loading of data tiles from one database.

use crossbeam_channel::{Receiver, Sender};
use mapscout_types::{GeoBox, Magnification, TileKey};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::breaker::BreakerRef;
use super::database::Database;
use crate::config::MapServiceConfig;
use crate::error::{MapscoutError, Result};
use crate::io::FileOffset;
use crate::tiles::{DataTileCache, Tile, TileData, TileObject, TileRef};
use crate::types::{TypeConfig, TypeId, TypeInfoSet};
use crate::water::GroundTile;

/// Loading all tiles of one request slower than this logs a warning.
const SLOW_LOAD: Duration = Duration::from_millis(200);

/// Options of one tile loading request.
#[derive(Clone, Default)]
pub struct AreaSearchParameter {
    maximum_area_level: u32,
    low_zoom_optimization: bool,
    breaker: Option<BreakerRef>,
}

impl std::fmt::Debug for AreaSearchParameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AreaSearchParameter")
            .field("maximum_area_level", &self.maximum_area_level)
            .field("low_zoom_optimization", &self.low_zoom_optimization)
            .field("breaker", &self.breaker.is_some())
            .finish()
    }
}

impl AreaSearchParameter {
    pub fn new() -> Self {
        Self::from_config(&MapServiceConfig::default())
    }

    pub fn from_config(config: &MapServiceConfig) -> Self {
        Self {
            maximum_area_level: config.maximum_area_level,
            low_zoom_optimization: config.low_zoom_optimization,
            breaker: None,
        }
    }

    pub fn with_maximum_area_level(mut self, level: u32) -> Self {
        self.maximum_area_level = level;
        self
    }

    pub fn with_low_zoom_optimization(mut self, enabled: bool) -> Self {
        self.low_zoom_optimization = enabled;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerRef) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn maximum_area_level(&self) -> u32 {
        self.maximum_area_level
    }

    pub fn low_zoom_optimization(&self) -> bool {
        self.low_zoom_optimization
    }

    pub fn is_aborted(&self) -> bool {
        self.breaker.as_ref().is_some_and(|b| b.is_aborted())
    }

    fn check_aborted(&self) -> Result<()> {
        if self.is_aborted() {
            Err(MapscoutError::Aborted)
        } else {
            Ok(())
        }
    }
}

/// Types to load per object kind.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeDefinition {
    pub node_types: TypeInfoSet,
    pub way_types: TypeInfoSet,
    pub area_types: TypeInfoSet,
}

impl TypeDefinition {
    pub fn new(node_types: TypeInfoSet, way_types: TypeInfoSet, area_types: TypeInfoSet) -> Self {
        Self {
            node_types,
            way_types,
            area_types,
        }
    }

    /// Every type of the registry, by the kinds it is declared for.
    pub fn from_type_config(config: &TypeConfig) -> Self {
        Self::new(config.node_types(), config.way_types(), config.area_types())
    }
}

/// Objects collected from a set of tiles, each object once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapData {
    pub nodes: Vec<TileObject>,
    pub ways: Vec<TileObject>,
    pub areas: Vec<TileObject>,
    pub ground_tiles: Vec<GroundTile>,
}

impl MapData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.ways.is_empty()
            && self.areas.is_empty()
            && self.ground_tiles.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.ways.clear();
        self.areas.clear();
        self.ground_tiles.clear();
    }
}

fn collect_objects(
    target: &mut Vec<TileObject>,
    seen: &mut FxHashSet<TileObject>,
    data: &RwLock<TileData<TileObject>>,
) {
    let data = data.read();
    target.extend(data.iter().filter(|object| seen.insert(**object)).copied());
}

/// Copy the data of the complete tiles of `tiles` into `map_data`.
///
/// Objects spanning several tiles are added once.
pub(crate) fn collect_tile_data<'a>(
    tiles: impl IntoIterator<Item = &'a TileRef>,
    map_data: &mut MapData,
) {
    let start = Instant::now();
    let mut nodes: FxHashSet<TileObject> = map_data.nodes.iter().copied().collect();
    let mut ways: FxHashSet<TileObject> = map_data.ways.iter().copied().collect();
    let mut areas: FxHashSet<TileObject> = map_data.areas.iter().copied().collect();

    for tile in tiles.into_iter().filter(|tile| tile.is_complete()) {
        collect_objects(&mut map_data.nodes, &mut nodes, tile.node_data());
        collect_objects(&mut map_data.ways, &mut ways, tile.way_data());
        collect_objects(&mut map_data.areas, &mut areas, tile.area_data());
        map_data
            .ground_tiles
            .extend(tile.ground_data().read().iter().cloned());
    }

    let elapsed = start.elapsed();
    if elapsed > SLOW_LOAD {
        log::warn!("Copying data from tiles to map data took {:?}", elapsed);
    }
}

/// Identifies a registered tile state callback.
pub type CallbackId = u64;

pub type TileStateCallback = Arc<dyn Fn(&TileRef) + Send + Sync>;

struct LoadTask {
    parameter: AreaSearchParameter,
    types: TypeDefinition,
    tiles: Vec<TileRef>,
}

struct ServiceInner {
    database: Arc<Database>,
    config: MapServiceConfig,
    cache: Mutex<DataTileCache>,
    load_lock: Mutex<()>,
    callbacks: Mutex<BTreeMap<CallbackId, TileStateCallback>>,
    next_callback_id: AtomicU64,
}

/// Serves data tiles of one database, loading missing data from its indexes.
///
/// Tiles are loaded synchronously by [`load_missing_tile_data`] or in the
/// background by the service's worker thread. Registered callbacks hear about
/// every tile that got prefilled or completed, on the loading thread.
///
/// [`load_missing_tile_data`]: MapService::load_missing_tile_data
pub struct MapService {
    inner: Arc<ServiceInner>,
    tasks: Option<Sender<LoadTask>>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MapService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapService")
            .field("database", &self.inner.database)
            .field("config", &self.inner.config)
            .finish()
    }
}

impl MapService {
    pub fn new(database: Arc<Database>, config: MapServiceConfig) -> Result<Self> {
        let inner = Arc::new(ServiceInner {
            cache: Mutex::new(DataTileCache::new(config.data_cache_size)),
            database,
            config,
            load_lock: Mutex::new(()),
            callbacks: Mutex::new(BTreeMap::new()),
            next_callback_id: AtomicU64::new(1),
        });

        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker_inner = Arc::clone(&inner);
        let worker = std::thread::Builder::new()
            .name("mapscout-loader".to_string())
            .spawn(move || run_worker(worker_inner, receiver))?;

        Ok(Self {
            inner,
            tasks: Some(sender),
            worker: Some(worker),
        })
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.inner.database
    }

    pub fn config(&self) -> &MapServiceConfig {
        &self.inner.config
    }

    pub fn set_cache_size(&self, size: usize) {
        self.inner.cache.lock().set_size(size);
    }

    pub fn cache_size(&self) -> usize {
        self.inner.cache.lock().size()
    }

    /// The tiles of the magnification's level covering `bbox`.
    pub fn lookup_tiles(&self, magnification: &Magnification, bbox: &GeoBox) -> Vec<TileRef> {
        self.inner
            .cache
            .lock()
            .get_tiles_for_bounding_box(magnification, bbox)
    }

    pub fn lookup_tile(&self, key: &TileKey) -> TileRef {
        self.inner.cache.lock().get_tile(key)
    }

    pub fn register_tile_state_callback<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(&TileRef) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::Relaxed);
        self.inner.callbacks.lock().insert(id, Arc::new(callback));
        id
    }

    pub fn deregister_tile_state_callback(&self, id: CallbackId) -> bool {
        self.inner.callbacks.lock().remove(&id).is_some()
    }

    /// Load the data of every incomplete tile of `tiles`.
    ///
    /// A failing tile does not stop the others, the first error is returned
    /// once all tiles were tried. A fired breaker stops at once with
    /// [`MapscoutError::Aborted`].
    pub fn load_missing_tile_data(
        &self,
        parameter: &AreaSearchParameter,
        types: &TypeDefinition,
        tiles: &[TileRef],
    ) -> Result<()> {
        self.inner.load_missing_tile_data(parameter, types, tiles)
    }

    /// Queue loading of `tiles` on the worker thread and return immediately.
    pub fn load_missing_tile_data_async(
        &self,
        parameter: AreaSearchParameter,
        types: TypeDefinition,
        tiles: Vec<TileRef>,
    ) -> Result<()> {
        let task = LoadTask {
            parameter,
            types,
            tiles,
        };
        self.tasks
            .as_ref()
            .and_then(|sender| sender.send(task).ok())
            .ok_or_else(|| MapscoutError::DatabaseClosed(self.inner.database.path().to_path_buf()))
    }

    pub fn add_tile_data_to_map_data(&self, tiles: &[TileRef], map_data: &mut MapData) {
        collect_tile_data(tiles, map_data);
    }

    /// Mark all cached tiles for reloading.
    pub fn invalidate_cache(&self) {
        self.inner.cache.lock().invalidate();
    }
}

impl Drop for MapService {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop.
        self.tasks.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!(
                    "Loader thread of '{}' panicked",
                    self.inner.database.path().display()
                );
            }
        }
    }
}

fn run_worker(inner: Arc<ServiceInner>, tasks: Receiver<LoadTask>) {
    log::debug!("Loader thread for '{}' started", inner.database.path().display());

    for task in tasks.iter() {
        match inner.load_missing_tile_data(&task.parameter, &task.types, &task.tiles) {
            Ok(()) => {}
            Err(MapscoutError::Aborted) => log::debug!("Tile loading aborted"),
            Err(e) => log::warn!(
                "Loading tiles of '{}' failed: {}",
                inner.database.path().display(),
                e
            ),
        }
    }

    log::debug!("Loader thread for '{}' stopped", inner.database.path().display());
}

impl ServiceInner {
    fn notify(&self, tile: &TileRef) {
        let callbacks: Vec<TileStateCallback> = self.callbacks.lock().values().cloned().collect();
        for callback in callbacks {
            callback(tile);
        }
    }

    fn load_missing_tile_data(
        &self,
        parameter: &AreaSearchParameter,
        types: &TypeDefinition,
        tiles: &[TileRef],
    ) -> Result<()> {
        let _guard = self.load_lock.lock();
        let start = Instant::now();
        let slow_tile = Duration::from_millis(self.config.slow_tile_warning_ms);
        let mut first_error = None;

        for tile in tiles.iter().filter(|tile| !tile.is_complete()) {
            parameter.check_aborted()?;
            let tile_start = Instant::now();

            if parameter.low_zoom_optimization() {
                self.cache.lock().prefill_data_from_cache(
                    tile,
                    &types.node_types,
                    &types.way_types,
                    &types.area_types,
                );
            }
            self.notify(tile);

            match self.load_tile(parameter, types, tile) {
                Ok(()) => self.notify(tile),
                Err(MapscoutError::Aborted) => return Err(MapscoutError::Aborted),
                Err(e) => {
                    log::error!("Error loading tile {}: {}", tile.key(), e);
                    first_error.get_or_insert(e);
                }
            }

            let elapsed = tile_start.elapsed();
            if elapsed > slow_tile {
                log::warn!("Retrieving tile data for tile {} took {:?}", tile.key(), elapsed);
            }
        }

        let elapsed = start.elapsed();
        if elapsed > SLOW_LOAD {
            log::warn!("Retrieving all tile data took {:?}", elapsed);
        }

        self.cache.lock().cleanup_cache();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn load_tile(&self, parameter: &AreaSearchParameter, types: &TypeDefinition, tile: &Tile) -> Result<()> {
        let bbox = tile.bounding_box();
        let magnification = Magnification::from_level(tile.level());

        let node_index = self.database.area_node_index()?;
        load_objects(tile.node_data(), &types.node_types, |requested| {
            let mut lookup = LoadedObjects::default();
            for type_id in requested.iter() {
                let single: TypeInfoSet = std::iter::once(type_id).collect();
                let result = node_index.get_offsets(&bbox, &single)?;
                lookup.add(type_id, &result.loaded_types, result.sorted_offsets());
            }
            Ok(lookup)
        })?;
        parameter.check_aborted()?;

        let way_index = self.database.area_way_index()?;
        load_objects(tile.way_data(), &types.way_types, |requested| {
            let mut lookup = LoadedObjects::default();
            for type_id in requested.iter() {
                let single: TypeInfoSet = std::iter::once(type_id).collect();
                let result = way_index.get_offsets(&bbox, &single)?;
                lookup.add(type_id, &result.loaded_types, result.sorted_offsets());
            }
            Ok(lookup)
        })?;
        parameter.check_aborted()?;

        let area_index = self.database.area_area_index()?;
        let area_level = magnification.level() + parameter.maximum_area_level();
        load_objects(tile.area_data(), &types.area_types, |requested| {
            let mut lookup = LoadedObjects::default();
            for type_id in requested.iter() {
                let single: TypeInfoSet = std::iter::once(type_id).collect();
                let result = area_index.get_offsets(&bbox, area_level, &single, usize::MAX)?;
                lookup.add(type_id, &result.loaded_types, result.offsets);
            }
            Ok(lookup)
        })?;
        parameter.check_aborted()?;

        self.load_ground_tiles(tile, &magnification)
    }

    fn load_ground_tiles(&self, tile: &Tile, magnification: &Magnification) -> Result<()> {
        if tile.ground_data().read().is_complete() {
            return Ok(());
        }

        let ground_tiles = match self.database.water_index()? {
            Some(index) => index.get_regions(&tile.bounding_box(), magnification)?,
            None => Vec::new(),
        };
        tile.ground_data()
            .write()
            .set_data(TypeInfoSet::new(), ground_tiles);
        Ok(())
    }
}

#[derive(Default)]
struct LoadedObjects {
    types: TypeInfoSet,
    objects: Vec<TileObject>,
}

impl LoadedObjects {
    fn add(&mut self, type_id: TypeId, loaded_types: &TypeInfoSet, offsets: Vec<FileOffset>) {
        self.types.extend_from(loaded_types);
        self.objects
            .extend(offsets.into_iter().map(|offset| TileObject::new(type_id, offset)));
    }
}

/// Query the types not yet present in `data` and add what was found.
fn load_objects<F>(data: &RwLock<TileData<TileObject>>, types: &TypeInfoSet, query: F) -> Result<()>
where
    F: FnOnce(&TypeInfoSet) -> Result<LoadedObjects>,
{
    let requested = {
        let data = data.read();
        if data.is_complete() {
            return Ok(());
        }
        let mut requested = types.clone();
        requested.remove_all(data.types());
        requested
    };

    if requested.is_empty() {
        data.write().set_complete();
        return Ok(());
    }

    let loaded = query(&requested)?;
    data.write().add_data(&loaded.types, loaded.objects);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::breaker::{Breaker, ThreadedBreaker};
    use mapscout_types::TileId;

    #[test]
    fn test_parameter_breaker() {
        let breaker = Arc::new(ThreadedBreaker::new());
        let parameter = AreaSearchParameter::new().with_breaker(breaker.clone());
        assert!(!parameter.is_aborted());
        assert_eq!(parameter.maximum_area_level(), 4);

        breaker.abort();
        assert!(parameter.is_aborted());
        assert!(matches!(parameter.check_aborted(), Err(MapscoutError::Aborted)));
    }

    #[test]
    fn test_load_objects_skips_cached_types() {
        let data = RwLock::new(TileData::new());
        data.write()
            .add_prefill_data(&[1].into_iter().collect(), vec![TileObject::new(1, 10)]);

        let wanted: TypeInfoSet = [1, 2].into_iter().collect();
        load_objects(&data, &wanted, |requested| {
            assert_eq!(requested, &[2].into_iter().collect::<TypeInfoSet>());
            let mut loaded = LoadedObjects::default();
            loaded.add(2, requested, vec![30, 20]);
            Ok(loaded)
        })
        .unwrap();

        let data = data.read();
        assert!(data.is_complete());
        let offsets: Vec<_> = data.iter().map(|o| o.offset).collect();
        assert_eq!(offsets, vec![10, 30, 20]);
    }

    #[test]
    fn test_load_objects_all_cached() {
        let data = RwLock::new(TileData::new());
        let types: TypeInfoSet = [1].into_iter().collect();
        data.write().add_prefill_data(&types, Vec::new());

        load_objects(&data, &types, |_| panic!("no query expected")).unwrap();
        assert!(data.read().is_complete());
    }

    #[test]
    fn test_collect_tile_data_deduplicates() {
        let types: TypeInfoSet = [1].into_iter().collect();
        let make_tile = |x: u32| {
            let tile = Arc::new(Tile::new(TileKey::new(2, TileId::new(x, 0))));
            tile.node_data().write().set_data(types.clone(), vec![TileObject::new(1, 5)]);
            tile.way_data().write().set_complete();
            tile.area_data()
                .write()
                .set_data(types.clone(), vec![TileObject::new(1, x as u64 + 100)]);
            tile.ground_data().write().set_complete();
            tile
        };
        let incomplete = Arc::new(Tile::new(TileKey::new(2, TileId::new(3, 0))));
        incomplete.node_data().write().set_data(types.clone(), vec![TileObject::new(1, 7)]);

        let tiles = vec![make_tile(0), make_tile(1), incomplete];
        let mut map_data = MapData::new();
        collect_tile_data(&tiles, &mut map_data);

        assert_eq!(map_data.nodes, vec![TileObject::new(1, 5)]);
        assert_eq!(map_data.areas, vec![TileObject::new(1, 100), TileObject::new(1, 101)]);
        assert!(map_data.ways.is_empty());
    }
}
