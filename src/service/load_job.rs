//! Loading the tiles of one map view across several databases.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use mapscout_types::{GeoBox, Magnification, TileKey};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::breaker::{BreakerRef, ThreadedBreaker};
use super::database::Database;
use super::map_service::{
    AreaSearchParameter, CallbackId, MapData, MapService, TypeDefinition, collect_tile_data,
};
use crate::config::{DatabaseConfig, MapServiceConfig};
use crate::error::Result;
use crate::tiles::TileRef;

pub type TileMap = BTreeMap<TileKey, TileRef>;

/// An open database together with the service loading its tiles.
#[derive(Debug, Clone)]
pub struct DBInstance {
    pub path: PathBuf,
    pub database: Arc<Database>,
    pub map_service: Arc<MapService>,
}

impl DBInstance {
    pub fn new(database: Arc<Database>, map_service: Arc<MapService>) -> Self {
        Self {
            path: database.path().to_path_buf(),
            database,
            map_service,
        }
    }

    pub fn open<P: AsRef<Path>>(
        dir: P,
        database_config: &DatabaseConfig,
        service_config: MapServiceConfig,
    ) -> Result<Self> {
        let database = Arc::new(Database::open(dir, database_config)?);
        let map_service = Arc::new(MapService::new(Arc::clone(&database), service_config)?);
        Ok(Self::new(database, map_service))
    }
}

/// Progress reported by a [`DBLoadJob`].
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Every tile of one database is loaded
    DatabaseLoaded { path: PathBuf, tiles: TileMap },
    /// Every relevant database is loaded
    Finished { loaded: BTreeMap<PathBuf, TileMap> },
}

type JobListener = Box<dyn FnMut(&JobEvent) + Send>;

/// Loads the tiles covering a lookup box from every database that overlaps it.
///
/// Tile completion is reported by the map services on their worker threads and
/// forwarded through a channel; the job's state is only touched by the thread
/// calling [`process_events`](Self::process_events) or
/// [`wait_finished`](Self::wait_finished).
pub struct DBLoadJob {
    magnification: Magnification,
    lookup_box: GeoBox,
    maximum_area_level: u32,
    low_zoom_optimization: bool,
    close_on_finish: bool,

    breaker: BreakerRef,
    databases: Vec<DBInstance>,
    callbacks: Vec<(Arc<MapService>, CallbackId)>,
    sender: Sender<(PathBuf, TileRef)>,
    receiver: Receiver<(PathBuf, TileRef)>,

    all_tiles: BTreeMap<PathBuf, TileMap>,
    loading_tiles: BTreeMap<PathBuf, TileMap>,
    loaded_tiles: BTreeMap<PathBuf, TileMap>,
    loaded_databases: BTreeSet<PathBuf>,

    listener: Option<JobListener>,
    finished: bool,
    closed: bool,
}

impl std::fmt::Debug for DBLoadJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DBLoadJob")
            .field("magnification", &self.magnification)
            .field("lookup_box", &self.lookup_box)
            .field("databases", &self.databases.len())
            .field("finished", &self.finished)
            .field("closed", &self.closed)
            .finish()
    }
}

impl DBLoadJob {
    pub fn new(
        magnification: Magnification,
        lookup_box: GeoBox,
        maximum_area_level: u32,
        low_zoom_optimization: bool,
        close_on_finish: bool,
    ) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            magnification,
            lookup_box,
            maximum_area_level,
            low_zoom_optimization,
            close_on_finish,
            breaker: Arc::new(ThreadedBreaker::new()),
            databases: Vec::new(),
            callbacks: Vec::new(),
            sender,
            receiver,
            all_tiles: BTreeMap::new(),
            loading_tiles: BTreeMap::new(),
            loaded_tiles: BTreeMap::new(),
            loaded_databases: BTreeSet::new(),
            listener: None,
            finished: false,
            closed: false,
        }
    }

    pub fn set_listener<F>(&mut self, listener: F)
    where
        F: FnMut(&JobEvent) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    pub fn magnification(&self) -> &Magnification {
        &self.magnification
    }

    pub fn lookup_box(&self) -> &GeoBox {
        &self.lookup_box
    }

    pub fn breaker(&self) -> &BreakerRef {
        &self.breaker
    }

    /// Start loading from the databases overlapping the lookup box.
    pub fn run(&mut self, databases: &[DBInstance], types: &TypeDefinition) {
        self.databases = databases
            .iter()
            .filter(|instance| self.is_relevant(instance))
            .cloned()
            .collect();

        if self.databases.is_empty() {
            log::debug!("No database covers {}, load job finished", self.lookup_box);
            self.finish();
            return;
        }

        let parameter = AreaSearchParameter::new()
            .with_maximum_area_level(self.maximum_area_level)
            .with_low_zoom_optimization(self.low_zoom_optimization)
            .with_breaker(Arc::clone(&self.breaker));

        let mut started = Vec::with_capacity(self.databases.len());
        for instance in &self.databases {
            let tiles = instance
                .map_service
                .lookup_tiles(&self.magnification, &self.lookup_box);

            let sender = self.sender.clone();
            let path = instance.path.clone();
            let id = instance
                .map_service
                .register_tile_state_callback(move |tile: &TileRef| {
                    // The job may already be gone.
                    let _ = sender.send((path.clone(), Arc::clone(tile)));
                });
            self.callbacks.push((Arc::clone(&instance.map_service), id));

            let tile_map: TileMap = tiles.iter().map(|tile| (tile.key(), Arc::clone(tile))).collect();
            self.all_tiles.insert(instance.path.clone(), tile_map.clone());
            self.loading_tiles.insert(instance.path.clone(), tile_map);
            self.loaded_tiles.insert(instance.path.clone(), TileMap::new());

            if let Err(e) = instance
                .map_service
                .load_missing_tile_data_async(parameter.clone(), types.clone(), tiles.clone())
            {
                log::warn!("Cannot start loading from '{}': {}", instance.path.display(), e);
            }
            started.push((instance.path.clone(), tiles));
        }

        for (path, tiles) in started {
            for tile in tiles.iter().filter(|tile| tile.is_complete()) {
                self.on_tile_state_changed(&path, tile);
            }
            self.check_database_loaded(&path);
        }
    }

    fn is_relevant(&self, instance: &DBInstance) -> bool {
        if !instance.database.is_open() {
            log::debug!("Skipping closed database '{}'", instance.path.display());
            return false;
        }

        match instance.database.bounding_box() {
            Ok(bbox) if bbox.intersects(&self.lookup_box) => true,
            Ok(bbox) => {
                log::debug!(
                    "Skipping database '{}', {} is outside of {}",
                    instance.path.display(),
                    bbox,
                    self.lookup_box
                );
                false
            }
            Err(e) => {
                log::warn!("Skipping database '{}': {}", instance.path.display(), e);
                false
            }
        }
    }

    /// Handle tile notifications that arrived so far without blocking.
    /// Returns the number of notifications handled.
    pub fn process_events(&mut self) -> usize {
        let mut count = 0;
        while let Ok((path, tile)) = self.receiver.try_recv() {
            self.on_tile_state_changed(&path, &tile);
            count += 1;
        }
        count
    }

    /// Handle tile notifications until the job finished or `timeout` passed.
    pub fn wait_finished(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.finished {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok((path, tile)) => self.on_tile_state_changed(&path, &tile),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.finished
    }

    fn on_tile_state_changed(&mut self, path: &Path, tile: &TileRef) {
        if self.closed || self.finished || !tile.is_complete() {
            return;
        }

        let Some(loading) = self.loading_tiles.get_mut(path) else {
            return;
        };
        let Some(tile) = loading.remove(&tile.key()) else {
            return;
        };
        if let Some(loaded) = self.loaded_tiles.get_mut(path) {
            loaded.insert(tile.key(), tile);
        }

        self.check_database_loaded(path);
    }

    fn check_database_loaded(&mut self, path: &Path) {
        if self.closed || self.finished || self.loaded_databases.contains(path) {
            return;
        }
        if !self.loading_tiles.get(path).is_some_and(|tiles| tiles.is_empty()) {
            return;
        }

        self.loaded_databases.insert(path.to_path_buf());
        let tiles = self.loaded_tiles.get(path).cloned().unwrap_or_default();
        log::debug!("Loaded {} tiles from '{}'", tiles.len(), path.display());
        self.emit(JobEvent::DatabaseLoaded {
            path: path.to_path_buf(),
            tiles,
        });

        if self.loading_tiles.values().all(|tiles| tiles.is_empty()) {
            self.finish();
        }
    }

    fn finish(&mut self) {
        self.finished = true;
        self.emit(JobEvent::Finished {
            loaded: self.loaded_tiles.clone(),
        });
        if self.close_on_finish {
            self.close();
        }
    }

    fn emit(&mut self, event: JobEvent) {
        if let Some(listener) = self.listener.as_mut() {
            listener(&event);
        }
    }

    /// Abort loading and detach from the map services. Tiles completing later
    /// are ignored.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.breaker.abort();
        for (service, id) in self.callbacks.drain(..) {
            service.deregister_tile_state_callback(id);
        }
        self.databases.clear();
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn databases(&self) -> &[DBInstance] {
        &self.databases
    }

    pub fn all_tiles(&self) -> &BTreeMap<PathBuf, TileMap> {
        &self.all_tiles
    }

    pub fn loaded_tiles(&self) -> &BTreeMap<PathBuf, TileMap> {
        &self.loaded_tiles
    }

    /// Copy the loaded tiles of every database into `map_data`.
    pub fn add_tile_data_to_map_data(&self, map_data: &mut MapData) {
        for tiles in self.loaded_tiles.values() {
            collect_tile_data(tiles.values(), map_data);
        }
    }
}

impl Drop for DBLoadJob {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_finishes_without_databases() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&events);

        let mut job = DBLoadJob::new(
            Magnification::from_level(10),
            GeoBox::from_bounds(50.0, 14.0, 50.1, 14.1),
            4,
            true,
            true,
        );
        job.set_listener(move |event| recorded.lock().push(event.clone()));
        job.run(&[], &TypeDefinition::default());

        assert!(job.is_finished());
        assert!(job.is_closed());
        assert!(job.breaker().is_aborted());
        assert!(job.wait_finished(Duration::from_millis(1)));

        let events = events.lock();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], JobEvent::Finished { loaded } if loaded.is_empty()));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut job = DBLoadJob::new(
            Magnification::from_level(3),
            GeoBox::world(),
            4,
            false,
            false,
        );
        job.close();
        job.close();
        assert!(job.is_closed());
        assert!(!job.is_finished());
        assert_eq!(job.process_events(), 0);
    }
}
