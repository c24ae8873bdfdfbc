//! Cache of rendered or downloaded map tile images.
//!
//! The cache is not synchronized. Owners that share it between threads wrap
//! it in a `parking_lot::Mutex` and hold the lock for every operation.

use bytes::Bytes;
use mapscout_types::{GeoBox, OsmTile};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use super::data_tile::TileState;
use crate::config::TileCacheConfig;

/// Cache key of an OSM tile, ordered by zoom level, then x, then y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCacheKey {
    pub zoom_level: u32,
    pub xtile: u32,
    pub ytile: u32,
}

impl TileCacheKey {
    pub const fn new(zoom_level: u32, xtile: u32, ytile: u32) -> Self {
        Self {
            zoom_level,
            xtile,
            ytile,
        }
    }

    pub fn bounding_box(&self) -> GeoBox {
        OsmTile::bounding_box(self.zoom_level, self.xtile, self.ytile)
    }
}

impl fmt::Display for TileCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "z: {}, {}x{}", self.zoom_level, self.xtile, self.ytile)
    }
}

#[derive(Debug, Clone)]
pub struct TileCacheVal {
    pub last_access: Instant,
    pub image: Bytes,
    /// Cache epoch the image was rendered for
    pub epoch: usize,
}

/// Inclusive tile range of a merged request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub x_from: u32,
    pub x_to: u32,
    pub y_from: u32,
    pub y_to: u32,
}

impl TileRange {
    pub fn width(&self) -> u32 {
        self.x_to - self.x_from + 1
    }

    pub fn height(&self) -> u32 {
        self.y_to - self.y_from + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct RequestState {
    pending: bool,
}

type RequestListener = Box<dyn FnMut(u32, u32, u32) + Send>;

pub struct TileCache {
    cache_size: usize,
    maximum_lifetime: Duration,
    epoch: usize,
    requests: BTreeMap<TileCacheKey, RequestState>,
    tiles: BTreeMap<TileCacheKey, TileCacheVal>,
    listener: Option<RequestListener>,
}

impl fmt::Debug for TileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TileCache")
            .field("cache_size", &self.cache_size)
            .field("epoch", &self.epoch)
            .field("requests", &self.requests.len())
            .field("tiles", &self.tiles.len())
            .finish()
    }
}

impl TileCache {
    pub fn new(cache_size: usize) -> Self {
        Self::with_config(&TileCacheConfig::default().with_cache_size(cache_size))
    }

    pub fn with_config(config: &TileCacheConfig) -> Self {
        Self {
            cache_size: config.cache_size,
            maximum_lifetime: config.maximum_lifetime(),
            epoch: 0,
            requests: BTreeMap::new(),
            tiles: BTreeMap::new(),
            listener: None,
        }
    }

    /// Register the receiver of "tile needed" notifications.
    pub fn set_request_listener<F>(&mut self, listener: F)
    where
        F: FnMut(u32, u32, u32) + Send + 'static,
    {
        self.listener = Some(Box::new(listener));
    }

    fn notify(&mut self, key: TileCacheKey) {
        if let Some(listener) = self.listener.as_mut() {
            listener(key.zoom_level, key.xtile, key.ytile);
        }
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    /// Register a request for a tile. Returns `false` if it is already
    /// requested.
    pub fn request(&mut self, zoom_level: u32, x: u32, y: u32) -> bool {
        let key = TileCacheKey::new(zoom_level, x, y);
        if self.requests.contains_key(&key) {
            return false;
        }

        log::trace!("Tile request {}", key);
        self.requests.insert(key, RequestState { pending: true });
        self.notify(key);
        true
    }

    pub fn contains_request(&self, zoom_level: u32, x: u32, y: u32) -> bool {
        self.requests
            .contains_key(&TileCacheKey::new(zoom_level, x, y))
    }

    /// Move a pending request into processing. Returns `false` if there is no
    /// such request or it is already processed.
    pub fn start_request_process(&mut self, zoom_level: u32, x: u32, y: u32) -> bool {
        match self.requests.get_mut(&TileCacheKey::new(zoom_level, x, y)) {
            Some(state) if state.pending => {
                state.pending = false;
                true
            }
            _ => false,
        }
    }

    /// Grow the range of tile `(x, y)` by every other pending request of the
    /// same zoom level as long as the range stays below `max_width` by
    /// `max_height` tiles. Merged requests are no longer pending.
    pub fn merge_and_start_requests(
        &mut self,
        zoom_level: u32,
        x: u32,
        y: u32,
        max_width: u32,
        max_height: u32,
    ) -> TileRange {
        let mut range = TileRange {
            x_from: x,
            x_to: x,
            y_from: y,
            y_to: y,
        };

        for (key, state) in self.requests.iter_mut() {
            if !state.pending || key.zoom_level != zoom_level {
                continue;
            }
            let width = range.x_to.max(key.xtile) - range.x_from.min(key.xtile);
            let height = range.y_to.max(key.ytile) - range.y_from.min(key.ytile);
            if width >= max_width || height >= max_height {
                continue;
            }

            range.x_from = range.x_from.min(key.xtile);
            range.x_to = range.x_to.max(key.xtile);
            range.y_from = range.y_from.min(key.ytile);
            range.y_to = range.y_to.max(key.ytile);
            state.pending = false;
        }

        range
    }

    pub fn remove_request(&mut self, zoom_level: u32, x: u32, y: u32) -> bool {
        self.requests
            .remove(&TileCacheKey::new(zoom_level, x, y))
            .is_some()
    }

    /// Drop every request that has not started processing.
    pub fn clear_pending_requests(&mut self) {
        self.requests.retain(|_, state| !state.pending);
    }

    pub fn is_request_queue_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Notify the listener about every open request again. Returns `true` if
    /// there was any.
    pub fn reemit_requests(&mut self) -> bool {
        let keys: Vec<TileCacheKey> = self.requests.keys().copied().collect();
        for key in &keys {
            self.notify(*key);
        }
        !keys.is_empty()
    }

    /// Where a tile is in its life cycle.
    pub fn state(&self, zoom_level: u32, x: u32, y: u32) -> TileState {
        let key = TileCacheKey::new(zoom_level, x, y);
        if self.tiles.contains_key(&key) {
            return TileState::Complete;
        }
        match self.requests.get(&key) {
            Some(state) if state.pending => TileState::Pending,
            Some(_) => TileState::InProgress,
            None => TileState::Absent,
        }
    }

    /// Store a tile, completing its request, and evict old tiles if the
    /// cache grew above its size.
    pub fn put(&mut self, zoom_level: u32, x: u32, y: u32, image: Bytes, epoch: usize) {
        self.remove_request(zoom_level, x, y);

        let key = TileCacheKey::new(zoom_level, x, y);
        log::trace!("Inserting tile {}", key);
        self.tiles.insert(
            key,
            TileCacheVal {
                last_access: Instant::now(),
                image,
                epoch,
            },
        );

        if self.tiles.len() > self.cache_size {
            let max_remove = (self.cache_size / 10).max(1) as u32;
            self.cleanup_cache(max_remove, self.maximum_lifetime);
        }
    }

    /// The cached tile with a refreshed access time.
    pub fn get(&mut self, zoom_level: u32, x: u32, y: u32) -> Option<TileCacheVal> {
        let key = TileCacheKey::new(zoom_level, x, y);
        match self.tiles.get_mut(&key) {
            Some(val) => {
                val.last_access = Instant::now();
                Some(val.clone())
            }
            None => {
                log::warn!("No tile in cache for key {}", key);
                None
            }
        }
    }

    pub fn contains(&self, zoom_level: u32, x: u32, y: u32) -> bool {
        self.tiles.contains_key(&TileCacheKey::new(zoom_level, x, y))
    }

    /// Evict tiles while the cache is above its size.
    ///
    /// Removes up to `max_remove` tiles not accessed for longer than
    /// `maximum_lifetime`. If none qualified and the cache is still too
    /// large, the single least recently accessed tile goes instead.
    /// `cleanup_cache(u32::MAX, Duration::ZERO)` empties the cache.
    pub fn cleanup_cache(&mut self, max_remove: u32, maximum_lifetime: Duration) {
        if max_remove == u32::MAX && maximum_lifetime.is_zero() {
            self.tiles.clear();
            return;
        }
        if self.tiles.len() <= self.cache_size {
            return;
        }

        log::debug!(
            "Cleaning tile cache ({}/{})",
            self.tiles.len(),
            self.cache_size
        );

        let now = Instant::now();
        let expired: Vec<TileCacheKey> = self
            .tiles
            .iter()
            .filter(|(_, val)| now.duration_since(val.last_access) > maximum_lifetime)
            .map(|(key, _)| *key)
            .take(max_remove as usize)
            .collect();
        for key in &expired {
            self.tiles.remove(key);
        }

        if expired.is_empty() && self.tiles.len() > self.cache_size {
            let oldest = self
                .tiles
                .iter()
                .min_by_key(|(_, val)| val.last_access)
                .map(|(key, _)| *key);
            if let Some(key) = oldest {
                log::trace!("Removing oldest tile {}", key);
                self.tiles.remove(&key);
            }
        }
    }

    /// Drop every tile intersecting `bbox`, or all tiles for `None` or an
    /// invalid box. Returns `true` if anything was removed.
    pub fn invalidate(&mut self, bbox: Option<&GeoBox>) -> bool {
        let before = self.tiles.len();
        match bbox.filter(|b| b.is_valid()) {
            Some(bbox) => self
                .tiles
                .retain(|key, _| !bbox.intersects(&key.bounding_box())),
            None => self.tiles.clear(),
        }
        self.tiles.len() != before
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Start a new epoch, for example after a style change. Cached tiles stay
    /// but carry their old epoch.
    pub fn increment_epoch(&mut self) -> usize {
        self.epoch += 1;
        self.epoch
    }
}
