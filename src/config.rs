//! Configuration for databases, tile caches, the map service and the index
//! generators.
//!
//! Every section can be loaded from JSON (and TOML with the `toml` feature);
//! missing fields fall back to their defaults and unknown fields are rejected.
use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use mapscout_types::MAX_LEVEL;

/// Top level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub tile_cache: TileCacheConfig,

    #[serde(default)]
    pub map_service: MapServiceConfig,

    #[serde(default)]
    pub water_index: WaterIndexConfig,

    #[serde(default)]
    pub area_index: AreaIndexConfig,
}

/// How index files are opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Map index files into memory instead of buffered reads
    #[serde(default = "DatabaseConfig::default_memory_mapped")]
    pub memory_mapped: bool,
}

impl DatabaseConfig {
    const fn default_memory_mapped() -> bool {
        cfg!(feature = "mmap")
    }

    pub fn with_memory_mapped(mut self, memory_mapped: bool) -> Self {
        self.memory_mapped = memory_mapped;
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            memory_mapped: Self::default_memory_mapped(),
        }
    }
}

/// Limits of the rendered tile cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TileCacheConfig {
    /// Number of tiles kept before cleanup starts
    #[serde(default = "TileCacheConfig::default_cache_size")]
    pub cache_size: usize,

    /// Age after which a tile may be evicted by the cleanup pass
    #[serde(default = "TileCacheConfig::default_maximum_lifetime_ms")]
    pub maximum_lifetime_ms: u64,
}

impl TileCacheConfig {
    const fn default_cache_size() -> usize {
        100
    }

    const fn default_maximum_lifetime_ms() -> u64 {
        5 * 60 * 1000
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_maximum_lifetime(mut self, lifetime: Duration) -> Self {
        self.maximum_lifetime_ms = lifetime.as_millis() as u64;
        self
    }

    pub fn maximum_lifetime(&self) -> Duration {
        Duration::from_millis(self.maximum_lifetime_ms)
    }
}

impl Default for TileCacheConfig {
    fn default() -> Self {
        Self {
            cache_size: Self::default_cache_size(),
            maximum_lifetime_ms: Self::default_maximum_lifetime_ms(),
        }
    }
}

/// Map service loading behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapServiceConfig {
    /// Number of data tiles kept in the service's cache
    #[serde(default = "MapServiceConfig::default_data_cache_size")]
    pub data_cache_size: usize,

    /// Levels below the requested magnification searched for areas
    #[serde(default = "MapServiceConfig::default_maximum_area_level")]
    pub maximum_area_level: u32,

    /// Reuse data of complete parent tiles while loading
    #[serde(default = "MapServiceConfig::default_low_zoom_optimization")]
    pub low_zoom_optimization: bool,

    /// Loading a tile slower than this logs a warning
    #[serde(default = "MapServiceConfig::default_slow_tile_warning_ms")]
    pub slow_tile_warning_ms: u64,
}

impl MapServiceConfig {
    const fn default_data_cache_size() -> usize {
        20
    }

    const fn default_maximum_area_level() -> u32 {
        4
    }

    const fn default_low_zoom_optimization() -> bool {
        true
    }

    const fn default_slow_tile_warning_ms() -> u64 {
        150
    }

    pub fn with_data_cache_size(mut self, size: usize) -> Self {
        self.data_cache_size = size;
        self
    }

    pub fn with_maximum_area_level(mut self, level: u32) -> Self {
        self.maximum_area_level = level;
        self
    }

    pub fn with_low_zoom_optimization(mut self, enabled: bool) -> Self {
        self.low_zoom_optimization = enabled;
        self
    }
}

impl Default for MapServiceConfig {
    fn default() -> Self {
        Self {
            data_cache_size: Self::default_data_cache_size(),
            maximum_area_level: Self::default_maximum_area_level(),
            low_zoom_optimization: Self::default_low_zoom_optimization(),
            slow_tile_warning_ms: Self::default_slow_tile_warning_ms(),
        }
    }
}

/// Water index generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaterIndexConfig {
    #[serde(default = "WaterIndexConfig::default_min_mag")]
    pub min_mag: u32,

    #[serde(default = "WaterIndexConfig::default_max_mag")]
    pub max_mag: u32,

    /// Rounds of water flooding into unknown cells
    #[serde(default = "WaterIndexConfig::default_fill_iterations")]
    pub fill_iterations: usize,
}

impl WaterIndexConfig {
    const fn default_min_mag() -> u32 {
        6
    }

    const fn default_max_mag() -> u32 {
        14
    }

    const fn default_fill_iterations() -> usize {
        20
    }

    pub fn with_levels(mut self, min_mag: u32, max_mag: u32) -> Self {
        self.min_mag = min_mag;
        self.max_mag = max_mag;
        self
    }

    pub fn with_fill_iterations(mut self, iterations: usize) -> Self {
        self.fill_iterations = iterations;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_mag > self.max_mag {
            return Err(format!(
                "Water index min_mag {} is above max_mag {}",
                self.min_mag, self.max_mag
            ));
        }
        if self.max_mag > MAX_LEVEL {
            return Err(format!("Water index max_mag {} exceeds {}", self.max_mag, MAX_LEVEL));
        }
        Ok(())
    }
}

impl Default for WaterIndexConfig {
    fn default() -> Self {
        Self {
            min_mag: Self::default_min_mag(),
            max_mag: Self::default_max_mag(),
            fill_iterations: Self::default_fill_iterations(),
        }
    }
}

/// AreaIndex generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AreaIndexConfig {
    #[serde(default = "AreaIndexConfig::default_min_level")]
    pub min_level: u32,

    #[serde(default = "AreaIndexConfig::default_max_level")]
    pub max_level: u32,

    /// A type's level is the lowest one whose fullest cell holds at most
    /// this many entries
    #[serde(default = "AreaIndexConfig::default_max_cell_entries")]
    pub max_cell_entries: usize,
}

impl AreaIndexConfig {
    const fn default_min_level() -> u32 {
        4
    }

    const fn default_max_level() -> u32 {
        14
    }

    const fn default_max_cell_entries() -> usize {
        64
    }

    pub fn with_levels(mut self, min_level: u32, max_level: u32) -> Self {
        self.min_level = min_level;
        self.max_level = max_level;
        self
    }

    pub fn with_max_cell_entries(mut self, entries: usize) -> Self {
        self.max_cell_entries = entries;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min_level > self.max_level {
            return Err(format!(
                "Area index min_level {} is above max_level {}",
                self.min_level, self.max_level
            ));
        }
        if self.max_level > MAX_LEVEL {
            return Err(format!("Area index max_level {} exceeds {}", self.max_level, MAX_LEVEL));
        }
        if self.max_cell_entries == 0 {
            return Err("Area index max_cell_entries must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl Default for AreaIndexConfig {
    fn default() -> Self {
        Self {
            min_level: Self::default_min_level(),
            max_level: Self::default_max_level(),
            max_cell_entries: Self::default_max_cell_entries(),
        }
    }
}

impl Config {
    pub fn with_database(mut self, config: DatabaseConfig) -> Self {
        self.database = config;
        self
    }

    pub fn with_tile_cache(mut self, config: TileCacheConfig) -> Self {
        self.tile_cache = config;
        self
    }

    pub fn with_map_service(mut self, config: MapServiceConfig) -> Self {
        self.map_service = config;
        self
    }

    pub fn with_water_index(mut self, config: WaterIndexConfig) -> Self {
        self.water_index = config;
        self
    }

    pub fn with_area_index(mut self, config: AreaIndexConfig) -> Self {
        self.area_index = config;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.tile_cache.cache_size == 0 {
            return Err("Tile cache size must be greater than zero".to_string());
        }

        if self.map_service.data_cache_size == 0 {
            return Err("Data cache size must be greater than zero".to_string());
        }

        if self.map_service.data_cache_size > 10_000 {
            log::warn!(
                "Data cache size of {} tiles is very large and may consume significant memory",
                self.map_service.data_cache_size
            );
        }

        self.water_index.validate()?;
        self.area_index.validate()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
