//! A map directory opened for reading.

use mapscout_types::GeoBox;
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::DatabaseConfig;
use crate::error::{MapscoutError, Result};
use crate::index::{AreaAreaIndex, AreaIndex};
use crate::io::{FileScanner, FileWriter};
use crate::types::TypeConfig;
use crate::water::WaterIndex;

pub const TYPES_FILE: &str = "types.json";
pub const BOUNDING_BOX_FILE: &str = "bounding.dat";
pub const AREA_NODE_INDEX_FILE: &str = "areanode.idx";
pub const AREA_WAY_INDEX_FILE: &str = "areaway.idx";
pub const AREA_AREA_INDEX_FILE: &str = "areaarea.idx";
pub const WATER_INDEX_FILE: &str = "water.idx";

const BOUNDING_BOX_MAGIC: &[u8; 8] = b"MSBOUNDS";
const BOUNDING_BOX_VERSION: u8 = 1;

/// Store the extent of the imported data.
pub fn write_bounding_box<P: AsRef<Path>>(path: P, bbox: &GeoBox) -> Result<()> {
    if !bbox.is_valid() {
        return Err(MapscoutError::InvalidBox(*bbox));
    }

    let mut writer = FileWriter::create(path)?;
    writer.write_magic(BOUNDING_BOX_MAGIC, BOUNDING_BOX_VERSION)?;
    writer.write_f64(bbox.min_lat())?;
    writer.write_f64(bbox.min_lon())?;
    writer.write_f64(bbox.max_lat())?;
    writer.write_f64(bbox.max_lon())?;
    writer.commit()
}

pub fn read_bounding_box<P: AsRef<Path>>(path: P) -> Result<GeoBox> {
    let scanner = FileScanner::open(path, false)?;
    let mut guard = scanner.lock();
    guard.read_magic(BOUNDING_BOX_MAGIC, BOUNDING_BOX_VERSION)?;
    let min_lat = guard.read_f64()?;
    let min_lon = guard.read_f64()?;
    let max_lat = guard.read_f64()?;
    let max_lon = guard.read_f64()?;
    Ok(GeoBox::from_bounds(min_lat, min_lon, max_lat, max_lon))
}

struct DatabaseFiles {
    type_config: Arc<TypeConfig>,
    bounding_box: GeoBox,
    area_node_index: Arc<AreaIndex>,
    area_way_index: Arc<AreaIndex>,
    area_area_index: Arc<AreaAreaIndex>,
    water_index: Option<Arc<WaterIndex>>,
}

impl DatabaseFiles {
    fn open(dir: &Path, config: &DatabaseConfig) -> Result<Self> {
        let type_config = TypeConfig::load(dir.join(TYPES_FILE))?;
        let bounding_box = read_bounding_box(dir.join(BOUNDING_BOX_FILE))?;
        let area_node_index = AreaIndex::open(dir.join(AREA_NODE_INDEX_FILE), config.memory_mapped)?;
        let area_way_index = AreaIndex::open(dir.join(AREA_WAY_INDEX_FILE), config.memory_mapped)?;
        let area_area_index =
            AreaAreaIndex::load(dir.join(AREA_AREA_INDEX_FILE), config.memory_mapped)?;

        let water_path = dir.join(WATER_INDEX_FILE);
        let water_index = if water_path.exists() {
            Some(Arc::new(WaterIndex::open(&water_path, config.memory_mapped)?))
        } else {
            log::debug!("No water index in '{}'", dir.display());
            None
        };

        Ok(Self {
            type_config: Arc::new(type_config),
            bounding_box,
            area_node_index: Arc::new(area_node_index),
            area_way_index: Arc::new(area_way_index),
            area_area_index: Arc::new(area_area_index),
            water_index,
        })
    }
}

/// The type configuration and indexes of one map directory.
///
/// Accessors fail with [`MapscoutError::DatabaseClosed`] after [`close`](Self::close).
/// Handles already given out stay usable.
pub struct Database {
    path: PathBuf,
    files: RwLock<Option<Arc<DatabaseFiles>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

impl Database {
    pub fn open<P: AsRef<Path>>(dir: P, config: &DatabaseConfig) -> Result<Self> {
        let path = dir.as_ref().to_path_buf();
        let files = DatabaseFiles::open(&path, config).inspect_err(|e| {
            log::error!("Cannot open database '{}': {}", path.display(), e)
        })?;

        log::info!(
            "Opened database '{}' covering {}",
            path.display(),
            files.bounding_box
        );

        Ok(Self {
            path,
            files: RwLock::new(Some(Arc::new(files))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.files.read().is_some()
    }

    pub fn close(&self) {
        if self.files.write().take().is_some() {
            log::debug!("Closed database '{}'", self.path.display());
        }
    }

    fn files(&self) -> Result<Arc<DatabaseFiles>> {
        self.files
            .read()
            .clone()
            .ok_or_else(|| MapscoutError::DatabaseClosed(self.path.clone()))
    }

    pub fn type_config(&self) -> Result<Arc<TypeConfig>> {
        Ok(Arc::clone(&self.files()?.type_config))
    }

    pub fn bounding_box(&self) -> Result<GeoBox> {
        Ok(self.files()?.bounding_box)
    }

    pub fn area_node_index(&self) -> Result<Arc<AreaIndex>> {
        Ok(Arc::clone(&self.files()?.area_node_index))
    }

    pub fn area_way_index(&self) -> Result<Arc<AreaIndex>> {
        Ok(Arc::clone(&self.files()?.area_way_index))
    }

    pub fn area_area_index(&self) -> Result<Arc<AreaAreaIndex>> {
        Ok(Arc::clone(&self.files()?.area_area_index))
    }

    /// The water index, `None` if the map has none.
    pub fn water_index(&self) -> Result<Option<Arc<WaterIndex>>> {
        Ok(self.files()?.water_index.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_bounding_box_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(BOUNDING_BOX_FILE);
        let bbox = GeoBox::from_bounds(50.1, 14.2, 50.2, 14.6);

        write_bounding_box(&path, &bbox).unwrap();
        assert_eq!(read_bounding_box(&path).unwrap(), bbox);

        assert!(write_bounding_box(&path, &GeoBox::invalid()).is_err());
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = Database::open(dir.path().join("missing"), &DatabaseConfig::default());
        assert!(matches!(result, Err(MapscoutError::Io(_))));
    }
}
