use mapscout_types::{GeoBox, Magnification, MagnificationLevel, TileIdBox, cell_dimension};
use std::path::Path;

use super::ground_tile::{GroundCoord, GroundTile, GroundTileType};
use crate::error::{MapscoutError, Result};
use crate::io::{FileOffset, FileScanner, ScannerGuard};

pub(crate) const WATER_INDEX_MAGIC: &[u8; 8] = b"MSWATERX";
pub(crate) const WATER_INDEX_VERSION: u8 = 1;

/// Levels are chosen this much finer than the query magnification.
pub const WATER_LEVEL_OFFSET: u32 = 4;

/// Bitmap values up to this are a uniform cell type, not a data position.
pub(crate) const MAX_UNIFORM_VALUE: u64 = GroundTileType::Coast as u64;

/// One magnification level of the water index.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterLevel {
    pub level: MagnificationLevel,
    pub has_cell_data: bool,
    pub data_offset_bytes: u8,
    pub default_cell_data: GroundTileType,
    pub index_data_offset: FileOffset,
    pub cell_width: f64,
    pub cell_height: f64,
    /// Stored cell extent, inclusive
    pub cell_x_start: u32,
    pub cell_x_end: u32,
    pub cell_y_start: u32,
    pub cell_y_end: u32,
}

impl WaterLevel {
    pub fn cell_x_count(&self) -> u32 {
        self.cell_x_end - self.cell_x_start + 1
    }

    pub fn cell_y_count(&self) -> u32 {
        self.cell_y_end - self.cell_y_start + 1
    }

    /// Start of the coast cell data, directly behind the bitmap.
    pub fn data_offset(&self) -> FileOffset {
        self.index_data_offset
            + self.cell_x_count() as u64 * self.cell_y_count() as u64 * self.data_offset_bytes as u64
    }

    fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.cell_x_start && x <= self.cell_x_end && y >= self.cell_y_start && y <= self.cell_y_end
    }

    fn empty_tile(&self, x: u32, y: u32) -> GroundTile {
        let (x_rel, y_rel) = if x >= self.cell_x_start && y >= self.cell_y_start {
            (x - self.cell_x_start, y - self.cell_y_start)
        } else {
            (0, 0)
        };
        GroundTile {
            x_abs: x,
            y_abs: y,
            x_rel,
            y_rel,
            cell_width: self.cell_width,
            cell_height: self.cell_height,
            tile_type: GroundTileType::Unknown,
            coords: Vec::new(),
        }
    }
}

/// Ground type lookup for land, water and coast cells.
pub struct WaterIndex {
    scanner: FileScanner,
    min_mag: MagnificationLevel,
    max_mag: MagnificationLevel,
    levels: Vec<WaterLevel>,
}

impl WaterIndex {
    pub fn open<P: AsRef<Path>>(path: P, memory_mapped: bool) -> Result<Self> {
        let scanner = FileScanner::open(path, memory_mapped)?;
        let (min_mag, max_mag, levels) = {
            let mut guard = scanner.lock();
            read_header(&mut guard)?
        };

        log::debug!(
            "Water index '{}' levels {}..={}",
            scanner.path().display(),
            min_mag,
            max_mag
        );

        Ok(Self {
            scanner,
            min_mag,
            max_mag,
            levels,
        })
    }

    pub fn path(&self) -> &Path {
        self.scanner.path()
    }

    pub fn min_mag(&self) -> MagnificationLevel {
        self.min_mag
    }

    pub fn max_mag(&self) -> MagnificationLevel {
        self.max_mag
    }

    pub fn levels(&self) -> &[WaterLevel] {
        &self.levels
    }

    /// The stored level used for queries at `magnification`.
    pub fn level_for(&self, magnification: &Magnification) -> Option<&WaterLevel> {
        let level = (magnification.level() + WATER_LEVEL_OFFSET).clamp(self.min_mag, self.max_mag);
        self.levels.get((level - self.min_mag) as usize)
    }

    /// Ground tiles for every cell touched by `bbox`, row by row.
    pub fn get_regions(
        &self,
        bbox: &GeoBox,
        magnification: &Magnification,
    ) -> Result<Vec<GroundTile>> {
        self.regions(bbox, magnification).inspect_err(|e| {
            log::error!(
                "Error while reading water index '{}': {}",
                self.path().display(),
                e
            )
        })
    }

    fn regions(&self, bbox: &GeoBox, magnification: &Magnification) -> Result<Vec<GroundTile>> {
        if !bbox.is_valid() {
            return Err(MapscoutError::InvalidBox(*bbox));
        }
        let Some(level) = self.level_for(magnification) else {
            return Ok(Vec::new());
        };

        let cells = TileIdBox::from_geo_box(level.level, bbox);
        let mut tiles = Vec::with_capacity(cells.count() as usize);

        for cell in cells.iter() {
            let mut tile = level.empty_tile(cell.x, cell.y);

            if !level.contains(cell.x, cell.y) {
                tiles.push(tile);
                continue;
            }
            if !level.has_cell_data {
                tile.tile_type = level.default_cell_data;
                tiles.push(tile);
                continue;
            }

            let mut guard = self.scanner.lock();
            let cell_id = tile.y_rel as u64 * level.cell_x_count() as u64 + tile.x_rel as u64;
            guard.seek(level.index_data_offset + cell_id * level.data_offset_bytes as u64)?;
            let value = guard.read_sized_offset(level.data_offset_bytes)?;

            if value <= MAX_UNIFORM_VALUE {
                tile.tile_type = GroundTileType::from_u8(value as u8).unwrap_or(GroundTileType::Unknown);
                tiles.push(tile);
                continue;
            }

            tile.tile_type = GroundTileType::Coast;
            tiles.push(tile.clone());

            guard.seek(level.data_offset() + value)?;
            let tile_count = guard.read_count(2)?;
            for _ in 0..tile_count {
                let type_pos = guard.position()?;
                let raw_type = guard.read_u8()?;
                let tile_type = GroundTileType::from_u8(raw_type).ok_or_else(|| {
                    MapscoutError::corrupt(guard.path(), type_pos, "a ground tile type", raw_type.to_string())
                })?;

                let coord_count = guard.read_count(4)?;
                let mut coords = Vec::with_capacity(coord_count as usize);
                for _ in 0..coord_count {
                    let x = guard.read_u16()?;
                    let y = guard.read_u16()?;
                    coords.push(GroundCoord::decode(x, y));
                }

                tiles.push(GroundTile {
                    tile_type,
                    coords,
                    ..tile.clone()
                });
            }
        }

        Ok(tiles)
    }
}

fn read_header(
    guard: &mut ScannerGuard<'_>,
) -> Result<(MagnificationLevel, MagnificationLevel, Vec<WaterLevel>)> {
    guard.read_magic(WATER_INDEX_MAGIC, WATER_INDEX_VERSION)?;

    let mag_pos = guard.position()?;
    let min_mag = guard.read_varint_u32()?;
    let max_mag = guard.read_varint_u32()?;
    if min_mag > max_mag || max_mag > mapscout_types::MAX_LEVEL {
        return Err(MapscoutError::corrupt(
            guard.path(),
            mag_pos,
            "min_mag <= max_mag <= 30",
            format!("{}..={}", min_mag, max_mag),
        ));
    }

    let mut levels = Vec::with_capacity((max_mag - min_mag + 1) as usize);
    for level in min_mag..=max_mag {
        let level_pos = guard.position()?;
        let has_cell_data = guard.read_bool()?;
        let data_offset_bytes = guard.read_u8()?;
        let raw_default = guard.read_u8()?;
        let index_data_offset = guard.read_file_offset()?;
        let cell_x_start = guard.read_varint_u32()?;
        let cell_x_end = guard.read_varint_u32()?;
        let cell_y_start = guard.read_varint_u32()?;
        let cell_y_end = guard.read_varint_u32()?;

        let default_cell_data = GroundTileType::from_u8(raw_default).ok_or_else(|| {
            MapscoutError::corrupt(guard.path(), level_pos, "a ground tile type", raw_default.to_string())
        })?;
        if has_cell_data && !(1..=8).contains(&data_offset_bytes) {
            return Err(MapscoutError::corrupt(
                guard.path(),
                level_pos,
                "data offset width 1..=8",
                data_offset_bytes.to_string(),
            ));
        }
        if cell_x_start > cell_x_end || cell_y_start > cell_y_end {
            return Err(MapscoutError::corrupt(
                guard.path(),
                level_pos,
                "a normalized cell extent",
                format!("{}..{} x {}..{}", cell_x_start, cell_x_end, cell_y_start, cell_y_end),
            ));
        }

        let dim = cell_dimension(level);
        levels.push(WaterLevel {
            level,
            has_cell_data,
            data_offset_bytes,
            default_cell_data,
            index_data_offset,
            cell_width: dim.width,
            cell_height: dim.height,
            cell_x_start,
            cell_x_end,
            cell_y_start,
            cell_y_end,
        });
    }

    Ok((min_mag, max_mag, levels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::FileWriter;
    use tempfile::TempDir;

    fn write_level_header(
        writer: &mut FileWriter,
        has_cell_data: bool,
        bytes: u8,
        default: GroundTileType,
        extent: [u32; 4],
    ) -> FileOffset {
        writer.write_bool(has_cell_data).unwrap();
        writer.write_u8(bytes).unwrap();
        writer.write_u8(default as u8).unwrap();
        let patch_at = writer.position();
        writer.write_file_offset(0).unwrap();
        for value in extent {
            writer.write_varint_u32(value).unwrap();
        }
        patch_at
    }

    /// Level 2 only; 2x1 cells at x 2..3, y 2: one water cell and one coast cell.
    fn sample_index(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("water.idx");
        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(WATER_INDEX_MAGIC, WATER_INDEX_VERSION).unwrap();
        writer.write_varint_u32(2).unwrap();
        writer.write_varint_u32(2).unwrap();
        let patch_at = write_level_header(&mut writer, true, 1, GroundTileType::Water, [2, 3, 2, 2]);

        let bitmap = writer.position();
        writer.patch_file_offset(patch_at, bitmap).unwrap();
        writer.write_u8(GroundTileType::Water as u8).unwrap();
        writer.write_u8(4).unwrap();
        writer.write_all(&[0, 0, 0, 0]).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_u8(GroundTileType::Land as u8).unwrap();
        writer.write_varint_u32(3).unwrap();
        for coord in [
            GroundCoord::new(0, 0, false),
            GroundCoord::new(GroundCoord::CELL_MAX, 0, true),
            GroundCoord::new(0, GroundCoord::CELL_MAX, true),
        ] {
            writer.write_u16(coord.encoded_x()).unwrap();
            writer.write_u16(coord.y).unwrap();
        }
        writer.commit().unwrap();
        path
    }

    #[test]
    fn test_uniform_and_coast_cells() {
        let dir = TempDir::new().unwrap();
        let index = WaterIndex::open(sample_index(&dir), false).unwrap();
        assert_eq!(index.min_mag(), 2);
        assert_eq!(index.levels().len(), 1);

        // Level 2 cells are 90 x 45 degrees; cells x 2..3 are lon 0..180, y 2 is lat 0..45.
        let bbox = GeoBox::from_bounds(10.0, 10.0, 20.0, 100.0);
        let tiles = index.get_regions(&bbox, &Magnification::WORLD).unwrap();

        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[0].tile_type, GroundTileType::Water);
        assert_eq!((tiles[0].x_abs, tiles[0].x_rel), (2, 0));
        assert_eq!(tiles[1].tile_type, GroundTileType::Coast);
        assert!(tiles[1].coords.is_empty());
        assert_eq!(tiles[2].tile_type, GroundTileType::Land);
        assert_eq!((tiles[2].x_abs, tiles[2].x_rel), (3, 1));
        assert_eq!(tiles[2].coords.len(), 3);
        assert!(tiles[2].coords[1].coast);
        assert!(!tiles[2].coords[0].coast);
    }

    #[test]
    fn test_cells_outside_extent_are_unknown() {
        let dir = TempDir::new().unwrap();
        let index = WaterIndex::open(sample_index(&dir), true).unwrap();

        let bbox = GeoBox::from_bounds(-10.0, -100.0, -5.0, -95.0);
        let tiles = index.get_regions(&bbox, &Magnification::CITY).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_type, GroundTileType::Unknown);
        assert_eq!((tiles[0].x_rel, tiles[0].y_rel), (0, 0));
    }

    #[test]
    fn test_level_without_cell_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("water.idx");
        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(WATER_INDEX_MAGIC, WATER_INDEX_VERSION).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_varint_u32(1).unwrap();
        write_level_header(&mut writer, false, 1, GroundTileType::Land, [0, 1, 0, 1]);
        writer.commit().unwrap();

        let index = WaterIndex::open(&path, false).unwrap();
        let tiles = index
            .get_regions(&GeoBox::from_bounds(-10.0, -10.0, 10.0, 10.0), &Magnification::WORLD)
            .unwrap();
        assert_eq!(tiles.len(), 4);
        assert!(tiles.iter().all(|t| t.tile_type == GroundTileType::Land));
    }

    #[test]
    fn test_oversized_coord_count_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("water.idx");
        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(WATER_INDEX_MAGIC, WATER_INDEX_VERSION).unwrap();
        writer.write_varint_u32(2).unwrap();
        writer.write_varint_u32(2).unwrap();
        let patch_at = write_level_header(&mut writer, true, 1, GroundTileType::Water, [2, 3, 2, 2]);

        let bitmap = writer.position();
        writer.patch_file_offset(patch_at, bitmap).unwrap();
        writer.write_u8(GroundTileType::Water as u8).unwrap();
        writer.write_u8(4).unwrap();
        writer.write_all(&[0, 0, 0, 0]).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_u8(GroundTileType::Land as u8).unwrap();
        writer.write_varint_u32(u32::MAX).unwrap();
        writer.write_all(&[0; 8]).unwrap();
        writer.commit().unwrap();

        let index = WaterIndex::open(&path, true).unwrap();
        let bbox = GeoBox::from_bounds(10.0, 10.0, 20.0, 100.0);
        assert!(matches!(
            index.get_regions(&bbox, &Magnification::WORLD),
            Err(MapscoutError::CorruptIndex { .. })
        ));

        // Uniform cells are still readable.
        let water = GeoBox::from_bounds(10.0, 10.0, 20.0, 20.0);
        let tiles = index.get_regions(&water, &Magnification::WORLD).unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].tile_type, GroundTileType::Water);
    }

    #[test]
    fn test_bad_magic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("water.idx");
        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(b"MSAREAIX", WATER_INDEX_VERSION).unwrap();
        writer.commit().unwrap();

        assert!(matches!(
            WaterIndex::open(&path, false),
            Err(MapscoutError::InvalidFormat(_))
        ));
    }
}
