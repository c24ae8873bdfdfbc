use mapscout_types::{GeoBox, MagnificationLevel, TileId, TileIdBox, MAX_LEVEL};
use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use super::SLOW_QUERY;
use crate::error::{MapscoutError, Result};
use crate::io::{FileOffset, FileScanner, ScannerGuard};
use crate::types::{TypeId, TypeInfoSet};

pub(crate) const AREA_INDEX_MAGIC: &[u8; 8] = b"MSAREAIX";
pub(crate) const AREA_INDEX_VERSION: u8 = 1;

/// Index metadata of one object type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeData {
    pub type_id: TypeId,
    /// Start of the bitmap, 0 if the type has no objects
    pub bitmap_offset: FileOffset,
    /// Width of one bitmap entry
    pub data_offset_bytes: u8,
    pub index_level: MagnificationLevel,
    /// Tiles actually covered by the bitmap
    pub tile_box: TileIdBox,
}

impl TypeData {
    pub fn has_data(&self) -> bool {
        self.bitmap_offset != 0
    }

    pub fn bounding_box(&self) -> GeoBox {
        self.tile_box.bounding_box(self.index_level)
    }

    /// Start of the cell data, directly behind the bitmap.
    pub fn data_offset(&self) -> FileOffset {
        self.bitmap_offset + self.tile_box.count() * self.data_offset_bytes as u64
    }
}

/// Result of an [`AreaIndex`] query.
#[derive(Debug, Clone, Default)]
pub struct AreaLookup {
    pub offsets: FxHashSet<FileOffset>,
    /// Requested types the index knows about
    pub loaded_types: TypeInfoSet,
}

impl AreaLookup {
    /// Offsets in ascending file order.
    pub fn sorted_offsets(&self) -> Vec<FileOffset> {
        let mut offsets: Vec<_> = self.offsets.iter().copied().collect();
        offsets.sort_unstable();
        offsets
    }
}

/// Bitmap index over a per-type tile grid.
///
/// The header is read on open; bitmaps and cell data are read on demand
/// through a shared [`FileScanner`].
pub struct AreaIndex {
    scanner: FileScanner,
    types: BTreeMap<TypeId, TypeData>,
}

impl AreaIndex {
    pub fn open<P: AsRef<Path>>(path: P, memory_mapped: bool) -> Result<Self> {
        let scanner = FileScanner::open(path, memory_mapped)?;
        let types = {
            let mut guard = scanner.lock();
            read_header(&mut guard)?
        };

        log::debug!(
            "Area index '{}' holds {} types",
            scanner.path().display(),
            types.len()
        );

        Ok(Self { scanner, types })
    }

    pub fn path(&self) -> &Path {
        self.scanner.path()
    }

    pub fn type_data(&self, type_id: TypeId) -> Option<&TypeData> {
        self.types.get(&type_id)
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeData> {
        self.types.values()
    }

    /// Offsets of all objects of `types` whose cells intersect `bbox`.
    ///
    /// Failures are logged here and returned; no partial result is handed out.
    pub fn get_offsets(&self, bbox: &GeoBox, types: &TypeInfoSet) -> Result<AreaLookup> {
        self.lookup(bbox, types).inspect_err(|e| {
            log::error!(
                "Error while reading area index '{}': {}",
                self.path().display(),
                e
            )
        })
    }

    fn lookup(&self, bbox: &GeoBox, types: &TypeInfoSet) -> Result<AreaLookup> {
        if !bbox.is_valid() {
            return Err(MapscoutError::InvalidBox(*bbox));
        }

        let start = Instant::now();
        let mut lookup = AreaLookup::default();

        for type_id in types.iter() {
            let Some(data) = self.types.get(&type_id) else {
                continue;
            };
            lookup.loaded_types.insert(type_id);

            if !data.has_data() || !data.bounding_box().intersects(bbox) {
                continue;
            }

            let query = TileIdBox::from_geo_box(data.index_level, bbox);
            let Some(range) = query.intersection(&data.tile_box) else {
                continue;
            };

            self.read_rows(data, &range, &mut lookup.offsets)?;
        }

        let elapsed = start.elapsed();
        if elapsed > SLOW_QUERY {
            log::warn!(
                "Retrieving {} offsets from area index '{}' for {} took {:?}",
                lookup.offsets.len(),
                self.path().display(),
                bbox,
                elapsed
            );
        }

        Ok(lookup)
    }

    fn read_rows(
        &self,
        data: &TypeData,
        range: &TileIdBox,
        offsets: &mut FxHashSet<FileOffset>,
    ) -> Result<()> {
        let bytes = data.data_offset_bytes as usize;
        let grid_width = data.tile_box.width() as u64;
        let mut bitmap = vec![0u8; range.width() as usize * bytes];

        for y in range.min_y()..=range.max_y() {
            let row_cell = (y - data.tile_box.min_y()) as u64 * grid_width
                + (range.min_x() - data.tile_box.min_x()) as u64;

            let mut guard = self.scanner.lock();
            guard.seek(data.bitmap_offset + row_cell * bytes as u64)?;
            guard.read_exact(&mut bitmap)?;

            let mut first = None;
            let mut non_empty = 0usize;
            for cell in bitmap.chunks_exact(bytes).map(decode_le) {
                if cell != 0 {
                    first.get_or_insert(cell);
                    non_empty += 1;
                }
            }

            // Non-empty cells of a row are stored back to back.
            let Some(first) = first else {
                continue;
            };
            guard.seek(data.data_offset() + first - 1)?;
            for _ in 0..non_empty {
                read_cell(&mut guard, offsets)?;
            }
        }

        Ok(())
    }
}

fn read_header(guard: &mut ScannerGuard<'_>) -> Result<BTreeMap<TypeId, TypeData>> {
    guard.read_magic(AREA_INDEX_MAGIC, AREA_INDEX_VERSION)?;

    let type_count = guard.read_varint_u32()?;
    let mut types = BTreeMap::new();

    for _ in 0..type_count {
        let entry_pos = guard.position()?;
        let raw_id = guard.read_varint_u32()?;
        let type_id = TypeId::try_from(raw_id).map_err(|_| {
            MapscoutError::corrupt(guard.path(), entry_pos, "a 16 bit type id", raw_id.to_string())
        })?;

        let bitmap_offset = guard.read_file_offset()?;
        let bytes_pos = guard.position()?;
        let data_offset_bytes = guard.read_u8()?;
        let index_level = guard.read_varint_u32()?;
        let min_x = guard.read_varint_u32()?;
        let min_y = guard.read_varint_u32()?;
        let max_x = guard.read_varint_u32()?;
        let max_y = guard.read_varint_u32()?;

        if bitmap_offset != 0 && !(1..=8).contains(&data_offset_bytes) {
            return Err(MapscoutError::corrupt(
                guard.path(),
                bytes_pos,
                "data offset width 1..=8",
                data_offset_bytes.to_string(),
            ));
        }
        if index_level > MAX_LEVEL {
            return Err(MapscoutError::corrupt(
                guard.path(),
                entry_pos,
                format!("an index level <= {}", MAX_LEVEL),
                index_level.to_string(),
            ));
        }
        if min_x > max_x || min_y > max_y {
            return Err(MapscoutError::corrupt(
                guard.path(),
                entry_pos,
                "a normalized tile box",
                format!("{},{} - {},{}", min_x, min_y, max_x, max_y),
            ));
        }

        let tile_box = TileIdBox {
            min: TileId::new(min_x, min_y),
            max: TileId::new(max_x, max_y),
        };
        types.insert(
            type_id,
            TypeData {
                type_id,
                bitmap_offset,
                data_offset_bytes,
                index_level,
                tile_box,
            },
        );
    }

    Ok(types)
}

fn read_cell(guard: &mut ScannerGuard<'_>, offsets: &mut FxHashSet<FileOffset>) -> Result<()> {
    let count = guard.read_count(1)?;
    let mut previous: FileOffset = 0;
    for _ in 0..count {
        previous = guard.read_delta(previous)?;
        offsets.insert(previous);
    }
    Ok(())
}

fn decode_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AreaIndexConfig;
    use crate::index::AreaIndexGenerator;
    use crate::io::FileWriter;
    use crate::progress::SilentProgress;
    use tempfile::TempDir;

    fn config() -> AreaIndexConfig {
        AreaIndexConfig::default()
            .with_levels(2, 8)
            .with_max_cell_entries(4)
    }

    #[test]
    fn test_decode_le() {
        assert_eq!(decode_le(&[0x01]), 1);
        assert_eq!(decode_le(&[0x01, 0x02, 0x03]), 0x030201);
    }

    #[test]
    fn test_unknown_and_empty_types() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("areanode.idx");

        let mut generator = AreaIndexGenerator::new(config());
        generator.register_type(7);
        generator
            .add(1, GeoBox::from_bounds(10.0, 10.0, 10.5, 10.5), 100)
            .unwrap();
        generator.write(&mut SilentProgress, &path).unwrap();

        let index = AreaIndex::open(&path, false).unwrap();
        assert!(!index.type_data(7).unwrap().has_data());
        assert!(index.type_data(1).unwrap().has_data());

        let types: TypeInfoSet = [1, 7, 9].into_iter().collect();
        let lookup = index
            .get_offsets(&GeoBox::from_bounds(0.0, 0.0, 20.0, 20.0), &types)
            .unwrap();
        assert_eq!(lookup.sorted_offsets(), vec![100]);
        assert_eq!(lookup.loaded_types.iter().collect::<Vec<_>>(), vec![1, 7]);
    }

    #[test]
    fn test_bad_width_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.idx");

        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(AREA_INDEX_MAGIC, AREA_INDEX_VERSION).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_file_offset(64).unwrap();
        writer.write_u8(9).unwrap();
        for _ in 0..5 {
            writer.write_varint_u32(0).unwrap();
        }
        writer.commit().unwrap();

        assert!(matches!(
            AreaIndex::open(&path, false),
            Err(MapscoutError::CorruptIndex { .. })
        ));
    }

    #[test]
    fn test_index_level_beyond_max_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deep.idx");

        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(AREA_INDEX_MAGIC, AREA_INDEX_VERSION).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_varint_u32(1).unwrap();
        writer.write_file_offset(64).unwrap();
        writer.write_u8(2).unwrap();
        writer.write_varint_u32(64).unwrap();
        for _ in 0..4 {
            writer.write_varint_u32(0).unwrap();
        }
        writer.commit().unwrap();

        match AreaIndex::open(&path, false) {
            Err(MapscoutError::CorruptIndex { actual, .. }) => assert_eq!(actual, "64"),
            other => panic!("expected a corrupt index error, got {:?}", other.is_ok()),
        }
    }

    #[test]
    fn test_truncated_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("short.idx");

        let mut writer = FileWriter::create(&path).unwrap();
        writer.write_magic(AREA_INDEX_MAGIC, AREA_INDEX_VERSION).unwrap();
        writer.write_varint_u32(3).unwrap();
        writer.commit().unwrap();

        assert!(matches!(
            AreaIndex::open(&path, false),
            Err(MapscoutError::Io(_))
        ));
    }

    #[test]
    fn test_invalid_box_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("areaway.idx");
        AreaIndexGenerator::new(config())
            .write(&mut SilentProgress, &path)
            .unwrap();

        let index = AreaIndex::open(&path, true).unwrap();
        let types: TypeInfoSet = [1].into_iter().collect();
        assert!(matches!(
            index.get_offsets(&GeoBox::invalid(), &types),
            Err(MapscoutError::InvalidBox(_))
        ));
    }
}
