use mapscout_types::{GeoBox, MagnificationLevel, TileId, TileIdBox};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use varint_rs::VarintWriter;

use super::IndexEntry;
use super::area_index::{AREA_INDEX_MAGIC, AREA_INDEX_VERSION};
use crate::config::AreaIndexConfig;
use crate::error::{MapscoutError, Result};
use crate::io::{FileOffset, FileWriter, bytes_needed};
use crate::progress::Progress;
use crate::types::TypeId;

/// Builds an [`AreaIndex`](super::AreaIndex) file from object boxes.
pub struct AreaIndexGenerator {
    config: AreaIndexConfig,
    types: BTreeSet<TypeId>,
    entries: Vec<IndexEntry>,
}

/// Encoded bitmap and cell data of one type.
struct TypeBlock {
    type_id: TypeId,
    level: MagnificationLevel,
    tile_box: TileIdBox,
    bytes: u8,
    cell_positions: BTreeMap<TileId, u64>,
    data: Vec<u8>,
}

impl AreaIndexGenerator {
    pub fn new(config: AreaIndexConfig) -> Self {
        Self {
            config,
            types: BTreeSet::new(),
            entries: Vec::new(),
        }
    }

    /// Make `type_id` part of the index even if it never gets an object.
    pub fn register_type(&mut self, type_id: TypeId) {
        self.types.insert(type_id);
    }

    pub fn add(&mut self, type_id: TypeId, bounding_box: GeoBox, offset: FileOffset) -> Result<()> {
        self.add_entry(IndexEntry::new(type_id, bounding_box, offset))
    }

    pub fn add_entry(&mut self, entry: IndexEntry) -> Result<()> {
        if !entry.bounding_box.is_valid() {
            return Err(MapscoutError::InvalidBox(entry.bounding_box));
        }
        self.types.insert(entry.type_id);
        self.entries.push(entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn write(&self, progress: &mut dyn Progress, path: &Path) -> Result<()> {
        self.config.validate().map_err(MapscoutError::Config)?;

        let mut by_type: BTreeMap<TypeId, Vec<&IndexEntry>> =
            self.types.iter().map(|&id| (id, Vec::new())).collect();
        for entry in &self.entries {
            by_type.entry(entry.type_id).or_default().push(entry);
        }

        let total = by_type.len();
        let mut blocks = Vec::with_capacity(total);
        for (n, (type_id, entries)) in by_type.into_iter().enumerate() {
            progress.set_progress(n, total);
            blocks.push(self.build_block(type_id, &entries)?);
        }

        let mut writer = FileWriter::create(path)?;
        writer.write_magic(AREA_INDEX_MAGIC, AREA_INDEX_VERSION)?;
        writer.write_varint_u32(blocks.len() as u32)?;

        let mut patches = Vec::with_capacity(blocks.len());
        for block in &blocks {
            writer.write_varint_u32(block.type_id as u32)?;
            patches.push(writer.position());
            writer.write_file_offset(0)?;
            writer.write_u8(block.bytes)?;
            writer.write_varint_u32(block.level)?;
            writer.write_varint_u32(block.tile_box.min_x())?;
            writer.write_varint_u32(block.tile_box.min_y())?;
            writer.write_varint_u32(block.tile_box.max_x())?;
            writer.write_varint_u32(block.tile_box.max_y())?;
        }

        for (block, patch_at) in blocks.iter().zip(patches) {
            if block.data.is_empty() {
                continue;
            }

            let bitmap_offset = writer.position();
            for tile in block.tile_box.iter() {
                let value = block.cell_positions.get(&tile).map_or(0, |pos| pos + 1);
                writer.write_sized_offset(value, block.bytes)?;
            }
            writer.write_all(&block.data)?;
            writer.patch_file_offset(patch_at, bitmap_offset)?;
        }

        writer.commit()?;
        progress.info(&format!(
            "Wrote {} entries of {} types to '{}'",
            self.entries.len(),
            blocks.len(),
            path.display()
        ));
        Ok(())
    }

    fn build_block(&self, type_id: TypeId, entries: &[&IndexEntry]) -> Result<TypeBlock> {
        if entries.is_empty() {
            return Ok(TypeBlock {
                type_id,
                level: self.config.min_level,
                tile_box: TileIdBox::new(TileId::new(0, 0), TileId::new(0, 0)),
                bytes: 1,
                cell_positions: BTreeMap::new(),
                data: Vec::new(),
            });
        }

        let level = self.select_level(entries);

        let mut cells: BTreeMap<TileId, Vec<FileOffset>> = BTreeMap::new();
        for entry in entries {
            for tile in TileIdBox::from_geo_box(level, &entry.bounding_box).iter() {
                cells.entry(tile).or_default().push(entry.offset);
            }
        }

        let mut tile_box: Option<TileIdBox> = None;
        let mut cell_positions = BTreeMap::new();
        let mut data = Vec::new();

        // BTreeMap order of TileId is row-major, matching the bitmap.
        for (tile, mut offsets) in cells {
            offsets.sort_unstable();
            offsets.dedup();

            tile_box = Some(match tile_box {
                Some(tile_box) => tile_box.include(&tile),
                None => TileIdBox::new(tile, tile),
            });
            cell_positions.insert(tile, data.len() as u64);

            data.write_u32_varint(offsets.len() as u32)?;
            let mut previous = 0;
            for offset in offsets {
                data.write_u64_varint(offset - previous)?;
                previous = offset;
            }
        }

        let tile_box = tile_box.ok_or_else(|| {
            MapscoutError::InvalidInput(format!("Type {} produced no cells", type_id))
        })?;

        Ok(TypeBlock {
            type_id,
            level,
            tile_box,
            bytes: bytes_needed(data.len() as u64 + 1),
            cell_positions,
            data,
        })
    }

    /// Lowest level whose fullest cell stays within the configured limit.
    fn select_level(&self, entries: &[&IndexEntry]) -> MagnificationLevel {
        for level in self.config.min_level..self.config.max_level {
            let mut counts: FxHashMap<TileId, usize> = FxHashMap::default();
            for entry in entries {
                for tile in TileIdBox::from_geo_box(level, &entry.bounding_box).iter() {
                    *counts.entry(tile).or_default() += 1;
                }
            }
            let fullest = counts.values().copied().max().unwrap_or(0);
            if fullest <= self.config.max_cell_entries {
                return level;
            }
        }
        self.config.max_level
    }
}
