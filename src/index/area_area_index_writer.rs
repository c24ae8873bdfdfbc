use mapscout_types::{GeoBox, MagnificationLevel, TileId, MAX_LEVEL};
use std::collections::BTreeMap;
use std::path::Path;

use super::IndexEntry;
use super::area_area_index::{AREA_AREA_INDEX_MAGIC, AREA_AREA_INDEX_VERSION, child_tile};
use crate::error::{MapscoutError, Result};
use crate::io::{FileOffset, FileWriter};
use crate::progress::Progress;
use crate::types::TypeId;

type CellData = BTreeMap<TypeId, Vec<FileOffset>>;

/// Builds an [`AreaAreaIndex`](super::AreaAreaIndex) file.
pub struct AreaAreaIndexGenerator {
    max_level: MagnificationLevel,
    /// Per level, the cells that exist and the areas stored in them
    levels: Vec<BTreeMap<TileId, CellData>>,
    entry_count: usize,
}

impl AreaAreaIndexGenerator {
    pub fn new(max_level: MagnificationLevel) -> Result<Self> {
        if max_level > MAX_LEVEL {
            return Err(MapscoutError::InvalidInput(format!(
                "Maximum level {} exceeds {}",
                max_level, MAX_LEVEL
            )));
        }

        let mut levels = vec![BTreeMap::new(); max_level as usize + 1];
        levels[0].insert(TileId::new(0, 0), CellData::new());

        Ok(Self {
            max_level,
            levels,
            entry_count: 0,
        })
    }

    pub fn max_level(&self) -> MagnificationLevel {
        self.max_level
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn add(&mut self, type_id: TypeId, bounding_box: GeoBox, offset: FileOffset) -> Result<()> {
        self.add_entry(IndexEntry::new(type_id, bounding_box, offset))
    }

    /// Store the area in the deepest cell that contains its whole box.
    pub fn add_entry(&mut self, entry: IndexEntry) -> Result<()> {
        let bbox = &entry.bounding_box;
        if !bbox.is_valid() {
            return Err(MapscoutError::InvalidBox(*bbox));
        }

        let (level, tile) = self.containing_cell(bbox);
        self.levels[level as usize]
            .entry(tile)
            .or_default()
            .entry(entry.type_id)
            .or_default()
            .push(entry.offset);

        let mut key = (level, tile);
        while key.0 > 0 {
            key = (key.0 - 1, TileId::new(key.1.x / 2, key.1.y / 2));
            self.levels[key.0 as usize].entry(key.1).or_default();
        }

        self.entry_count += 1;
        Ok(())
    }

    fn containing_cell(&self, bbox: &GeoBox) -> (MagnificationLevel, TileId) {
        for level in (1..=self.max_level).rev() {
            let min = TileId::from_coord(level, &bbox.min_coord());
            // A box ending exactly on a cell edge maps into the next cell.
            let max = TileId::from_coord(level, &bbox.max_coord());
            if min == max {
                return (level, min);
            }
        }
        (0, TileId::new(0, 0))
    }

    pub fn write(&self, progress: &mut dyn Progress, path: &Path) -> Result<()> {
        let mut writer = FileWriter::create(path)?;
        writer.write_magic(AREA_AREA_INDEX_MAGIC, AREA_AREA_INDEX_VERSION)?;
        writer.write_varint_u32(self.max_level)?;

        let mut child_offsets: BTreeMap<TileId, FileOffset> = BTreeMap::new();

        for level in (0..=self.max_level).rev() {
            progress.set_progress((self.max_level - level) as usize, self.max_level as usize + 1);
            let cells = &self.levels[level as usize];
            writer.write_varint_u32(cells.len() as u32)?;

            let mut offsets = BTreeMap::new();
            for (&tile, data) in cells {
                offsets.insert(tile, writer.position());

                for index in 0..4 {
                    let child = child_offsets
                        .get(&child_tile(tile, index))
                        .copied()
                        .unwrap_or(0);
                    writer.write_file_offset(child)?;
                }

                writer.write_varint_u32(data.len() as u32)?;
                for (&type_id, offsets) in data {
                    let mut sorted = offsets.clone();
                    sorted.sort_unstable();
                    sorted.dedup();

                    writer.write_varint_u32(type_id as u32)?;
                    writer.write_varint_u32(sorted.len() as u32)?;
                    let mut previous = 0;
                    for offset in sorted {
                        writer.write_varint_u64(offset - previous)?;
                        previous = offset;
                    }
                }
            }

            child_offsets = offsets;
        }

        writer.commit()?;
        progress.info(&format!(
            "Wrote {} areas in {} cells to '{}'",
            self.entry_count,
            self.levels.iter().map(|l| l.len()).sum::<usize>(),
            path.display()
        ));
        Ok(())
    }
}
