use mapscout_types::{GeoBox, MagnificationLevel, TileId, MAX_LEVEL, cell_dimension};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::SLOW_QUERY;
use crate::error::{MapscoutError, Result};
use crate::io::{FileOffset, FileScanner, ScannerGuard};
use crate::types::{TypeId, TypeInfoSet};

pub(crate) const AREA_AREA_INDEX_MAGIC: &[u8; 8] = b"MSAREAAX";
pub(crate) const AREA_AREA_INDEX_VERSION: u8 = 1;

/// Offsets of one type inside a cell.
#[derive(Debug, Clone)]
struct TypeOffsets {
    type_id: TypeId,
    offsets: Vec<FileOffset>,
}

#[derive(Debug, Clone)]
struct IndexCell {
    /// top-left, top-right, bottom-left, bottom-right; 0 = no child
    children: [FileOffset; 4],
    data: SmallVec<[TypeOffsets; 2]>,
}

impl IndexCell {
    fn type_offsets(&self, type_id: TypeId) -> Option<&[FileOffset]> {
        self.data
            .iter()
            .find(|t| t.type_id == type_id)
            .map(|t| t.offsets.as_slice())
    }
}

/// Tile id of child `index` of the cell `(x, y)`, one level deeper.
pub(crate) fn child_tile(parent: TileId, index: usize) -> TileId {
    let (cx, cy) = (parent.x * 2, parent.y * 2);
    match index {
        0 => TileId::new(cx, cy + 1),
        1 => TileId::new(cx + 1, cy + 1),
        2 => TileId::new(cx, cy),
        _ => TileId::new(cx + 1, cy),
    }
}

/// Result of an [`AreaAreaIndex`] query.
#[derive(Debug, Clone, Default)]
pub struct AreaAreaLookup {
    /// Offsets in harvest order, level by level
    pub offsets: Vec<FileOffset>,
    pub loaded_types: TypeInfoSet,
    /// The query stopped because `max_count` would have been exceeded
    pub capped: bool,
}

/// Structure of one pyramid cell, for inspection and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct AreaAreaCell {
    pub level: MagnificationLevel,
    pub id: TileId,
    pub offset: FileOffset,
    pub children: [FileOffset; 4],
    pub entry_count: usize,
}

/// Quad-tree pyramid index for areas, held completely in memory.
///
/// Level 0 is a single root cell covering the world; every level halves the
/// cell size. An area lives in the deepest cell that contains its box.
pub struct AreaAreaIndex {
    path: PathBuf,
    max_level: MagnificationLevel,
    root: FileOffset,
    cells: FxHashMap<FileOffset, IndexCell>,
}

impl AreaAreaIndex {
    pub fn load<P: AsRef<Path>>(path: P, memory_mapped: bool) -> Result<Self> {
        let scanner = FileScanner::open(path, memory_mapped)?;
        let mut guard = scanner.lock();
        let index = read_pyramid(&mut guard)?;

        log::debug!(
            "Area area index '{}': {} cells, max level {}",
            index.path.display(),
            index.cells.len(),
            index.max_level
        );
        Ok(index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_level(&self) -> MagnificationLevel {
        self.max_level
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Offsets of areas of `types` stored in cells that intersect `bbox`, down
    /// to `max_level`.
    ///
    /// Harvesting stops before the result would grow beyond `max_count`; what
    /// was collected until then is returned with `capped` set.
    pub fn get_offsets(
        &self,
        bbox: &GeoBox,
        max_level: MagnificationLevel,
        types: &TypeInfoSet,
        max_count: usize,
    ) -> Result<AreaAreaLookup> {
        self.lookup(bbox, max_level, types, max_count)
            .inspect_err(|e| {
                log::error!(
                    "Error while reading area area index '{}': {}",
                    self.path.display(),
                    e
                )
            })
    }

    fn lookup(
        &self,
        bbox: &GeoBox,
        max_level: MagnificationLevel,
        types: &TypeInfoSet,
        max_count: usize,
    ) -> Result<AreaAreaLookup> {
        if !bbox.is_valid() {
            return Err(MapscoutError::InvalidBox(*bbox));
        }

        let start = Instant::now();
        let min_lon = bbox.min_lon() + 180.0;
        let max_lon = bbox.max_lon() + 180.0;
        let min_lat = bbox.min_lat() + 90.0;
        let max_lat = bbox.max_lat() + 90.0;
        let deepest = max_level.min(self.max_level);

        let mut lookup = AreaAreaLookup::default();
        let mut current = vec![(TileId::new(0, 0), self.root)];
        let mut next = Vec::new();
        let mut level = 0;

        'levels: while !current.is_empty() && level <= deepest {
            next.clear();

            for &(tile, offset) in &current {
                let cell = self.cell(offset)?;

                let matching: usize = types
                    .iter()
                    .filter_map(|t| cell.type_offsets(t))
                    .map(|o| o.len())
                    .sum();
                if lookup.offsets.len() + matching > max_count {
                    lookup.capped = true;
                    break 'levels;
                }
                for type_id in types.iter() {
                    if let Some(offsets) = cell.type_offsets(type_id) {
                        lookup.offsets.extend_from_slice(offsets);
                    }
                }

                if level == deepest {
                    continue;
                }

                let dim = cell_dimension(level + 1);
                for (index, &child) in cell.children.iter().enumerate() {
                    if child == 0 {
                        continue;
                    }
                    let id = child_tile(tile, index);
                    let x = id.x as f64 * dim.width;
                    let y = id.y as f64 * dim.height;
                    if x < max_lon && x + dim.width > min_lon && y < max_lat && y + dim.height > min_lat
                    {
                        next.push((id, child));
                    }
                }
            }

            std::mem::swap(&mut current, &mut next);
            level += 1;
        }

        lookup.loaded_types = types.clone();

        let elapsed = start.elapsed();
        if elapsed > SLOW_QUERY {
            log::warn!(
                "Retrieving {} area offsets from '{}' for {} took {:?}",
                lookup.offsets.len(),
                self.path.display(),
                bbox,
                elapsed
            );
        }

        Ok(lookup)
    }

    fn cell(&self, offset: FileOffset) -> Result<&IndexCell> {
        self.cells.get(&offset).ok_or_else(|| {
            MapscoutError::corrupt(&self.path, offset, "an index cell", "no cell at offset")
        })
    }

    /// All cells, breadth first from the root.
    pub fn cells(&self) -> Vec<AreaAreaCell> {
        let mut result = Vec::with_capacity(self.cells.len());
        let mut current = vec![(TileId::new(0, 0), self.root)];
        let mut level = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for (id, offset) in current {
                let Some(cell) = self.cells.get(&offset) else {
                    continue;
                };
                for (index, &child) in cell.children.iter().enumerate() {
                    if child != 0 {
                        next.push((child_tile(id, index), child));
                    }
                }
                result.push(AreaAreaCell {
                    level,
                    id,
                    offset,
                    children: cell.children,
                    entry_count: cell.data.iter().map(|t| t.offsets.len()).sum(),
                });
            }
            current = next;
            level += 1;
        }

        result
    }
}

fn read_pyramid(guard: &mut ScannerGuard<'_>) -> Result<AreaAreaIndex> {
    let path = guard.path().to_path_buf();
    guard.read_magic(AREA_AREA_INDEX_MAGIC, AREA_AREA_INDEX_VERSION)?;

    let level_pos = guard.position()?;
    let max_level = guard.read_varint_u32()?;
    if max_level > MAX_LEVEL {
        return Err(MapscoutError::corrupt(
            &path,
            level_pos,
            format!("max level <= {}", MAX_LEVEL),
            max_level.to_string(),
        ));
    }

    let mut cells = FxHashMap::default();
    let mut level_offsets: Vec<FxHashSet<FileOffset>> =
        vec![FxHashSet::default(); max_level as usize + 1];
    let mut root = 0;

    for level in (0..=max_level).rev() {
        let count_pos = guard.position()?;
        let count = guard.read_varint_u32()?;

        if level == 0 && count != 1 {
            return Err(MapscoutError::corrupt(
                &path,
                count_pos,
                "exactly one root cell",
                format!("{} cells", count),
            ));
        }

        for _ in 0..count {
            let offset = guard.position()?;
            let mut children = [0; 4];
            for child in children.iter_mut() {
                *child = guard.read_file_offset()?;
            }

            if level == max_level {
                if children.iter().any(|&c| c != 0) {
                    return Err(MapscoutError::corrupt(
                        &path,
                        offset,
                        "no children at the deepest level",
                        format!("{:?}", children),
                    ));
                }
            } else if let Some(&child) = children
                .iter()
                .find(|&&c| c != 0 && !level_offsets[level as usize + 1].contains(&c))
            {
                return Err(MapscoutError::corrupt(
                    &path,
                    offset,
                    format!("a child cell on level {}", level + 1),
                    format!("unresolved offset {}", child),
                ));
            }

            let data = read_cell_data(guard, &path)?;
            level_offsets[level as usize].insert(offset);
            cells.insert(offset, IndexCell { children, data });
            if level == 0 {
                root = offset;
            }
        }
    }

    Ok(AreaAreaIndex {
        path,
        max_level,
        root,
        cells,
    })
}

fn read_cell_data(
    guard: &mut ScannerGuard<'_>,
    path: &Path,
) -> Result<SmallVec<[TypeOffsets; 2]>> {
    // Each type entry holds at least a type id and a count.
    let type_count = guard.read_count(2)?;
    let mut data = SmallVec::with_capacity(type_count as usize);

    for _ in 0..type_count {
        let pos = guard.position()?;
        let raw_id = guard.read_varint_u32()?;
        let type_id = TypeId::try_from(raw_id).map_err(|_| {
            MapscoutError::corrupt(path, pos, "a 16 bit type id", raw_id.to_string())
        })?;

        let count = guard.read_count(1)?;
        let mut offsets = Vec::with_capacity(count as usize);
        let mut previous: FileOffset = 0;
        for _ in 0..count {
            previous = guard.read_delta(previous)?;
            offsets.push(previous);
        }
        data.push(TypeOffsets { type_id, offsets });
    }

    Ok(data)
}
