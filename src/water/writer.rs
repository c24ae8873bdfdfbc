//! Water index generation: rasterizes coastlines into per-level cell states
//! and land polygons and writes the result in the water index format.

use geo::{Contains, LineString, Point, Polygon};
use mapscout_types::{GeoBox, GeoCoord, MagnificationLevel, TileIdBox};
use rstar::{AABB, RTree, RTreeObject};
use std::collections::BTreeMap;
use std::path::Path;
use varint_rs::VarintWriter;

use super::coast::{Coast, CoastState};
use super::geometry::{is_area_at_least_partly_in_area, lines_intersect};
use super::ground_tile::{GroundCoord, GroundTileType};
use super::processor::merge_coastlines;
use super::state_map::StateMap;
use super::water_index::{MAX_UNIFORM_VALUE, WATER_INDEX_MAGIC, WATER_INDEX_VERSION};
use crate::config::WaterIndexConfig;
use crate::error::{MapscoutError, Result};
use crate::io::{FileWriter, bytes_needed};
use crate::progress::Progress;

/// Coast cell data starts behind this many zero bytes so that every data
/// position is larger than the uniform cell values.
const DATA_PADDING: usize = 4;

/// A closed coastline with land on its left side.
struct LandArea {
    polygon: Polygon<f64>,
    bbox: GeoBox,
}

struct IndexedArea {
    index: usize,
    min: [f64; 2],
    max: [f64; 2],
}

impl RTreeObject for IndexedArea {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.min, self.max)
    }
}

struct LandAreas {
    areas: Vec<LandArea>,
    tree: RTree<IndexedArea>,
}

impl LandAreas {
    fn new(coastlines: &[Coast]) -> Self {
        let areas: Vec<LandArea> = coastlines
            .iter()
            .filter(|c| c.is_area && c.left == CoastState::Land && c.len() >= 3)
            .map(|c| {
                let coords: Vec<GeoCoord> = c.coords().collect();
                LandArea {
                    polygon: to_polygon(&coords),
                    bbox: GeoBox::from_coords(&coords),
                }
            })
            .collect();

        let tree = RTree::bulk_load(
            areas
                .iter()
                .enumerate()
                .map(|(index, area)| IndexedArea {
                    index,
                    min: [area.bbox.min_lon(), area.bbox.min_lat()],
                    max: [area.bbox.max_lon(), area.bbox.max_lat()],
                })
                .collect(),
        );

        Self { areas, tree }
    }

    fn intersecting(&self, bbox: &GeoBox) -> Vec<&LandArea> {
        let envelope = AABB::from_corners(
            [bbox.min_lon(), bbox.min_lat()],
            [bbox.max_lon(), bbox.max_lat()],
        );
        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|entry| &self.areas[entry.index])
            .collect()
    }

    fn contains(&self, coord: &GeoCoord) -> bool {
        let point = Point::new(coord.lon, coord.lat);
        self.intersecting(&GeoBox::new(*coord, *coord))
            .into_iter()
            .any(|area| area.polygon.contains(&point))
    }
}

/// A merged coastline ready for rasterization.
struct CoastPath {
    coords: Vec<GeoCoord>,
    is_area: bool,
    left: CoastState,
    right: CoastState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LandSide {
    Left,
    Right,
}

impl CoastPath {
    fn new(coast: &Coast) -> Self {
        Self {
            coords: coast.coords().collect(),
            is_area: coast.is_area,
            left: coast.left,
            right: coast.right,
        }
    }

    fn segment_count(&self) -> usize {
        match self.coords.len() {
            0 | 1 => 0,
            n if self.is_area => n,
            n => n - 1,
        }
    }

    fn segment(&self, index: usize) -> (GeoCoord, GeoCoord) {
        (self.coords[index], self.coords[(index + 1) % self.coords.len()])
    }

    fn land_side(&self) -> Option<LandSide> {
        if self.left == CoastState::Land {
            Some(LandSide::Left)
        } else if self.right == CoastState::Land {
            Some(LandSide::Right)
        } else {
            None
        }
    }
}

fn to_polygon(coords: &[GeoCoord]) -> Polygon<f64> {
    let ring: Vec<geo::Coord<f64>> = coords.iter().map(|&c| c.into()).collect();
    Polygon::new(LineString::from(ring), Vec::new())
}

/// A polygon of one coast cell, in cell coordinates.
#[derive(Debug, Clone, PartialEq)]
struct CellTile {
    tile_type: GroundTileType,
    coords: Vec<GroundCoord>,
}

/// Rasterized result of one magnification level.
struct LevelData {
    map: StateMap,
    /// Polygons of the coast cells keyed by relative `(y, x)`
    cell_tiles: BTreeMap<(u32, u32), Vec<CellTile>>,
}

impl LevelData {
    fn default_cell_data(&self) -> GroundTileType {
        self.map.state(0, 0)
    }

    fn has_cell_data(&self) -> bool {
        if !self.cell_tiles.is_empty() {
            return true;
        }
        let default = self.default_cell_data();
        (0..self.map.y_count())
            .any(|y| (0..self.map.x_count()).any(|x| self.map.state(x, y) != default))
    }
}

/// Builds a water index file from coastlines and the polygons bounding the
/// imported region.
pub struct WaterIndexGenerator {
    config: WaterIndexConfig,
}

impl WaterIndexGenerator {
    pub fn new(config: WaterIndexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WaterIndexConfig {
        &self.config
    }

    /// Merge `coastlines`, rasterize them for every level in
    /// `min_mag..=max_mag` over `data_box` and write the index to `path`.
    ///
    /// Land spreads from the land side of every coastline. Without bounding
    /// polygons every cell that is neither land nor coast is treated as water.
    pub fn generate(
        &self,
        progress: &mut dyn Progress,
        coastlines: Vec<Coast>,
        bounding_polygons: &[Coast],
        data_box: &GeoBox,
        path: &Path,
    ) -> Result<()> {
        self.config.validate().map_err(MapscoutError::Config)?;
        if !data_box.is_valid() {
            return Err(MapscoutError::InvalidBox(*data_box));
        }

        let coastlines = merge_coastlines(progress, coastlines);
        let land = LandAreas::new(&coastlines);
        let paths: Vec<CoastPath> = coastlines.iter().map(CoastPath::new).collect();
        let polygons: Vec<Vec<GeoCoord>> = bounding_polygons
            .iter()
            .map(|c| c.coords().collect())
            .filter(|coords: &Vec<GeoCoord>| coords.len() >= 3)
            .collect();
        let polygon_shapes: Vec<Polygon<f64>> = polygons.iter().map(|p| to_polygon(p)).collect();
        let may_spread = |cell: &GeoBox| {
            polygons.is_empty()
                || polygons
                    .iter()
                    .any(|poly| is_area_at_least_partly_in_area(&cell.corners(), poly))
        };

        progress.info(&format!(
            "{} coastline(s), {} land area(s), {} bounding polygon(s)",
            coastlines.len(),
            land.areas.len(),
            polygons.len()
        ));

        let mut levels = Vec::new();
        for level in self.config.min_mag..=self.config.max_mag {
            progress.set_action(&format!("Building water index level {}", level));

            let mut data = LevelData {
                map: StateMap::new(level, data_box),
                cell_tiles: BTreeMap::new(),
            };
            let cell_segments = mark_coast_cells(&mut data.map, &paths);
            let environment = rasterize_coast_cells(&mut data, &paths, &cell_segments);
            apply_coast_environment(&mut data.map, &environment);
            classify_land_cells(&mut data.map, &land);

            data.map.fill_land();
            data.map.spread_land(&may_spread);
            data.map.fill_water(self.config.fill_iterations, &may_spread);
            classify_remaining_cells(&mut data.map, &polygon_shapes);

            log::debug!(
                "Water index level {}: {}x{} cells, {} coast cell(s)",
                level,
                data.map.x_count(),
                data.map.y_count(),
                data.cell_tiles.len()
            );
            levels.push(data);
        }

        progress.set_action(&format!("Writing '{}'", path.display()));
        write_index(path, self.config.min_mag, self.config.max_mag, &levels)
    }
}

/// Segments crossing each coast cell as `(path, segment)`, keyed by relative
/// `(y, x)`.
type CellSegments = BTreeMap<(u32, u32), Vec<(usize, usize)>>;

/// Mark every cell crossed by a coastline segment as `Coast`.
fn mark_coast_cells(map: &mut StateMap, paths: &[CoastPath]) -> CellSegments {
    let level = map.level();
    let extent = *map.cell_box();
    let mut cell_segments = CellSegments::new();

    for (path_index, path) in paths.iter().enumerate() {
        for segment in 0..path.segment_count() {
            let (a, b) = path.segment(segment);
            let segment_cells = TileIdBox::from_geo_box(level, &GeoBox::new(a, b));
            let Some(cells) = segment_cells.intersection(&extent) else {
                continue;
            };

            for cell in cells.iter() {
                if !segment_crosses_box(&a, &b, &cell.bounding_box(level)) {
                    continue;
                }
                if let Some((x, y)) = map.relative(cell.x, cell.y) {
                    map.set_state(x, y, GroundTileType::Coast);
                    cell_segments
                        .entry((y, x))
                        .or_default()
                        .push((path_index, segment));
                }
            }
        }
    }

    cell_segments
}

fn segment_crosses_box(a: &GeoCoord, b: &GeoCoord, bbox: &GeoBox) -> bool {
    if bbox.contains(a) || bbox.contains(b) {
        return true;
    }
    let [sw, se, ne, nw] = corners_ccw(bbox);
    lines_intersect(a, b, &sw, &se)
        || lines_intersect(a, b, &se, &ne)
        || lines_intersect(a, b, &ne, &nw)
        || lines_intersect(a, b, &nw, &sw)
}

fn corners_ccw(bbox: &GeoBox) -> [GeoCoord; 4] {
    [
        GeoCoord::new(bbox.min_lat(), bbox.min_lon()),
        GeoCoord::new(bbox.min_lat(), bbox.max_lon()),
        GeoCoord::new(bbox.max_lat(), bbox.max_lon()),
        GeoCoord::new(bbox.max_lat(), bbox.min_lon()),
    ]
}

/// States implied for the neighbours south, east, north and west of a coast
/// cell, `Unknown` where the cell does not decide.
type BorderStates = [GroundTileType; 4];

/// Build the polygons of every coast cell and collect the border states of
/// the cells whose pieces could all be closed.
fn rasterize_coast_cells(
    data: &mut LevelData,
    paths: &[CoastPath],
    cell_segments: &CellSegments,
) -> Vec<((u32, u32), BorderStates)> {
    let mut environment = Vec::new();

    for (&(y, x), segments) in cell_segments {
        let raster = rasterize_cell(&data.map, x, y, paths, segments);
        if let Some(borders) = raster.borders {
            environment.push(((x, y), borders));
        }
        data.cell_tiles.insert((y, x), raster.tiles);
    }

    environment
}

/// Part of a coastline inside one cell, oriented with land on its left.
/// `entry` and `exit` are border positions, see [`border_position`].
#[derive(Debug, Clone, PartialEq)]
struct Piece {
    coords: Vec<GeoCoord>,
    entry: f64,
    exit: f64,
}

struct CellRaster {
    tiles: Vec<CellTile>,
    borders: Option<BorderStates>,
}

fn rasterize_cell(
    map: &StateMap,
    x: u32,
    y: u32,
    paths: &[CoastPath],
    segments: &[(usize, usize)],
) -> CellRaster {
    let cell = map.cell_bounding_box(x, y);
    let mut by_path: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &(path, segment) in segments {
        by_path.entry(path).or_default().push(segment);
    }

    let mut tiles = Vec::new();
    let mut pieces = Vec::new();
    let mut complete = true;

    for (path_index, segment_list) in by_path {
        let path = &paths[path_index];

        if path.is_area && path.coords.iter().all(|c| cell.contains(c)) {
            let tile_type = match path.left {
                CoastState::Land => GroundTileType::Land,
                CoastState::Water => GroundTileType::Water,
                _ => continue,
            };
            tiles.push(CellTile {
                tile_type,
                coords: path
                    .coords
                    .iter()
                    .map(|c| map.transform(x, y, c, true))
                    .collect(),
            });
            continue;
        }

        let Some(side) = path.land_side() else {
            continue;
        };
        for run in segment_runs(path, &segment_list, &cell) {
            for mut coords in clip_run(path, &run, &cell) {
                if side == LandSide::Right {
                    coords.reverse();
                }
                let ends = match (coords.first(), coords.last()) {
                    (Some(first), Some(last)) if on_border(first, &cell) && on_border(last, &cell) => {
                        Some((border_position(first, &cell), border_position(last, &cell)))
                    }
                    _ => None,
                };
                match ends {
                    Some((entry, exit)) => pieces.push(Piece {
                        coords,
                        entry,
                        exit,
                    }),
                    // A coastline ending inside the cell.
                    None => complete = false,
                }
            }
        }
    }

    let (polygons, arcs) = close_pieces(&pieces, &cell);
    for polygon in polygons {
        let coords: Vec<GroundCoord> = polygon
            .iter()
            .map(|(c, coast)| map.transform(x, y, c, *coast))
            .collect();
        if coords.len() >= 3 {
            tiles.push(CellTile {
                tile_type: GroundTileType::Land,
                coords,
            });
        }
    }

    CellRaster {
        tiles,
        borders: (complete && !pieces.is_empty()).then(|| border_states(&arcs)),
    }
}

/// Split the segments of `path` crossing a cell into runs of consecutive
/// segments. A ring's run starts behind a gap, or at a vertex outside the
/// cell when every segment crosses it.
fn segment_runs(path: &CoastPath, segments: &[usize], cell: &GeoBox) -> Vec<Vec<usize>> {
    let count = path.segment_count();
    let mut ordered = segments.to_vec();
    ordered.sort_unstable();
    ordered.dedup();
    if ordered.is_empty() {
        return Vec::new();
    }

    if path.is_area {
        if ordered.len() == count {
            let start = (0..count)
                .find(|&i| !cell.contains(&path.coords[i]))
                .unwrap_or(0);
            return vec![(0..count).map(|i| (start + i) % count).collect()];
        }
        let len = ordered.len();
        if let Some(start) = (0..len).find(|&i| ordered[i] != (ordered[(i + len - 1) % len] + 1) % count) {
            ordered.rotate_left(start);
        }
    }

    let mut runs: Vec<Vec<usize>> = Vec::new();
    for segment in ordered {
        let continues = runs
            .last()
            .and_then(|run| run.last())
            .is_some_and(|&last| (last + 1) % count.max(1) == segment);
        match runs.last_mut() {
            Some(run) if continues => run.push(segment),
            _ => runs.push(vec![segment]),
        }
    }
    runs
}

/// Cut a run of segments into the polylines lying inside `cell`.
fn clip_run(path: &CoastPath, run: &[usize], cell: &GeoBox) -> Vec<Vec<GeoCoord>> {
    let mut pieces = Vec::new();
    let mut current: Option<Vec<GeoCoord>> = None;

    for &segment in run {
        let (a, b) = path.segment(segment);
        let Some(clip) = clip_segment(&a, &b, cell) else {
            pieces.extend(current.take());
            continue;
        };

        if current.is_none() {
            // Touching the cell in a single point.
            if clip.from == clip.to {
                continue;
            }
            current = Some(vec![clip.from]);
        }
        if let Some(coords) = current.as_mut() {
            if coords.last() != Some(&clip.to) {
                coords.push(clip.to);
            }
        }
        if clip.leaves {
            pieces.extend(current.take());
        }
    }

    pieces.extend(current);
    pieces.retain(|coords| coords.len() >= 2);
    pieces
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct SegmentClip {
    from: GeoCoord,
    to: GeoCoord,
    /// The segment continues outside the cell behind `to`
    leaves: bool,
}

/// Liang-Barsky clipping of `a..b` to `cell`. Points on the border are
/// snapped onto it.
fn clip_segment(a: &GeoCoord, b: &GeoCoord, cell: &GeoBox) -> Option<SegmentClip> {
    let d_lon = b.lon - a.lon;
    let d_lat = b.lat - a.lat;
    let edges = [
        (-d_lon, a.lon - cell.min_lon()),
        (d_lon, cell.max_lon() - a.lon),
        (-d_lat, a.lat - cell.min_lat()),
        (d_lat, cell.max_lat() - a.lat),
    ];

    let (mut t0, mut t1) = (0.0f64, 1.0f64);
    let (mut enter, mut exit) = (None, None);
    for (edge, &(p, q)) in edges.iter().enumerate() {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            if r > t0 {
                t0 = r;
                enter = Some(edge);
            }
        } else {
            if r < t0 {
                return None;
            }
            if r < t1 {
                t1 = r;
                exit = Some(edge);
            }
        }
    }

    let at = |t: f64, edge: usize| {
        let point = GeoCoord::new(a.lat + t * d_lat, a.lon + t * d_lon);
        snap_to_edge(point, edge, cell)
    };
    Some(SegmentClip {
        from: enter.map_or(*a, |edge| at(t0, edge)),
        to: exit.map_or(*b, |edge| at(t1, edge)),
        leaves: t1 < 1.0,
    })
}

/// Edges in clipping order: west, east, south, north.
fn snap_to_edge(point: GeoCoord, edge: usize, cell: &GeoBox) -> GeoCoord {
    let lat = point.lat.clamp(cell.min_lat(), cell.max_lat());
    let lon = point.lon.clamp(cell.min_lon(), cell.max_lon());
    match edge {
        0 => GeoCoord::new(lat, cell.min_lon()),
        1 => GeoCoord::new(lat, cell.max_lon()),
        2 => GeoCoord::new(cell.min_lat(), lon),
        _ => GeoCoord::new(cell.max_lat(), lon),
    }
}

fn on_border(coord: &GeoCoord, cell: &GeoBox) -> bool {
    coord.lon == cell.min_lon()
        || coord.lon == cell.max_lon()
        || coord.lat == cell.min_lat()
        || coord.lat == cell.max_lat()
}

/// Position of a border point, counter-clockwise from the south west
/// corner: the south edge maps to `0..1`, east to `1..2`, north to `2..3`
/// and west to `3..4`.
fn border_position(coord: &GeoCoord, cell: &GeoBox) -> f64 {
    let width = cell.max_lon() - cell.min_lon();
    let height = cell.max_lat() - cell.min_lat();
    let distances = [
        (coord.lat - cell.min_lat()) / height,
        (cell.max_lon() - coord.lon) / width,
        (cell.max_lat() - coord.lat) / height,
        (coord.lon - cell.min_lon()) / width,
    ];
    let mut edge = 0;
    for (i, distance) in distances.iter().enumerate().skip(1) {
        if *distance < distances[edge] {
            edge = i;
        }
    }

    let along = match edge {
        0 => (coord.lon - cell.min_lon()) / width,
        1 => (coord.lat - cell.min_lat()) / height,
        2 => (cell.max_lon() - coord.lon) / width,
        _ => (cell.max_lat() - coord.lat) / height,
    };
    (edge as f64 + along.clamp(0.0, 1.0)).rem_euclid(4.0)
}

/// A run along the cell border: start position and length.
type BorderArc = (f64, f64);

/// Close the pieces into land polygons. From the exit of a piece the cell
/// border is followed counter-clockwise to the nearest entry, until the
/// polygon returns to its first piece. Coords carry the coast flag: set
/// when the edge to the following coord is coastline.
fn close_pieces(pieces: &[Piece], cell: &GeoBox) -> (Vec<Vec<(GeoCoord, bool)>>, Vec<BorderArc>) {
    let corners = corners_ccw(cell);
    let mut used = vec![false; pieces.len()];
    let mut polygons = Vec::new();
    let mut arcs = Vec::new();

    for start in 0..pieces.len() {
        if used[start] {
            continue;
        }

        let mut polygon = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            let piece = &pieces[current];
            let last = piece.coords.len() - 1;
            polygon.extend(piece.coords.iter().enumerate().map(|(i, c)| (*c, i < last)));

            let next = (0..pieces.len())
                .filter(|&j| j == start || !used[j])
                .map(|j| {
                    let distance = (pieces[j].entry - piece.exit).rem_euclid(4.0);
                    if j == current && distance == 0.0 {
                        (j, 4.0)
                    } else {
                        (j, distance)
                    }
                })
                .min_by(|a, b| a.1.total_cmp(&b.1));
            let Some((next, distance)) = next else {
                break;
            };

            let mut passed: Vec<(f64, GeoCoord)> = (1..=4)
                .map(|k| ((k as f64 - piece.exit).rem_euclid(4.0), corners[k % 4]))
                .filter(|(offset, _)| *offset > 0.0 && *offset < distance)
                .collect();
            passed.sort_by(|a, b| a.0.total_cmp(&b.0));
            polygon.extend(passed.into_iter().map(|(_, corner)| (corner, false)));
            arcs.push((piece.exit, distance));

            if next == start {
                break;
            }
            current = next;
        }

        polygons.push(polygon);
    }

    (polygons, arcs)
}

const COVER_EPSILON: f64 = 1e-9;

/// An edge fully covered by land arcs borders land, an edge no arc touches
/// borders water.
fn border_states(arcs: &[BorderArc]) -> BorderStates {
    let mut states = [GroundTileType::Unknown; 4];
    for (edge, state) in states.iter_mut().enumerate() {
        let from = edge as f64;
        let covered: f64 = arcs
            .iter()
            .flat_map(|&(start, length)| {
                [-4.0, 0.0].map(|shift| {
                    let low = (start + shift).max(from);
                    let high = (start + shift + length).min(from + 1.0);
                    (high - low).max(0.0)
                })
            })
            .sum();

        if covered >= 1.0 - COVER_EPSILON {
            *state = GroundTileType::Land;
        } else if covered <= COVER_EPSILON {
            *state = GroundTileType::Water;
        }
    }
    states
}

/// Hand the border states of coast cells to their unknown neighbours.
fn apply_coast_environment(map: &mut StateMap, environment: &[((u32, u32), BorderStates)]) {
    for &((x, y), borders) in environment {
        let neighbours = [
            y.checked_sub(1).map(|ny| (x, ny)),
            Some((x + 1, y)),
            Some((x, y + 1)),
            x.checked_sub(1).map(|nx| (nx, y)),
        ];
        for (neighbour, state) in neighbours.into_iter().zip(borders) {
            let Some((nx, ny)) = neighbour else {
                continue;
            };
            if state != GroundTileType::Unknown && map.state(nx, ny) == GroundTileType::Unknown {
                map.set_state(nx, ny, state);
            }
        }
    }
}

/// Unknown cells whose centre lies in a closed land area become land.
fn classify_land_cells(map: &mut StateMap, land: &LandAreas) {
    for y in 0..map.y_count() {
        for x in 0..map.x_count() {
            if map.state(x, y) == GroundTileType::Unknown
                && land.contains(&map.cell_bounding_box(x, y).center())
            {
                map.set_state(x, y, GroundTileType::Land);
            }
        }
    }
}

/// Cells still unknown are water inside the bounding polygons, or
/// everywhere when there are none.
fn classify_remaining_cells(map: &mut StateMap, polygons: &[Polygon<f64>]) {
    for y in 0..map.y_count() {
        for x in 0..map.x_count() {
            if map.state(x, y) != GroundTileType::Unknown {
                continue;
            }
            let center = map.cell_bounding_box(x, y).center();
            let point = Point::new(center.lon, center.lat);
            if polygons.is_empty() || polygons.iter().any(|p| p.contains(&point)) {
                map.set_state(x, y, GroundTileType::Water);
            }
        }
    }
}

/// Serialize the coast cell polygons of one level and return the data region
/// with the position of each coast cell inside it.
fn encode_cell_data(data: &LevelData) -> Result<(Vec<u8>, BTreeMap<(u32, u32), u64>)> {
    let mut buffer = vec![0u8; DATA_PADDING];
    let mut positions = BTreeMap::new();

    for (cell, tiles) in &data.cell_tiles {
        positions.insert(*cell, buffer.len() as u64);
        buffer.write_u32_varint(tiles.len() as u32)?;
        for tile in tiles {
            buffer.push(tile.tile_type as u8);
            buffer.write_u32_varint(tile.coords.len() as u32)?;
            for coord in &tile.coords {
                buffer.extend_from_slice(&coord.encoded_x().to_le_bytes());
                buffer.extend_from_slice(&coord.y.to_le_bytes());
            }
        }
    }

    Ok((buffer, positions))
}

fn write_index(
    path: &Path,
    min_mag: MagnificationLevel,
    max_mag: MagnificationLevel,
    levels: &[LevelData],
) -> Result<()> {
    let mut encoded = Vec::with_capacity(levels.len());
    for level in levels {
        let (buffer, positions) = encode_cell_data(level)?;
        let max_value = positions.values().copied().max().unwrap_or(0).max(MAX_UNIFORM_VALUE);
        encoded.push((buffer, positions, bytes_needed(max_value)));
    }

    let mut writer = FileWriter::create(path)?;
    writer.write_magic(WATER_INDEX_MAGIC, WATER_INDEX_VERSION)?;
    writer.write_varint_u32(min_mag)?;
    writer.write_varint_u32(max_mag)?;

    let mut patch_positions = Vec::with_capacity(levels.len());
    for (level, (_, _, bytes)) in levels.iter().zip(&encoded) {
        writer.write_bool(level.has_cell_data())?;
        writer.write_u8(*bytes)?;
        writer.write_u8(level.default_cell_data() as u8)?;
        patch_positions.push(writer.position());
        writer.write_file_offset(0)?;
        writer.write_varint_u32(level.map.x_start())?;
        writer.write_varint_u32(level.map.x_end())?;
        writer.write_varint_u32(level.map.y_start())?;
        writer.write_varint_u32(level.map.y_end())?;
    }

    for ((level, (buffer, positions, bytes)), patch_at) in
        levels.iter().zip(&encoded).zip(patch_positions)
    {
        if !level.has_cell_data() {
            continue;
        }

        let index_data_offset = writer.position();
        writer.patch_file_offset(patch_at, index_data_offset)?;

        for y in 0..level.map.y_count() {
            for x in 0..level.map.x_count() {
                let value = match level.map.state(x, y) {
                    GroundTileType::Coast => positions.get(&(y, x)).copied().unwrap_or(0),
                    state => state as u64,
                };
                writer.write_sized_offset(value, *bytes)?;
            }
        }
        writer.write_all(buffer)?;
    }

    writer.commit()
}
