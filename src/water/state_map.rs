use mapscout_types::{
    CellDimension, GeoBox, GeoCoord, MagnificationLevel, TileId, TileIdBox, cell_dimension,
};

use std::collections::VecDeque;

use super::ground_tile::{GroundCoord, GroundTileType};

/// Ground state of every cell of one level, two bits per cell.
///
/// Cells are addressed relative to the covered cell box unless a method says
/// otherwise. Reads outside the box return `Unknown`, writes are ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct StateMap {
    level: MagnificationLevel,
    dimension: CellDimension,
    cells: TileIdBox,
    area: Vec<u8>,
}

impl StateMap {
    /// Map covering every cell of `level` touched by `bbox`, all `Unknown`.
    pub fn new(level: MagnificationLevel, bbox: &GeoBox) -> Self {
        let mut map = Self {
            level,
            dimension: cell_dimension(level),
            cells: TileIdBox::new(TileId::new(0, 0), TileId::new(0, 0)),
            area: Vec::new(),
        };
        map.set_box(bbox);
        map
    }

    /// Resize to the cells touched by `bbox` and reset all states.
    pub fn set_box(&mut self, bbox: &GeoBox) {
        self.cells = TileIdBox::from_geo_box(self.level, bbox);
        let cell_count = self.cells.count() as usize;
        self.area = vec![0; cell_count.div_ceil(4)];
    }

    pub fn level(&self) -> MagnificationLevel {
        self.level
    }

    pub fn cell_width(&self) -> f64 {
        self.dimension.width
    }

    pub fn cell_height(&self) -> f64 {
        self.dimension.height
    }

    pub fn cell_box(&self) -> &TileIdBox {
        &self.cells
    }

    pub fn x_start(&self) -> u32 {
        self.cells.min_x()
    }

    pub fn x_end(&self) -> u32 {
        self.cells.max_x()
    }

    pub fn y_start(&self) -> u32 {
        self.cells.min_y()
    }

    pub fn y_end(&self) -> u32 {
        self.cells.max_y()
    }

    pub fn x_count(&self) -> u32 {
        self.cells.width()
    }

    pub fn y_count(&self) -> u32 {
        self.cells.height()
    }

    fn slot(&self, x: u32, y: u32) -> Option<(usize, u32)> {
        if x >= self.x_count() || y >= self.y_count() {
            return None;
        }
        let cell = y as usize * self.x_count() as usize + x as usize;
        Some((cell / 4, (cell % 4) as u32 * 2))
    }

    pub fn state(&self, x: u32, y: u32) -> GroundTileType {
        self.slot(x, y)
            .and_then(|(index, shift)| GroundTileType::from_u8((self.area[index] >> shift) & 0b11))
            .unwrap_or(GroundTileType::Unknown)
    }

    pub fn set_state(&mut self, x: u32, y: u32, state: GroundTileType) {
        if let Some((index, shift)) = self.slot(x, y) {
            self.area[index] = (self.area[index] & !(0b11 << shift)) | ((state as u8) << shift);
        }
    }

    /// Relative position of the world cell `(x, y)`, if it is covered.
    pub fn relative(&self, x: u32, y: u32) -> Option<(u32, u32)> {
        self.cells
            .contains(&TileId::new(x, y))
            .then(|| (x - self.x_start(), y - self.y_start()))
    }

    pub fn state_abs(&self, x: u32, y: u32) -> GroundTileType {
        self.relative(x, y)
            .map_or(GroundTileType::Unknown, |(x, y)| self.state(x, y))
    }

    pub fn set_state_abs(&mut self, x: u32, y: u32, state: GroundTileType) {
        if let Some((x, y)) = self.relative(x, y) {
            self.set_state(x, y, state);
        }
    }

    /// Geographic extent of the relative cell `(x, y)`.
    pub fn cell_bounding_box(&self, x: u32, y: u32) -> GeoBox {
        TileId::new(self.x_start() + x, self.y_start() + y).bounding_box(self.level)
    }

    /// Scale `coord` into the cell coordinates of the relative cell `(x, y)`.
    pub fn transform(&self, x: u32, y: u32, coord: &GeoCoord, coast: bool) -> GroundCoord {
        let cell = self.cell_bounding_box(x, y);
        let scale = GroundCoord::CELL_MAX as f64;
        let gx = ((coord.lon - cell.min_lon()) / self.dimension.width * scale + 0.5).floor();
        let gy = ((coord.lat - cell.min_lat()) / self.dimension.height * scale + 0.5).floor();
        GroundCoord::new(gx.clamp(0.0, scale) as u16, gy.clamp(0.0, scale) as u16, coast)
    }

    /// Turn unknown runs enclosed by land or coast into land, row by row and
    /// then column by column, until nothing changes.
    pub fn fill_land(&mut self) {
        let mut changed = true;
        while changed {
            changed = false;

            for y in 0..self.y_count() {
                changed |= self.fill_run(self.x_count(), |x| (x, y));
            }
            for x in 0..self.x_count() {
                changed |= self.fill_run(self.y_count(), |y| (x, y));
            }
        }
    }

    /// One scan along a row or column. Only runs that start right behind a
    /// land cell are filled.
    fn fill_run(&mut self, length: u32, cell: impl Fn(u32) -> (u32, u32)) -> bool {
        let mut changed = false;
        let mut run: Option<(u32, u32)> = None;
        let mut after_land = false;
        let mut i = 0;

        while i < length {
            let (x, y) = cell(i);
            let state = self.state(x, y);

            match run {
                None if !after_land => {
                    after_land = state == GroundTileType::Land;
                    i += 1;
                }
                None => {
                    if state == GroundTileType::Unknown {
                        run = Some((i, i));
                        i += 1;
                    } else {
                        after_land = false;
                    }
                }
                Some((start, end)) => match state {
                    GroundTileType::Unknown => {
                        run = Some((start, i));
                        i += 1;
                    }
                    GroundTileType::Coast | GroundTileType::Land => {
                        for j in start..=end {
                            let (x, y) = cell(j);
                            self.set_state(x, y, GroundTileType::Land);
                        }
                        changed = true;
                        run = None;
                        after_land = false;
                    }
                    GroundTileType::Water => {
                        run = None;
                        after_land = false;
                    }
                },
            }
        }

        changed
    }

    /// Relative 4-neighbours of `(x, y)` inside the map.
    fn neighbours(&self, x: u32, y: u32) -> impl Iterator<Item = (u32, u32)> + use<> {
        let (x_count, y_count) = (self.x_count(), self.y_count());
        [
            x.checked_sub(1).map(|nx| (nx, y)),
            Some((x + 1, y)),
            y.checked_sub(1).map(|ny| (x, ny)),
            Some((x, y + 1)),
        ]
        .into_iter()
        .flatten()
        .filter(move |&(nx, ny)| nx < x_count && ny < y_count)
    }

    /// Flood land into every unknown cell connected to a land cell. Cells
    /// for which `may_enter` fails stay unknown and stop the flood.
    pub fn spread_land(&mut self, may_enter: impl Fn(&GeoBox) -> bool) {
        let mut queue: VecDeque<(u32, u32)> = (0..self.y_count())
            .flat_map(|y| (0..self.x_count()).map(move |x| (x, y)))
            .filter(|&(x, y)| self.state(x, y) == GroundTileType::Land)
            .collect();

        while let Some((x, y)) = queue.pop_front() {
            for (nx, ny) in self.neighbours(x, y) {
                if self.state(nx, ny) == GroundTileType::Unknown
                    && may_enter(&self.cell_bounding_box(nx, ny))
                {
                    self.set_state(nx, ny, GroundTileType::Land);
                    queue.push_back((nx, ny));
                }
            }
        }
    }

    /// Grow water into unknown 4-neighbours for `iterations` rounds. Only
    /// water cells for which `may_spread` holds spread further.
    pub fn fill_water(&mut self, iterations: usize, may_spread: impl Fn(&GeoBox) -> bool) {
        for _ in 0..iterations {
            let mut next = self.clone();
            let mut changed = false;

            for y in 0..self.y_count() {
                for x in 0..self.x_count() {
                    if self.state(x, y) != GroundTileType::Water
                        || !may_spread(&self.cell_bounding_box(x, y))
                    {
                        continue;
                    }

                    for (nx, ny) in self.neighbours(x, y) {
                        if self.state(nx, ny) == GroundTileType::Unknown {
                            next.set_state(nx, ny, GroundTileType::Water);
                            changed = true;
                        }
                    }
                }
            }

            *self = next;
            if !changed {
                break;
            }
        }
    }
}
