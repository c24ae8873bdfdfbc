use serde::{Deserialize, Serialize};

const CELL_BITS: usize = u64::BITS as usize;

/// Axis aligned rectangle in screen pixels. May extend beyond the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ScreenPixelRectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl ScreenPixelRectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

/// The columns of a rectangle as 64 bit cells, one bit per pixel column,
/// together with its row range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenRectMask {
    first_row: i32,
    last_row: i32,
    first_cell: usize,
    cells: Vec<u64>,
}

impl ScreenRectMask {
    /// Mask of `rect` clipped horizontally to `[0, screen_width)`.
    pub fn new(screen_width: usize, rect: ScreenPixelRectangle) -> Self {
        let first_row = rect.y;
        let last_row = rect.y + rect.height - 1;

        let start = rect.x.max(0) as i64;
        let end = (rect.x as i64 + rect.width as i64).min(screen_width as i64);
        if start >= end {
            return Self {
                first_row,
                last_row,
                first_cell: start as usize / CELL_BITS,
                cells: Vec::new(),
            };
        }

        let (start, end) = (start as usize, end as usize);
        let first_cell = start / CELL_BITS;
        let last_cell = (end - 1) / CELL_BITS;

        let cells = (first_cell..=last_cell)
            .map(|cell| {
                let cell_start = cell * CELL_BITS;
                let from = start.max(cell_start) - cell_start;
                let to = end.min(cell_start + CELL_BITS) - cell_start;
                bit_range(from, to)
            })
            .collect();

        Self {
            first_row,
            last_row,
            first_cell,
            cells,
        }
    }

    pub fn first_row(&self) -> i32 {
        self.first_row
    }

    pub fn last_row(&self) -> i32 {
        self.last_row
    }

    pub fn first_cell(&self) -> usize {
        self.first_cell
    }

    pub fn last_cell(&self) -> usize {
        self.first_cell + self.cells.len().saturating_sub(1)
    }

    /// Bits of the cell with absolute index `index`, zero outside the mask.
    pub fn cell(&self, index: usize) -> u64 {
        index
            .checked_sub(self.first_cell)
            .and_then(|i| self.cells.get(i))
            .copied()
            .unwrap_or(0)
    }

    /// Nothing of the rectangle is on screen.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() || self.first_row > self.last_row
    }
}

/// Bits `from..to` set, `to <= 64`.
fn bit_range(from: usize, to: usize) -> u64 {
    let upper = if to >= CELL_BITS {
        u64::MAX
    } else {
        (1u64 << to) - 1
    };
    upper & !((1u64 << from) - 1)
}

/// One bit per screen pixel marking space already taken by labels.
#[derive(Debug, Clone)]
pub struct ScreenMask {
    width: usize,
    height: usize,
    cells_per_row: usize,
    bitmap: Vec<u64>,
}

impl ScreenMask {
    pub fn new(width: usize, height: usize) -> Self {
        let cells_per_row = width.div_ceil(CELL_BITS);
        Self {
            width,
            height,
            cells_per_row,
            bitmap: vec![0; cells_per_row * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    fn rows(&self, mask: &ScreenRectMask) -> std::ops::Range<usize> {
        let first = mask.first_row.max(0) as usize;
        let last = (mask.last_row as i64 + 1).clamp(0, self.height as i64) as usize;
        first.min(last)..last
    }

    fn cells<'a>(&self, mask: &'a ScreenRectMask) -> impl Iterator<Item = (usize, u64)> + 'a {
        let limit = self.cells_per_row;
        (mask.first_cell..=mask.last_cell())
            .filter(move |&cell| cell < limit)
            .map(move |cell| (cell, mask.cell(cell)))
    }

    pub fn add_mask(&mut self, mask: &ScreenRectMask) {
        if mask.is_empty() {
            return;
        }
        let cells: Vec<_> = self.cells(mask).collect();
        for row in self.rows(mask) {
            let base = row * self.cells_per_row;
            for &(cell, bits) in &cells {
                self.bitmap[base + cell] |= bits;
            }
        }
    }

    pub fn has_collision(&self, mask: &ScreenRectMask) -> bool {
        if mask.is_empty() {
            return false;
        }
        self.rows(mask).any(|row| {
            let base = row * self.cells_per_row;
            self.cells(mask)
                .any(|(cell, bits)| self.bitmap[base + cell] & bits != 0)
        })
    }

    pub fn clear(&mut self) {
        self.bitmap.fill(0);
    }
}
