use crate::coord::GeoCoord;
use crate::geo_box::GeoBox;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;

/// Deepest supported magnification level.
pub const MAX_LEVEL: u32 = 30;

/// A discrete zoom step. Level `n` divides the world into `2^n x 2^n` cells.
pub type MagnificationLevel = u32;

/// Size of one cell of the equirectangular tile grid at a given level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellDimension {
    /// Longitude extent in degrees
    pub width: f64,
    /// Latitude extent in degrees
    pub height: f64,
}

/// Cell size at `level`: 360 / 2^level by 180 / 2^level degrees.
///
/// ```
/// use mapscout_types::cell_dimension;
///
/// let dim = cell_dimension(2);
/// assert_eq!(dim.width, 90.0);
/// assert_eq!(dim.height, 45.0);
/// ```
pub fn cell_dimension(level: MagnificationLevel) -> CellDimension {
    let cells = 2f64.powi(level as i32);
    CellDimension {
        width: 360.0 / cells,
        height: 180.0 / cells,
    }
}

/// A map magnification factor, always a power of two in practice.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Magnification {
    magnification: f64,
}

impl Default for Magnification {
    fn default() -> Self {
        Self::WORLD
    }
}

impl Magnification {
    pub const WORLD: Magnification = Magnification::from_level(0);
    pub const CONTINENT: Magnification = Magnification::from_level(4);
    pub const STATE: Magnification = Magnification::from_level(5);
    pub const STATE_OVER: Magnification = Magnification::from_level(6);
    pub const COUNTY: Magnification = Magnification::from_level(7);
    pub const REGION: Magnification = Magnification::from_level(8);
    pub const PROXIMITY: Magnification = Magnification::from_level(9);
    pub const CITY_OVER: Magnification = Magnification::from_level(10);
    pub const CITY: Magnification = Magnification::from_level(11);
    pub const SUBURB: Magnification = Magnification::from_level(12);
    pub const DETAIL: Magnification = Magnification::from_level(13);
    pub const CLOSE: Magnification = Magnification::from_level(14);
    pub const CLOSER: Magnification = Magnification::from_level(15);
    pub const VERY_CLOSE: Magnification = Magnification::from_level(16);
    pub const BLOCK: Magnification = Magnification::from_level(18);
    pub const STREET: Magnification = Magnification::from_level(19);
    pub const HOUSE: Magnification = Magnification::from_level(20);

    pub const fn from_level(level: MagnificationLevel) -> Self {
        Self {
            magnification: (1u64 << level) as f64,
        }
    }

    /// Arbitrary magnification; the level is the integer part of its log2.
    pub fn new(magnification: f64) -> Self {
        Self {
            magnification: magnification.max(1.0),
        }
    }

    pub fn magnification(&self) -> f64 {
        self.magnification
    }

    pub fn level(&self) -> MagnificationLevel {
        (self.magnification.log2().floor() as u32).min(MAX_LEVEL)
    }
}

/// A tile address relative to some magnification level.
///
/// Ordering is row-major: by `y`, then `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileId {
    pub x: u32,
    pub y: u32,
}

impl Ord for TileId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for TileId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl TileId {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// The tile containing `coord` at `level`.
    ///
    /// Coordinates on the east or north edge of the world are clamped into the
    /// last tile so that `0 <= x, y < 2^level` always holds.
    pub fn from_coord(level: MagnificationLevel, coord: &GeoCoord) -> Self {
        let dim = cell_dimension(level);
        let max_index = ((1u64 << level) - 1) as f64;
        let x = ((coord.lon + 180.0) / dim.width).floor().clamp(0.0, max_index);
        let y = ((coord.lat + 90.0) / dim.height).floor().clamp(0.0, max_index);
        Self::new(x as u32, y as u32)
    }

    /// South-west corner of the tile.
    pub fn bottom_left_coord(&self, level: MagnificationLevel) -> GeoCoord {
        let dim = cell_dimension(level);
        GeoCoord::new(
            self.y as f64 * dim.height - 90.0,
            self.x as f64 * dim.width - 180.0,
        )
    }

    pub fn bounding_box(&self, level: MagnificationLevel) -> GeoBox {
        let dim = cell_dimension(level);
        GeoBox::from_bounds(
            self.y as f64 * dim.height - 90.0,
            self.x as f64 * dim.width - 180.0,
            (self.y + 1) as f64 * dim.height - 90.0,
            (self.x + 1) as f64 * dim.width - 180.0,
        )
    }

    pub fn display_text(&self) -> String {
        format!("{}.{}", self.y, self.x)
    }
}

/// A tile id together with its level. Orders by `(level, y, x)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub level: MagnificationLevel,
    pub id: TileId,
}

impl TileKey {
    pub const fn new(level: MagnificationLevel, id: TileId) -> Self {
        Self { level, id }
    }

    pub fn bounding_box(&self) -> GeoBox {
        self.id.bounding_box(self.level)
    }

    /// The key of the tile one level up that covers this one, `None` at level 0.
    pub fn parent(&self) -> Option<TileKey> {
        (self.level > 0).then(|| {
            TileKey::new(self.level - 1, TileId::new(self.id.x / 2, self.id.y / 2))
        })
    }

    pub fn display_text(&self) -> String {
        format!("{}.{}.{}", self.level, self.id.y, self.id.x)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

/// An inclusive rectangle of tile ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileIdBox {
    pub min: TileId,
    pub max: TileId,
}

impl TileIdBox {
    /// Box spanning both tiles, in any order.
    pub fn new(a: TileId, b: TileId) -> Self {
        Self {
            min: TileId::new(a.x.min(b.x), a.y.min(b.y)),
            max: TileId::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// All tiles at `level` touched by `bbox`.
    pub fn from_geo_box(level: MagnificationLevel, bbox: &GeoBox) -> Self {
        Self::new(
            TileId::from_coord(level, &bbox.min_coord()),
            TileId::from_coord(level, &bbox.max_coord()),
        )
    }

    pub fn min_x(&self) -> u32 {
        self.min.x
    }

    pub fn min_y(&self) -> u32 {
        self.min.y
    }

    pub fn max_x(&self) -> u32 {
        self.max.x
    }

    pub fn max_y(&self) -> u32 {
        self.max.y
    }

    pub fn width(&self) -> u32 {
        self.max.x - self.min.x + 1
    }

    pub fn height(&self) -> u32 {
        self.max.y - self.min.y + 1
    }

    pub fn count(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, id: &TileId) -> bool {
        id.x >= self.min.x && id.x <= self.max.x && id.y >= self.min.y && id.y <= self.max.y
    }

    pub fn include(&self, id: &TileId) -> Self {
        Self {
            min: TileId::new(self.min.x.min(id.x), self.min.y.min(id.y)),
            max: TileId::new(self.max.x.max(id.x), self.max.y.max(id.y)),
        }
    }

    /// Common tiles of both boxes, `None` if they are disjoint.
    pub fn intersection(&self, other: &TileIdBox) -> Option<TileIdBox> {
        let min = TileId::new(self.min.x.max(other.min.x), self.min.y.max(other.min.y));
        let max = TileId::new(self.max.x.min(other.max.x), self.max.y.min(other.max.y));
        (min.x <= max.x && min.y <= max.y).then_some(TileIdBox { min, max })
    }

    /// Geographic extent of the whole box.
    pub fn bounding_box(&self, level: MagnificationLevel) -> GeoBox {
        let min = self.min.bottom_left_coord(level);
        let max = TileId::new(self.max.x + 1, self.max.y + 1).bottom_left_coord(level);
        GeoBox::new(min, max)
    }

    /// Tiles in row-major order (y, then x).
    pub fn iter(&self) -> impl Iterator<Item = TileId> + '_ {
        (self.min.y..=self.max.y)
            .flat_map(move |y| (self.min.x..=self.max.x).map(move |x| TileId::new(x, y)))
    }
}

/// Web Mercator ("slippy map") tile numbering as used by online tile servers.
pub struct OsmTile;

impl OsmTile {
    /// Longitude of the western edge of column `x` at `zoom`.
    pub fn tile_to_lon(zoom: u32, x: u32) -> f64 {
        x as f64 / 2f64.powi(zoom as i32) * 360.0 - 180.0
    }

    /// Latitude of the northern edge of row `y` at `zoom`.
    pub fn tile_to_lat(zoom: u32, y: u32) -> f64 {
        let n = PI - 2.0 * PI * y as f64 / 2f64.powi(zoom as i32);
        n.sinh().atan().to_degrees()
    }

    /// Geographic extent of tile `(x, y)` at `zoom`.
    ///
    /// ```
    /// use mapscout_types::OsmTile;
    ///
    /// let bbox = OsmTile::bounding_box(1, 1, 0);
    /// assert_eq!(bbox.min_lon(), 0.0);
    /// assert_eq!(bbox.max_lon(), 180.0);
    /// assert!(bbox.min_lat().abs() < 1e-9);
    /// ```
    pub fn bounding_box(zoom: u32, x: u32, y: u32) -> GeoBox {
        GeoBox::from_bounds(
            Self::tile_to_lat(zoom, y + 1),
            Self::tile_to_lon(zoom, x),
            Self::tile_to_lat(zoom, y),
            Self::tile_to_lon(zoom, x + 1),
        )
    }
}
