use serde::{Deserialize, Serialize};
use std::fmt;

/// What a cell, or a polygon inside a cell, consists of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum GroundTileType {
    Unknown = 0,
    Land = 1,
    Water = 2,
    Coast = 3,
}

impl GroundTileType {
    /// Decode a stored type, `None` for values above 3.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(GroundTileType::Unknown),
            1 => Some(GroundTileType::Land),
            2 => Some(GroundTileType::Water),
            3 => Some(GroundTileType::Coast),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroundTileType::Unknown => "unknown",
            GroundTileType::Land => "land",
            GroundTileType::Water => "water",
            GroundTileType::Coast => "coast",
        }
    }
}

impl fmt::Display for GroundTileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point inside a cell, scaled to `0..=CELL_MAX` on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroundCoord {
    pub x: u16,
    pub y: u16,
    /// The edge from this point to the next one follows a coastline.
    /// Border corners and the points where a coastline leaves the cell are
    /// not flagged.
    pub coast: bool,
}

impl GroundCoord {
    pub const CELL_MAX: u16 = 0x7FFF;

    const COAST_FLAG: u16 = 1 << 15;

    pub const fn new(x: u16, y: u16, coast: bool) -> Self {
        Self { x, y, coast }
    }

    /// Encoded x: the coordinate with the coast flag in bit 15.
    pub(crate) fn encoded_x(&self) -> u16 {
        if self.coast {
            self.x | Self::COAST_FLAG
        } else {
            self.x
        }
    }

    pub(crate) fn decode(x: u16, y: u16) -> Self {
        Self {
            x: x & !Self::COAST_FLAG,
            y,
            coast: x & Self::COAST_FLAG != 0,
        }
    }
}

/// One ground region of a water index cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTile {
    /// Cell column in the level's world grid
    pub x_abs: u32,
    pub y_abs: u32,
    /// Cell position relative to the level's stored extent
    pub x_rel: u32,
    pub y_rel: u32,
    pub cell_width: f64,
    pub cell_height: f64,
    pub tile_type: GroundTileType,
    /// Polygon outline, empty for a uniform cell
    pub coords: Vec<GroundCoord>,
}

impl GroundTile {
    /// Geographic coordinate of `coord` inside this tile.
    pub fn to_geo(&self, coord: &GroundCoord) -> mapscout_types::GeoCoord {
        let scale = GroundCoord::CELL_MAX as f64;
        mapscout_types::GeoCoord::new(
            self.y_abs as f64 * self.cell_height - 90.0
                + coord.y as f64 / scale * self.cell_height,
            self.x_abs as f64 * self.cell_width - 180.0 + coord.x as f64 / scale * self.cell_width,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coast_flag_encoding() {
        let coord = GroundCoord::new(GroundCoord::CELL_MAX, 17, true);
        assert_eq!(coord.encoded_x(), 0xFFFF);
        assert_eq!(GroundCoord::decode(0xFFFF, 17), coord);

        let border = GroundCoord::new(12, 0, false);
        assert_eq!(GroundCoord::decode(border.encoded_x(), 0), border);
    }

    #[test]
    fn test_type_decoding() {
        assert_eq!(GroundTileType::from_u8(2), Some(GroundTileType::Water));
        assert_eq!(GroundTileType::from_u8(4), None);
        assert_eq!(GroundTileType::Coast.to_string(), "coast");
    }

    #[test]
    fn test_to_geo() {
        let tile = GroundTile {
            x_abs: 2,
            y_abs: 1,
            x_rel: 0,
            y_rel: 0,
            cell_width: 90.0,
            cell_height: 45.0,
            tile_type: GroundTileType::Land,
            coords: Vec::new(),
        };
        let corner = tile.to_geo(&GroundCoord::new(GroundCoord::CELL_MAX, 0, false));
        assert_eq!(corner.lon, 90.0);
        assert_eq!(corner.lat, -45.0);
    }
}
