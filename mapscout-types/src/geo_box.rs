use crate::coord::GeoCoord;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic bounding box.
///
/// A box is either valid, in which case `min <= max` holds on both axes, or the
/// distinguished invalid box returned by [`GeoBox::invalid`]. Boxes are values:
/// operations such as [`GeoBox::include`] return a new box.
///
/// # Examples
///
/// ```
/// use mapscout_types::{GeoBox, GeoCoord};
///
/// let bbox = GeoBox::new(GeoCoord::new(1.0, 2.0), GeoCoord::new(-1.0, -2.0));
/// assert_eq!(bbox.min_lat(), -1.0);
/// assert_eq!(bbox.max_lon(), 2.0);
///
/// assert!(!GeoBox::invalid().is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBox {
    min: GeoCoord,
    max: GeoCoord,
    valid: bool,
}

impl Default for GeoBox {
    fn default() -> Self {
        Self::invalid()
    }
}

impl GeoBox {
    /// Create a box spanning the two corners, in any order.
    pub fn new(a: GeoCoord, b: GeoCoord) -> Self {
        Self {
            min: GeoCoord::new(a.lat.min(b.lat), a.lon.min(b.lon)),
            max: GeoCoord::new(a.lat.max(b.lat), a.lon.max(b.lon)),
            valid: true,
        }
    }

    /// Create a box from its latitude/longitude bounds.
    pub fn from_bounds(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self::new(GeoCoord::new(min_lat, min_lon), GeoCoord::new(max_lat, max_lon))
    }

    pub const fn invalid() -> Self {
        Self {
            min: GeoCoord::new(0.0, 0.0),
            max: GeoCoord::new(0.0, 0.0),
            valid: false,
        }
    }

    /// The whole WGS84 range.
    pub fn world() -> Self {
        Self::from_bounds(
            GeoCoord::MIN_LAT,
            GeoCoord::MIN_LON,
            GeoCoord::MAX_LAT,
            GeoCoord::MAX_LON,
        )
    }

    /// Smallest box containing all coordinates, invalid for an empty input.
    pub fn from_coords<'a, I>(coords: I) -> Self
    where
        I: IntoIterator<Item = &'a GeoCoord>,
    {
        coords
            .into_iter()
            .fold(Self::invalid(), |bbox, coord| bbox.include_coord(coord))
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn min_coord(&self) -> GeoCoord {
        self.min
    }

    pub fn max_coord(&self) -> GeoCoord {
        self.max
    }

    pub fn min_lat(&self) -> f64 {
        self.min.lat
    }

    pub fn min_lon(&self) -> f64 {
        self.min.lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max.lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max.lon
    }

    /// Longitude extent in degrees.
    pub fn width(&self) -> f64 {
        self.max.lon - self.min.lon
    }

    /// Latitude extent in degrees.
    pub fn height(&self) -> f64 {
        self.max.lat - self.min.lat
    }

    pub fn center(&self) -> GeoCoord {
        GeoCoord::new(
            (self.min.lat + self.max.lat) / 2.0,
            (self.min.lon + self.max.lon) / 2.0,
        )
    }

    /// Corners in clockwise order starting at the top left.
    pub fn corners(&self) -> [GeoCoord; 4] {
        [
            GeoCoord::new(self.max.lat, self.min.lon),
            GeoCoord::new(self.max.lat, self.max.lon),
            GeoCoord::new(self.min.lat, self.max.lon),
            GeoCoord::new(self.min.lat, self.min.lon),
        ]
    }

    /// Grow the box so that it contains `coord`.
    pub fn include_coord(&self, coord: &GeoCoord) -> Self {
        if !self.valid {
            return Self::new(*coord, *coord);
        }
        Self::new(
            GeoCoord::new(self.min.lat.min(coord.lat), self.min.lon.min(coord.lon)),
            GeoCoord::new(self.max.lat.max(coord.lat), self.max.lon.max(coord.lon)),
        )
    }

    /// Grow the box so that it contains `other`. Invalid boxes are neutral.
    pub fn include(&self, other: &GeoBox) -> Self {
        match (self.valid, other.valid) {
            (false, _) => *other,
            (_, false) => *self,
            _ => self.include_coord(&other.min).include_coord(&other.max),
        }
    }

    /// Whether `coord` lies inside or on the border of the box.
    pub fn contains(&self, coord: &GeoCoord) -> bool {
        self.valid
            && coord.lat >= self.min.lat
            && coord.lat <= self.max.lat
            && coord.lon >= self.min.lon
            && coord.lon <= self.max.lon
    }

    /// Whether the boxes share at least one point. Touching edges count.
    pub fn intersects(&self, other: &GeoBox) -> bool {
        self.valid
            && other.valid
            && !(other.max.lon < self.min.lon
                || other.min.lon > self.max.lon
                || other.max.lat < self.min.lat
                || other.min.lat > self.max.lat)
    }

    /// Whether the boxes share interior area. Touching edges do not count.
    pub fn intersects_strict(&self, other: &GeoBox) -> bool {
        self.valid
            && other.valid
            && other.min.lon < self.max.lon
            && other.max.lon > self.min.lon
            && other.min.lat < self.max.lat
            && other.max.lat > self.min.lat
    }

    /// The box as a `geo::Rect` (x = longitude), `None` when invalid.
    pub fn to_rect(&self) -> Option<geo::Rect<f64>> {
        self.valid
            .then(|| geo::Rect::new(geo::Coord::from(self.min), geo::Coord::from(self.max)))
    }

    pub fn display_text(&self) -> String {
        if !self.valid {
            return "[invalid]".to_string();
        }
        format!("[{} - {}]", self.min.display_text(), self.max.display_text())
    }
}

impl fmt::Display for GeoBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

impl From<geo::Rect<f64>> for GeoBox {
    fn from(rect: geo::Rect<f64>) -> Self {
        GeoBox::new(rect.min().into(), rect.max().into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_starts_from_invalid() {
        let coords = [
            GeoCoord::new(1.0, 5.0),
            GeoCoord::new(-2.0, 3.0),
            GeoCoord::new(0.5, 7.0),
        ];
        let bbox = GeoBox::from_coords(&coords);
        assert!(bbox.is_valid());
        assert_eq!(bbox.min_coord(), GeoCoord::new(-2.0, 3.0));
        assert_eq!(bbox.max_coord(), GeoCoord::new(1.0, 7.0));

        let empty: [GeoCoord; 0] = [];
        assert!(!GeoBox::from_coords(&empty).is_valid());
    }

    #[test]
    fn test_edge_touch_policies() {
        let a = GeoBox::from_bounds(0.0, 0.0, 1.0, 1.0);
        let b = GeoBox::from_bounds(0.0, 1.0, 1.0, 2.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects_strict(&b));

        let c = GeoBox::from_bounds(0.5, 0.5, 2.0, 2.0);
        assert!(a.intersects_strict(&c));
    }

    #[test]
    fn test_invalid_never_intersects() {
        let a = GeoBox::world();
        assert!(!a.intersects(&GeoBox::invalid()));
        assert!(!GeoBox::invalid().contains(&GeoCoord::new(0.0, 0.0)));
        assert_eq!(GeoBox::invalid().include(&a), a);
    }
}
