use serde::{Deserialize, Serialize};
use std::fmt;

/// A geographic coordinate in degrees.
///
/// Latitude comes first, matching the order used throughout the index formats.
///
/// # Examples
///
/// ```
/// use mapscout_types::GeoCoord;
///
/// let a = GeoCoord::new(0.0, 0.0);
/// let b = GeoCoord::new(3.0, 4.0);
/// assert_eq!(a.distance_square(&b), 25.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoCoord {
    /// Latitude in degrees, -90..=90
    pub lat: f64,
    /// Longitude in degrees, -180..=180
    pub lon: f64,
}

impl GeoCoord {
    pub const MIN_LAT: f64 = -90.0;
    pub const MAX_LAT: f64 = 90.0;
    pub const MIN_LON: f64 = -180.0;
    pub const MAX_LON: f64 = 180.0;

    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }

    /// Whether both components are inside the WGS84 value range.
    pub fn is_valid(&self) -> bool {
        (Self::MIN_LAT..=Self::MAX_LAT).contains(&self.lat)
            && (Self::MIN_LON..=Self::MAX_LON).contains(&self.lon)
    }

    /// Squared planar distance in degrees. Only meaningful for ordering
    /// nearby points.
    pub fn distance_square(&self, other: &GeoCoord) -> f64 {
        let dlat = self.lat - other.lat;
        let dlon = self.lon - other.lon;
        dlat * dlat + dlon * dlon
    }

    pub fn display_text(&self) -> String {
        format!("{:.7} {:.7}", self.lat, self.lon)
    }
}

impl fmt::Display for GeoCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

impl From<GeoCoord> for geo::Coord<f64> {
    fn from(coord: GeoCoord) -> Self {
        geo::coord! { x: coord.lon, y: coord.lat }
    }
}

impl From<geo::Coord<f64>> for GeoCoord {
    fn from(coord: geo::Coord<f64>) -> Self {
        GeoCoord::new(coord.y, coord.x)
    }
}

impl From<GeoCoord> for geo::Point<f64> {
    fn from(coord: GeoCoord) -> Self {
        geo::Point::new(coord.lon, coord.lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_conversion_swaps_axes() {
        let coord = GeoCoord::new(52.5, 13.4);
        let c: geo::Coord<f64> = coord.into();
        assert_eq!(c.x, 13.4);
        assert_eq!(c.y, 52.5);
        assert_eq!(GeoCoord::from(c), coord);
    }

    #[test]
    fn test_validity() {
        assert!(GeoCoord::new(90.0, -180.0).is_valid());
        assert!(!GeoCoord::new(90.1, 0.0).is_valid());
        assert!(!GeoCoord::new(0.0, 180.5).is_valid());
    }
}
