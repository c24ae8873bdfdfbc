use mapscout_types::{GeoBox, GeoCoord};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Ground state on one side of a coastline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CoastState {
    #[default]
    Undefined = 0,
    Land = 1,
    Water = 2,
    Unknown = 3,
}

impl CoastState {
    /// Equal states, or one of them `Unknown`.
    pub fn compatible(a: CoastState, b: CoastState) -> bool {
        a == b || a == CoastState::Unknown || b == CoastState::Unknown
    }

    /// State of two joined compatible sides; a concrete state wins over `Unknown`.
    pub fn merged(a: CoastState, b: CoastState) -> CoastState {
        if a == CoastState::Unknown { b } else { a }
    }
}

impl fmt::Display for CoastState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CoastState::Undefined => "undefined",
            CoastState::Land => "land",
            CoastState::Water => "water",
            CoastState::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A coastline point. Id 0 marks a synthetic point without an OSM node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoastPoint {
    pub id: u64,
    pub coord: GeoCoord,
}

impl CoastPoint {
    pub const fn new(id: u64, coord: GeoCoord) -> Self {
        Self { id, coord }
    }

    pub const fn synthetic(coord: GeoCoord) -> Self {
        Self { id: 0, coord }
    }
}

/// A coastline or boundary segment, open or closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coast {
    pub id: u64,
    /// Closed ring; the last point connects back to the first
    pub is_area: bool,
    pub sort_criteria: f64,
    pub front_node_id: u64,
    pub back_node_id: u64,
    pub coast: Vec<CoastPoint>,
    pub left: CoastState,
    pub right: CoastState,
}

impl Coast {
    /// Open chain with endpoint ids taken from the points.
    pub fn from_points(id: u64, points: Vec<CoastPoint>, left: CoastState, right: CoastState) -> Self {
        let front_node_id = points.first().map_or(0, |p| p.id);
        let back_node_id = points.last().map_or(0, |p| p.id);
        Self {
            id,
            is_area: false,
            sort_criteria: 0.0,
            front_node_id,
            back_node_id,
            coast: points,
            left,
            right,
        }
    }

    /// Closed ring of the given points.
    pub fn area(id: u64, points: Vec<CoastPoint>, left: CoastState, right: CoastState) -> Self {
        Self {
            is_area: true,
            ..Self::from_points(id, points, left, right)
        }
    }

    /// Closed ring from bare coordinates, all points synthetic.
    pub fn area_from_coords(
        id: u64,
        coords: &[GeoCoord],
        left: CoastState,
        right: CoastState,
    ) -> Self {
        let points = coords.iter().copied().map(CoastPoint::synthetic).collect();
        Self::area(id, points, left, right)
    }

    pub fn len(&self) -> usize {
        self.coast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coast.is_empty()
    }

    pub fn coords(&self) -> impl Iterator<Item = GeoCoord> + '_ {
        self.coast.iter().map(|p| p.coord)
    }

    pub fn bounding_box(&self) -> GeoBox {
        GeoBox::from_coords(self.coast.iter().map(|p| &p.coord))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_compatibility() {
        use CoastState::*;
        assert!(CoastState::compatible(Land, Land));
        assert!(CoastState::compatible(Land, Unknown));
        assert!(CoastState::compatible(Unknown, Water));
        assert!(!CoastState::compatible(Land, Water));
        assert!(!CoastState::compatible(Undefined, Land));

        assert_eq!(CoastState::merged(Unknown, Land), Land);
        assert_eq!(CoastState::merged(Water, Unknown), Water);
        assert_eq!(CoastState::merged(Unknown, Unknown), Unknown);
    }

    #[test]
    fn test_endpoint_ids() {
        let coast = Coast::from_points(
            5,
            vec![
                CoastPoint::new(10, GeoCoord::new(0.0, 0.0)),
                CoastPoint::new(11, GeoCoord::new(1.0, 1.0)),
            ],
            CoastState::Land,
            CoastState::Water,
        );
        assert_eq!((coast.front_node_id, coast.back_node_id), (10, 11));
        assert!(!coast.is_area);
        assert_eq!(coast.bounding_box().max_lat(), 1.0);
    }
}
