//! Spatial indexes mapping a geographic box and a set of object types to
//! offsets in an object data file.
//!
//! [`AreaIndex`] is a per-type bitmap over a tile grid and serves nodes and
//! ways. [`AreaAreaIndex`] is a quad-tree pyramid for areas, which are stored
//! at the deepest level whose cell still contains them completely.
//!
//! Both readers may return extra candidates that the caller has to check
//! geometrically, but never miss an object whose box intersects the query.

mod area_area_index;
mod area_area_index_writer;
mod area_index;
mod area_index_writer;

pub use area_area_index::{AreaAreaCell, AreaAreaIndex, AreaAreaLookup};
pub use area_area_index_writer::AreaAreaIndexGenerator;
pub use area_index::{AreaIndex, AreaLookup, TypeData};
pub use area_index_writer::AreaIndexGenerator;

use std::time::Duration;

/// Queries slower than this are logged.
pub(crate) const SLOW_QUERY: Duration = Duration::from_millis(100);

/// An object as seen by the index generators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexEntry {
    pub type_id: crate::types::TypeId,
    pub bounding_box: mapscout_types::GeoBox,
    pub offset: crate::io::FileOffset,
}

impl IndexEntry {
    pub fn new(
        type_id: crate::types::TypeId,
        bounding_box: mapscout_types::GeoBox,
        offset: crate::io::FileOffset,
    ) -> Self {
        Self {
            type_id,
            bounding_box,
            offset,
        }
    }
}
