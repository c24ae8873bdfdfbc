use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// An integer cell or screen position. Orders row-major: by `y`, then `x`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

impl Ord for Pixel {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.y, self.x).cmp(&(other.y, other.x))
    }
}

impl PartialOrd for Pixel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
