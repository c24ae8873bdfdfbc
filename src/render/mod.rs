//! Helpers shared with label placement.

mod screen_mask;

pub use screen_mask::{ScreenMask, ScreenPixelRectangle, ScreenRectMask};
