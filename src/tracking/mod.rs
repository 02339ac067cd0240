//! Photometric tracking: per-frame grid selection, affine patch warping,
//! the iterated photometric filter update and map growth.

mod display;
pub mod grid;
pub mod stage;
pub mod submap;
pub mod tracker;
mod update;
pub mod warp;

pub use stage::Stage;
pub use submap::SubMap;
pub use tracker::VisualTracker;
