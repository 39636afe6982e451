pub mod planar;
pub mod spherical;

// Re-exports for convenience
pub use planar::{PlanarOutcome, PlanarSelectorParams, TilePyramid};
pub use spherical::{CameraPose, SphericalSelection};
