//! Physical-space geometry used to place entities on the grid

pub mod point;
pub mod polygon;

pub use point::Point;
pub use polygon::Polygon;
