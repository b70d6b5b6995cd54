pub mod geo;

pub use geo::GeoPoint;
