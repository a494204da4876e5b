pub mod distance_ranker;

pub use distance_ranker::{distances, haversine_km, rank, RankedMatch};
