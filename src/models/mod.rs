pub mod coordinate;
pub mod date_range;
pub mod match_info;

pub use coordinate::{Coordinate, CoordinateMap, VenueQuery, VenueStatus};
pub use date_range::{DateRange, RangeError};
pub use match_info::{Competition, Match, MatchId, Team};
