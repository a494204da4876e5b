pub mod error;
pub mod football_data;
pub mod nominatim;

use async_trait::async_trait;

use crate::models::{DateRange, Match};

pub use error::ApiError;
pub use football_data::FootballDataClient;
pub use nominatim::{GeocodedPlace, NominatimClient};

/// Source of scheduled matches for a date range
#[async_trait]
pub trait MatchSource: Send + Sync {
    async fn fetch_matches(&self, range: &DateRange) -> Result<Vec<Match>, ApiError>;
}

/// Team id to home venue name
#[async_trait]
pub trait TeamVenueLookup: Send + Sync {
    /// `Ok(None)` when the team is unknown or has no venue on record
    async fn venue_name(&self, team_id: i64) -> Result<Option<String>, ApiError>;
}

/// Free-text place search returning the first usable candidate
#[async_trait]
pub trait PlaceSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Option<GeocodedPlace>, ApiError>;
}
