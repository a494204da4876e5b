use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use super::geocoder::Geocoder;
use crate::api::{ApiError, GeocodedPlace, TeamVenueLookup};
use crate::models::VenueQuery;

/// Which step of venue resolution failed
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("venue lookup failed for team {team_id}: {source}")]
    Lookup {
        team_id: i64,
        #[source]
        source: ApiError,
    },

    #[error("geocoding failed for '{venue}': {source}")]
    Geocode {
        venue: String,
        #[source]
        source: ApiError,
    },
}

impl ResolveError {
    /// Rate limits from either service are retried the same way
    pub fn is_rate_limited(&self) -> bool {
        match self {
            ResolveError::Lookup { source, .. } | ResolveError::Geocode { source, .. } => {
                source.is_rate_limited()
            }
        }
    }
}

/// Result of a completed resolution attempt
#[derive(Debug, Clone, PartialEq)]
pub enum VenueOutcome {
    Located { venue: String, place: GeocodedPlace },
    /// No venue on record, or the geocoder had no usable candidate
    NotFound,
}

/// Anything that can place a match's home venue on the map
#[async_trait]
pub trait VenueSource: Send + Sync {
    async fn resolve(&self, query: &VenueQuery) -> Result<VenueOutcome, ResolveError>;
}

/// Team venue lookup followed by geocoding of the venue name
pub struct VenueResolver {
    lookup: Arc<dyn TeamVenueLookup>,
    geocoder: Geocoder,
}

impl VenueResolver {
    pub fn new(lookup: Arc<dyn TeamVenueLookup>, geocoder: Geocoder) -> Self {
        Self { lookup, geocoder }
    }
}

#[async_trait]
impl VenueSource for VenueResolver {
    async fn resolve(&self, query: &VenueQuery) -> Result<VenueOutcome, ResolveError> {
        let venue = self
            .lookup
            .venue_name(query.team_id)
            .await
            .map_err(|source| ResolveError::Lookup {
                team_id: query.team_id,
                source,
            })?;

        let Some(venue) = venue else {
            info!(
                "No venue on record for {} (team {})",
                query.team_name, query.team_id
            );
            return Ok(VenueOutcome::NotFound);
        };

        debug!("Match {}: {} plays at {}", query.match_id, query.team_name, venue);

        let place = self
            .geocoder
            .resolve(&venue)
            .await
            .map_err(|source| ResolveError::Geocode {
                venue: venue.clone(),
                source,
            })?;

        Ok(match place {
            Some(place) => VenueOutcome::Located { venue, place },
            None => VenueOutcome::NotFound,
        })
    }
}
