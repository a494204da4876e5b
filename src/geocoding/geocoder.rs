use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiError, GeocodedPlace, PlaceSearch};

/// Resolves a venue name to coordinates with a single search request.
///
/// Never retries; the pipeline owns the request cadence.
pub struct Geocoder {
    search: Arc<dyn PlaceSearch>,
}

impl Geocoder {
    pub fn new(search: Arc<dyn PlaceSearch>) -> Self {
        Self { search }
    }

    /// `Ok(None)` when the provider has no usable candidate for the name
    pub async fn resolve(&self, venue_name: &str) -> Result<Option<GeocodedPlace>, ApiError> {
        let venue = venue_name.trim();
        if venue.is_empty() {
            warn!("Refusing to geocode an empty venue name");
            return Ok(None);
        }

        let place = self.search.search(venue).await?;

        match &place {
            Some(p) => debug!("Geocoded '{}' to {} ({})", venue, p.coordinate, p.address),
            None => warn!("No coordinates found for venue '{}'", venue),
        }

        Ok(place)
    }
}
