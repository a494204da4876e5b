use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::error::ApiError;
use super::PlaceSearch;
use crate::models::Coordinate;

const SERVICE: &str = "nominatim";

/// Client for the Nominatim (OpenStreetMap) search API
pub struct NominatimClient {
    client: Client,
    base_url: String,
    user_agent: String,
}

/// One search candidate; coordinates arrive as decimal strings
#[derive(Debug, Deserialize)]
struct SearchResult {
    lat: Option<String>,
    lon: Option<String>,
    display_name: Option<String>,
}

/// First usable candidate of a free-text search
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodedPlace {
    pub coordinate: Coordinate,

    /// Address as reported by the provider
    pub address: String,

    /// Query text that produced this place
    pub searched_for: String,
}

impl NominatimClient {
    /// Create a new client. Nominatim rejects requests without a User-Agent.
    pub fn new(base_url: &str, user_agent: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            user_agent: user_agent.to_string(),
        }
    }
}

#[async_trait]
impl PlaceSearch for NominatimClient {
    async fn search(&self, query: &str) -> Result<Option<GeocodedPlace>, ApiError> {
        let url = format!(
            "{}/search?format=json&q={}",
            self.base_url,
            urlencoding::encode(query)
        );

        debug!("Geocoding venue: {}", url);

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                service: SERVICE,
                source,
            })?;

        if !response.status().is_success() {
            return Err(ApiError::from_response(SERVICE, response).await);
        }

        let results: Vec<SearchResult> =
            response.json().await.map_err(|source| ApiError::Decode {
                service: SERVICE,
                source,
            })?;

        let Some(first) = results.into_iter().next() else {
            debug!("No geocoding results for '{}'", query);
            return Ok(None);
        };

        let coordinate = match (first.lat.as_deref(), first.lon.as_deref()) {
            (Some(lat), Some(lon)) => Coordinate::parse(lat, lon),
            _ => None,
        };

        let Some(coordinate) = coordinate else {
            warn!("Invalid coordinates for venue '{}'", query);
            return Ok(None);
        };

        Ok(Some(GeocodedPlace {
            coordinate,
            address: first.display_name.unwrap_or_default(),
            searched_for: query.to_string(),
        }))
    }
}
