use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::geocoding::PipelineSettings;
use crate::models::Coordinate;

/// Fallback reference point (Sofia) when none is configured
const DEFAULT_REFERENCE: (f64, f64) = (42.6977, 23.3219);

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// football-data.org API base URL
    pub football_api_url: String,

    /// football-data.org API token (X-Auth-Token)
    pub football_api_key: String,

    /// Nominatim base URL
    pub geocoder_url: String,

    /// User-Agent sent to the geocoder
    pub geocoder_user_agent: String,

    /// Minimum seconds between geocoding requests
    pub min_request_delay_secs: u64,

    /// Attempts per venue before giving up
    pub max_attempts: u32,

    /// First backoff after a rate-limited attempt, in seconds
    pub backoff_base_secs: u64,

    /// Point distances are measured from
    pub reference: Coordinate,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let reference_lat: f64 = env::var("REFERENCE_LAT")
            .unwrap_or_else(|_| DEFAULT_REFERENCE.0.to_string())
            .parse()
            .context("REFERENCE_LAT must be a valid number")?;

        let reference_lon: f64 = env::var("REFERENCE_LON")
            .unwrap_or_else(|_| DEFAULT_REFERENCE.1.to_string())
            .parse()
            .context("REFERENCE_LON must be a valid number")?;

        let reference = Coordinate::new(reference_lat, reference_lon)
            .context("REFERENCE_LAT/REFERENCE_LON must be a valid coordinate")?;

        Ok(Config {
            football_api_url: env::var("FOOTBALL_API_URL")
                .unwrap_or_else(|_| "https://api.football-data.org/v4".to_string()),

            football_api_key: env::var("FOOTBALL_API_KEY")
                .context("FOOTBALL_API_KEY must be set")?,

            geocoder_url: env::var("GEOCODER_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),

            geocoder_user_agent: env::var("GEOCODER_USER_AGENT")
                .unwrap_or_else(|_| "FootballVenueMapper".to_string()),

            min_request_delay_secs: env::var("MIN_REQUEST_DELAY_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("MIN_REQUEST_DELAY_SECS must be a valid number")?,

            max_attempts: env::var("MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .context("MAX_ATTEMPTS must be a valid number")?,

            backoff_base_secs: env::var("BACKOFF_BASE_SECS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("BACKOFF_BASE_SECS must be a valid number")?,

            reference,
        })
    }

    /// Throttle and retry policy for the geocoding pipeline
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            min_request_delay: Duration::from_secs(self.min_request_delay_secs),
            max_attempts: self.max_attempts,
            backoff_base: Duration::from_secs(self.backoff_base_secs),
        }
    }
}
