use std::collections::HashMap;

use super::match_info::MatchId;

/// A point on the globe in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    /// Latitude, -90.0 to 90.0
    pub lat: f64,

    /// Longitude, -180.0 to 180.0
    pub lon: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite or out-of-range values
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
        let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);

        (lat_ok && lon_ok).then_some(Self { lat, lon })
    }

    /// Parse the decimal-string pair geocoding providers return
    pub fn parse(lat: &str, lon: &str) -> Option<Self> {
        let lat: f64 = lat.trim().parse().ok()?;
        let lon: f64 = lon.trim().parse().ok()?;
        Self::new(lat, lon)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lon)
    }
}

/// Input to the venue resolver: which team's home ground to locate for which match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VenueQuery {
    pub match_id: MatchId,
    pub team_id: i64,
    /// Team name, only used in log output
    pub team_name: String,
}

/// Where a match's venue ended up after a pipeline run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VenueStatus {
    Resolved(Coordinate),
    /// Tried and gave up; the match stays off the map
    Unresolved,
}

/// Resolved venues keyed by match id. Unresolved matches are absent.
pub type CoordinateMap = HashMap<MatchId, Coordinate>;
