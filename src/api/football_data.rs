use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::error::ApiError;
use super::{MatchSource, TeamVenueLookup};
use crate::models::{Competition, DateRange, Match, Team};

const SERVICE: &str = "football-data";

/// Client for the football-data.org v4 REST API (matches and teams)
pub struct FootballDataClient {
    client: Client,
    base_url: String,
    api_key: String,
}

/// Response of `/matches`
#[derive(Debug, Deserialize)]
struct MatchesResponse {
    #[serde(default)]
    matches: Vec<MatchResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchResponse {
    id: i64,
    utc_date: DateTime<Utc>,
    status: Option<String>,
    home_team: TeamResponse,
    away_team: TeamResponse,
    competition: CompetitionResponse,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TeamResponse {
    id: Option<i64>,
    name: Option<String>,
    short_name: Option<String>,
    crest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompetitionResponse {
    id: Option<i64>,
    name: String,
    emblem: Option<String>,
}

/// Response of `/teams/{id}`; only the venue is of interest
#[derive(Debug, Deserialize)]
struct TeamDetailsResponse {
    venue: Option<String>,
}

impl FootballDataClient {
    /// Create a new football-data client
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    /// Convert API match to our model; matches without a home team id cannot be placed
    fn convert_match(&self, data: MatchResponse) -> Option<Match> {
        let home_team = convert_team(data.home_team)?;
        let away_team = convert_team(data.away_team).unwrap_or_else(|| Team {
            id: 0,
            name: "TBD".to_string(),
            short_name: None,
            crest: None,
        });

        Some(Match {
            id: data.id,
            utc_date: data.utc_date,
            status: data.status,
            home_team,
            away_team,
            competition: Competition {
                id: data.competition.id,
                name: data.competition.name,
                emblem: data.competition.emblem,
            },
        })
    }
}

fn convert_team(team: TeamResponse) -> Option<Team> {
    Some(Team {
        id: team.id?,
        name: team.name.unwrap_or_else(|| "TBD".to_string()),
        short_name: team.short_name,
        crest: team.crest,
    })
}

#[async_trait]
impl MatchSource for FootballDataClient {
    /// Fetch matches kicking off within the range, in API order
    async fn fetch_matches(&self, range: &DateRange) -> Result<Vec<Match>, ApiError> {
        let (date_from, date_to) = range.query_params();
        let url = format!(
            "{}/matches?dateFrom={}&dateTo={}",
            self.base_url, date_from, date_to
        );

        debug!("Fetching matches from: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                service: SERVICE,
                source,
            })?;

        if !response.status().is_success() {
            let err = ApiError::from_response(SERVICE, response).await;
            warn!("Failed to fetch matches for {}: {}", range, err);
            return Err(err);
        }

        let body: MatchesResponse = response.json().await.map_err(|source| ApiError::Decode {
            service: SERVICE,
            source,
        })?;

        let total = body.matches.len();
        let matches: Vec<Match> = body
            .matches
            .into_iter()
            .filter(|m| range.contains(m.utc_date))
            .filter_map(|m| self.convert_match(m))
            .collect();

        info!(
            "football-data returned {} matches for {} ({} kept)",
            total,
            range,
            matches.len()
        );

        Ok(matches)
    }
}

#[async_trait]
impl TeamVenueLookup for FootballDataClient {
    /// Look up a team's home venue name
    async fn venue_name(&self, team_id: i64) -> Result<Option<String>, ApiError> {
        let url = format!("{}/teams/{}", self.base_url, team_id);

        debug!("Fetching team venue: {}", url);

        let response = self
            .client
            .get(&url)
            .header("X-Auth-Token", &self.api_key)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                service: SERVICE,
                source,
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(ApiError::from_response(SERVICE, response).await);
        }

        let team: TeamDetailsResponse =
            response.json().await.map_err(|source| ApiError::Decode {
                service: SERVICE,
                source,
            })?;

        Ok(team
            .venue
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty()))
    }
}
