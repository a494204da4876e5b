use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, MatchSource};
use crate::geocoding::{CancellationToken, GeocodingPipeline, VenueUpdate};
use crate::models::{
    Coordinate, CoordinateMap, DateRange, Match, MatchId, RangeError, VenueStatus,
};
use crate::ranking::{self, RankedMatch};

/// Why a submitted query produced no match list
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid date range: {0}")]
    InvalidRange(#[from] RangeError),

    #[error("failed to fetch matches: {0}")]
    MatchFetch(#[source] ApiError),

    #[error("query was superseded by a newer one")]
    Superseded,
}

/// Where the current query is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
    /// No range submitted (or reset)
    Idle,
    /// Fetching the match list
    Loading,
    /// Matches known, venues still being resolved
    Geocoding,
    /// Every match has been tried; distances are final
    Ready,
    /// The match list could not be fetched
    Failed(String),
}

/// What the presentation layer sees
#[derive(Debug, Clone)]
pub struct QueryView {
    pub generation: u64,
    pub range: Option<DateRange>,
    pub matches: Vec<Match>,
    pub coordinates: Arc<CoordinateMap>,
    pub status: QueryStatus,
    pub selected: Option<MatchId>,
}

struct QueryState {
    generation: u64,
    range: Option<DateRange>,
    matches: Vec<Match>,
    /// Replaced wholesale on every publication, never edited in place
    coordinates: Arc<CoordinateMap>,
    status: QueryStatus,
    selected: Option<MatchId>,
    /// Token of the active run, if any
    token: Option<CancellationToken>,
}

impl QueryState {
    fn new() -> Self {
        Self {
            generation: 0,
            range: None,
            matches: Vec::new(),
            coordinates: Arc::new(CoordinateMap::new()),
            status: QueryStatus::Idle,
            selected: None,
            token: None,
        }
    }

    /// Cancel the active run and start a new generation with empty results
    fn supersede(&mut self, range: Option<DateRange>, status: QueryStatus) -> u64 {
        if let Some(previous) = self.token.take() {
            previous.cancel();
            info!("Cancelled geocoding for query {}", self.generation);
        }

        self.generation += 1;
        self.range = range;
        self.matches = Vec::new();
        self.coordinates = Arc::new(CoordinateMap::new());
        self.selected = None;
        self.status = status;
        self.generation
    }
}

/// Handle to a submitted query's background geocoding
pub struct QueryHandle {
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl QueryHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Wait for the query's geocoding to finish (or be cancelled)
    pub async fn finished(self) {
        if let Some(task) = self.task {
            if let Err(e) = task.await {
                error!("Geocoding task for query {} failed: {}", self.generation, e);
            }
        }
    }
}

/// Owns the current date range and the single active geocoding run
#[derive(Clone)]
pub struct QueryController {
    matches_api: Arc<dyn MatchSource>,
    pipeline: Arc<GeocodingPipeline>,
    state: Arc<RwLock<QueryState>>,
}

impl QueryController {
    /// Create a new controller with no active query
    pub fn new(matches_api: Arc<dyn MatchSource>, pipeline: Arc<GeocodingPipeline>) -> Self {
        Self {
            matches_api,
            pipeline,
            state: Arc::new(RwLock::new(QueryState::new())),
        }
    }

    /// Validate two `YYYY-MM-DD` dates and submit them as a range
    pub async fn submit_dates(&self, from: &str, to: &str) -> Result<QueryHandle, QueryError> {
        let range = DateRange::parse(from, to)?;
        self.submit(range).await
    }

    /// Replace the current query with `range`.
    ///
    /// Any run still in flight is cancelled before the match list is
    /// requested, and its results are never published.
    pub async fn submit(&self, range: DateRange) -> Result<QueryHandle, QueryError> {
        let (generation, token) = {
            let mut state = self.state.write().await;
            let generation = state.supersede(Some(range), QueryStatus::Loading);
            let token = CancellationToken::new();
            state.token = Some(token.clone());
            (generation, token)
        };

        info!("Query {}: loading matches for {}", generation, range);

        let fetched = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(QueryError::Superseded),
            result = self.matches_api.fetch_matches(&range) => result,
        };

        let matches = match fetched {
            Ok(matches) => matches,
            Err(e) => {
                error!("Query {}: failed to fetch matches: {}", generation, e);
                let mut state = self.state.write().await;
                if state.generation == generation {
                    state.status = QueryStatus::Failed(e.to_string());
                    state.token = None;
                }
                return Err(QueryError::MatchFetch(e));
            }
        };

        {
            let mut state = self.state.write().await;
            if state.generation != generation {
                return Err(QueryError::Superseded);
            }

            state.matches = matches.clone();

            if matches.is_empty() {
                info!("Query {}: no matches for {}", generation, range);
                state.status = QueryStatus::Ready;
                state.token = None;
                return Ok(QueryHandle {
                    generation,
                    task: None,
                });
            }

            state.status = QueryStatus::Geocoding;
        }

        info!("Query {}: {} matches, geocoding venues", generation, matches.len());

        let pipeline = Arc::clone(&self.pipeline);
        let shared = Arc::clone(&self.state);

        let task = tokio::spawn(async move {
            let (update_tx, update_rx) = mpsc::unbounded_channel();

            let (report, ()) = tokio::join!(
                pipeline.run_with_updates(&matches, &token, update_tx),
                publish_updates(&shared, generation, &token, update_rx),
            );

            let mut state = shared.write().await;
            if state.generation != generation || token.is_cancelled() {
                debug!(
                    "Dropping {} coordinates from superseded query {}",
                    report.coordinates.len(),
                    generation
                );
                return;
            }

            info!(
                "Query {}: {} of {} venues located",
                generation,
                report.coordinates.len(),
                matches.len()
            );

            state.coordinates = Arc::new(report.coordinates);
            state.status = QueryStatus::Ready;
            state.token = None;
        });

        Ok(QueryHandle {
            generation,
            task: Some(task),
        })
    }

    /// Cancel whatever is running and go back to the idle state
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        let generation = state.supersede(None, QueryStatus::Idle);
        debug!("Reset to query generation {}", generation);
    }

    /// Current state for display
    pub async fn snapshot(&self) -> QueryView {
        let state = self.state.read().await;
        QueryView {
            generation: state.generation,
            range: state.range,
            matches: state.matches.clone(),
            coordinates: Arc::clone(&state.coordinates),
            status: state.status.clone(),
            selected: state.selected,
        }
    }

    /// Distance of every current match from `reference`, `None` where unresolved
    pub async fn distances(&self, reference: Coordinate) -> HashMap<MatchId, Option<f64>> {
        let state = self.state.read().await;
        ranking::distances(reference, &state.coordinates, &state.matches)
    }

    /// Matches nearest-first, or `None` while distances are still incomplete
    pub async fn sorted_by_distance(&self, reference: Coordinate) -> Option<Vec<RankedMatch>> {
        let state = self.state.read().await;
        if state.status != QueryStatus::Ready {
            return None;
        }
        Some(ranking::rank(reference, &state.coordinates, &state.matches))
    }

    /// Mark a match as selected and return where to centre the map
    pub async fn select(&self, match_id: MatchId) -> Option<Coordinate> {
        let mut state = self.state.write().await;
        if !state.matches.iter().any(|m| m.id == match_id) {
            warn!("Match {} is not part of the current query", match_id);
            return None;
        }

        state.selected = Some(match_id);
        state.coordinates.get(&match_id).copied()
    }
}

/// Publish each located venue while the run is still going
async fn publish_updates(
    shared: &RwLock<QueryState>,
    generation: u64,
    token: &CancellationToken,
    mut updates: mpsc::UnboundedReceiver<VenueUpdate>,
) {
    while let Some(update) = updates.recv().await {
        let VenueStatus::Resolved(coordinate) = update.status else {
            continue;
        };

        let mut state = shared.write().await;
        if state.generation != generation || token.is_cancelled() {
            debug!(
                "Dropping match {} from superseded query {}",
                update.match_id, generation
            );
            continue;
        }

        let mut coordinates = CoordinateMap::clone(&state.coordinates);
        coordinates.insert(update.match_id, coordinate);
        state.coordinates = Arc::new(coordinates);
    }
}
