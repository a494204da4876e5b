use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::cancel::CancellationToken;
use super::venue_resolver::{VenueOutcome, VenueSource};
use crate::models::{CoordinateMap, Match, MatchId, VenueQuery, VenueStatus};

/// Request cadence and retry policy for a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Minimum gap between a completed resolution and the next request
    pub min_request_delay: Duration,

    /// Attempts per match, including the first
    pub max_attempts: u32,

    /// Backoff after the first rate-limited attempt; doubles on each further one
    pub backoff_base: Duration,
}

impl PipelineSettings {
    /// Wait after a rate-limited attempt with 0-based index `attempt`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            min_request_delay: Duration::from_secs(20),
            max_attempts: 3,
            backoff_base: Duration::from_secs(20),
        }
    }
}

/// Everything a run learned, including what the coordinate map leaves out
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    /// Resolved venues only
    pub coordinates: CoordinateMap,

    /// Status of every match that was tried; untried matches are absent
    pub statuses: HashMap<MatchId, VenueStatus>,

    /// Resolution attempts spent per tried match
    pub attempts: HashMap<MatchId, u32>,

    /// Whether the run stopped early on cancellation
    pub cancelled: bool,
}

impl PipelineReport {
    /// Matches that were tried and left off the map
    pub fn unresolved(&self) -> Vec<MatchId> {
        let mut ids: Vec<MatchId> = self
            .statuses
            .iter()
            .filter(|(_, status)| matches!(status, VenueStatus::Unresolved))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Final status of one match, sent as soon as it is known
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VenueUpdate {
    pub match_id: MatchId,
    pub status: VenueStatus,
}

/// Per-match retry state machine
#[derive(Debug, Clone, Copy, PartialEq)]
enum Step {
    /// Waiting out the inter-request delay before attempt `n`
    Throttling(u32),
    Attempting(u32),
    /// Attempt `n` was rate limited
    Backoff(u32),
    Finished(VenueStatus),
}

/// Resolves venues for a list of matches one request at a time
pub struct GeocodingPipeline {
    source: Arc<dyn VenueSource>,
    settings: PipelineSettings,
}

impl GeocodingPipeline {
    pub fn new(source: Arc<dyn VenueSource>, settings: PipelineSettings) -> Self {
        Self { source, settings }
    }

    /// Resolve venues in input order and return the coordinates found.
    ///
    /// Per-match failures leave that match out of the map. On cancellation
    /// the matches resolved so far are returned.
    pub async fn run(&self, matches: &[Match], token: &CancellationToken) -> CoordinateMap {
        self.run_with_report(matches, token).await.coordinates
    }

    /// Same as [`run`](Self::run) but keeps unresolved statuses and attempt counts
    pub async fn run_with_report(
        &self,
        matches: &[Match],
        token: &CancellationToken,
    ) -> PipelineReport {
        self.execute(matches, token, None).await
    }

    /// Same as [`run_with_report`](Self::run_with_report), also sending each
    /// match's final status on `updates` as soon as it is reached.
    ///
    /// The sender is dropped when the run ends, which closes the channel.
    pub async fn run_with_updates(
        &self,
        matches: &[Match],
        token: &CancellationToken,
        updates: mpsc::UnboundedSender<VenueUpdate>,
    ) -> PipelineReport {
        self.execute(matches, token, Some(&updates)).await
    }

    async fn execute(
        &self,
        matches: &[Match],
        token: &CancellationToken,
        updates: Option<&mpsc::UnboundedSender<VenueUpdate>>,
    ) -> PipelineReport {
        let mut report = PipelineReport::default();

        if matches.is_empty() {
            return report;
        }

        info!("Geocoding venues for {} matches", matches.len());

        let mut last_request: Option<Instant> = None;

        for (index, m) in matches.iter().enumerate() {
            if token.is_cancelled() {
                info!(
                    "Geocoding cancelled before match {} ({}/{})",
                    m.id,
                    index + 1,
                    matches.len()
                );
                report.cancelled = true;
                break;
            }

            let query = VenueQuery {
                match_id: m.id,
                team_id: m.home_team.id,
                team_name: m.home_team.name.clone(),
            };

            let mut attempts = 0;
            let status = self
                .resolve_match(&query, token, &mut last_request, &mut attempts)
                .await;

            if attempts > 0 {
                report.attempts.insert(m.id, attempts);
            }

            match status {
                Some(status) => {
                    if let VenueStatus::Resolved(coordinate) = status {
                        report.coordinates.insert(m.id, coordinate);
                    }
                    report.statuses.insert(m.id, status);

                    if let Some(tx) = updates {
                        let update = VenueUpdate {
                            match_id: m.id,
                            status,
                        };
                        if tx.send(update).is_err() {
                            debug!("Update receiver dropped, match {} not sent", m.id);
                        }
                    }
                }
                None => {
                    info!("Geocoding cancelled while processing match {}", m.id);
                    report.cancelled = true;
                    break;
                }
            }
        }

        info!(
            "Geocoding finished: {} resolved, {} unresolved, {} untried{}",
            report.coordinates.len(),
            report.unresolved().len(),
            matches.len() - report.statuses.len(),
            if report.cancelled { " (cancelled)" } else { "" }
        );

        report
    }

    /// Drive one match through the retry state machine.
    ///
    /// Returns `None` if cancelled before a final status was reached.
    async fn resolve_match(
        &self,
        query: &VenueQuery,
        token: &CancellationToken,
        last_request: &mut Option<Instant>,
        attempts: &mut u32,
    ) -> Option<VenueStatus> {
        let max_attempts = self.settings.max_attempts.max(1);
        let mut step = Step::Throttling(0);

        loop {
            step = match step {
                Step::Throttling(attempt) => {
                    if !self.throttle(*last_request, token).await {
                        return None;
                    }
                    Step::Attempting(attempt)
                }

                Step::Attempting(attempt) => {
                    *attempts = attempt + 1;

                    let result = tokio::select! {
                        biased;
                        _ = token.cancelled() => return None,
                        result = self.source.resolve(query) => result,
                    };

                    match result {
                        Ok(VenueOutcome::Located { venue, place }) => {
                            *last_request = Some(Instant::now());
                            info!(
                                "Match {}: {} -> {}",
                                query.match_id, venue, place.coordinate
                            );
                            Step::Finished(VenueStatus::Resolved(place.coordinate))
                        }
                        Ok(VenueOutcome::NotFound) => {
                            *last_request = Some(Instant::now());
                            warn!(
                                "Match {}: no coordinates for {}'s venue",
                                query.match_id, query.team_name
                            );
                            Step::Finished(VenueStatus::Unresolved)
                        }
                        Err(e) if e.is_rate_limited() => {
                            warn!(
                                "Match {}: rate limited on attempt {}/{}",
                                query.match_id,
                                attempt + 1,
                                max_attempts
                            );
                            Step::Backoff(attempt)
                        }
                        Err(e) => {
                            warn!("Skipping match {}: {}", query.match_id, e);
                            Step::Finished(VenueStatus::Unresolved)
                        }
                    }
                }

                Step::Backoff(attempt) => {
                    let delay = self.settings.backoff_delay(attempt);
                    debug!("Match {}: backing off for {:?}", query.match_id, delay);

                    if !token.sleep(delay).await {
                        return None;
                    }

                    let next = attempt + 1;
                    if next >= max_attempts {
                        error!(
                            "Failed to resolve venue for match {} after {} attempts",
                            query.match_id, max_attempts
                        );
                        Step::Finished(VenueStatus::Unresolved)
                    } else {
                        Step::Throttling(next)
                    }
                }

                Step::Finished(status) => return Some(status),
            };
        }
    }

    /// Wait until the minimum delay since the last request has passed.
    ///
    /// Returns `false` if cancelled while waiting.
    async fn throttle(&self, last_request: Option<Instant>, token: &CancellationToken) -> bool {
        let Some(last) = last_request else {
            return true;
        };

        let elapsed = last.elapsed();
        if elapsed >= self.settings.min_request_delay {
            return true;
        }

        let wait = self.settings.min_request_delay - elapsed;
        debug!("Throttling next request for {:?}", wait);
        token.sleep(wait).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ApiError, GeocodedPlace};
    use crate::geocoding::venue_resolver::ResolveError;
    use crate::models::{Competition, Coordinate, Team};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reqwest::StatusCode;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, Copy)]
    enum Reply {
        Locate,
        NotFound,
        RateLimited,
        ServerError,
    }

    /// Replays a scripted reply per team and records when each call happened
    struct ScriptedSource {
        scripts: Mutex<HashMap<i64, VecDeque<Reply>>>,
        calls: Mutex<Vec<(MatchId, Instant)>>,
    }

    impl ScriptedSource {
        fn new(scripts: Vec<(i64, Vec<Reply>)>) -> Arc<Self> {
            let scripts = scripts
                .into_iter()
                .map(|(team, replies)| (team, replies.into_iter().collect()))
                .collect();
            Arc::new(Self {
                scripts: Mutex::new(scripts),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(MatchId, Instant)> {
            self.calls.lock().unwrap().clone()
        }

        fn calls_for(&self, match_id: MatchId) -> Vec<Instant> {
            self.calls()
                .into_iter()
                .filter(|(id, _)| *id == match_id)
                .map(|(_, at)| at)
                .collect()
        }
    }

    #[async_trait]
    impl VenueSource for ScriptedSource {
        async fn resolve(&self, query: &VenueQuery) -> Result<VenueOutcome, ResolveError> {
            self.calls
                .lock()
                .unwrap()
                .push((query.match_id, Instant::now()));

            let reply = self
                .scripts
                .lock()
                .unwrap()
                .get_mut(&query.team_id)
                .and_then(|replies| replies.pop_front())
                .unwrap_or(Reply::Locate);

            match reply {
                Reply::Locate => Ok(VenueOutcome::Located {
                    venue: format!("Stadium {}", query.team_id),
                    place: GeocodedPlace {
                        coordinate: venue_coordinate(query.team_id),
                        address: String::new(),
                        searched_for: format!("Stadium {}", query.team_id),
                    },
                }),
                Reply::NotFound => Ok(VenueOutcome::NotFound),
                Reply::RateLimited => Err(ResolveError::Geocode {
                    venue: format!("Stadium {}", query.team_id),
                    source: ApiError::RateLimited {
                        service: "nominatim",
                    },
                }),
                Reply::ServerError => Err(ResolveError::Lookup {
                    team_id: query.team_id,
                    source: ApiError::Status {
                        service: "football-data",
                        status: StatusCode::INTERNAL_SERVER_ERROR,
                        body: String::new(),
                    },
                }),
            }
        }
    }

    fn venue_coordinate(team_id: i64) -> Coordinate {
        Coordinate::new(40.0 + team_id as f64 / 10.0, 10.0).unwrap()
    }

    /// Match `id` hosted by team `id * 10`
    fn fixture(id: MatchId) -> Match {
        Match {
            id,
            utc_date: Utc.with_ymd_and_hms(2025, 3, 1, 15, 0, 0).unwrap(),
            status: Some("SCHEDULED".to_string()),
            home_team: Team {
                id: id * 10,
                name: format!("Home {}", id),
                short_name: None,
                crest: None,
            },
            away_team: Team {
                id: id * 10 + 1,
                name: format!("Away {}", id),
                short_name: None,
                crest: None,
            },
            competition: Competition {
                id: Some(2021),
                name: "Premier League".to_string(),
                emblem: None,
            },
        }
    }

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    /// Paused-clock gaps land exactly on the expected value, give or take timer rounding
    fn assert_gap(actual: Duration, expected: Duration) {
        assert!(
            actual >= expected && actual < expected + Duration::from_millis(5),
            "expected gap of {:?}, got {:?}",
            expected,
            actual
        );
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let settings = PipelineSettings::default();
        assert_eq!(settings.backoff_delay(0), secs(20));
        assert_eq!(settings.backoff_delay(1), secs(40));
        assert_eq!(settings.backoff_delay(2), secs(80));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_match_list_makes_no_requests() {
        let source = ScriptedSource::new(Vec::new());
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());

        let coords = pipeline.run(&[], &CancellationToken::new()).await;

        assert!(coords.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_consecutive_requests() {
        let source = ScriptedSource::new(Vec::new());
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let matches: Vec<Match> = (1..=3).map(fixture).collect();

        let coords = pipeline.run(&matches, &CancellationToken::new()).await;

        assert_eq!(coords.len(), 3);
        assert_eq!(coords[&2], venue_coordinate(20));

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        for pair in calls.windows(2) {
            assert_gap(pair[1].1 - pair[0].1, secs(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_twice_then_resolved() {
        let source = ScriptedSource::new(vec![(10, vec![Reply::RateLimited; 2])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());

        let report = pipeline
            .run_with_report(&[fixture(1)], &CancellationToken::new())
            .await;

        assert_eq!(report.coordinates.get(&1), Some(&venue_coordinate(10)));
        assert_eq!(report.attempts[&1], 3);

        let calls = source.calls_for(1);
        assert_eq!(calls.len(), 3);
        assert_gap(calls[1] - calls[0], secs(20));
        assert_gap(calls[2] - calls[1], secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_cap_leaves_match_unresolved_and_continues() {
        let source = ScriptedSource::new(vec![(10, vec![Reply::RateLimited; 3])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());

        let report = pipeline
            .run_with_report(&[fixture(1), fixture(2)], &CancellationToken::new())
            .await;

        assert_eq!(source.calls_for(1).len(), 3);
        assert_eq!(report.attempts[&1], 3);
        assert_eq!(report.statuses[&1], VenueStatus::Unresolved);
        assert!(!report.coordinates.contains_key(&1));

        assert!(report.coordinates.contains_key(&2));
        assert_eq!(report.unresolved(), vec![1]);
        assert!(!report.cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_failures_are_not_retried() {
        let source = ScriptedSource::new(vec![(10, vec![Reply::ServerError])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let started = Instant::now();

        let report = pipeline
            .run_with_report(&[fixture(1), fixture(2)], &CancellationToken::new())
            .await;

        assert_eq!(source.calls_for(1).len(), 1);
        assert_eq!(report.attempts[&1], 1);
        assert_eq!(report.statuses[&1], VenueStatus::Unresolved);
        assert!(report.coordinates.contains_key(&2));

        // A failed attempt does not count as a request for throttling purposes
        assert!(started.elapsed() < secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_is_final_and_throttles_next() {
        let source = ScriptedSource::new(vec![(10, vec![Reply::NotFound])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());

        let report = pipeline
            .run_with_report(&[fixture(1), fixture(2)], &CancellationToken::new())
            .await;

        assert_eq!(report.attempts[&1], 1);
        assert_eq!(report.statuses[&1], VenueStatus::Unresolved);
        assert_eq!(report.coordinates.keys().collect::<Vec<_>>(), vec![&2]);

        let calls = source.calls();
        assert_gap(calls[1].1 - calls[0].1, secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_preserves_earlier_results() {
        let source = ScriptedSource::new(Vec::new());
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let matches: Vec<Match> = (1..=4).map(fixture).collect();
        let token = CancellationToken::new();
        let started = Instant::now();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(30)).await;
            canceller.cancel();
        });

        let report = pipeline.run_with_report(&matches, &token).await;

        assert!(report.cancelled);
        assert_eq!(source.calls().len(), 2);

        let mut resolved: Vec<MatchId> = report.coordinates.keys().copied().collect();
        resolved.sort_unstable();
        assert_eq!(resolved, vec![1, 2]);
        assert!(!report.statuses.contains_key(&3));
        assert!(!report.statuses.contains_key(&4));

        // The pending throttle wait was abandoned, not waited out
        assert!(started.elapsed() < secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_interrupts_backoff() {
        let source = ScriptedSource::new(vec![(10, vec![Reply::RateLimited; 3])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let token = CancellationToken::new();
        let started = Instant::now();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(secs(5)).await;
            canceller.cancel();
        });

        let report = pipeline
            .run_with_report(&[fixture(1), fixture(2)], &token)
            .await;

        assert!(report.cancelled);
        assert!(report.coordinates.is_empty());
        assert_eq!(source.calls().len(), 1);
        assert!(started.elapsed() < secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_token_makes_no_requests() {
        let source = ScriptedSource::new(Vec::new());
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let token = CancellationToken::new();
        token.cancel();

        let report = pipeline.run_with_report(&[fixture(1)], &token).await;

        assert!(report.cancelled);
        assert!(report.coordinates.is_empty());
        assert!(source.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_sent_per_match_in_order() {
        let source = ScriptedSource::new(vec![(20, vec![Reply::NotFound])]);
        let pipeline = GeocodingPipeline::new(source.clone(), PipelineSettings::default());
        let matches: Vec<Match> = (1..=3).map(fixture).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = pipeline
            .run_with_updates(&matches, &CancellationToken::new(), tx)
            .await;

        let mut updates = Vec::new();
        while let Some(update) = rx.recv().await {
            updates.push(update);
        }

        assert_eq!(
            updates,
            vec![
                VenueUpdate {
                    match_id: 1,
                    status: VenueStatus::Resolved(venue_coordinate(10)),
                },
                VenueUpdate {
                    match_id: 2,
                    status: VenueStatus::Unresolved,
                },
                VenueUpdate {
                    match_id: 3,
                    status: VenueStatus::Resolved(venue_coordinate(30)),
                },
            ]
        );
        assert_eq!(report.coordinates.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_arrives_before_run_ends() {
        let source = ScriptedSource::new(Vec::new());
        let pipeline = Arc::new(GeocodingPipeline::new(
            source.clone(),
            PipelineSettings::default(),
        ));
        let matches: Vec<Match> = (1..=2).map(fixture).collect();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let started = Instant::now();

        let run = {
            let pipeline = Arc::clone(&pipeline);
            tokio::spawn(async move {
                pipeline
                    .run_with_updates(&matches, &CancellationToken::new(), tx)
                    .await
            })
        };

        let first = rx.recv().await.unwrap();
        assert_eq!(first.match_id, 1);
        // Match 2 is still waiting out the throttle
        assert!(started.elapsed() < secs(20));

        run.await.unwrap();
        assert_eq!(rx.recv().await.map(|u| u.match_id), Some(2));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_outcomes_end_to_end() {
        let source = ScriptedSource::new(vec![
            (20, vec![Reply::RateLimited]),
            (30, vec![Reply::RateLimited; 3]),
        ]);
        let settings = PipelineSettings::default();
        let pipeline = GeocodingPipeline::new(source.clone(), settings);
        let matches: Vec<Match> = (1..=3).map(fixture).collect();
        let started = Instant::now();

        let coords = pipeline.run(&matches, &CancellationToken::new()).await;

        let mut keys: Vec<MatchId> = coords.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, vec![1, 2]);
        assert!(!coords.contains_key(&3));

        let floor = settings.min_request_delay * 2 + settings.backoff_delay(0);
        assert!(started.elapsed() >= floor);
        assert_eq!(source.calls().len(), 1 + 2 + 3);
    }
}
