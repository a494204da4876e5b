use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use football_venue_map::api::{FootballDataClient, NominatimClient};
use football_venue_map::config::Config;
use football_venue_map::geocoding::{Geocoder, GeocodingPipeline, VenueResolver};
use football_venue_map::models::{Coordinate, DateRange, Match, MatchId};
use football_venue_map::workers::{QueryController, QueryError, QueryStatus};

/// A line of user input
#[derive(Debug, PartialEq)]
enum Command {
    Range(String, String),
    Reset,
    Sort,
    Select(MatchId),
    Show,
    Help,
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "football_venue_map=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    info!("Starting football-venue-map");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded");

    // Initialize API clients
    let football = Arc::new(FootballDataClient::new(
        &config.football_api_url,
        &config.football_api_key,
    ));
    let nominatim = Arc::new(NominatimClient::new(
        &config.geocoder_url,
        &config.geocoder_user_agent,
    ));
    info!("API clients initialized");

    let resolver = VenueResolver::new(football.clone(), Geocoder::new(nominatim));
    let pipeline = Arc::new(GeocodingPipeline::new(
        Arc::new(resolver),
        config.pipeline_settings(),
    ));
    let controller = QueryController::new(football, pipeline);

    let reference = config.reference;
    let mut sort_by_distance = false;

    print_help();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            line = lines.next_line() => line?,
        };

        let Some(line) = line else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(msg) => {
                println!("{}", msg);
                continue;
            }
        };

        match command {
            Command::Range(from, to) => match DateRange::parse(&from, &to) {
                Ok(range) => {
                    sort_by_distance = false;
                    spawn_query(controller.clone(), range, reference);
                }
                Err(e) => println!("{}", e),
            },
            Command::Reset => {
                controller.reset().await;
                sort_by_distance = false;
                println!("Cleared. Pick another date range.");
            }
            Command::Sort => {
                if controller.snapshot().await.status != QueryStatus::Ready {
                    println!("Still calculating distances...");
                } else {
                    sort_by_distance = !sort_by_distance;
                    show(&controller, reference, sort_by_distance).await;
                }
            }
            Command::Select(id) => match controller.select(id).await {
                Some(coordinate) => println!("Centring map on match {} at {}", id, coordinate),
                None => println!("No location for match {}", id),
            },
            Command::Show => show(&controller, reference, sort_by_distance).await,
            Command::Help => print_help(),
            Command::Quit => break,
        }
    }

    controller.reset().await;
    info!("Shutting down football-venue-map");
    Ok(())
}

/// Submit a range in the background so input stays responsive while venues resolve
fn spawn_query(controller: QueryController, range: DateRange, reference: Coordinate) {
    tokio::spawn(async move {
        match controller.submit(range).await {
            Ok(handle) => {
                let generation = handle.generation();
                show(&controller, reference, false).await;
                handle.finished().await;

                if controller.snapshot().await.generation == generation {
                    println!("All venues processed for {}", range);
                    show(&controller, reference, false).await;
                }
            }
            Err(QueryError::Superseded) => debug!("Query for {} superseded", range),
            Err(e) => {
                error!("Query for {} failed: {}", range, e);
                println!("Could not load matches. Please try again.");
            }
        }
    });
}

/// Print the current match list
async fn show(controller: &QueryController, reference: Coordinate, sort_by_distance: bool) {
    let view = controller.snapshot().await;

    match &view.status {
        QueryStatus::Idle => {
            println!("Pick a date range: range YYYY-MM-DD YYYY-MM-DD");
            return;
        }
        QueryStatus::Loading => {
            println!("Loading matches...");
            return;
        }
        QueryStatus::Failed(msg) => {
            println!("Could not load matches ({}). Please try again.", msg);
            return;
        }
        QueryStatus::Geocoding | QueryStatus::Ready => {}
    }

    let range = view.range.map(|r| r.to_string()).unwrap_or_default();

    if view.matches.is_empty() {
        println!("No matches for {}", range);
        return;
    }

    let distances = controller.distances(reference).await;

    let ordered: Vec<Match> = if sort_by_distance {
        match controller.sorted_by_distance(reference).await {
            Some(ranked) => ranked.into_iter().map(|r| r.fixture).collect(),
            None => view.matches.clone(),
        }
    } else {
        view.matches.clone()
    };

    println!("Matches {}", range);
    for m in &ordered {
        let marker = if view.selected == Some(m.id) { '>' } else { ' ' };
        let distance = match distances.get(&m.id).copied().flatten() {
            Some(km) => format!("{:.1} km", km),
            None => "distance unavailable".to_string(),
        };

        println!(
            "{} [{}] {} | {} | {}'s ground | {}",
            marker,
            m.id,
            m.utc_date.format("%Y-%m-%d %H:%M UTC"),
            m.label(),
            m.home_team.display_name(),
            distance
        );
    }

    if view.status == QueryStatus::Geocoding {
        println!(
            "Locating venues... {}/{} found so far",
            view.coordinates.len(),
            view.matches.len()
        );
    }
}

/// Parse a command line; `Ok(None)` for blank input
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let parts: Vec<&str> = line.split_whitespace().collect();

    let command = match parts.as_slice() {
        [] => return Ok(None),
        ["range", from, to] => Command::Range(from.to_string(), to.to_string()),
        ["range", ..] => return Err("usage: range YYYY-MM-DD YYYY-MM-DD".to_string()),
        ["reset"] => Command::Reset,
        ["sort"] => Command::Sort,
        ["select", id] => Command::Select(
            id.parse()
                .map_err(|_| format!("'{}' is not a match id", id))?,
        ),
        ["show"] => Command::Show,
        ["help"] => Command::Help,
        ["quit"] | ["exit"] => Command::Quit,
        _ => return Err(format!("unknown command '{}', try 'help'", line.trim())),
    };

    Ok(Some(command))
}

fn print_help() {
    println!("Commands:");
    println!("  range FROM TO   load matches between two dates (YYYY-MM-DD)");
    println!("  show            print the current match list");
    println!("  sort            toggle sorting by distance");
    println!("  select ID       centre the map on a match's venue");
    println!("  reset           clear the current query");
    println!("  quit            exit");
}
