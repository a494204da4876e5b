use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use football_venue_map::api::{FootballDataClient, NominatimClient};
use football_venue_map::config::Config;
use football_venue_map::geocoding::{Geocoder, VenueOutcome, VenueResolver, VenueSource};
use football_venue_map::models::VenueQuery;
use football_venue_map::ranking::haversine_km;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "locate_team=info,football_venue_map=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let team_id = parse_team(&args).context("usage: locate_team --team <TEAM_ID>")?;

    let config = Config::from_env()?;

    let football = Arc::new(FootballDataClient::new(
        &config.football_api_url,
        &config.football_api_key,
    ));
    let nominatim = Arc::new(NominatimClient::new(
        &config.geocoder_url,
        &config.geocoder_user_agent,
    ));
    let resolver = VenueResolver::new(football, Geocoder::new(nominatim));

    info!("Locating home venue of team {}", team_id);

    let query = VenueQuery {
        match_id: 0,
        team_id,
        team_name: format!("team {}", team_id),
    };

    match resolver.resolve(&query).await? {
        VenueOutcome::Located { venue, place } => {
            let distance = haversine_km(config.reference, place.coordinate);
            println!("{}", venue);
            println!("  address:  {}", place.address);
            println!("  location: {}", place.coordinate);
            println!("  distance: {:.1} km from {}", distance, config.reference);
        }
        VenueOutcome::NotFound => bail!("No location found for team {}", team_id),
    }

    Ok(())
}

/// Parse --team argument
fn parse_team(args: &[String]) -> Option<i64> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--team" || arg == "-t" {
            if let Some(value) = args.get(i + 1) {
                if let Ok(id) = value.parse() {
                    return Some(id);
                }
            }
        }
    }
    None
}
