use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{Coordinate, CoordinateMap, Match, MatchId};

/// Mean Earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points in kilometres (haversine)
pub fn haversine_km(a: Coordinate, b: Coordinate) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

/// A match with its distance from the reference point, if its venue is known
#[derive(Debug, Clone, PartialEq)]
pub struct RankedMatch {
    pub fixture: Match,
    pub distance_km: Option<f64>,
}

/// Distance from `reference` for every match; `None` where the venue is unresolved
pub fn distances(
    reference: Coordinate,
    coords: &CoordinateMap,
    matches: &[Match],
) -> HashMap<MatchId, Option<f64>> {
    matches
        .iter()
        .map(|m| (m.id, coords.get(&m.id).map(|c| haversine_km(reference, *c))))
        .collect()
}

/// Order matches by ascending distance from `reference`.
///
/// Matches without a coordinate always come last. Equal distances keep
/// their original relative order.
pub fn rank(reference: Coordinate, coords: &CoordinateMap, matches: &[Match]) -> Vec<RankedMatch> {
    let mut ranked: Vec<RankedMatch> = matches
        .iter()
        .map(|m| RankedMatch {
            fixture: m.clone(),
            distance_km: coords.get(&m.id).map(|c| haversine_km(reference, *c)),
        })
        .collect();

    // sort_by is stable
    ranked.sort_by(|a, b| compare_distance(a.distance_km, b.distance_km));
    ranked
}

fn compare_distance(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Competition, Team};
    use chrono::{TimeZone, Utc};

    fn sofia() -> Coordinate {
        Coordinate::new(42.6977, 23.3219).unwrap()
    }

    fn fixture(id: MatchId) -> Match {
        Match {
            id,
            utc_date: Utc.with_ymd_and_hms(2025, 3, 1, 18, 0, 0).unwrap(),
            status: None,
            home_team: Team {
                id,
                name: format!("Home {}", id),
                short_name: None,
                crest: None,
            },
            away_team: Team {
                id: id + 100,
                name: format!("Away {}", id),
                short_name: None,
                crest: None,
            },
            competition: Competition {
                id: None,
                name: "Friendly".to_string(),
                emblem: None,
            },
        }
    }

    #[test]
    fn test_haversine_same_point_is_zero() {
        assert_eq!(haversine_km(sofia(), sofia()), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // Sofia to London is roughly 2,020 km
        let london = Coordinate::new(51.5074, -0.1278).unwrap();
        let d = haversine_km(sofia(), london);
        assert!((2000.0..2040.0).contains(&d), "got {}", d);
        assert!((d - haversine_km(london, sofia())).abs() < 1e-9);
    }

    #[test]
    fn test_rank_orders_by_distance_with_unresolved_last() {
        let matches: Vec<Match> = (1..=4).map(fixture).collect();
        let mut coords = CoordinateMap::new();
        // Madrid, Plovdiv, (3 unresolved), Bucharest
        coords.insert(1, Coordinate::new(40.4531, -3.6883).unwrap());
        coords.insert(2, Coordinate::new(42.1354, 24.7453).unwrap());
        coords.insert(4, Coordinate::new(44.4378, 26.0946).unwrap());

        let ranked = rank(sofia(), &coords, &matches);
        let order: Vec<MatchId> = ranked.iter().map(|r| r.fixture.id).collect();

        assert_eq!(order, vec![2, 4, 1, 3]);
        assert_eq!(ranked[3].distance_km, None);
    }

    #[test]
    fn test_rank_is_stable_for_ties_and_unresolved() {
        let matches: Vec<Match> = (1..=5).map(fixture).collect();
        let mut coords = CoordinateMap::new();
        let same = Coordinate::new(48.2188, 11.6247).unwrap();
        coords.insert(4, same);
        coords.insert(2, same);

        let ranked = rank(sofia(), &coords, &matches);
        let order: Vec<MatchId> = ranked.iter().map(|r| r.fixture.id).collect();

        assert_eq!(order, vec![2, 4, 1, 3, 5]);
    }

    #[test]
    fn test_distances_marks_unresolved() {
        let matches = vec![fixture(1), fixture(2)];
        let mut coords = CoordinateMap::new();
        coords.insert(1, sofia());

        let d = distances(sofia(), &coords, &matches);
        assert_eq!(d[&1], Some(0.0));
        assert_eq!(d[&2], None);
    }
}
