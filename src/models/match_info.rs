use chrono::{DateTime, Utc};

/// Opaque match identifier as issued by the matches API
pub type MatchId = i64;

/// A scheduled football match
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Unique match identifier
    pub id: MatchId,

    /// Kick-off time
    pub utc_date: DateTime<Utc>,

    /// Match status as reported upstream (e.g. "SCHEDULED", "TIMED")
    pub status: Option<String>,

    /// Home side; its venue is where the match is placed on the map
    pub home_team: Team,

    /// Away side
    pub away_team: Team,

    /// Competition the match belongs to
    pub competition: Competition,
}

/// Team as it appears on a match record
#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
    pub crest: Option<String>,
}

impl Team {
    /// Short name when available, full name otherwise
    pub fn display_name(&self) -> &str {
        self.short_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
    }
}

/// Competition metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Competition {
    pub id: Option<i64>,
    pub name: String,
    pub emblem: Option<String>,
}

impl Match {
    /// One-line label for lists and logs
    pub fn label(&self) -> String {
        format!(
            "{} vs {} ({})",
            self.home_team.name, self.away_team.name, self.competition.name
        )
    }
}
