use chrono::{DateTime, Utc};
use log::warn;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub options: Vec<PollOption>,
    pub status: PollStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub total_votes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub text: String,
    pub votes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Active,
    Closed,
    Draft,
}

impl PollStatus {
    // The backend is inconsistent about casing ("ACTIVE" vs "active")
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => PollStatus::Active,
            "closed" => PollStatus::Closed,
            "draft" => PollStatus::Draft,
            other => {
                warn!("Unknown poll status '{}', treating it as draft", other);
                PollStatus::Draft
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PollStatus::Active => "active",
            PollStatus::Closed => "closed",
            PollStatus::Draft => "draft",
        }
    }
}

impl fmt::Display for PollStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Poll {
    /// Only an active poll can be closed.
    pub fn can_close(&self) -> bool {
        self.status == PollStatus::Active
    }
}

/// Option label -> vote count. Labels are unique; insertion order is kept for display
/// but ignored by equality.
#[derive(Debug, Clone, Default)]
pub struct Standings {
    entries: Vec<(String, u64)>,
}

impl Standings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the count for `label`, keeping its original position.
    pub fn insert(&mut self, label: impl Into<String>, votes: u64) {
        let label = label.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == label) {
            Some(entry) => entry.1 = votes,
            None => self.entries.push((label, votes)),
        }
    }

    pub fn get(&self, label: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == label)
            .map(|(_, votes)| *votes)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> + '_ {
        self.entries.iter().map(|(label, votes)| (label.as_str(), *votes))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn sum(&self) -> u64 {
        self.entries.iter().map(|(_, votes)| *votes).sum()
    }
}

impl PartialEq for Standings {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self.iter().all(|(label, votes)| other.get(label) == Some(votes))
    }
}

impl<L: Into<String>> FromIterator<(L, u64)> for Standings {
    fn from_iter<I: IntoIterator<Item = (L, u64)>>(iter: I) -> Self {
        let mut standings = Standings::new();
        for (label, votes) in iter {
            standings.insert(label, votes);
        }
        standings
    }
}

impl Serialize for Standings {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (label, votes) in self.iter() {
            map.serialize_entry(label, &votes)?;
        }
        map.end()
    }
}

/// Latest tally held in the shared live-stats store. Always replaced wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    pub total_votes: u64,
    pub standings: Standings,
}

// Request bodies for the admin API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreatePoll {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdatePoll {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<PollOption>>,
}

/// Identity flags persisted in client storage across restarts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub is_authenticated: bool,
    pub is_profile_filled: bool,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    // Anything other than "dark" means light
    pub fn parse(raw: &str) -> Self {
        if raw == "dark" { Theme::Dark } else { Theme::Light }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}
