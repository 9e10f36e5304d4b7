use crate::models::{LiveStats, Poll, PollOption, Standings};
use log::debug;
use serde::Deserialize;
use serde_json::Value;

// Reserved keys in a live stats document. Every other key is an option label.
pub const STAT_NAME_KEY: &str = "statName";
pub const TOTAL_VOTES_KEY: &str = "totalVotes";

/// Canonical view of a tally, whatever shape it arrived in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub title: String,
    pub total_votes: Option<u64>,
    pub standings: Standings,
}

impl Snapshot {
    /// Store entry for this snapshot. A missing total is stored as zero.
    pub fn to_live_stats(&self) -> LiveStats {
        LiveStats {
            total_votes: self.total_votes.unwrap_or(0),
            standings: self.standings.clone(),
        }
    }
}

/// Which source won when resolving what to display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSource {
    Live,
    Cached,
    Poll,
}

/// What a live view renders.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveDisplay {
    pub title: String,
    pub total_votes: u64,
    pub standings: Standings,
    pub source: SnapshotSource,
}

/// Options arrive either as bare labels or as records with one of several label fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OptionShape {
    Label(String),
    Record(OptionRecord),
    Other(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OptionRecord {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub option: Option<String>,
    #[serde(default)]
    pub votes: Option<Value>,
}

/// Reads a vote count out of whatever the backend sent: integers, non-negative floats,
/// or numeric strings.
pub fn count_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0)
                .map(|f| f.round() as u64)
        }),
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Shape (a): a decoded live-subscription document.
///
/// `statName` and `totalVotes` are split off; every remaining key is an option label.
/// Never fails: a non-object document yields the empty snapshot.
pub fn from_live_message(document: &Value) -> Snapshot {
    let Some(fields) = document.as_object() else {
        debug!("Live stats document is not an object, using empty snapshot");
        return Snapshot::default();
    };

    let mut snapshot = Snapshot::default();
    for (key, value) in fields {
        match key.as_str() {
            STAT_NAME_KEY => {
                snapshot.title = value.as_str().unwrap_or_default().to_string();
            }
            TOTAL_VOTES_KEY => {
                snapshot.total_votes = count_from_value(value);
            }
            label => match count_from_value(value) {
                Some(votes) => snapshot.standings.insert(label, votes),
                None => debug!("Dropping non-numeric standing '{}': {}", label, value),
            },
        }
    }
    snapshot
}

/// Shape (b): the store's cached tally, titled with the poll it belongs to.
pub fn from_cached(stats: &LiveStats, title: &str) -> Snapshot {
    Snapshot {
        title: title.to_string(),
        total_votes: Some(stats.total_votes),
        standings: stats.standings.clone(),
    }
}

/// Shape (c): a fetched poll. Standings follow the poll's option order.
pub fn from_poll(poll: &Poll) -> Snapshot {
    Snapshot {
        title: poll.title.clone(),
        total_votes: Some(poll.total_votes),
        standings: poll
            .options
            .iter()
            .map(|option| (option.text.clone(), option.votes))
            .collect(),
    }
}

/// Label for the option at `index`: `text`, then `label`, then `option`, then "Option N".
pub fn option_label(index: usize, shape: &OptionShape) -> String {
    let explicit = match shape {
        OptionShape::Label(label) => Some(label.as_str()),
        OptionShape::Record(record) => [&record.text, &record.label, &record.option]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|label| !label.is_empty()),
        OptionShape::Other(_) => None,
    };

    match explicit {
        Some(label) if !label.is_empty() => label.to_string(),
        _ => format!("Option {}", index + 1),
    }
}

/// Normalizes one wire option into a `PollOption`. Bare labels carry zero votes.
pub fn normalize_option(index: usize, shape: &OptionShape) -> PollOption {
    let text = option_label(index, shape);
    match shape {
        OptionShape::Record(record) => PollOption {
            id: record.id.as_ref().map(value_to_id).unwrap_or_default(),
            text,
            votes: record.votes.as_ref().and_then(count_from_value).unwrap_or(0),
        },
        OptionShape::Label(_) | OptionShape::Other(_) => PollOption {
            id: String::new(),
            text,
            votes: 0,
        },
    }
}

/// Ids come back as strings or numbers depending on the table.
pub fn value_to_id(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Picks what to display: live message, then cached store entry, then the poll itself.
///
/// The title falls back to the poll title when the live message has none, and the total
/// falls back to the poll's last known total. The explicit total is never reconciled
/// against the sum of the standings.
pub fn resolve(live: Option<&Snapshot>, cached: Option<&LiveStats>, poll: &Poll) -> LiveDisplay {
    let (snapshot, source) = match (live, cached) {
        (Some(live), _) => (live.clone(), SnapshotSource::Live),
        (None, Some(cached)) => (from_cached(cached, &poll.title), SnapshotSource::Cached),
        (None, None) => (from_poll(poll), SnapshotSource::Poll),
    };

    let title = if snapshot.title.is_empty() {
        poll.title.clone()
    } else {
        snapshot.title
    };

    LiveDisplay {
        title,
        total_votes: snapshot.total_votes.unwrap_or(poll.total_votes),
        standings: snapshot.standings,
        source,
    }
}
