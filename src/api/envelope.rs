use crate::api::ApiError;
use crate::live::normalizer::{self, OptionShape};
use crate::models::{Poll, PollStatus};
use chrono::{DateTime, TimeZone, Utc};
use log::{debug, warn};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Poll as the backend sends it. Every field is optional and loosely typed; a field of
/// the wrong type is dropped on its own instead of failing the whole poll.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WirePoll {
    pub id: Option<Value>,
    pub poll_id: Option<Value>,
    pub title: Option<Value>,
    pub description: Option<Value>,
    pub options: Option<Value>,
    pub status: Option<Value>,
    pub created_at: Option<Value>,
    pub closed_at: Option<Value>,
    pub total_votes: Option<Value>,
}

impl WirePoll {
    pub fn into_poll(self) -> Poll {
        let options = option_shapes(self.options)
            .iter()
            .enumerate()
            .map(|(index, shape)| normalizer::normalize_option(index, shape))
            .collect();

        Poll {
            id: self
                .id
                .filter(is_present)
                .or(self.poll_id)
                .as_ref()
                .map(normalizer::value_to_id)
                .unwrap_or_default(),
            title: text_field(self.title, "title").unwrap_or_default(),
            description: text_field(self.description, "description").filter(|d| !d.is_empty()),
            options,
            status: text_field(self.status, "status")
                .as_deref()
                .map(PollStatus::parse)
                .unwrap_or(PollStatus::Draft),
            created_at: self.created_at.as_ref().and_then(parse_timestamp),
            closed_at: self.closed_at.as_ref().and_then(parse_timestamp),
            total_votes: self
                .total_votes
                .as_ref()
                .and_then(normalizer::count_from_value)
                .unwrap_or(0),
        }
    }
}

// Anything but an array (null included) means no options
fn option_shapes(options: Option<Value>) -> Vec<OptionShape> {
    match options {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| {
                OptionShape::deserialize(&item).unwrap_or_else(|_| OptionShape::Other(item.clone()))
            })
            .collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            warn!("Ignoring non-array poll options: {}", other);
            Vec::new()
        }
    }
}

fn text_field(value: Option<Value>, field: &str) -> Option<String> {
    match value? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Null => None,
        other => {
            warn!("Ignoring non-text poll {}: {}", field, other);
            None
        }
    }
}

/// RFC 3339 strings or epoch milliseconds (as a number or a numeric string).
fn parse_timestamp(raw: &Value) -> Option<DateTime<Utc>> {
    let millis = match raw {
        Value::String(text) => match DateTime::parse_from_rfc3339(text) {
            Ok(dt) => return Some(dt.with_timezone(&Utc)),
            Err(e) => text.trim().parse::<i64>().map_err(|_| e.to_string()),
        },
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|f| f as i64))
            .ok_or_else(|| "not an integer".to_string()),
        Value::Null => return None,
        other => Err(format!("unexpected {}", other)),
    };

    match millis.map(|ms| Utc.timestamp_millis_opt(ms).single()) {
        Ok(Some(dt)) => Some(dt),
        Ok(None) => {
            warn!("Ignoring out-of-range timestamp {}", raw);
            None
        }
        Err(e) => {
            warn!("Ignoring unparseable timestamp {}: {}", raw, e);
            None
        }
    }
}

fn decode_poll(value: Value) -> Option<Poll> {
    match serde_json::from_value::<WirePoll>(value) {
        Ok(wire) => Some(wire.into_poll()),
        Err(e) => {
            warn!("Failed to decode poll payload: {}", e);
            None
        }
    }
}

fn is_present(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// The shapes `active-poll` has been seen to answer with.
#[derive(Debug, PartialEq)]
pub enum ActivePollBody {
    /// `{ "poll": {...} }`
    Wrapped(Value),
    /// `{ "pollId": ..., ... }`
    Flat(Map<String, Value>),
    /// `{ "Item": {...} }` straight from the table
    Item(Value),
    /// `{ "id": ..., ... }`
    Bare(Map<String, Value>),
    /// Anything else: no active poll.
    Empty,
}

impl ActivePollBody {
    pub fn classify(body: Value) -> Self {
        let Value::Object(mut fields) = body else {
            return ActivePollBody::Empty;
        };

        if fields.get("poll").is_some_and(is_present) {
            ActivePollBody::Wrapped(fields.remove("poll").unwrap_or_default())
        } else if fields.get("pollId").is_some_and(is_present) {
            ActivePollBody::Flat(fields)
        } else if fields.get("Item").is_some_and(is_present) {
            ActivePollBody::Item(fields.remove("Item").unwrap_or_default())
        } else if fields.get("id").is_some_and(is_present) {
            ActivePollBody::Bare(fields)
        } else {
            ActivePollBody::Empty
        }
    }

    pub fn into_poll(self) -> Option<Poll> {
        match self {
            ActivePollBody::Wrapped(poll) | ActivePollBody::Item(poll) => decode_poll(poll),
            ActivePollBody::Flat(fields) | ActivePollBody::Bare(fields) => {
                decode_poll(Value::Object(fields))
            }
            ActivePollBody::Empty => {
                debug!("active-poll returned no poll");
                None
            }
        }
    }
}

pub fn decode_active_poll(body: Value) -> Option<Poll> {
    ActivePollBody::classify(body).into_poll()
}

/// Result of a create/update/close/delete call once the envelope is peeled off.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationOutcome {
    pub poll: Option<Poll>,
    pub message: Option<String>,
}

// A reason is a non-empty string, or an object carrying one under "message"
fn reason_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(text) => text.as_str(),
        Value::Object(fields) => fields.get("message").and_then(Value::as_str)?,
        _ => return None,
    };
    (!text.is_empty()).then(|| text.to_string())
}

/// `success: false` is an error carrying `error` or `message`; otherwise the payload is
/// `data`, then `poll`, then the body itself. Fields are read straight off the body so a
/// strangely typed field never hides the success flag.
pub fn decode_mutation(body: Value, default_error: &str) -> Result<MutationOutcome, ApiError> {
    let message = body.get("message").and_then(reason_text);

    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let reason = body
            .get("error")
            .and_then(reason_text)
            .or(message)
            .unwrap_or_else(|| default_error.to_string());
        return Err(ApiError::Rejected(reason));
    }

    let payload = match body {
        Value::Object(mut fields) => {
            let data = fields.remove("data").filter(is_present);
            let poll = fields.remove("poll").filter(is_present);
            data.or(poll).unwrap_or(Value::Object(fields))
        }
        other => other,
    };

    // Only treat the payload as a poll if it names one
    let names_poll = payload.as_object().is_some_and(|fields| {
        fields
            .get("id")
            .or(fields.get("pollId"))
            .is_some_and(is_present)
    });
    let poll = if names_poll { decode_poll(payload) } else { None };

    Ok(MutationOutcome { poll, message })
}
