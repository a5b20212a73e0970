//! Probing helpers for loosely-typed documents.
//!
//! Message and conversation documents come from several client versions, so
//! nothing here assumes a fixed shape. Each extractor is an ordered list of
//! keys tried in turn, returning the first value that parses.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

pub const TIMESTAMP_KEYS: &[&str] = &[
    "createdAt",
    "created_at",
    "sentAt",
    "sent_at",
    "timestamp",
    "time",
    "date",
    "createdOn",
    "sent_on",
];

pub const SENDER_KEYS: &[&str] = &[
    "senderId",
    "sender_id",
    "userId",
    "user_id",
    "from",
    "fromUserId",
    "authorId",
    "author_id",
    "participantId",
    "participant_id",
];

pub const SENDER_RECORD_KEYS: &[&str] = &["sender", "user", "author"];

pub const MESSAGE_ID_KEYS: &[&str] = &["id", "messageId", "message_id", "localId", "local_id"];

pub const CONVERSATION_ID_KEYS: &[&str] = &[
    "conversationId",
    "conversation_id",
    "chatId",
    "chat_id",
    "threadId",
    "thread_id",
    "roomId",
    "room_id",
    "channelId",
    "channel_id",
];

const NESTED_ID_KEYS: &[&str] = &["id", "uid", "userId", "user_id"];

/// Non-null value under `key`.
pub fn field<'a>(record: &'a Value, key: &str) -> Option<&'a Value> {
    record.get(key).filter(|value| !value.is_null())
}

/// First key whose value the extractor accepts.
pub fn probe<'a, T, F>(record: &'a Value, keys: &[&str], extract: F) -> Option<T>
where
    F: Fn(&'a Value) -> Option<T>,
{
    keys.iter()
        .filter_map(|key| field(record, key))
        .find_map(extract)
}

pub fn probe_bool(record: &Value, keys: &[&str]) -> Option<bool> {
    probe(record, keys, Value::as_bool)
}

pub fn probe_str<'a>(record: &'a Value, keys: &[&str]) -> Option<&'a str> {
    probe(record, keys, Value::as_str)
}

/// Canonical string form of an identifier-like value.
///
/// Strings are trimmed, integral numbers lose their fractional part and
/// objects are searched for the usual id keys.
pub fn normalize_identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                return Some(int.to_string());
            }
            if let Some(int) = number.as_u64() {
                return Some(int.to_string());
            }
            let float = number.as_f64()?;
            if !float.is_finite() {
                return None;
            }
            if float.fract() == 0.0 && float.abs() < 9.0e15 {
                Some(format!("{}", float as i64))
            } else {
                Some(float.to_string())
            }
        }
        Value::Object(_) => probe(value, NESTED_ID_KEYS, normalize_identifier),
        _ => None,
    }
}

pub fn normalize_identifier_str(value: &str) -> Option<String> {
    normalize_identifier(&Value::String(value.to_string()))
}

/// Parses the timestamp encodings seen in message documents: RFC 3339 or
/// SQL-style strings, epoch milliseconds and `{seconds, nanoseconds}` maps.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_str(text.trim()),
        Value::Number(number) => {
            let millis = number.as_f64()?;
            if !millis.is_finite() {
                return None;
            }
            Utc.timestamp_millis_opt(millis as i64).single()
        }
        Value::Object(map) => parse_seconds_map(map),
        _ => None,
    }
}

fn parse_timestamp_str(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

fn parse_seconds_map(map: &Map<String, Value>) -> Option<DateTime<Utc>> {
    let seconds = map
        .get("seconds")
        .or_else(|| map.get("_seconds"))
        .and_then(Value::as_f64)?;
    let nanos = map
        .get("nanoseconds")
        .or_else(|| map.get("_nanoseconds"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    if !seconds.is_finite() || !nanos.is_finite() {
        return None;
    }
    let millis = seconds as i64 * 1000 + (nanos / 1.0e6).floor() as i64;
    Utc.timestamp_millis_opt(millis).single()
}

pub fn extract_timestamp(record: &Value) -> Option<DateTime<Utc>> {
    probe(record, TIMESTAMP_KEYS, parse_timestamp)
}

pub fn extract_sender_id(record: &Value) -> Option<String> {
    if let Some(sender) = probe(record, SENDER_KEYS, normalize_identifier) {
        return Some(sender);
    }
    SENDER_RECORD_KEYS
        .iter()
        .filter_map(|key| field(record, key))
        .filter(|nested| nested.is_object())
        .find_map(|nested| probe(nested, NESTED_ID_KEYS, normalize_identifier))
}

pub fn extract_message_id(record: &Value) -> Option<String> {
    probe(record, MESSAGE_ID_KEYS, normalize_identifier)
}

pub fn extract_conversation_id(record: &Value) -> Option<String> {
    probe(record, CONVERSATION_ID_KEYS, normalize_identifier)
}

/// Embedded sender/author/user sub-record, if any.
pub fn sender_record(record: &Value) -> Option<&Value> {
    SENDER_RECORD_KEYS
        .iter()
        .filter_map(|key| field(record, key))
        .find(|nested| nested.is_object())
}
