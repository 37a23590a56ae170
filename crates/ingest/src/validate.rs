//! Per-event validation of raw client JSON.

use chrono::{DateTime, TimeZone, Utc};
use logship_core::{Error, EventSource, Level, Limits, LogEvent};
use serde::Serialize;
use serde_json::{Map, Value};

/// Why one event of a batch was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventRejection {
    /// Position in the batch
    pub index: usize,
    /// Offending field
    pub field: String,
    /// Human-readable reason
    pub reason: String,
}

impl EventRejection {
    fn new(index: usize, field: &str, reason: impl Into<String>) -> Self {
        EventRejection {
            index,
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Turn one raw event into a [`LogEvent`].
///
/// `timestamp`, `source` and `message` are required. `timestamp` is an
/// RFC 3339 string or epoch milliseconds. `level` defaults to INFO.
/// `payload` (or `data`) must be an object when present; `metadata` is
/// merged over it. A missing `id` is generated.
pub fn parse_event(
    index: usize,
    raw: &Value,
    metadata: &Map<String, Value>,
    limits: &Limits,
) -> Result<LogEvent, EventRejection> {
    let reject = |field: &str, reason: &str| EventRejection::new(index, field, reason);

    let obj = raw
        .as_object()
        .ok_or_else(|| reject("event", "must be a JSON object"))?;

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => return Err(reject("timestamp", "required")),
        Some(value) => parse_timestamp(value).ok_or_else(|| {
            reject("timestamp", "expected an RFC 3339 string or epoch milliseconds")
        })?,
    };

    let source = match obj.get("source") {
        Some(Value::String(s)) => s
            .parse::<EventSource>()
            .map_err(|e| reject("source", &e.to_string()))?,
        None | Some(Value::Null) => return Err(reject("source", "required")),
        Some(_) => return Err(reject("source", "must be a string")),
    };

    let message = match obj.get("message") {
        Some(Value::String(s)) => s.as_str(),
        None | Some(Value::Null) => return Err(reject("message", "required")),
        Some(_) => return Err(reject("message", "must be a string")),
    };

    let level = match obj.get("level") {
        None | Some(Value::Null) => Level::Info,
        Some(Value::String(s)) => s
            .parse::<Level>()
            .map_err(|e| reject("level", &e.to_string()))?,
        Some(_) => return Err(reject("level", "must be a string")),
    };

    let (payload_field, payload) = match (obj.get("payload"), obj.get("data")) {
        (Some(p), _) if !p.is_null() => ("payload", Some(p)),
        (_, Some(d)) if !d.is_null() => ("data", Some(d)),
        _ => ("payload", None),
    };
    let payload = match payload {
        None => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(_) => return Err(reject(payload_field, "must be an object")),
    };

    let mut builder = LogEvent::builder(source, message)
        .timestamp(timestamp)
        .level(level)
        .fields(payload)
        .fields(metadata.clone())
        .limits(limits.clone());

    match obj.get("id") {
        None | Some(Value::Null) => {}
        Some(Value::String(id)) => builder = builder.id(id.as_str()),
        Some(_) => return Err(reject("id", "must be a string")),
    }

    builder.build().map_err(|e| match e {
        Error::Validation { field, reason } => EventRejection::new(index, &field, reason),
        other => EventRejection::new(index, "event", other.to_string()),
    })
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|ts| ts.with_timezone(&Utc)),
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}
