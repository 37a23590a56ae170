//! LogEvent: one structured, immutable telemetry record
//!
//! Events are created at the instant of observation and never change
//! afterwards. Fields are private; construct through [`LogEvent::builder`].

use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::payload::Payload;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Producer category of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    /// Host resource sample from the metrics sampler
    SystemMetric,
    /// Per-request performance trace
    RequestTrace,
    /// Client-side application event received by the ingestion endpoint
    ClientEvent,
}

impl EventSource {
    /// Wire name of the source.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::SystemMetric => "system-metric",
            EventSource::RequestTrace => "request-trace",
            EventSource::ClientEvent => "client-event",
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an enum from its wire name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    /// Which enum was being parsed
    pub kind: &'static str,
    /// The rejected input
    pub value: String,
}

impl FromStr for EventSource {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "system-metric" => Ok(EventSource::SystemMetric),
            "request-trace" => Ok(EventSource::RequestTrace),
            "client-event" => Ok(EventSource::ClientEvent),
            _ => Err(ParseEnumError {
                kind: "source",
                value: s.to_string(),
            }),
        }
    }
}

/// Event severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    /// Verbose diagnostics
    Debug,
    /// Normal operation
    Info,
    /// Degraded but functional
    Warn,
    /// Failure
    Error,
}

impl Level {
    /// Wire name of the level.
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" | "WARNING" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            _ => Err(ParseEnumError {
                kind: "level",
                value: s.to_string(),
            }),
        }
    }
}

/// One structured telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    id: String,
    timestamp: DateTime<Utc>,
    source: EventSource,
    level: Level,
    message: String,
    #[serde(default)]
    payload: Payload,
}

impl LogEvent {
    /// Start building an event.
    pub fn builder(source: EventSource, message: impl Into<String>) -> LogEventBuilder {
        LogEventBuilder {
            id: None,
            timestamp: None,
            source,
            level: Level::Info,
            message: message.into(),
            payload: Map::new(),
            limits: Limits::default(),
        }
    }

    /// Unique identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Observation time.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Producer category.
    pub fn source(&self) -> EventSource {
        self.source
    }

    /// Severity.
    pub fn level(&self) -> Level {
        self.level
    }

    /// Short tag, e.g. `USER_ACTION`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Producer-defined fields.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Encode as one JSON document.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode from one JSON document.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Builder for [`LogEvent`].
#[derive(Debug, Clone)]
pub struct LogEventBuilder {
    id: Option<String>,
    timestamp: Option<DateTime<Utc>>,
    source: EventSource,
    level: Level,
    message: String,
    payload: Map<String, Value>,
    limits: Limits,
}

impl LogEventBuilder {
    /// Use a producer-assigned id instead of a generated one.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the observation time (defaults to now).
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Set the level (defaults to INFO).
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Add one payload field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Merge a map of payload fields.
    pub fn fields(mut self, fields: Map<String, Value>) -> Self {
        self.payload.extend(fields);
        self
    }

    /// Override the default limits.
    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Validate and build the event.
    ///
    /// The payload is bounded by `limits.max_payload_bytes`; an invalid
    /// message is a validation error.
    pub fn build(self) -> Result<LogEvent> {
        self.limits.validate_message(&self.message)?;
        let id = match self.id {
            Some(id) if !id.trim().is_empty() => id,
            Some(_) => return Err(Error::validation("id", "must not be empty")),
            None => Uuid::new_v4().to_string(),
        };
        Ok(LogEvent {
            id,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            source: self.source,
            level: self.level,
            message: self.message,
            payload: Payload::bounded(self.payload, self.limits.max_payload_bytes),
        })
    }
}
