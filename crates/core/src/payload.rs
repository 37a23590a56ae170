//! Size-bounded event payloads
//!
//! A payload is a JSON object whose serialized form never exceeds a declared
//! limit. Building a payload over the limit walks the entries in key order,
//! keeps each one that still fits and skips each one that does not, then
//! records what was cut with two marker fields:
//!
//! ```text
//! { ...kept entries..., "_truncated": true, "_original_bytes": 81234 }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker key set to `true` on truncated payloads.
pub const TRUNCATED_MARKER: &str = "_truncated";

/// Marker key holding the serialized size before truncation.
pub const ORIGINAL_BYTES_MARKER: &str = "_original_bytes";

/// Room reserved for the two marker entries.
const MARKER_RESERVE: usize = 64;

/// Producer-defined key/value mapping attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    /// Empty payload.
    pub fn new() -> Self {
        Payload(Map::new())
    }

    /// Build a payload that serializes to at most `max_bytes`.
    ///
    /// An entry too large for the remaining room is skipped; later, smaller
    /// entries may still be kept.
    pub fn bounded(map: Map<String, Value>, max_bytes: usize) -> Self {
        let original = encoded_len(&Value::Object(map.clone()));
        if original <= max_bytes {
            return Payload(map);
        }

        let budget = max_bytes.saturating_sub(MARKER_RESERVE);
        let mut kept = Map::new();
        // "{}" plus separators: track the running size without re-encoding
        let mut used = 2;
        for (key, value) in map {
            let entry = encoded_len(&Value::String(key.clone())) + 1 + encoded_len(&value);
            let separator = usize::from(!kept.is_empty());
            if used + separator + entry > budget {
                continue;
            }
            used += separator + entry;
            kept.insert(key, value);
        }
        kept.insert(TRUNCATED_MARKER.to_string(), Value::Bool(true));
        kept.insert(ORIGINAL_BYTES_MARKER.to_string(), Value::from(original));
        Payload(kept)
    }

    /// Insert a field (unbounded; call [`Payload::bounded`] via the event builder).
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the payload carries the truncation marker.
    pub fn is_truncated(&self) -> bool {
        matches!(self.0.get(TRUNCATED_MARKER), Some(Value::Bool(true)))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialized size in bytes.
    pub fn encoded_len(&self) -> usize {
        serde_json::to_vec(&self.0).map(|v| v.len()).unwrap_or(0)
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Take the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Payload {
    fn from(map: Map<String, Value>) -> Self {
        Payload(map)
    }
}

fn encoded_len(value: &Value) -> usize {
    serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX)
}
