//! Remote object naming and metadata.
//!
//! ```text
//! {prefix}/{YYYY}/{MM}/{DD}/{hostname}/{created_ms:013}-{seq:06}-{digest}.log.zst
//! ```
//!
//! The date is the file's creation date (UTC), not the upload date, so a
//! retried upload lands on the same key. `digest` is the xxh3-64 of the
//! uncompressed file.

use chrono::{DateTime, TimeZone, Utc};
use logship_durability::LogFileId;
use std::collections::HashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Object metadata keys attached to every upload.
pub struct ObjectMetadataKey;

impl ObjectMetadataKey {
    /// Local file name
    pub const ORIGINAL_FILENAME: &'static str = "original-filename";
    /// Producing host
    pub const HOSTNAME: &'static str = "hostname";
    /// Uncompressed size in bytes
    pub const ORIGINAL_SIZE: &'static str = "original-size";
    /// xxh3-64 of the compressed body, used to detect an identical object
    pub const CONTENT_XXH3: &'static str = "content-xxh3";
    /// RFC 3339 time of the upload
    pub const UPLOAD_TIMESTAMP: &'static str = "upload-timestamp";
}

/// Hex xxh3-64 of `bytes` (16 lowercase digits).
pub fn content_digest(bytes: &[u8]) -> String {
    format!("{:016x}", xxh3_64(bytes))
}

/// Keep a hostname usable as one key segment.
///
/// Anything but ASCII alphanumerics, `-`, `_` and `.` becomes `_`.
pub fn sanitize_hostname(hostname: &str) -> String {
    let cleaned: String = hostname
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "unknown".to_string(),
        s => s.to_string(),
    }
}

/// Object key of a log file.
pub fn remote_key(prefix: &str, hostname: &str, id: LogFileId, digest: &str) -> String {
    let created = created_at(id);
    let prefix = prefix.trim_matches('/');
    let name = format!(
        "{}/{}/{:013}-{:06}-{}.log.zst",
        created.format("%Y/%m/%d"),
        sanitize_hostname(hostname),
        id.created_ms,
        id.sequence,
        digest
    );
    if prefix.is_empty() {
        name
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Metadata stored with the object.
pub fn object_metadata(
    id: LogFileId,
    hostname: &str,
    original_size: u64,
    compressed_digest: &str,
    uploaded_at: DateTime<Utc>,
) -> HashMap<String, String> {
    HashMap::from([
        (
            ObjectMetadataKey::ORIGINAL_FILENAME.to_string(),
            id.segment_file_name(),
        ),
        (ObjectMetadataKey::HOSTNAME.to_string(), hostname.to_string()),
        (
            ObjectMetadataKey::ORIGINAL_SIZE.to_string(),
            original_size.to_string(),
        ),
        (
            ObjectMetadataKey::CONTENT_XXH3.to_string(),
            compressed_digest.to_string(),
        ),
        (
            ObjectMetadataKey::UPLOAD_TIMESTAMP.to_string(),
            uploaded_at.to_rfc3339(),
        ),
    ])
}

fn created_at(id: LogFileId) -> DateTime<Utc> {
    i64::try_from(id.created_ms)
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        // 2024-05-01T12:00:00Z
        let id = LogFileId::new(1_714_564_800_000, 7);
        let key = remote_key("logs/", "web-01", id, "00ff00ff00ff00ff");
        assert_eq!(
            key,
            "logs/2024/05/01/web-01/1714564800000-000007-00ff00ff00ff00ff.log.zst"
        );
        assert_eq!(
            remote_key("", "web-01", id, "ab"),
            "2024/05/01/web-01/1714564800000-000007-ab.log.zst"
        );
    }

    #[test]
    fn test_key_is_stable_for_same_file() {
        let id = LogFileId::new(1_714_564_800_000, 1);
        let digest = content_digest(b"segment bytes");
        assert_eq!(
            remote_key("logs", "h", id, &digest),
            remote_key("logs", "h", id, &digest)
        );
        assert_ne!(digest, content_digest(b"other bytes"));
        assert_eq!(digest.len(), 16);
    }

    #[test]
    fn test_sanitize_hostname() {
        assert_eq!(sanitize_hostname("web-01.internal"), "web-01.internal");
        assert_eq!(sanitize_hostname("a/b c"), "a_b_c");
        assert_eq!(sanitize_hostname(""), "unknown");
        assert_eq!(sanitize_hostname(".."), "unknown");
    }

    #[test]
    fn test_metadata_keys() {
        let id = LogFileId::new(1_714_564_800_000, 1);
        let meta = object_metadata(id, "h", 1234, "abcd", Utc::now());
        assert_eq!(meta[ObjectMetadataKey::ORIGINAL_SIZE], "1234");
        assert_eq!(meta[ObjectMetadataKey::CONTENT_XXH3], "abcd");
        assert_eq!(
            meta[ObjectMetadataKey::ORIGINAL_FILENAME],
            "log-1714564800000-000001.seg"
        );
    }
}
