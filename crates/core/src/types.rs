/// Task identifiers are time-ordered UUIDs (v7).
pub type TaskId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque key/value map handed verbatim to handlers and returned as results.
pub type Payload = serde_json::Map<String, serde_json::Value>;
