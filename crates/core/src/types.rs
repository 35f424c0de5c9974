/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Ordered string-keyed argument map used by processors, jobs and scripts.
///
/// A `BTreeMap` keeps serialization order stable, which the pipeline
/// checksum depends on.
pub type ArgMap = std::collections::BTreeMap<String, serde_json::Value>;
