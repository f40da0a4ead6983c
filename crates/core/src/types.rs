/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Hex-encoded request fingerprint (see [`crate::fingerprint`]).
pub type Fingerprint = String;
