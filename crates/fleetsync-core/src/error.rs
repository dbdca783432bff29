//! Rejection reasons for provider records

use thiserror::Error;

/// Why a raw provider record could not become a [`PositionRecord`](crate::PositionRecord).
///
/// Rejections are not failures of the sync cycle: the record is dropped
/// before it reaches the engine and the reason is only logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RejectReason {
    /// No external identifier (plate or tracker number)
    #[error("missing identifier")]
    MissingIdentifier,

    /// Entity class could not be determined
    #[error("missing entity class")]
    MissingEntityClass,

    /// No observation timestamp
    #[error("missing timestamp")]
    MissingTimestamp,

    /// Timestamp present but not a valid point in time
    #[error("unparsable timestamp: {0}")]
    InvalidTimestamp(String),

    /// Latitude or longitude absent
    #[error("missing coordinates")]
    MissingCoordinates,

    /// Latitude or longitude outside the valid range
    #[error("coordinates out of range: ({latitude}, {longitude})")]
    CoordinatesOutOfRange { latitude: f64, longitude: f64 },
}
