use thiserror::Error;

/// Reasons a single inbound message could not be turned into records.
///
/// Every variant is local to one message: the caller logs it and moves on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to decode payload as JSON: {0}")]
    PayloadDecode(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    PayloadNotObject,

    #[error("malformed timestamp {value:?}: {reason}")]
    MalformedTimestamp { value: String, reason: String },

    #[error("payload has no \"Time\" field")]
    MissingTimestamp,

    #[error("invalid value for {sensor}.{measurement}: {value}")]
    InvalidFieldValue {
        sensor: String,
        measurement: String,
        value: serde_json::Value,
    },
}
