//! Error types for the protocol layer.
//!
//! Each crate in Peril defines its own error enum. A `ProtocolError`
//! always means the problem is in turning values into bytes (or back),
//! or in a value that breaks a wire-level rule, never in the broker.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("json encode failed: {0}")]
    JsonEncode(#[source] serde_json::Error),

    /// JSON deserialization failed: malformed text, missing fields,
    /// wrong field types.
    #[cfg(feature = "json")]
    #[error("json decode failed: {0}")]
    JsonDecode(#[source] serde_json::Error),

    /// Bincode serialization failed.
    #[cfg(feature = "bincode")]
    #[error("bincode encode failed: {0}")]
    BincodeEncode(#[source] bincode::Error),

    /// Bincode deserialization failed, usually truncated or foreign bytes.
    #[cfg(feature = "bincode")]
    #[error("bincode decode failed: {0}")]
    BincodeDecode(#[source] bincode::Error),

    /// A location name outside the board.
    #[error("unknown location: {0}")]
    UnknownLocation(String),

    /// A username that cannot be used as a routing-key word.
    #[error("invalid username {0:?}: {1}")]
    InvalidUsername(String, &'static str),
}
