//! Error types for the Graph API core.
//!
//! # Design
//! Configuration failures are split in two: `MissingField` names a required
//! credential that never arrived, `ConfigValidation` covers values that are
//! present but malformed. Callers surface both as plain messages, but tests
//! and logs need to tell them apart.
//!
//! `Upstream` carries the most specific message the Graph API offered; the
//! transport never classifies failures by HTTP status.

/// Errors returned by the config resolver, the transport and the composer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A required configuration field is absent.
    #[error("missing header: {0}")]
    MissingField(String),

    /// Configuration fields are present but fail structural validation.
    #[error("invalid configuration: {0}")]
    ConfigValidation(String),

    /// The caller payload fails structural validation.
    #[error("invalid request: {0}")]
    RequestValidation(String),

    /// The upstream body contained an `error` object.
    #[error("{0}")]
    Upstream(String),

    /// A body that claims success is missing the arrays we read from.
    #[error("malformed upstream response: {0}")]
    MalformedUpstreamResponse(String),

    /// The call did not finish within the configured timeout.
    #[error("upstream call timed out after {0} ms")]
    TransportTimeout(u64),

    /// Connection-level failure other than a timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;
