//! Error types.

use crate::schema::SchemaError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StubError>;

/// Errors raised while registering stubs or synthesizing responses.
///
/// Unmatched requests are never reported through this type; they surface
/// as [`crate::interceptor::Interception::Unhandled`].
#[derive(Error, Debug)]
pub enum StubError {
    /// Invalid stub registration.
    #[error("invalid stub configuration: {0}")]
    Configuration(String),

    /// Malformed request passed in by the host.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{0} is not supported")]
    Unimplemented(&'static str),

    /// A response message does not match the procedure's output type.
    #[error("expected type {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("invalid error code: {0}")]
    InvalidErrorCode(String),

    #[error("invalid http error status: {0}")]
    InvalidHttpStatus(u16),

    #[error("invalid attributes for {message}: {reason}")]
    InvalidAttributes { message: String, reason: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("template error: {0}")]
    Template(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Raised by a host that refuses requests no stub handled.
///
/// Displays the full diagnostic text.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct NetConnectNotAllowed {
    pub message: String,
}

impl StubError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        StubError::Configuration(msg.into())
    }
}
