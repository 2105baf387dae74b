//! Response synthesis.
//!
//! Turns a declarative response value into the HTTP response a real server
//! would have sent: a protobuf body with status 200 on success, or a JSON
//! error object with the status mapped from its code.

use crate::error::{Result, StubError};
use crate::request::{JSON_CONTENT_TYPE, PROTOBUF_CONTENT_TYPE};
use crate::schema::{Message, MessageType};
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Error codes and their HTTP statuses.
///
/// Several codes share a status. Reverse lookup returns the code declared
/// first in [`ErrorCode::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Canceled,
    InvalidArgument,
    Malformed,
    DeadlineExceeded,
    NotFound,
    BadRoute,
    AlreadyExists,
    PermissionDenied,
    Unauthenticated,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Internal,
    Unknown,
    Unimplemented,
    Unavailable,
    #[serde(rename = "dataloss")]
    DataLoss,
}

impl ErrorCode {
    /// Declaration order, which is also the reverse lookup order.
    pub const ALL: [ErrorCode; 18] = [
        ErrorCode::Canceled,
        ErrorCode::InvalidArgument,
        ErrorCode::Malformed,
        ErrorCode::DeadlineExceeded,
        ErrorCode::NotFound,
        ErrorCode::BadRoute,
        ErrorCode::AlreadyExists,
        ErrorCode::PermissionDenied,
        ErrorCode::Unauthenticated,
        ErrorCode::ResourceExhausted,
        ErrorCode::FailedPrecondition,
        ErrorCode::Aborted,
        ErrorCode::OutOfRange,
        ErrorCode::Internal,
        ErrorCode::Unknown,
        ErrorCode::Unimplemented,
        ErrorCode::Unavailable,
        ErrorCode::DataLoss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Canceled => "canceled",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Malformed => "malformed",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
            ErrorCode::NotFound => "not_found",
            ErrorCode::BadRoute => "bad_route",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::PermissionDenied => "permission_denied",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::ResourceExhausted => "resource_exhausted",
            ErrorCode::FailedPrecondition => "failed_precondition",
            ErrorCode::Aborted => "aborted",
            ErrorCode::OutOfRange => "out_of_range",
            ErrorCode::Internal => "internal",
            ErrorCode::Unknown => "unknown",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DataLoss => "dataloss",
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Canceled | ErrorCode::DeadlineExceeded => 408,
            ErrorCode::InvalidArgument | ErrorCode::Malformed | ErrorCode::OutOfRange => 400,
            ErrorCode::NotFound | ErrorCode::BadRoute => 404,
            ErrorCode::AlreadyExists | ErrorCode::Aborted => 409,
            ErrorCode::PermissionDenied => 403,
            ErrorCode::Unauthenticated => 401,
            ErrorCode::ResourceExhausted => 429,
            ErrorCode::FailedPrecondition => 412,
            ErrorCode::Internal | ErrorCode::Unknown | ErrorCode::DataLoss => 500,
            ErrorCode::Unimplemented => 501,
            ErrorCode::Unavailable => 503,
        }
    }

    /// First-declared code for an HTTP status.
    pub fn from_status(status: u16) -> Option<ErrorCode> {
        Self::ALL.into_iter().find(|c| c.http_status() == status)
    }
}

impl FromStr for ErrorCode {
    type Err = StubError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| StubError::InvalidErrorCode(s.to_string()))
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured error as carried in an error response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {msg}")]
pub struct TwirpError {
    pub code: ErrorCode,
    pub msg: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl TwirpError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            msg: msg.into(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    pub fn http_status(&self) -> u16 {
        self.code.http_status()
    }
}

impl From<ErrorCode> for TwirpError {
    /// The code doubles as the message.
    fn from(code: ErrorCode) -> Self {
        TwirpError::new(code, code.as_str())
    }
}

/// What a stub answers with.
#[derive(Debug, Clone)]
pub enum ResponseValue {
    /// Zero-valued instance of the output type.
    Default,
    /// Output type built from a field map; other fields default.
    Attrs(Json),
    Message(Message),
    /// Zero-valued instance of an explicitly named type.
    Type(MessageType),
    Error(TwirpError),
    /// Symbolic error code, e.g. `not_found`.
    Code(String),
    /// HTTP status mapped to an error code.
    Status(u16),
}

impl From<()> for ResponseValue {
    fn from(_: ()) -> Self {
        ResponseValue::Default
    }
}

impl From<Json> for ResponseValue {
    fn from(v: Json) -> Self {
        ResponseValue::Attrs(v)
    }
}

impl From<Message> for ResponseValue {
    fn from(v: Message) -> Self {
        ResponseValue::Message(v)
    }
}

impl From<MessageType> for ResponseValue {
    fn from(v: MessageType) -> Self {
        ResponseValue::Type(v)
    }
}

impl From<TwirpError> for ResponseValue {
    fn from(v: TwirpError) -> Self {
        ResponseValue::Error(v)
    }
}

impl From<ErrorCode> for ResponseValue {
    fn from(v: ErrorCode) -> Self {
        ResponseValue::Error(v.into())
    }
}

impl From<&str> for ResponseValue {
    fn from(v: &str) -> Self {
        ResponseValue::Code(v.to_string())
    }
}

impl From<u16> for ResponseValue {
    fn from(v: u16) -> Self {
        ResponseValue::Status(v)
    }
}

/// A client call result is repackaged as-is.
impl From<std::result::Result<Message, TwirpError>> for ResponseValue {
    fn from(v: std::result::Result<Message, TwirpError>) -> Self {
        match v {
            Ok(message) => ResponseValue::Message(message),
            Err(error) => ResponseValue::Error(error),
        }
    }
}

impl<T: Into<ResponseValue>> From<Option<T>> for ResponseValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ResponseValue::Default)
    }
}

/// A complete HTTP response handed back to the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseDescriptor {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseDescriptor {
    pub fn success(message: &Message) -> Self {
        Self::with_body(StatusCode::OK, PROTOBUF_CONTENT_TYPE, message.encode())
    }

    pub fn error(error: &TwirpError) -> Result<Self> {
        let status = StatusCode::from_u16(error.http_status())
            .map_err(|_| StubError::InvalidHttpStatus(error.http_status()))?;
        Ok(Self::with_body(
            status,
            JSON_CONTENT_TYPE,
            serde_json::to_vec(error)?,
        ))
    }

    fn with_body(status: StatusCode, content_type: &'static str, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            status,
            headers,
            body: Bytes::from(body),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    /// Read the response back the way a client would.
    pub fn decode(
        &self,
        output_type: &MessageType,
    ) -> Result<std::result::Result<Message, TwirpError>> {
        if self.is_success() {
            Ok(Ok(output_type.decode(&self.body)?))
        } else {
            Ok(Err(serde_json::from_slice(&self.body)?))
        }
    }
}

impl From<ResponseDescriptor> for http::Response<Bytes> {
    fn from(descriptor: ResponseDescriptor) -> Self {
        let mut response = http::Response::new(descriptor.body);
        *response.status_mut() = descriptor.status;
        *response.headers_mut() = descriptor.headers;
        response
    }
}

/// Build the response for a procedure with the given output type.
pub fn synthesize(output_type: &MessageType, value: ResponseValue) -> Result<ResponseDescriptor> {
    let error = match value {
        ResponseValue::Default => return Ok(ResponseDescriptor::success(&output_type.new_message())),
        ResponseValue::Attrs(attrs) => {
            let message =
                output_type
                    .from_json(&attrs)
                    .map_err(|e| StubError::InvalidAttributes {
                        message: output_type.full_name().to_string(),
                        reason: e.to_string(),
                    })?;
            return Ok(ResponseDescriptor::success(&message));
        }
        ResponseValue::Message(message) => {
            check_type(output_type, message.message_type())?;
            return Ok(ResponseDescriptor::success(&message));
        }
        ResponseValue::Type(message_type) => {
            check_type(output_type, &message_type)?;
            return Ok(ResponseDescriptor::success(&message_type.new_message()));
        }
        ResponseValue::Error(error) => error,
        ResponseValue::Code(code) => TwirpError::from(code.parse::<ErrorCode>()?),
        ResponseValue::Status(status) => ErrorCode::from_status(status)
            .map(TwirpError::from)
            .ok_or(StubError::InvalidHttpStatus(status))?,
    };

    ResponseDescriptor::error(&error)
}

fn check_type(expected: &MessageType, found: &MessageType) -> Result<()> {
    if expected != found {
        return Err(StubError::TypeMismatch {
            expected: expected.full_name().to_string(),
            found: found.full_name().to_string(),
        });
    }
    Ok(())
}
