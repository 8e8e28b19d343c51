//! Typed engine responses
//!
//! The facade never formats text itself; it produces a [`Response`] that a
//! translator renders for the caller.

use serde::Serialize;

use super::error::Error;

/// What kind of result a response carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Operation acknowledged with no value
    Ack,
    /// Single counter value
    Count,
    /// List of integer ids
    ListU32,
    /// Operation failed
    Error,
}

/// Response payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Payload {
    /// No value
    Ack,
    /// Counter value
    Count(u64),
    /// Integer ids in ascending order
    ListU32(Vec<u32>),
    /// Nothing; used by error responses
    Empty,
}

/// Result of one engine operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Response {
    /// Whether the operation succeeded
    pub success: bool,
    /// Result kind
    pub kind: ResponseKind,
    /// Result value
    pub payload: Payload,
    /// Error description when `success` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Response {
    /// Successful acknowledgement
    pub fn ack() -> Self {
        Self::ok(ResponseKind::Ack, Payload::Ack)
    }

    /// Successful counter value
    pub fn count(value: u64) -> Self {
        Self::ok(ResponseKind::Count, Payload::Count(value))
    }

    /// Successful id list
    pub fn list(ids: Vec<u32>) -> Self {
        Self::ok(ResponseKind::ListU32, Payload::ListU32(ids))
    }

    /// Failed operation
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            kind: ResponseKind::Error,
            payload: Payload::Empty,
            error_message: Some(message.into()),
        }
    }

    fn ok(kind: ResponseKind, payload: Payload) -> Self {
        Self { success: true, kind, payload, error_message: None }
    }
}

impl From<Error> for Response {
    fn from(err: Error) -> Self {
        Response::error(err.to_string())
    }
}

impl<T: Into<Response>> From<Result<T, Error>> for Response {
    fn from(result: Result<T, Error>) -> Self {
        match result {
            Ok(value) => value.into(),
            Err(err) => err.into(),
        }
    }
}

impl From<u64> for Response {
    fn from(value: u64) -> Self {
        Response::count(value)
    }
}

impl From<Vec<u32>> for Response {
    fn from(ids: Vec<u32>) -> Self {
        Response::list(ids)
    }
}

impl From<()> for Response {
    fn from(_: ()) -> Self {
        Response::ack()
    }
}
