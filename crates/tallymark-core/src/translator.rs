//! Response rendering
//!
//! Turns engine [`Response`] values into the bytes a client sees. Only
//! successful responses render; failures become a [`TranslateError`] and the
//! transport decides how to report them.

use thiserror::Error;

use crate::types::{Payload, Response, ResponseKind};

/// Fixed acknowledgement line
pub const ACK_LINE: &str = "OK\n";

/// Output encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Plain text lines
    #[default]
    Text,
    /// JSON encoding of the whole response
    Json,
}

/// Rendering failures
#[derive(Error, Debug)]
pub enum TranslateError {
    /// The response describes a failed operation
    #[error("operation failed: {0}")]
    Failed(String),

    /// Kind and payload disagree
    #[error("response kind {kind:?} cannot carry this payload")]
    Mismatch {
        /// Declared kind
        kind: ResponseKind,
    },

    /// JSON encoding failed
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render `response` in `format`
pub fn translate(response: &Response, format: Format) -> Result<String, TranslateError> {
    if !response.success {
        let message = response.error_message.clone().unwrap_or_else(|| "unknown error".to_string());
        return Err(TranslateError::Failed(message));
    }
    match format {
        Format::Text => render_text(response),
        Format::Json => Ok(serde_json::to_string(response)?),
    }
}

fn render_text(response: &Response) -> Result<String, TranslateError> {
    match (response.kind, &response.payload) {
        (ResponseKind::Ack, Payload::Ack) => Ok(ACK_LINE.to_string()),
        (ResponseKind::Count, Payload::Count(value)) => Ok(format!("{value}\n")),
        (ResponseKind::ListU32, Payload::ListU32(ids)) => Ok(join_ids(ids)),
        (ResponseKind::Error, _) => Err(TranslateError::Failed(
            response.error_message.clone().unwrap_or_else(|| "unknown error".to_string()),
        )),
        (kind, _) => Err(TranslateError::Mismatch { kind }),
    }
}

/// Comma-joined decimals with no trailing separator
pub fn join_ids(ids: &[u32]) -> String {
    let mut out = String::with_capacity(ids.len() * 4);
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&id.to_string());
    }
    out
}
