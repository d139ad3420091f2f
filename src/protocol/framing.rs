//! Body Framing Classification
//!
//! Once the header block is complete, the mirror has to decide how many body
//! bytes to read back. Three disciplines exist: a declared `Content-Length`,
//! `Transfer-Encoding: chunked`, or neither. The classification is derived
//! exactly once per connection and drives the body-streaming loop.

use crate::protocol::headers::header_value;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur while classifying the body framing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// `Content-Length` was present but its value is not a parseable integer
    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),
}

/// How the body of a request is delimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// A positive `Content-Length` was declared; read until exactly this
    /// many body bytes have been forwarded.
    KnownLength(u64),

    /// `Transfer-Encoding: chunked`. Chunk decoding is not implemented, so
    /// the body length is unknown; only immediately-available bytes are
    /// forwarded, which may truncate the body.
    Chunked,

    /// Neither header was usable; no body bytes will be read.
    Unknown,
}

impl BodyFraming {
    /// Classifies the body framing from a raw header block.
    ///
    /// `Content-Length` takes precedence: if present and parseable as a
    /// positive integer, the framing is [`BodyFraming::KnownLength`]. A value
    /// that fails integer parsing is a hard error. A parseable but
    /// non-positive value simply does not declare a body, and classification
    /// falls through to `Transfer-Encoding`, where only the literal value
    /// `chunked` (case-insensitive) is recognized; anything else is logged
    /// as unsupported and otherwise ignored.
    pub fn classify(block: &[u8]) -> Result<Self, FramingError> {
        if let Some(raw) = header_value(block, "Content-Length") {
            let text = String::from_utf8_lossy(raw);
            let length: i64 = text
                .parse()
                .map_err(|_| FramingError::InvalidContentLength(text.into_owned()))?;
            if length > 0 {
                return Ok(BodyFraming::KnownLength(length as u64));
            }
        }

        if let Some(raw) = header_value(block, "Transfer-Encoding") {
            if raw.eq_ignore_ascii_case(b"chunked") {
                return Ok(BodyFraming::Chunked);
            }
            warn!(
                value = %String::from_utf8_lossy(raw),
                "Transfer-Encoding header set, the value is not supported"
            );
        }

        Ok(BodyFraming::Unknown)
    }
}
