//! HTTP Header-Block Parsing
//!
//! This module provides just enough HTTP parsing for the mirror: it never
//! builds a request object, it only locates the end of the header block and
//! classifies how the body is framed. Everything operates on raw bytes so the
//! request can be echoed back byte-for-byte.
//!
//! ## Modules
//!
//! - `headers`: terminator search and case-insensitive header value lookup
//! - `framing`: the [`BodyFraming`] classification derived from the block
//!
//! ## Example
//!
//! ```
//! use httpmirror::protocol::{body_start, BodyFraming};
//!
//! let block = b"POST / HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
//! let offset = body_start(block).unwrap();
//! assert_eq!(&block[offset..], b"hello");
//! assert_eq!(BodyFraming::classify(block), Ok(BodyFraming::KnownLength(5)));
//! ```

pub mod framing;
pub mod headers;

// Re-export commonly used types for convenience
pub use framing::{BodyFraming, FramingError};
pub use headers::{body_start, header_value};
