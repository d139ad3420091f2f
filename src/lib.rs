//! # httpmirror - An HTTP Mirror Server for Load-Test Assertions
//!
//! httpmirror is a test double: it accepts HTTP connections and echoes each
//! request back to the sender as the response body, preceded by a fixed
//! `HTTP/1.0 200 OK` status line. A load-generating client pointed at the
//! mirror can assert on exactly the bytes it transmitted, independent of any
//! application logic on the far side.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          httpmirror                           │
//! │                                                               │
//! │  ┌─────────────┐     ┌───────────────┐     ┌──────────────┐   │
//! │  │ TCP Server  │────>│ MirrorHandler │────>│   protocol   │   │
//! │  │ (Listener)  │     │ (1 per conn)  │     │ header scan, │   │
//! │  └─────────────┘     └───────────────┘     │ body framing │   │
//! │                                            └──────────────┘   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## What Gets Mirrored
//!
//! For every connection the handler writes the fixed preamble
//! (`HTTP/1.0 200 OK`, `Content-Type: text/plain`, blank line) and then:
//!
//! 1. Accumulates the request header block until the blank-line terminator
//!    and echoes it back verbatim.
//! 2. Classifies the body framing from the headers:
//!    - `Content-Length: n` — reads and echoes exactly `n` body bytes.
//!    - `Transfer-Encoding: chunked` — echoes only immediately-available
//!      bytes; chunk decoding is not implemented, so the body may be
//!      truncated. Known limitation.
//!    - neither — reads no body.
//! 3. Flushes and closes. One request per connection, no keep-alive.
//!
//! ## Quick Start
//!
//! ```ignore
//! use httpmirror::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() {
//!     let stats = Arc::new(ConnectionStats::new());
//!     let listener = TcpListener::bind("127.0.0.1:8081").await.unwrap();
//!
//!     loop {
//!         let (stream, addr) = listener.accept().await.unwrap();
//!         tokio::spawn(handle_connection(stream, addr, Arc::clone(&stats)));
//!     }
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: header-block terminator search, header lookup, framing
//! - [`connection`]: the per-connection mirror handler and statistics

pub mod connection;
pub mod protocol;

// Re-export commonly used types for convenience
pub use connection::{handle_connection, ConnectionError, ConnectionStats, MirrorHandler};
pub use protocol::{body_start, header_value, BodyFraming, FramingError};

/// The default port the mirror listens on
pub const DEFAULT_PORT: u16 = 8081;

/// The default host the mirror binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of httpmirror
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
