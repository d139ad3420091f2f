//! Connection Handler Module
//!
//! This module manages individual client connections to the mirror. Each
//! accepted connection is handled by its own async task, so any number of
//! load-generator clients can be mirrored concurrently without sharing any
//! per-request state.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                      (main.rs)                              │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     MirrorHandler                           │
//! │                                                             │
//! │  preamble ──> accumulate headers ──> echo headers ──┐       │
//! │                                                     ▼       │
//! │             close <── stream body <── classify framing      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use httpmirror::connection::{handle_connection, ConnectionStats};
//! use std::sync::Arc;
//!
//! let stats = Arc::new(ConnectionStats::new());
//!
//! // For each accepted connection...
//! let (stream, addr) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, addr, Arc::clone(&stats)));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, ConnectionError, ConnectionStats, MirrorHandler};
