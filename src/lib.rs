#![forbid(unsafe_code)]

//! Paste store: accept text over a raw TCP connection, store it under a short
//! random identifier, and serve it back over HTTP.
//!
//! Building blocks:
//! 1. **Storage**: identifier pool, capacity accounting, oldest-first eviction
//! 2. **Ingest**: bounded, deadline-limited copy of one connection into one item
//! 3. **Server**: the TCP write transport and the HTTP read transport
//!
//! # Library usage
//!
//! Use the [`prelude`] for convenient access to the most common types:
//!
//! ```rust,no_run
//! use paste_store::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use paste_store::core::config::Config;
//! use paste_store::storage::allocator::Allocator;
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod ingest;
pub mod logger;
pub mod server;
pub mod storage;
