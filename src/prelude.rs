//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use paste_store::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{PasteError, Result};

// Storage
pub use crate::storage::allocator::{Allocator, AllocatorStats, IdLease};
pub use crate::storage::capacity::CapacityTracker;
pub use crate::storage::id_pool::IdPool;
pub use crate::storage::lock::InstanceLock;

// Ingest
pub use crate::ingest::copy::{Deadline, bounded_copy};
pub use crate::ingest::session::{IngestContext, SessionOutcome, run_session};

// Server
pub use crate::server::PasteServer;

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, spawn_logger};

// Daemon
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::PasteDaemon;
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::SignalHandler;
