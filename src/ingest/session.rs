//! Per-connection ingestion: acquire, write, then commit or roll back.
//!
//! ```text
//! Start ──acquire──▶ Acquired ──create file──▶ Writing ──▶ Committed
//!   │                   │                         │
//!   └─ reject           └─ release                └─▶ RolledBack
//! ```
//!
//! Every terminal state answers the client with at most one line and leaves
//! the allocator consistent: a committed item is counted exactly once, a
//! rolled-back one leaves no file and its identifier back in the pool.

#![allow(missing_docs)]

use std::fs::{self, File};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::PasteError;
use crate::ingest::copy::{CopyEnd, DeadlineRead, Deadline, bounded_copy};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle, RollbackReason};
use crate::storage::allocator::{Allocator, IdLease};

/// Reply sent for oversize payloads.
pub const OVERSIZE_REPLY: &str = "Too much data, try smaller :)";

/// Shared, read-only inputs of every ingestion session.
pub struct IngestContext {
    pub allocator: Arc<Allocator>,
    pub max_item_size: u64,
    pub timeout: Duration,
    /// Base of the URL handed back to writers, without trailing slash.
    pub public_base_url: String,
    pub logger: ActivityLoggerHandle,
}

impl IngestContext {
    #[must_use]
    pub fn from_config(
        config: &Config,
        allocator: Arc<Allocator>,
        public_base_url: String,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            allocator,
            max_item_size: config.storage.max_item_size,
            timeout: config.read_timeout(),
            public_base_url,
            logger,
        }
    }

    /// Retrieval URL for `id`.
    #[must_use]
    pub fn paste_url(&self, id: &str) -> String {
        format!("{}/{id}", self.public_base_url)
    }
}

/// Terminal state of one session.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Item stored under `id`.
    Committed { id: String, bytes: u64 },
    /// No identifier could be acquired.
    Rejected(PasteError),
    /// The backing file could not be created; the identifier was released.
    CreateFailed(PasteError),
    /// Payload discarded; file removed and identifier released.
    RolledBack {
        id: String,
        reason: RollbackReason,
        bytes: u64,
    },
}

impl SessionOutcome {
    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// Drive one write connection to completion.
///
/// `client` is the peer address used in log events.
pub fn run_session<S>(ctx: &IngestContext, stream: &mut S, client: &str) -> SessionOutcome
where
    S: DeadlineRead + Write + ?Sized,
{
    let started = Instant::now();

    // Start → Acquired
    let lease = match ctx.allocator.lease() {
        Ok(lease) => lease,
        Err(err) => {
            ctx.logger.send(ActivityEvent::PasteRejected {
                client: client.to_string(),
                error_code: err.code().to_string(),
                reason: err.to_string(),
            });
            reply_error(stream, &err);
            return SessionOutcome::Rejected(err);
        }
    };

    // Acquired → Writing
    let path = ctx.allocator.item_path(lease.id());
    let mut file = match File::create(&path) {
        Ok(file) => file,
        Err(e) => {
            let err = PasteError::io(&path, e);
            eprintln!("[PASTES-INGEST] failed to create {}: {err}", path.display());
            ctx.logger.send(ActivityEvent::Error {
                code: err.code().to_string(),
                message: err.to_string(),
            });
            lease.release();
            return SessionOutcome::CreateFailed(err);
        }
    };

    // Writing: one byte past the cap tells "exactly full" from "too much".
    let deadline = Deadline::after(ctx.timeout);
    let limit = ctx.max_item_size.saturating_add(1);
    let copied = bounded_copy(stream, &mut file, limit, deadline);
    let flushed = file.flush();
    drop(file);

    let failure = match copied.end {
        CopyEnd::Failed(e) => Some(e),
        _ => flushed.err(),
    };

    if copied.bytes > ctx.max_item_size {
        let err = PasteError::OversizeRejected {
            limit: ctx.max_item_size,
        };
        return roll_back(ctx, stream, lease, client, RollbackReason::Oversize, copied.bytes, &err);
    }
    if let Some(e) = failure {
        let err = PasteError::net("ingest", e);
        return roll_back(ctx, stream, lease, client, RollbackReason::Io, copied.bytes, &err);
    }
    if copied.bytes == 0 {
        return roll_back(
            ctx,
            stream,
            lease,
            client,
            RollbackReason::Empty,
            0,
            &PasteError::EmptyPayloadIgnored,
        );
    }

    // Writing → Committed
    let id = lease.commit(copied.bytes);
    ctx.logger.send(ActivityEvent::PasteCreated {
        id: id.clone(),
        size_bytes: copied.bytes,
        client: client.to_string(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });
    reply_line(stream, &ctx.paste_url(&id));

    SessionOutcome::Committed {
        id,
        bytes: copied.bytes,
    }
}

fn roll_back<S>(
    ctx: &IngestContext,
    stream: &mut S,
    lease: IdLease,
    client: &str,
    reason: RollbackReason,
    bytes: u64,
    err: &PasteError,
) -> SessionOutcome
where
    S: Write + ?Sized,
{
    let id = lease.id().to_string();
    let path = ctx.allocator.item_path(&id);
    if let Err(e) = fs::remove_file(&path) {
        eprintln!("[PASTES-INGEST] failed to remove {}: {e}", path.display());
    }
    lease.release();

    ctx.logger.send(ActivityEvent::PasteRolledBack {
        id: id.clone(),
        client: client.to_string(),
        reason,
        bytes,
        details: err.client_reply(),
    });
    reply_error(stream, err);

    SessionOutcome::RolledBack { id, reason, bytes }
}

fn reply_error<S: Write + ?Sized>(stream: &mut S, err: &PasteError) {
    if let Some(line) = err.client_reply() {
        reply_line(stream, &line);
    }
}

/// Best effort: the peer may already be gone.
fn reply_line<S: Write + ?Sized>(stream: &mut S, line: &str) {
    let _ = stream
        .write_all(line.as_bytes())
        .and_then(|()| stream.write_all(b"\n"))
        .and_then(|()| stream.flush());
}

// ──────────────────── tests ────────────────────
