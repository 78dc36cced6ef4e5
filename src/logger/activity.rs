//! Activity logger: a dedicated thread owns the `JsonlWriter`; every other
//! thread sends `ActivityEvent`s through a bounded crossbeam channel.
//!
//! `send()` uses `try_send()`, so connection threads are never blocked by
//! logging back-pressure. Events below the configured severity are dropped at
//! the handle before they reach the channel.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{PasteError, Result};
use crate::logger::jsonl::{EventType, JsonlConfig, JsonlWriter, LogEntry, Severity};

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Why an ingestion session rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackReason {
    Oversize,
    Empty,
    Io,
}

impl RollbackReason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Oversize => "oversize",
            Self::Empty => "empty",
            Self::Io => "io_error",
        }
    }
}

/// Events recorded in the activity log.
#[derive(Debug, Clone)]
pub enum ActivityEvent {
    ServiceStarted {
        version: String,
        config_hash: String,
        free_ids: usize,
        current_bytes: u64,
    },
    ServiceStopped {
        reason: String,
        uptime_secs: u64,
    },
    ListenerStarted {
        transport: &'static str,
        addr: String,
    },
    PasteCreated {
        id: String,
        size_bytes: u64,
        client: String,
        duration_ms: u64,
    },
    PasteRejected {
        client: String,
        error_code: String,
        reason: String,
    },
    PasteRolledBack {
        id: String,
        client: String,
        reason: RollbackReason,
        bytes: u64,
        details: Option<String>,
    },
    ItemEvicted {
        id: String,
        size_bytes: u64,
        reusable: bool,
    },
    PasteServed {
        id: String,
        client: String,
        size_bytes: u64,
    },
    PasteNotFound {
        id: String,
        client: String,
    },
    Error {
        code: String,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

impl ActivityEvent {
    /// Severity the event is recorded at.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::ServiceStarted { .. }
            | Self::ServiceStopped { .. }
            | Self::ListenerStarted { .. }
            | Self::PasteCreated { .. }
            | Self::PasteServed { .. } => Severity::Info,
            Self::PasteRolledBack {
                reason: RollbackReason::Empty,
                ..
            }
            | Self::PasteNotFound { .. } => Severity::Debug,
            Self::PasteRejected { .. } | Self::PasteRolledBack { .. } | Self::ItemEvicted { .. } => {
                Severity::Warning
            }
            Self::Error { .. } => Severity::Critical,
            Self::Shutdown => Severity::Critical,
        }
    }
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    min_level: Severity,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle with no logger thread behind it; every event is discarded.
    pub fn detached() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            min_level: Severity::Critical,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events counter
    /// is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if event.severity() < self.min_level {
            return;
        }
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    /// Whether events of `level` reach the log.
    pub fn enabled(&self, level: Severity) -> bool {
        level >= self.min_level
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Request graceful shutdown; join the logger thread afterwards.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for building the activity logger.
pub struct ActivityLoggerConfig {
    pub jsonl_config: JsonlConfig,
    pub channel_capacity: usize,
    pub min_level: Severity,
}

impl Default for ActivityLoggerConfig {
    fn default() -> Self {
        Self {
            jsonl_config: JsonlConfig::default(),
            channel_capacity: CHANNEL_CAPACITY,
            min_level: Severity::Info,
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle.
///
/// The thread runs until `handle.shutdown()` is called or all senders are dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let dropped_clone = Arc::clone(&dropped);

    let handle = ActivityLoggerHandle {
        tx,
        min_level: config.min_level,
        dropped_events: dropped,
    };

    let jsonl_config = config.jsonl_config;
    let join = thread::Builder::new()
        .name("pastes-logger".to_string())
        .spawn(move || {
            logger_thread_main(&rx, jsonl_config, &dropped_clone);
        })
        .map_err(|e| PasteError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(
    rx: &Receiver<ActivityEvent>,
    jsonl_config: JsonlConfig,
    dropped: &AtomicU64,
) {
    let mut jsonl = JsonlWriter::open(jsonl_config);

    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 {
            let mut warn = LogEntry::new(EventType::Error, Severity::Warning);
            warn.details = Some(format!("{d} log events dropped due to back-pressure"));
            jsonl.write_entry(&warn);
        }

        if matches!(event, ActivityEvent::Shutdown) {
            break;
        }

        jsonl.write_entry(&event_to_log_entry(&event));
        // Connection threads are sparse; flush so the log is tail-able.
        jsonl.flush();
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
fn event_to_log_entry(event: &ActivityEvent) -> LogEntry {
    let severity = event.severity();
    match event {
        ActivityEvent::ServiceStarted {
            version,
            config_hash,
            free_ids,
            current_bytes,
        } => {
            let mut e = LogEntry::new(EventType::ServiceStart, severity);
            e.size = Some(*current_bytes);
            e.details = Some(format!(
                "version={version} config_hash={config_hash} free_ids={free_ids}"
            ));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ServiceStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventType::ServiceStop, severity);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::ListenerStarted { transport, addr } => {
            let mut e = LogEntry::new(EventType::ListenerStart, severity);
            e.details = Some(format!("{transport} listening on {addr}"));
            e
        }
        ActivityEvent::PasteCreated {
            id,
            size_bytes,
            client,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventType::PasteCreate, severity);
            e.id = Some(id.clone());
            e.size = Some(*size_bytes);
            e.client = Some(client.clone());
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PasteRejected {
            client,
            error_code,
            reason,
        } => {
            let mut e = LogEntry::new(EventType::PasteReject, severity);
            e.client = Some(client.clone());
            e.reason = Some(reason.clone());
            e.error_code = Some(error_code.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::PasteRolledBack {
            id,
            client,
            reason,
            bytes,
            details,
        } => {
            let mut e = LogEntry::new(EventType::PasteRollback, severity);
            e.id = Some(id.clone());
            e.client = Some(client.clone());
            e.reason = Some(reason.as_str().to_string());
            e.size = Some(*bytes);
            e.error_message.clone_from(details);
            e.ok = Some(false);
            e
        }
        ActivityEvent::ItemEvicted {
            id,
            size_bytes,
            reusable,
        } => {
            let mut e = LogEntry::new(EventType::ItemEvict, severity);
            e.id = Some(id.clone());
            e.size = Some(*size_bytes);
            e.details = Some(format!("reusable={reusable}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::PasteServed {
            id,
            client,
            size_bytes,
        } => {
            let mut e = LogEntry::new(EventType::PasteServe, severity);
            e.id = Some(id.clone());
            e.client = Some(client.clone());
            e.size = Some(*size_bytes);
            e.ok = Some(true);
            e
        }
        ActivityEvent::PasteNotFound { id, client } => {
            let mut e = LogEntry::new(EventType::PasteNotFound, severity);
            e.id = Some(id.clone());
            e.client = Some(client.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventType::Error, severity);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventType::ServiceStop, severity),
    }
}

// ──────────────────── tests ────────────────────
