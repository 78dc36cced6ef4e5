//! Service lifecycle: take the directory lock, start the logger, build the
//! allocator from the backing directory, serve both transports, and shut
//! everything down in order when a signal arrives.

#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::config::Config;
use crate::core::errors::{PasteError, Result};
use crate::daemon::signals::SignalHandler;
use crate::logger::activity::{
    ActivityEvent, ActivityLoggerConfig, ActivityLoggerHandle, spawn_logger,
};
use crate::logger::jsonl::JsonlConfig;
use crate::server::PasteServer;
use crate::storage::allocator::Allocator;
use crate::storage::lock::InstanceLock;

/// How often the main loop polls the shutdown flag and listener health.
const TICK: Duration = Duration::from_millis(100);

/// Logger channel depth.
const LOG_CHANNEL_CAP: usize = 1024;

/// The paste service: owns every long-lived component.
pub struct PasteDaemon {
    config: Config,
    allocator: Arc<Allocator>,
    logger_handle: ActivityLoggerHandle,
    logger_join: Option<thread::JoinHandle<()>>,
    signal_handler: SignalHandler,
    start_time: Instant,
    _lock: InstanceLock,
}

impl PasteDaemon {
    /// Build the daemon with SIGINT/SIGTERM hooks registered.
    pub fn init(config: Config) -> Result<Self> {
        Self::init_with_signals(config, SignalHandler::new())
    }

    /// Build the daemon with a caller-supplied shutdown flag.
    pub fn init_with_signals(config: Config, signal_handler: SignalHandler) -> Result<Self> {
        let start_time = Instant::now();

        // 1. Single owner of the backing directory.
        let lock = InstanceLock::acquire(&config.paths.lock_file)?;

        // 2. Logger.
        let logger_config = ActivityLoggerConfig {
            jsonl_config: JsonlConfig {
                path: config.logging.jsonl_path.clone(),
                ..JsonlConfig::default()
            },
            channel_capacity: LOG_CHANNEL_CAP,
            min_level: config.logging.level,
        };
        let (logger_handle, logger_join) = spawn_logger(logger_config)?;

        // 3. Startup scan and pool generation.
        let allocator = match Allocator::open(&config.storage, Some(logger_handle.clone())) {
            Ok(allocator) => Arc::new(allocator),
            Err(err) => {
                logger_handle.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: format!("startup scan failed: {err}"),
                });
                logger_handle.shutdown();
                let _ = logger_join.join();
                return Err(err);
            }
        };

        Ok(Self {
            config,
            allocator,
            logger_handle,
            logger_join: Some(logger_join),
            signal_handler,
            start_time,
            _lock: lock,
        })
    }

    #[must_use]
    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.allocator
    }

    /// Clone of the shutdown flag, for requesting shutdown from elsewhere.
    #[must_use]
    pub fn signal_handler(&self) -> SignalHandler {
        self.signal_handler.clone()
    }

    /// Serve until shutdown is requested or a listener dies.
    pub fn run(&mut self) -> Result<()> {
        let stats = self.allocator.stats();
        self.logger_handle.send(ActivityEvent::ServiceStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
            free_ids: stats.free_ids,
            current_bytes: stats.current_bytes,
        });

        let mut server = match PasteServer::start(
            &self.config,
            Arc::clone(&self.allocator),
            self.logger_handle.clone(),
        ) {
            Ok(server) => server,
            Err(err) => {
                self.logger_handle.send(ActivityEvent::Error {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.stop_logger("listener startup failed");
                return Err(err);
            }
        };
        eprintln!(
            "[PASTES-DAEMON] tcp on {}, http on {}, serving {} ({} ids free, {}/{} bytes)",
            server.tcp_addr(),
            server.web_addr(),
            server.public_base_url(),
            stats.free_ids,
            stats.current_bytes,
            stats.max_bytes,
        );

        // ──────── main loop ────────
        let mut listener_failed = false;
        loop {
            if self.signal_handler.should_shutdown() {
                eprintln!("[PASTES-DAEMON] shutdown requested");
                break;
            }
            if server.has_failed() {
                listener_failed = true;
                break;
            }
            thread::sleep(TICK);
        }

        let reason = if listener_failed {
            "listener failed"
        } else {
            "clean shutdown"
        };
        self.shutdown(&mut server, reason);

        if listener_failed {
            return Err(PasteError::Runtime {
                details: "an accept loop exited unexpectedly".to_string(),
            });
        }
        Ok(())
    }

    // ──────────────────── shutdown ────────────────────

    fn shutdown(&mut self, server: &mut PasteServer, reason: &str) {
        // Connections finish before the logger so their events are flushed.
        server.shutdown();
        self.stop_logger(reason);
    }

    fn stop_logger(&mut self, reason: &str) {
        let uptime_secs = self.start_time.elapsed().as_secs();
        self.logger_handle.send(ActivityEvent::ServiceStopped {
            reason: reason.to_string(),
            uptime_secs,
        });
        self.logger_handle.shutdown();
        if let Some(join) = self.logger_join.take() {
            let _ = join.join();
        }
        eprintln!("[PASTES-DAEMON] stopped: {reason} (uptime={uptime_secs}s)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpStream};

    fn test_config(root: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.server.tcp_port = 0;
        config.server.web_port = 0;
        config.storage.directory = root.join("pastes");
        config.storage.id_length = 2;
        config.ingest.timeout_ms = 2_000;
        config.logging.jsonl_path = Some(root.join("activity.jsonl"));
        config.paths.lock_file = root.join("pastes.lock");
        config
    }

    #[test]
    fn second_daemon_on_same_lock_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let _first = PasteDaemon::init_with_signals(config.clone(), SignalHandler::unregistered()).unwrap();
        let err = PasteDaemon::init_with_signals(config, SignalHandler::unregistered())
            .err()
            .unwrap();
        assert_eq!(err.code(), "PST-3005");
    }

    #[test]
    fn unusable_directory_fails_init() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = test_config(tmp.path());
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, b"x").unwrap();
        config.storage.directory = blocker.join("pastes");
        let err = PasteDaemon::init_with_signals(config, SignalHandler::unregistered())
            .err()
            .unwrap();
        assert_eq!(err.code(), "PST-3002");
    }

    #[test]
    fn run_serves_until_shutdown_requested() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let signals = SignalHandler::unregistered();
        let mut daemon = PasteDaemon::init_with_signals(config, signals.clone()).unwrap();
        let allocator = Arc::clone(daemon.allocator());

        let runner = thread::spawn(move || daemon.run());

        // Ports are ephemeral; find the write listener through the log.
        let log_path = tmp.path().join("activity.jsonl");
        let tcp_addr = wait_for_listener(&log_path, "tcp");

        let mut client = TcpStream::connect(tcp_addr).unwrap();
        client.write_all(b"from the daemon").unwrap();
        client.shutdown(Shutdown::Write).unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).unwrap();
        assert!(reply.starts_with("http://127.0.0.1:"), "{reply}");

        signals.request_shutdown();
        runner.join().unwrap().unwrap();
        assert_eq!(allocator.stats().current_bytes, 15);

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("service_start"));
        assert!(log.contains("paste_create"));
        assert!(log.contains("service_stop"));

        // Listeners are joined before the logger stops, so nothing follows the stop event.
        let last: serde_json::Value = serde_json::from_str(log.lines().last().unwrap()).unwrap();
        assert_eq!(last["event"], "service_stop");
        assert!(last["details"].as_str().unwrap().starts_with("reason=clean shutdown"));
    }

    fn wait_for_listener(log_path: &std::path::Path, transport: &str) -> String {
        let prefix = format!("{transport} listening on ");
        for _ in 0..200 {
            if let Ok(log) = std::fs::read_to_string(log_path) {
                for line in log.lines() {
                    let Ok(entry) = serde_json::from_str::<serde_json::Value>(line) else {
                        continue;
                    };
                    if let Some(addr) = entry["details"].as_str().and_then(|d| d.strip_prefix(&prefix)) {
                        return addr.to_string();
                    }
                }
            }
            thread::sleep(Duration::from_millis(10));
        }
        panic!("{transport} listener never logged");
    }
}
