//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{PasteError, Result};
use crate::logger::jsonl::Severity;
use crate::storage::id_pool::{ALPHABET, MAX_ID_LENGTH};

/// Full paste store configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Listening sockets and the public addresses advertised to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address shared by both transports.
    pub address: String,
    /// Raw TCP port accepting pastes.
    pub tcp_port: u16,
    /// HTTP port serving pastes back.
    pub web_port: u16,
    /// Base URL embedded in the links handed back to writers.
    pub base_url: String,
    /// Host shown on the index page for the TCP transport (empty: host of `base_url`).
    pub tcp_display_host: String,
    /// Port shown on the index page for the TCP transport (0: `tcp_port`).
    pub tcp_display_port: u16,
}

/// Backing directory and allocation limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StorageConfig {
    pub directory: PathBuf,
    /// Soft cap on the summed size of all stored items, in bytes.
    pub max_dir_size: u64,
    /// Hard cap on a single item, in bytes.
    pub max_item_size: u64,
    /// Length of generated identifiers.
    pub id_length: usize,
    /// Evict the oldest items instead of rejecting when full.
    pub gc: bool,
}

/// Ingestion protocol knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IngestConfig {
    /// Time a writer gets to send its payload once an identifier is reserved.
    pub timeout_ms: u64,
}

/// Activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum severity that reaches the log.
    pub level: Severity,
    /// JSONL file; `None` writes JSON lines to stderr.
    pub jsonl_path: Option<PathBuf>,
}

/// Filesystem paths used by pastes itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    /// Exclusive lock guarding single-process ownership of the backing directory.
    pub lock_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            tcp_port: 9999,
            web_port: 4433,
            base_url: "http://127.0.0.1".to_string(),
            tcp_display_host: String::new(),
            tcp_display_port: 0,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: env::temp_dir().join("pastes"),
            max_dir_size: 104_857_600,
            max_item_size: 10_485_760,
            id_length: 4,
            gc: false,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { timeout_ms: 1_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Severity::Info,
            jsonl_path: None,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!(
                    "[PASTES-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths"
                );
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        let cfg = home_dir.join(".config").join("pastes").join("config.toml");
        let data = home_dir.join(".local").join("share").join("pastes");
        Self {
            config_file: cfg,
            lock_file: data.join("pastes.lock"),
        }
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| PasteError::Io {
                path: path_buf.clone(),
                source,
            })?;
            let parsed: Self = toml::from_str(&raw)?;
            parsed
        } else if is_explicit_path {
            return Err(PasteError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.finalize()?;
        Ok(cfg)
    }

    /// Normalize and validate after programmatic edits (CLI flag overrides).
    pub fn finalize(&mut self) -> Result<()> {
        self.normalize();
        self.validate()
    }

    /// Deterministic hash of the effective config for logging.
    ///
    /// FNV-1a keeps the value stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Read deadline imposed on a writer once its identifier is reserved.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.ingest.timeout_ms)
    }

    /// `address:tcp_port`.
    #[must_use]
    pub fn tcp_bind_addr(&self) -> String {
        join_host_port(&self.server.address, self.server.tcp_port)
    }

    /// `address:web_port`.
    #[must_use]
    pub fn web_bind_addr(&self) -> String {
        join_host_port(&self.server.address, self.server.web_port)
    }

    /// Public base URL for the configured web port.
    #[must_use]
    pub fn public_base_url(&self) -> String {
        self.public_base_url_for(self.server.web_port)
    }

    /// Public base URL, appending `:web_port` unless it is the scheme default
    /// or `base_url` already names a port.
    #[must_use]
    pub fn public_base_url_for(&self, web_port: u16) -> String {
        let base = self.server.base_url.trim_end_matches('/');
        let Some((scheme, rest)) = base.split_once("://") else {
            return base.to_string();
        };
        let (authority, path) = rest.find('/').map_or((rest, ""), |idx| rest.split_at(idx));
        let default_port = if scheme.eq_ignore_ascii_case("https") {
            443
        } else {
            80
        };
        if web_port == 0 || web_port == default_port || authority_has_port(authority) {
            return base.to_string();
        }
        format!("{scheme}://{authority}:{web_port}{path}")
    }

    /// Host advertised for the TCP transport on the index page: the explicit
    /// override, else the host of `base_url` as is.
    #[must_use]
    pub fn display_tcp_host(&self) -> String {
        if !self.server.tcp_display_host.is_empty() {
            return self.server.tcp_display_host.clone();
        }
        let base = self.server.base_url.trim_end_matches('/');
        let rest = base.split_once("://").map_or(base, |(_, rest)| rest);
        let authority = rest.split('/').next().unwrap_or(rest);
        strip_port(authority).to_string()
    }

    /// Port advertised for the TCP transport, given the port actually bound.
    #[must_use]
    pub fn display_tcp_port(&self, bound_port: u16) -> u16 {
        if self.server.tcp_display_port == 0 {
            bound_port
        } else {
            self.server.tcp_display_port
        }
    }

    /// Apply `PASTES_*` overrides through `lookup` (the process env in production).
    pub fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // server
        if let Some(raw) = lookup("PASTES_ADDRESS") {
            self.server.address = raw;
        }
        if let Some(raw) = lookup("PASTES_TCP_PORT") {
            self.server.tcp_port = parse_env("PASTES_TCP_PORT", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_WEB_PORT") {
            self.server.web_port = parse_env("PASTES_WEB_PORT", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_BASE_URL") {
            self.server.base_url = raw;
        }
        if let Some(raw) = lookup("PASTES_TCP_DISPLAY_HOST") {
            self.server.tcp_display_host = raw;
        }
        if let Some(raw) = lookup("PASTES_TCP_DISPLAY_PORT") {
            self.server.tcp_display_port = parse_env("PASTES_TCP_DISPLAY_PORT", &raw)?;
        }

        // storage
        if let Some(raw) = lookup("PASTES_DIRECTORY") {
            self.storage.directory = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("PASTES_MAX_DIR_SIZE") {
            self.storage.max_dir_size = parse_env("PASTES_MAX_DIR_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_MAX_ITEM_SIZE") {
            self.storage.max_item_size = parse_env("PASTES_MAX_ITEM_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_ID_LENGTH") {
            self.storage.id_length = parse_env("PASTES_ID_LENGTH", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_GC") {
            self.storage.gc = parse_env("PASTES_GC", &raw)?;
        }

        // ingest
        if let Some(raw) = lookup("PASTES_TIMEOUT_MS") {
            self.ingest.timeout_ms = parse_env("PASTES_TIMEOUT_MS", &raw)?;
        }

        // logging
        if let Some(raw) = lookup("PASTES_LOG_LEVEL") {
            self.logging.level = parse_env("PASTES_LOG_LEVEL", &raw)?;
        }
        if let Some(raw) = lookup("PASTES_JSONL_PATH") {
            self.logging.jsonl_path = Some(PathBuf::from(raw));
        }

        Ok(())
    }

    fn normalize(&mut self) {
        let trimmed = self.server.base_url.trim().trim_end_matches('/').to_string();
        self.server.base_url = trimmed;
        self.server.address = self.server.address.trim().to_string();
        if self
            .logging
            .jsonl_path
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            self.logging.jsonl_path = None;
        }
    }

    /// Check cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.server.address.is_empty() {
            return Err(PasteError::InvalidConfig {
                details: "server.address must not be empty".to_string(),
            });
        }

        if self.server.tcp_port != 0 && self.server.tcp_port == self.server.web_port {
            return Err(PasteError::InvalidConfig {
                details: format!(
                    "server.tcp_port and server.web_port must differ, both are {}",
                    self.server.tcp_port
                ),
            });
        }

        let base = &self.server.base_url;
        if !(base.starts_with("http://") || base.starts_with("https://"))
            || base.split_once("://").is_some_and(|(_, rest)| rest.is_empty())
        {
            return Err(PasteError::InvalidConfig {
                details: format!("server.base_url must be an http(s) URL with a host, got {base:?}"),
            });
        }

        if self.storage.directory.as_os_str().is_empty() {
            return Err(PasteError::InvalidConfig {
                details: "storage.directory is mandatory".to_string(),
            });
        }

        // The whole identifier space is materialized at startup.
        if !(1..=MAX_ID_LENGTH).contains(&self.storage.id_length) {
            return Err(PasteError::InvalidConfig {
                details: format!(
                    "storage.id_length must be in [1, {MAX_ID_LENGTH}] ({} symbols), got {}",
                    ALPHABET.len(),
                    self.storage.id_length
                ),
            });
        }

        if self.storage.max_dir_size == 0 || self.storage.max_item_size == 0 {
            return Err(PasteError::InvalidConfig {
                details: "storage.max_dir_size and storage.max_item_size must be > 0".to_string(),
            });
        }

        if self.storage.max_item_size == u64::MAX {
            return Err(PasteError::InvalidConfig {
                details: "storage.max_item_size must leave room for the overflow probe byte"
                    .to_string(),
            });
        }

        if self.ingest.timeout_ms == 0 {
            return Err(PasteError::InvalidConfig {
                details: "ingest.timeout_ms must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn authority_has_port(authority: &str) -> bool {
    authority
        .rsplit_once(':')
        .is_some_and(|(_, port)| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()))
}

fn strip_port(authority: &str) -> &str {
    if authority_has_port(authority) {
        authority
            .rsplit_once(':')
            .map_or(authority, |(host, _)| host)
    } else {
        authority
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|error| PasteError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}
