//! PST-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, PasteError>;

/// Top-level error type for the paste store.
#[derive(Debug, Error)]
pub enum PasteError {
    #[error("[PST-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[PST-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[PST-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[PST-2001] storage full")]
    StorageFull,

    #[error("[PST-2002] ID pool empty")]
    PoolEmpty,

    #[error("[PST-2003] failed to run GC for {trigger}")]
    GcFailed { trigger: &'static str },

    #[error("[PST-2004] nothing to evict in {path}")]
    NothingToEvict { path: PathBuf },

    #[error("[PST-2101] payload exceeds {limit} bytes")]
    OversizeRejected { limit: u64 },

    #[error("[PST-2102] empty payload ignored")]
    EmptyPayloadIgnored,

    #[error("[PST-2201] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[PST-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[PST-3003] network failure in {context}: {source}")]
    Network {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("[PST-3004] malformed HTTP request: {details}")]
    Http { details: String },

    #[error("[PST-3005] storage directory is owned by another process (lock {path})")]
    InstanceLocked { path: PathBuf },

    #[error("[PST-3006] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[PST-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl PasteError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "PST-1001",
            Self::MissingConfig { .. } => "PST-1002",
            Self::ConfigParse { .. } => "PST-1003",
            Self::StorageFull => "PST-2001",
            Self::PoolEmpty => "PST-2002",
            Self::GcFailed { .. } => "PST-2003",
            Self::NothingToEvict { .. } => "PST-2004",
            Self::OversizeRejected { .. } => "PST-2101",
            Self::EmptyPayloadIgnored => "PST-2102",
            Self::Serialization { .. } => "PST-2201",
            Self::Io { .. } => "PST-3002",
            Self::Network { .. } => "PST-3003",
            Self::Http { .. } => "PST-3004",
            Self::InstanceLocked { .. } => "PST-3005",
            Self::ChannelClosed { .. } => "PST-3006",
            Self::Runtime { .. } => "PST-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    ///
    /// Capacity and pool exhaustion clear up as soon as an item is evicted or
    /// a concurrent session rolls back, so a client may simply try again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageFull
                | Self::PoolEmpty
                | Self::Io { .. }
                | Self::Network { .. }
                | Self::ChannelClosed { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether this is a policy rejection rather than a system fault.
    #[must_use]
    pub const fn is_policy_rejection(&self) -> bool {
        matches!(
            self,
            Self::OversizeRejected { .. } | Self::EmptyPayloadIgnored
        )
    }

    /// The single line sent back to a write-transport client, if any.
    ///
    /// Empty payloads are discarded silently.
    #[must_use]
    pub fn client_reply(&self) -> Option<String> {
        match self {
            Self::EmptyPayloadIgnored => None,
            Self::OversizeRejected { .. } => Some("Too much data, try smaller :)".to_string()),
            Self::StorageFull => Some("Server error: storage full".to_string()),
            Self::PoolEmpty => Some("Server error: ID pool empty".to_string()),
            Self::GcFailed { trigger } => Some(format!("Server error: failed to run GC for {trigger}")),
            Self::Io { source, .. } | Self::Network { source, .. } => Some(source.to_string()),
            other => Some(format!("Server error: {other}")),
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for socket errors.
    #[must_use]
    pub const fn net(context: &'static str, source: std::io::Error) -> Self {
        Self::Network { context, source }
    }
}

impl From<serde_json::Error> for PasteError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for PasteError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for PasteError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
