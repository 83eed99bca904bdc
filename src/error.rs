//! Error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::WindowHandle;

/// Errors reported by a platform backend.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("{call} failed with os error {code}")]
    Os { call: &'static str, code: i32 },

    #[error("window {0} no longer exists")]
    WindowGone(WindowHandle),

    #[error("failed to register for notifications: {0}")]
    Registration(String),

    #[error("no platform backend for this target: {0}")]
    Unsupported(&'static str),
}

impl PlatformError {
    /// The platform error code, when the failure came from an OS call.
    #[must_use]
    pub const fn code(&self) -> Option<i32> {
        match self {
            Self::Os { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Errors reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path:   PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] ron::Error),
}

/// Errors returned by [`LayoutKeeper`](crate::LayoutKeeper) operations.
#[derive(Debug, Error)]
pub enum KeeperError {
    #[error("layout keeper is already running")]
    AlreadyRunning,

    #[error("layout keeper is not running")]
    NotRunning,

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name:   &'static str,
        #[source]
        source: io::Error,
    },
}
