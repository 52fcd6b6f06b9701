//! Error types for backend, device and configuration failures.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a capture backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Device with given id was not found.
    #[error("device {0} not found")]
    DeviceNotFound(u32),
    /// The backend refused to open the device.
    #[error("failed to open device: {0}")]
    OpenFailed(String),
    /// The backend does not support the requested operation or value.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Error during a streaming operation.
    #[error("stream error: {0}")]
    Stream(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// A device could not be acquired.
///
/// Recoverable at the manager level: the device is skipped or replaced by the
/// fallback camera.
#[derive(Debug, Error)]
#[error("failed to open camera device {device_id}: {reason}")]
pub struct OpenError {
    /// Numeric id the open was attempted with.
    pub device_id: u32,
    /// Backend-provided reason.
    pub reason: String,
}

/// Failure of a frame or property operation on a [`Device`](crate::Device).
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The device is closed or was never opened.
    #[error("camera is not open")]
    NotOpen,
    /// The backend had no frame available. Transient; callers may retry.
    #[error("no frame available")]
    NoFrame,
    /// The backend failed while servicing the request.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Result type for device operations.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Configuration could not be read or a record is malformed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file '{}': {source}", path.display())]
    Io {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The configuration text is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A required key is absent.
    #[error("missing config key '{0}'")]
    Missing(String),
    /// A key holds a value of the wrong shape.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted path of the offending key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
    /// The configuration could not be loaded at all.
    #[error("configuration unavailable: {0}")]
    Unavailable(String),
    /// A device record is present but unusable.
    #[error("invalid device record #{index}: {reason}")]
    InvalidRecord {
        /// Position of the record in the device list.
        index: usize,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
