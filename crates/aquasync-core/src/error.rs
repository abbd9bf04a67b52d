//! Error types for aquasync-core.
//!
//! The taxonomy follows what a caller has to do about the failure:
//!
//! | Error | Meaning | User action |
//! |-------|---------|-------------|
//! | [`Error::ScanTimeout`] | No bottle advertised in the window | Move closer, retry |
//! | [`Error::Bluetooth`] | Radio/stack error (adapter off, ...) | Check Bluetooth |
//! | [`Error::ConnectionFailed`] | GATT connect failed on the scan path | Retry |
//! | [`Error::NoData`] | Connected, but the characteristic was empty | Keep bottle stable, retry |
//!
//! Fast-reconnect failures never reach the caller; the orchestrator falls
//! back to a full scan instead. Payloads that decode to nothing are not
//! errors either; `sync` returns `Ok(None)` for those.
//!
//! The enum is `Clone` (BLE source errors are wrapped in `Arc`) so one
//! in-flight cycle outcome can be handed to every caller that joined it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while syncing with a bottle.
///
/// Marked `#[non_exhaustive]` to allow new variants without breaking
/// downstream code.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy stack error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(Arc<btleplug::Error>),

    /// No Bluetooth adapter is available.
    #[error("no Bluetooth adapter available")]
    NoAdapter,

    /// No matching bottle advertised within the scan window.
    #[error("no bottle found within {duration:?}")]
    ScanTimeout {
        /// The scan window that elapsed.
        duration: Duration,
    },

    /// GATT connection attempt failed.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// The identifier that failed to connect, if known.
        identifier: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Connected and discovered successfully, but the characteristic held
    /// no value at all.
    #[error("bottle sent no data")]
    NoData,

    /// Operation attempted while not connected.
    #[error("not connected to bottle")]
    NotConnected,

    /// Required characteristic missing after service discovery.
    #[error("characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
    },

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Connection attempt timed out.
    Timeout,
    /// Bottle is out of range or no longer known to the adapter.
    OutOfRange,
    /// Underlying BLE error.
    Ble(String),
    /// Other/unknown error.
    Other(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "connection timed out"),
            Self::OutOfRange => write!(f, "bottle out of range"),
            Self::Ble(msg) => write!(f, "BLE error: {}", msg),
            Self::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(
        identifier: Option<String>,
        reason: ConnectionFailureReason,
    ) -> Self {
        Self::ConnectionFailed { identifier, reason }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>) -> Self {
        Self::CharacteristicNotFound { uuid: uuid.into() }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

impl From<btleplug::Error> for Error {
    fn from(err: btleplug::Error) -> Self {
        Error::Bluetooth(Arc::new(err))
    }
}

/// Result type alias using aquasync-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
