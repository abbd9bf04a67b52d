//! Trait abstractions over the bottle link.
//!
//! The sync orchestrator drives a [`BottleTransport`] rather than btleplug
//! directly, so the full cycle (guard, fast path, fallback, disconnect
//! accounting) can be exercised against [`crate::mock::MockTransport`]
//! without BLE hardware. [`crate::device::BleTransport`] is the production
//! implementation.

use async_trait::async_trait;

use crate::error::Result;

/// An established, discovered, settled link to one bottle.
///
/// The connection is exclusively owned by the cycle that acquired it and
/// must be released via [`disconnect`](BottleConnection::disconnect) on
/// every exit path.
#[async_trait]
pub trait BottleConnection: Send + Sync {
    /// Connection identifier, cacheable for fast reconnects.
    fn identifier(&self) -> &str;

    /// Read the raw volume characteristic payload.
    async fn read_volume_payload(&self) -> Result<Vec<u8>>;

    /// Read the standard battery level characteristic payload.
    async fn read_battery_payload(&self) -> Result<Vec<u8>>;

    /// Read the vendor battery-text characteristic payload.
    async fn read_battery_text_payload(&self) -> Result<Vec<u8>>;

    /// Release the connection.
    async fn disconnect(&self) -> Result<()>;
}

/// Acquires bottle connections, by cached identifier or by scanning.
#[async_trait]
pub trait BottleTransport: Send + Sync {
    /// Fast path: reconnect to a previously seen bottle without scanning.
    ///
    /// Failures are expected and non-fatal; the orchestrator falls back to
    /// [`connect_scanning`](BottleTransport::connect_scanning).
    async fn connect_cached(&self, identifier: &str) -> Result<Box<dyn BottleConnection>>;

    /// Scan path: discover a bottle by advertisement and connect to it.
    async fn connect_scanning(&self) -> Result<Box<dyn BottleConnection>>;
}
