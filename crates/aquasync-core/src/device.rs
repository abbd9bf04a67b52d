//! Bottle connection and characteristic access.
//!
//! This module is the connection-manager half of the sync cycle: it turns a
//! peripheral (fresh from a scan, or looked up by a cached identifier) into a
//! connected, discovered, settled [`Bottle`] ready for one-shot reads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::scan::{ScanOptions, find_bottle, find_known_peripheral, peripheral_identifier};
use aquasync_types::ble;

/// Default timeout for a scan-path GATT connection.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for a fast-reconnect attempt against a cached identifier.
const DEFAULT_FAST_CONNECT_TIMEOUT: Duration = Duration::from_secs(8);

/// Default timeout for service discovery.
const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for characteristic reads.
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Default pause after discovery before touching the GATT table.
///
/// The bottle runs on constrained firmware; discovery can report complete
/// before its attribute table is actually ready to serve reads.
const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(275);

/// Configuration for connection timeouts and pacing.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use aquasync_core::device::ConnectionConfig;
///
/// let config = ConnectionConfig::default()
///     .connect_timeout(Duration::from_secs(20))
///     .settle_delay(Duration::from_millis(400));
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Timeout for a scan-path GATT connection.
    pub connect_timeout: Duration,
    /// Timeout for a fast-reconnect attempt against a cached identifier.
    pub fast_connect_timeout: Duration,
    /// Timeout for service discovery after connection.
    pub discovery_timeout: Duration,
    /// Timeout for characteristic reads.
    pub read_timeout: Duration,
    /// Pause after discovery before the first read.
    pub settle_delay: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fast_connect_timeout: DEFAULT_FAST_CONNECT_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            settle_delay: DEFAULT_SETTLE_DELAY,
        }
    }
}

impl ConnectionConfig {
    /// Create a connection config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan-path connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the fast-reconnect timeout.
    #[must_use]
    pub fn fast_connect_timeout(mut self, timeout: Duration) -> Self {
        self.fast_connect_timeout = timeout;
        self
    }

    /// Set the service discovery timeout.
    #[must_use]
    pub fn discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Set the characteristic read timeout.
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the post-discovery settle delay.
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }
}

/// A connected bottle.
///
/// Holds an exclusive GATT connection for the duration of one sync cycle.
/// Every exit path must release it: call [`Bottle::disconnect`] before
/// dropping. Dropping without disconnecting logs a warning and spawns a
/// best-effort cleanup task.
///
/// Intentionally not `Clone`: a `Bottle` owns an active connection, and
/// cloning would make its release ambiguous.
pub struct Bottle {
    /// Kept alive for the lifetime of the peripheral connection; the
    /// peripheral may hold internal references to the adapter.
    #[allow(dead_code)]
    adapter: Adapter,
    peripheral: Peripheral,
    name: Option<String>,
    identifier: String,
    /// Characteristics discovered on connect, keyed by UUID.
    characteristics: HashMap<Uuid, Characteristic>,
    disconnected: AtomicBool,
    config: ConnectionConfig,
}

impl std::fmt::Debug for Bottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bottle")
            .field("name", &self.name)
            .field("identifier", &self.identifier)
            .field("characteristics", &self.characteristics.len())
            .finish_non_exhaustive()
    }
}

impl Bottle {
    /// Connect via a full advertisement scan.
    #[tracing::instrument(level = "info", skip_all)]
    pub async fn connect_scanning(
        adapter: Adapter,
        options: &ScanOptions,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let peripheral = find_bottle(&adapter, options).await?;
        Self::from_peripheral(adapter, peripheral, config, false).await
    }

    /// Fast path: reconnect to a bottle the adapter already knows.
    ///
    /// Cancels any stale connection state for the identifier first (errors
    /// ignored; the cancel is best-effort cleanup), pauses briefly, then
    /// connects with the shorter fast-reconnect timeout. Callers treat any
    /// failure here as a cue to fall back to the scan path.
    #[tracing::instrument(level = "info", skip_all, fields(identifier = %identifier))]
    pub async fn connect_cached(
        adapter: Adapter,
        identifier: &str,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let peripheral = find_known_peripheral(&adapter, identifier)
            .await?
            .ok_or_else(|| {
                Error::connection_failed(
                    Some(identifier.to_string()),
                    ConnectionFailureReason::OutOfRange,
                )
            })?;

        // Drop whatever half-open state the stack still holds for this
        // peripheral before dialing again.
        if let Err(e) = peripheral.disconnect().await {
            debug!("pre-connect cancel failed (ignored): {}", e);
        }
        sleep(config.settle_delay).await;

        Self::from_peripheral(adapter, peripheral, config, true).await
    }

    /// Connect, discover services, and let the GATT table settle.
    async fn from_peripheral(
        adapter: Adapter,
        peripheral: Peripheral,
        config: ConnectionConfig,
        fast: bool,
    ) -> Result<Self> {
        let connect_timeout = if fast {
            config.fast_connect_timeout
        } else {
            config.connect_timeout
        };

        info!("connecting to bottle...");
        let attempt = timeout(connect_timeout, peripheral.connect()).await;
        match attempt {
            Err(_) => {
                return Err(Error::connection_failed(
                    None,
                    ConnectionFailureReason::Timeout,
                ));
            }
            Ok(Err(e)) => {
                return Err(Error::connection_failed(
                    None,
                    ConnectionFailureReason::Ble(e.to_string()),
                ));
            }
            Ok(Ok(())) => {}
        }
        info!("connected");

        debug!("discovering services...");
        timeout(config.discovery_timeout, peripheral.discover_services())
            .await
            .map_err(|_| Error::timeout("discover services", config.discovery_timeout))??;

        let mut characteristics = HashMap::new();
        for service in peripheral.services() {
            debug!("  service: {}", service.uuid);
            for characteristic in &service.characteristics {
                debug!("    characteristic: {}", characteristic.uuid);
                characteristics.insert(characteristic.uuid, characteristic.clone());
            }
        }

        let properties = peripheral.properties().await?;
        let name = properties.as_ref().and_then(|p| p.local_name.clone());
        let identifier = properties
            .as_ref()
            .map(|p| peripheral_identifier(&p.address.to_string(), &peripheral.id()))
            .unwrap_or_else(|| crate::scan::format_peripheral_id(&peripheral.id()));

        // The firmware needs a moment after discovery before its attribute
        // table serves reads reliably.
        sleep(config.settle_delay).await;

        Ok(Self {
            adapter,
            peripheral,
            name,
            identifier,
            characteristics,
            disconnected: AtomicBool::new(false),
            config,
        })
    }

    /// The advertised name, if the bottle reported one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The connection identifier (address, or peripheral id on macOS).
    ///
    /// The orchestrator caches this for fast reconnects; the cache lives in
    /// memory only and never survives a restart.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Check if the bottle is connected (queries BLE stack state).
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Read a characteristic value by UUID.
    pub async fn read_characteristic(&self, uuid: Uuid) -> Result<Vec<u8>> {
        let characteristic = self
            .characteristics
            .get(&uuid)
            .ok_or_else(|| Error::characteristic_not_found(uuid.to_string()))?;

        let data = timeout(self.config.read_timeout, self.peripheral.read(characteristic))
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("read characteristic {}", uuid),
                    self.config.read_timeout,
                )
            })??;
        Ok(data)
    }

    /// Read the raw volume payload (base64-encoded reading string).
    pub async fn read_volume_payload(&self) -> Result<Vec<u8>> {
        self.read_characteristic(ble::VOLUME_CHARACTERISTIC).await
    }

    /// Read the standard battery level payload.
    pub async fn read_battery_payload(&self) -> Result<Vec<u8>> {
        self.read_characteristic(ble::BATTERY_LEVEL).await
    }

    /// Read the vendor battery-text payload.
    pub async fn read_battery_text_payload(&self) -> Result<Vec<u8>> {
        self.read_characteristic(ble::BATTERY_TEXT_CHARACTERISTIC)
            .await
    }

    /// Release the connection.
    ///
    /// Must be called on every exit path of a sync cycle, including errors.
    /// Failures here are logged by callers, never treated as fatal.
    #[tracing::instrument(level = "info", skip(self), fields(identifier = %self.identifier))]
    pub async fn disconnect(&self) -> Result<()> {
        info!("disconnecting from bottle...");
        self.disconnected.store(true, Ordering::SeqCst);
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

// Safety net only: the orchestrator disconnects explicitly on every path.
// If a Bottle is dropped while still connected, spawn a best-effort cleanup
// task so the OS connection slot is not leaked.
impl Drop for Bottle {
    fn drop(&mut self) {
        if self.disconnected.load(Ordering::SeqCst) {
            return;
        }
        self.disconnected.store(true, Ordering::SeqCst);

        warn!(
            identifier = %self.identifier,
            "bottle dropped without disconnect(), spawning best-effort cleanup"
        );

        let peripheral = self.peripheral.clone();
        let identifier = self.identifier.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                if let Err(e) = peripheral.disconnect().await {
                    debug!(
                        identifier = %identifier,
                        "best-effort disconnect failed (may already be gone): {}", e
                    );
                }
            });
        }
    }
}

#[async_trait::async_trait]
impl crate::traits::BottleConnection for Bottle {
    fn identifier(&self) -> &str {
        Bottle::identifier(self)
    }

    async fn read_volume_payload(&self) -> Result<Vec<u8>> {
        Bottle::read_volume_payload(self).await
    }

    async fn read_battery_payload(&self) -> Result<Vec<u8>> {
        Bottle::read_battery_payload(self).await
    }

    async fn read_battery_text_payload(&self) -> Result<Vec<u8>> {
        Bottle::read_battery_text_payload(self).await
    }

    async fn disconnect(&self) -> Result<()> {
        Bottle::disconnect(self).await
    }
}

/// Production transport over the system Bluetooth adapter.
///
/// The adapter handle is process-wide: acquired lazily on the first cycle
/// and reused by every one after it.
pub struct BleTransport {
    adapter: tokio::sync::OnceCell<Adapter>,
    scan_options: ScanOptions,
    config: ConnectionConfig,
}

impl BleTransport {
    /// Create a transport with the given scan and connection settings.
    pub fn new(scan_options: ScanOptions, config: ConnectionConfig) -> Self {
        Self {
            adapter: tokio::sync::OnceCell::new(),
            scan_options,
            config,
        }
    }

    async fn adapter(&self) -> Result<&Adapter> {
        self.adapter
            .get_or_try_init(crate::scan::get_adapter)
            .await
    }
}

impl std::fmt::Debug for BleTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BleTransport")
            .field("scan_options", &self.scan_options)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl crate::traits::BottleTransport for BleTransport {
    async fn connect_cached(
        &self,
        identifier: &str,
    ) -> Result<Box<dyn crate::traits::BottleConnection>> {
        let adapter = self.adapter().await?.clone();
        let bottle = Bottle::connect_cached(adapter, identifier, self.config.clone()).await?;
        Ok(Box::new(bottle))
    }

    async fn connect_scanning(&self) -> Result<Box<dyn crate::traits::BottleConnection>> {
        let adapter = self.adapter().await?.clone();
        let bottle =
            Bottle::connect_scanning(adapter, &self.scan_options, self.config.clone()).await?;
        Ok(Box::new(bottle))
    }
}
