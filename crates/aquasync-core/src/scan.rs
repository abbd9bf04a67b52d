//! Bottle discovery over BLE advertisements.
//!
//! Scanning is unfiltered on purpose: some platforms drop the service list
//! from individual advertisement packets, so an adapter-level service filter
//! misses real bottles. Matching happens here instead, against the advertised
//! name allow-list and the volume service UUID.

use std::time::Duration;

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use aquasync_types::ble;

/// Options for bottle scanning.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to wait for a matching advertisement.
    pub timeout: Duration,
    /// Advertised-name allow-list (case-insensitive substring match).
    pub names: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            names: ble::BOTTLE_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the scan timeout in seconds.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    /// Replace the advertised-name allow-list.
    #[must_use]
    pub fn names(mut self, names: Vec<String>) -> Self {
        self.names = names;
        self
    }
}

/// A bottle seen during a listing scan.
#[derive(Debug, Clone)]
pub struct DiscoveredBottle {
    /// The advertised name, if any.
    pub name: Option<String>,
    /// Connection identifier (address on Linux/Windows, peripheral id on macOS).
    pub identifier: String,
    /// RSSI signal strength at discovery time.
    pub rssi: Option<i16>,
}

/// Get the first available Bluetooth adapter.
pub async fn get_adapter() -> Result<Adapter> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;

    adapters.into_iter().next().ok_or(Error::NoAdapter)
}

/// Stops the advertisement scan exactly once, no matter which completion
/// path gets there first.
struct ScanGuard<'a> {
    adapter: &'a Adapter,
    stopped: bool,
}

impl<'a> ScanGuard<'a> {
    fn new(adapter: &'a Adapter) -> Self {
        Self {
            adapter,
            stopped: false,
        }
    }

    async fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if let Err(e) = self.adapter.stop_scan().await {
            warn!("failed to stop scan: {}", e);
        }
    }
}

/// Scan until the first matching bottle advertises, or the window elapses.
///
/// # Errors
///
/// - [`Error::ScanTimeout`] if no match appeared within `options.timeout`
/// - [`Error::Bluetooth`] if the radio reported an error (adapter off, ...)
#[tracing::instrument(level = "info", skip_all, fields(timeout_secs = options.timeout.as_secs()))]
pub async fn find_bottle(adapter: &Adapter, options: &ScanOptions) -> Result<Peripheral> {
    let mut events = adapter.events().await?;

    info!("scanning for bottle...");
    adapter.start_scan(ScanFilter::default()).await?;
    let mut guard = ScanGuard::new(adapter);

    let deadline = sleep(options.timeout);
    tokio::pin!(deadline);

    let outcome = loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("scan window elapsed without a match");
                break Err(Error::ScanTimeout {
                    duration: options.timeout,
                });
            }
            event = events.next() => {
                let Some(event) = event else {
                    break Err(btleplug::Error::RuntimeError(
                        "advertisement stream ended".into(),
                    )
                    .into());
                };
                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        match candidate(adapter, &id, options).await {
                            Ok(Some(peripheral)) => break Ok(peripheral),
                            Ok(None) => {}
                            Err(e) => debug!("skipping candidate: {}", e),
                        }
                    }
                    CentralEvent::ServicesAdvertisement { id, services }
                        if services.iter().any(ble::is_volume_service) =>
                    {
                        debug!("matched bottle by advertised service");
                        match adapter.peripheral(&id).await {
                            Ok(peripheral) => break Ok(peripheral),
                            Err(e) => debug!("advertised peripheral vanished: {}", e),
                        }
                    }
                    _ => {}
                }
            }
        }
    };

    guard.stop().await;
    outcome
}

/// List every matching bottle seen during one scan window.
pub async fn scan_for_bottles(
    adapter: &Adapter,
    options: &ScanOptions,
) -> Result<Vec<DiscoveredBottle>> {
    info!(
        "scanning for bottles for {} seconds...",
        options.timeout.as_secs()
    );

    adapter.start_scan(ScanFilter::default()).await?;
    sleep(options.timeout).await;
    adapter.stop_scan().await?;

    let mut found = Vec::new();
    for peripheral in adapter.peripherals().await? {
        let Ok(Some(properties)) = peripheral.properties().await else {
            continue;
        };
        if !bottle_matches(
            properties.local_name.as_deref(),
            &properties.services,
            &options.names,
        ) {
            continue;
        }
        let identifier =
            peripheral_identifier(&properties.address.to_string(), &peripheral.id());
        found.push(DiscoveredBottle {
            name: properties.local_name.clone(),
            identifier,
            rssi: properties.rssi,
        });
    }

    info!("scan complete, found {} bottle(s)", found.len());
    Ok(found)
}

/// Look up an already-known peripheral by identifier, without scanning.
///
/// This is the fast-reconnect lookup: after a successful cycle the adapter
/// usually still knows the bottle, so a repeat sync can skip the scan window
/// entirely.
pub async fn find_known_peripheral(
    adapter: &Adapter,
    identifier: &str,
) -> Result<Option<Peripheral>> {
    let wanted = identifier.trim().to_lowercase();

    for peripheral in adapter.peripherals().await? {
        let id_string = format_peripheral_id(&peripheral.id()).to_lowercase();
        if id_string == wanted {
            debug!("matched cached bottle by peripheral id");
            return Ok(Some(peripheral));
        }

        if let Ok(Some(properties)) = peripheral.properties().await {
            let address = properties.address.to_string().to_lowercase();
            if address != "00:00:00:00:00:00"
                && (address == wanted || address.replace(':', "") == wanted.replace(':', ""))
            {
                debug!("matched cached bottle by address");
                return Ok(Some(peripheral));
            }
        }
    }

    Ok(None)
}

async fn candidate(
    adapter: &Adapter,
    id: &PeripheralId,
    options: &ScanOptions,
) -> Result<Option<Peripheral>> {
    let peripheral = adapter.peripheral(id).await?;
    let Some(properties) = peripheral.properties().await? else {
        return Ok(None);
    };

    let name = properties.local_name.as_deref();
    if bottle_matches(name, &properties.services, &options.names) {
        info!(name = name.unwrap_or("<unnamed>"), "found bottle");
        return Ok(Some(peripheral));
    }
    Ok(None)
}

/// Decide whether an advertisement belongs to a bottle.
fn bottle_matches(name: Option<&str>, services: &[Uuid], allowed: &[String]) -> bool {
    if let Some(name) = name
        && ble::name_matches_any(name, allowed.iter().map(String::as_str))
    {
        return true;
    }
    services.iter().any(ble::is_volume_service)
}

/// Format a peripheral id as a bare string.
///
/// On macOS peripheral ids are CoreBluetooth UUIDs; elsewhere they wrap the
/// Bluetooth address.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Build the connection identifier for a peripheral.
///
/// macOS reports an all-zero address, so the peripheral id is used there;
/// other platforms use the Bluetooth address.
pub fn peripheral_identifier(address: &str, id: &PeripheralId) -> String {
    if address == "00:00:00:00:00:00" {
        format_peripheral_id(id)
    } else {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_names() -> Vec<String> {
        ScanOptions::default().names
    }

    #[test]
    fn test_scan_options_defaults() {
        let options = ScanOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert!(options.names.iter().any(|n| n == "AquaSense"));
    }

    #[test]
    fn test_scan_options_builder() {
        let options = ScanOptions::new()
            .timeout_secs(3)
            .names(vec!["HydroProto".into()]);
        assert_eq!(options.timeout, Duration::from_secs(3));
        assert_eq!(options.names, vec!["HydroProto".to_string()]);
    }

    #[test]
    fn test_bottle_matches_by_name() {
        assert!(bottle_matches(Some("AquaSense-2"), &[], &default_names()));
        assert!(bottle_matches(Some("arduino nano"), &[], &default_names()));
        assert!(!bottle_matches(Some("Mi Smart Band 5"), &[], &default_names()));
        assert!(!bottle_matches(None, &[], &default_names()));
    }

    #[test]
    fn test_bottle_matches_by_service() {
        let services = [ble::VOLUME_SERVICE];
        assert!(bottle_matches(None, &services, &default_names()));
        assert!(bottle_matches(Some("whatever"), &services, &default_names()));
        assert!(!bottle_matches(
            Some("whatever"),
            &[ble::BATTERY_SERVICE],
            &default_names()
        ));
    }

    #[test]
    fn test_bottle_matches_custom_allow_list() {
        let custom = vec!["HydroProto".to_string()];
        assert!(bottle_matches(Some("HydroProto v3"), &[], &custom));
        assert!(!bottle_matches(Some("AquaSense-2"), &[], &custom));
    }
}
