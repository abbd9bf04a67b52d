//! The sync orchestrator.
//!
//! [`SyncService`] owns everything one process needs to talk to its bottle:
//! the transport over the shared radio, the cached peripheral identifier for
//! fast reconnects, and the in-flight marker that collapses overlapping sync
//! requests onto a single cycle. Construct it once and clone handles freely.
//!
//! A cycle runs strictly in sequence:
//!
//! ```text
//! Idle -> Scanning -> Connecting -> Discovering -> Reading
//!      -> Disconnecting -> Cooldown -> Idle
//! ```
//!
//! (the fast-reconnect path enters at Connecting). A second caller arriving
//! mid-cycle does not start a second scan; it awaits the same outcome as the
//! first.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::device::{BleTransport, ConnectionConfig};
use crate::error::{Error, Result};
use crate::guard::ConnectionGuard;
use crate::scan::ScanOptions;
use crate::traits::{BottleConnection as _, BottleTransport};
use aquasync_types::decode::{decode_battery, decode_battery_text, decode_volume};

/// Default pause after disconnecting, before the cycle resolves.
///
/// The bottle firmware takes about a second to resume advertising after a
/// disconnect; starting the next scan sooner would just miss it.
const DEFAULT_COOLDOWN: Duration = Duration::from_millis(1200);

/// Where a sync cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CyclePhase {
    /// No cycle running.
    Idle = 0,
    /// Waiting for a matching advertisement.
    Scanning = 1,
    /// Establishing the GATT connection.
    Connecting = 2,
    /// Service discovery and settle.
    Discovering = 3,
    /// Reading the characteristic.
    Reading = 4,
    /// Releasing the connection.
    Disconnecting = 5,
    /// Letting the bottle resume advertising.
    Cooldown = 6,
}

impl CyclePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CyclePhase::Scanning,
            2 => CyclePhase::Connecting,
            3 => CyclePhase::Discovering,
            4 => CyclePhase::Reading,
            5 => CyclePhase::Disconnecting,
            6 => CyclePhase::Cooldown,
            _ => CyclePhase::Idle,
        }
    }
}

impl std::fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            CyclePhase::Idle => "idle",
            CyclePhase::Scanning => "scanning",
            CyclePhase::Connecting => "connecting",
            CyclePhase::Discovering => "discovering",
            CyclePhase::Reading => "reading",
            CyclePhase::Disconnecting => "disconnecting",
            CyclePhase::Cooldown => "cooldown",
        };
        write!(f, "{}", label)
    }
}

/// Configuration for the full sync cycle.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Scanner settings (window, advertised-name allow-list).
    pub scan: ScanOptions,
    /// Connection timeouts and pacing.
    pub connection: ConnectionConfig,
    /// Pause after disconnecting, before the cycle resolves.
    pub cooldown: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            scan: ScanOptions::default(),
            connection: ConnectionConfig::default(),
            cooldown: DEFAULT_COOLDOWN,
        }
    }
}

impl SyncConfig {
    /// Create a sync config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scanner options.
    #[must_use]
    pub fn scan(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    /// Set the connection config.
    #[must_use]
    pub fn connection(mut self, connection: ConnectionConfig) -> Self {
        self.connection = connection;
        self
    }

    /// Set the post-disconnect cooldown.
    #[must_use]
    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }
}

type SharedCycle = Shared<BoxFuture<'static, Result<Option<i32>>>>;

/// The bottle sync service.
///
/// One instance per process; clones share the same radio, identifier cache,
/// and in-flight cycle.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn BottleTransport>,
    cooldown: Duration,
    /// Identifier of the last bottle a cycle connected to. Memory only;
    /// never persisted across restarts.
    cached_identifier: RwLock<Option<String>>,
    /// The cycle overlapping callers join instead of starting their own.
    in_flight: Mutex<Option<SharedCycle>>,
    /// Serializes volume and battery cycles on the single radio.
    cycle_lock: Mutex<()>,
    phase: AtomicU8,
}

impl Default for SyncService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SyncService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncService")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl SyncService {
    /// Create a service over the system Bluetooth adapter with defaults.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    /// Create a service over the system Bluetooth adapter.
    pub fn with_config(config: SyncConfig) -> Self {
        let transport = BleTransport::new(config.scan, config.connection);
        Self::with_transport(Arc::new(transport), config.cooldown)
    }

    /// Create a service over an arbitrary transport (mocks in tests).
    pub fn with_transport(transport: Arc<dyn BottleTransport>, cooldown: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                cooldown,
                cached_identifier: RwLock::new(None),
                in_flight: Mutex::new(None),
                cycle_lock: Mutex::new(()),
                phase: AtomicU8::new(CyclePhase::Idle as u8),
            }),
        }
    }

    /// Where the current cycle is, or [`CyclePhase::Idle`].
    pub fn phase(&self) -> CyclePhase {
        CyclePhase::from_u8(self.inner.phase.load(Ordering::SeqCst))
    }

    /// Identifier of the last bottle a cycle connected to, if any.
    pub async fn last_bottle(&self) -> Option<String> {
        self.inner.cached_identifier.read().await.clone()
    }

    /// Drop the cached identifier; the next sync starts with a full scan.
    pub async fn forget_bottle(&self) {
        *self.inner.cached_identifier.write().await = None;
    }

    /// Run one sync cycle and return the decoded reading.
    ///
    /// Returns `Ok(Some(ml))` for a decoded reading, `Ok(None)` when the
    /// bottle answered but the payload was not decodable yet (warm-up
    /// sentinel or malformed text; both mean "wait and retry").
    ///
    /// If a cycle is already in flight, this call joins it and resolves to
    /// the same outcome instead of starting a second scan.
    ///
    /// # Errors
    ///
    /// - [`Error::ScanTimeout`]: no bottle advertised within the window
    /// - [`Error::Bluetooth`]: the radio reported an error
    /// - [`Error::ConnectionFailed`]: the scan-path connection failed
    /// - [`Error::NoData`]: connected, but the characteristic was empty
    pub async fn sync(&self) -> Result<Option<i32>> {
        let cycle = {
            let mut slot = self.inner.in_flight.lock().await;
            match slot.as_ref() {
                Some(existing) if existing.peek().is_none() => {
                    debug!("joining in-flight sync cycle");
                    existing.clone()
                }
                _ => {
                    let inner = Arc::clone(&self.inner);
                    let fresh: SharedCycle =
                        async move { inner.run_volume_cycle().await }.boxed().shared();
                    *slot = Some(fresh.clone());
                    fresh
                }
            }
        };

        let outcome = cycle.await;

        // Clear the marker so the next call starts fresh. Only a resolved
        // future is removed, so a newer in-progress cycle is never clobbered.
        {
            let mut slot = self.inner.in_flight.lock().await;
            if slot.as_ref().is_some_and(|cycle| cycle.peek().is_some()) {
                *slot = None;
            }
        }

        outcome
    }

    /// Read the battery level, best effort.
    ///
    /// Shares the scanner and connection manager with [`sync`](Self::sync)
    /// but absorbs every failure: scan timeouts, missing characteristics,
    /// and undecodable payloads all come back as `None`. A battery reading
    /// is advisory and must never block the volume flow.
    pub async fn read_battery_percent(&self) -> Option<u8> {
        match Arc::clone(&self.inner).run_battery_cycle().await {
            Ok(percent) => percent,
            Err(e) => {
                warn!("battery read failed (reported as no reading): {}", e);
                None
            }
        }
    }
}

impl Inner {
    fn set_phase(&self, phase: CyclePhase) {
        self.phase.store(phase as u8, Ordering::SeqCst);
    }

    async fn cooldown_pause(&self) {
        self.set_phase(CyclePhase::Cooldown);
        sleep(self.cooldown).await;
    }

    /// Disconnect, logging instead of failing; a disconnect error never
    /// overrides the cycle's result.
    async fn release(&self, guard: ConnectionGuard) {
        self.set_phase(CyclePhase::Disconnecting);
        if let Err(e) = guard.disconnect().await {
            warn!("disconnect failed (ignored): {}", e);
        }
    }

    /// Acquire a connection: fast path first, scan path as the fallback.
    async fn acquire_connection(&self) -> Result<ConnectionGuard> {
        let cached = self.cached_identifier.read().await.clone();

        if let Some(identifier) = cached {
            self.set_phase(CyclePhase::Connecting);
            match self.transport.connect_cached(&identifier).await {
                Ok(connection) => {
                    info!(identifier = %identifier, "fast reconnect succeeded");
                    self.set_phase(CyclePhase::Discovering);
                    return Ok(ConnectionGuard::new(connection));
                }
                Err(e) => {
                    // Swallowed on purpose: the scan path below is the retry,
                    // and a fast-path miss is not worth surfacing.
                    debug!(
                        identifier = %identifier,
                        "fast reconnect failed ({}), falling back to scan", e
                    );
                }
            }
        }

        self.set_phase(CyclePhase::Scanning);
        let connection = self.transport.connect_scanning().await?;
        self.set_phase(CyclePhase::Discovering);

        let identifier = connection.identifier().to_string();
        *self.cached_identifier.write().await = Some(identifier);

        Ok(ConnectionGuard::new(connection))
    }

    async fn run_volume_cycle(self: Arc<Self>) -> Result<Option<i32>> {
        let _cycle = self.cycle_lock.lock().await;
        let outcome = self.volume_cycle().await;
        self.set_phase(CyclePhase::Idle);
        outcome
    }

    async fn volume_cycle(&self) -> Result<Option<i32>> {
        let guard = self.acquire_connection().await?;

        self.set_phase(CyclePhase::Reading);
        let payload = match guard.read_volume_payload().await {
            Ok(payload) => payload,
            Err(e) => {
                self.release(guard).await;
                self.cooldown_pause().await;
                return Err(e);
            }
        };

        if payload.is_empty() {
            warn!("volume characteristic held no data");
            self.release(guard).await;
            self.cooldown_pause().await;
            return Err(Error::NoData);
        }

        let reading = decode_volume(&payload);
        match reading {
            Some(ml) => info!(ml, "decoded bottle reading"),
            None => debug!("payload not decodable yet (sensor settling or malformed)"),
        }

        self.release(guard).await;
        self.cooldown_pause().await;
        Ok(reading)
    }

    async fn run_battery_cycle(self: Arc<Self>) -> Result<Option<u8>> {
        let _cycle = self.cycle_lock.lock().await;
        let outcome = self.battery_cycle().await;
        self.set_phase(CyclePhase::Idle);
        outcome
    }

    async fn battery_cycle(&self) -> Result<Option<u8>> {
        let guard = self.acquire_connection().await?;

        self.set_phase(CyclePhase::Reading);
        let percent = match guard.read_battery_payload().await {
            Ok(payload) => decode_battery(&payload),
            Err(e) => {
                debug!(
                    "standard battery characteristic unavailable ({}), trying vendor text",
                    e
                );
                match guard.read_battery_text_payload().await {
                    Ok(payload) => decode_battery_text(&payload),
                    Err(e) => {
                        debug!("vendor battery characteristic unavailable too: {}", e);
                        None
                    }
                }
            }
        };

        self.release(guard).await;
        self.cooldown_pause().await;
        Ok(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockTransport;

    fn service(transport: &MockTransport) -> SyncService {
        SyncService::with_transport(Arc::new(transport.clone()), DEFAULT_COOLDOWN)
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_reads_decodes_and_disconnects() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        let reading = svc.sync().await.unwrap();
        assert_eq!(reading, Some(500));
        assert_eq!(transport.scan_count(), 1);
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
        assert_eq!(svc.phase(), CyclePhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_syncs_share_one_cycle() {
        let transport = MockTransport::new();
        transport.set_connect_latency(Duration::from_millis(50));
        let svc = service(&transport);

        let (first, second) = tokio::join!(svc.sync(), svc.sync());
        assert_eq!(first.unwrap(), Some(500));
        assert_eq!(second.unwrap(), Some(500));

        // One scan, one connection, one disconnect: the second caller joined
        // the first cycle instead of starting its own.
        assert_eq!(transport.scan_count(), 1);
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_syncs_share_failures_too() {
        let transport = MockTransport::new();
        transport.set_connect_latency(Duration::from_millis(50));
        transport.fail_next_scans(1);
        let svc = service(&transport);

        let (first, second) = tokio::join!(svc.sync(), svc.sync());
        assert!(matches!(first, Err(Error::ScanTimeout { .. })));
        assert!(matches!(second, Err(Error::ScanTimeout { .. })));
        assert_eq!(transport.scan_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_marker_cleared_so_next_sync_is_fresh() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        svc.sync().await.unwrap();
        svc.sync().await.unwrap();

        // Two separate cycles ran (the second over the fast path).
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.disconnect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_sync_prefers_fast_path() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        svc.sync().await.unwrap();
        assert_eq!(transport.scan_count(), 1);
        assert_eq!(transport.cached_attempt_count(), 0);

        svc.sync().await.unwrap();
        assert_eq!(transport.cached_attempt_count(), 1);
        // No second scan was needed.
        assert_eq!(transport.scan_count(), 1);
        assert_eq!(svc.last_bottle().await.as_deref(), Some("mock-bottle-01"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_path_failure_falls_back_to_scan() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        svc.sync().await.unwrap();
        transport.fail_next_cached_connects(1);

        // The fast-path failure is swallowed; the caller still gets a reading.
        let reading = svc.sync().await.unwrap();
        assert_eq!(reading, Some(500));
        assert_eq!(transport.cached_attempt_count(), 1);
        assert_eq!(transport.scan_count(), 2);
        assert_eq!(transport.connect_count(), 2);
        assert_eq!(transport.disconnect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_bottle_forces_scan() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        svc.sync().await.unwrap();
        svc.forget_bottle().await;
        svc.sync().await.unwrap();

        assert_eq!(transport.cached_attempt_count(), 0);
        assert_eq!(transport.scan_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_payload_is_no_data_after_disconnect() {
        let transport = MockTransport::new();
        transport.set_volume_payload(Vec::new());
        let svc = service(&transport);

        let err = svc.sync().await.unwrap_err();
        assert!(matches!(err, Error::NoData));
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_warmup_payload_is_ok_none() {
        let transport = MockTransport::new();
        transport.set_volume_text("Waiting...");
        let svc = service(&transport);

        assert_eq!(svc.sync().await.unwrap(), None);
        assert_eq!(transport.disconnect_count(), transport.connect_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_payload_is_ok_none() {
        let transport = MockTransport::new();
        transport.set_volume_text("garbage text");
        let svc = service(&transport);

        assert_eq!(svc.sync().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_failure_still_disconnects() {
        let transport = MockTransport::new();
        transport.fail_volume_reads(true);
        let svc = service(&transport);

        let err = svc.sync().await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_timeout_propagates() {
        let transport = MockTransport::new();
        transport.fail_next_scans(1);
        let svc = service(&transport);

        let err = svc.sync().await.unwrap_err();
        assert!(matches!(err, Error::ScanTimeout { .. }));
        // Never connected, so nothing to disconnect.
        assert_eq!(transport.connect_count(), 0);
        assert_eq!(transport.disconnect_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_readings_change() {
        let transport = MockTransport::new();
        transport.push_volume_text(" Volume: 500.0 mL");
        transport.push_volume_text(" Volume: 400.0 mL");
        let svc = service(&transport);

        assert_eq!(svc.sync().await.unwrap(), Some(500));
        assert_eq!(svc.sync().await.unwrap(), Some(400));
    }

    // --- Battery ---

    #[tokio::test(start_paused = true)]
    async fn test_battery_read_happy_path() {
        let transport = MockTransport::new();
        let svc = service(&transport);

        assert_eq!(svc.read_battery_percent().await, Some(85));
        assert_eq!(transport.disconnect_count(), transport.connect_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_falls_back_to_vendor_text() {
        let transport = MockTransport::new();
        transport.clear_battery();
        transport.set_battery_text("72%");
        let svc = service(&transport);

        assert_eq!(svc.read_battery_percent().await, Some(72));
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_missing_everywhere_is_none() {
        let transport = MockTransport::new();
        transport.clear_battery();
        transport.clear_battery_text();
        let svc = service(&transport);

        assert_eq!(svc.read_battery_percent().await, None);
        // Still disconnected cleanly.
        assert_eq!(transport.disconnect_count(), transport.connect_count());
    }

    #[tokio::test(start_paused = true)]
    async fn test_battery_absorbs_scan_failure() {
        let transport = MockTransport::new();
        transport.fail_next_scans(1);
        let svc = service(&transport);

        // Absorbed, not propagated.
        assert_eq!(svc.read_battery_percent().await, None);
    }
}
