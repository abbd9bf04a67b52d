//! Mock transport for testing without BLE hardware.
//!
//! [`MockTransport`] implements [`BottleTransport`] with scripted payloads,
//! per-operation failure injection, and connect/scan/disconnect counters, so
//! orchestrator behavior (the in-flight guard, the fast-path fallback, the
//! disconnect-on-every-path invariant) can be asserted directly.
//!
//! # Example
//!
//! ```
//! use aquasync_core::mock::MockTransport;
//!
//! let transport = MockTransport::new();
//! transport.set_volume_text(" Volume: 750.0 mL");
//! transport.fail_next_cached_connects(1);
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::time::sleep;

use crate::error::{ConnectionFailureReason, Error, Result};
use crate::traits::{BottleConnection, BottleTransport};

/// A scriptable bottle transport.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<MockState>,
}

struct MockState {
    identifier: String,
    /// Payload served when the queue is empty.
    volume_payload: Mutex<Vec<u8>>,
    /// Payloads served first, one per read, in order.
    volume_queue: Mutex<VecDeque<Vec<u8>>>,
    battery_payload: Mutex<Option<Vec<u8>>>,
    battery_text_payload: Mutex<Option<Vec<u8>>>,
    connect_latency: Mutex<Duration>,
    /// Whether the fast path can find this bottle at all.
    cached_known: AtomicBool,
    remaining_cached_failures: AtomicU32,
    remaining_scan_failures: AtomicU32,
    fail_volume_reads: AtomicBool,
    scans: AtomicU32,
    cached_attempts: AtomicU32,
    connects: AtomicU32,
    disconnects: AtomicU32,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Create a mock bottle with a 500 mL reading and a healthy battery.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                identifier: "mock-bottle-01".to_string(),
                volume_payload: Mutex::new(encode_text(" Volume: 500.0 mL")),
                volume_queue: Mutex::new(VecDeque::new()),
                battery_payload: Mutex::new(Some(encode_bytes(&[85]))),
                battery_text_payload: Mutex::new(None),
                connect_latency: Mutex::new(Duration::ZERO),
                cached_known: AtomicBool::new(true),
                remaining_cached_failures: AtomicU32::new(0),
                remaining_scan_failures: AtomicU32::new(0),
                fail_volume_reads: AtomicBool::new(false),
                scans: AtomicU32::new(0),
                cached_attempts: AtomicU32::new(0),
                connects: AtomicU32::new(0),
                disconnects: AtomicU32::new(0),
            }),
        }
    }

    // --- Scripting ---

    /// Set the volume reading as decoded text (base64-encoded on the wire).
    pub fn set_volume_text(&self, text: &str) {
        *self.state.volume_payload.lock().unwrap() = encode_text(text);
    }

    /// Set the raw volume payload bytes (e.g. empty, for no-data tests).
    pub fn set_volume_payload(&self, payload: Vec<u8>) {
        *self.state.volume_payload.lock().unwrap() = payload;
    }

    /// Queue a reading to be served before the current payload, in order.
    pub fn push_volume_text(&self, text: &str) {
        self.state
            .volume_queue
            .lock()
            .unwrap()
            .push_back(encode_text(text));
    }

    /// Set the standard battery level.
    pub fn set_battery_level(&self, level: u8) {
        *self.state.battery_payload.lock().unwrap() = Some(encode_bytes(&[level]));
    }

    /// Remove the standard battery characteristic.
    pub fn clear_battery(&self) {
        *self.state.battery_payload.lock().unwrap() = None;
    }

    /// Set the vendor battery-text payload.
    pub fn set_battery_text(&self, text: &str) {
        *self.state.battery_text_payload.lock().unwrap() = Some(encode_text(text));
    }

    /// Remove the vendor battery-text characteristic.
    pub fn clear_battery_text(&self) {
        *self.state.battery_text_payload.lock().unwrap() = None;
    }

    // --- Failure injection ---

    /// Fail the next `n` fast-path connection attempts.
    pub fn fail_next_cached_connects(&self, n: u32) {
        self.state
            .remaining_cached_failures
            .store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` scans with a scan timeout.
    pub fn fail_next_scans(&self, n: u32) {
        self.state.remaining_scan_failures.store(n, Ordering::SeqCst);
    }

    /// Control whether the fast path can find the bottle at all.
    pub fn set_cached_known(&self, known: bool) {
        self.state.cached_known.store(known, Ordering::SeqCst);
    }

    /// Make volume reads fail with a timeout.
    pub fn fail_volume_reads(&self, fail: bool) {
        self.state.fail_volume_reads.store(fail, Ordering::SeqCst);
    }

    /// Add artificial latency to every connection attempt.
    pub fn set_connect_latency(&self, latency: Duration) {
        *self.state.connect_latency.lock().unwrap() = latency;
    }

    // --- Counters ---

    /// Number of scans started.
    pub fn scan_count(&self) -> u32 {
        self.state.scans.load(Ordering::SeqCst)
    }

    /// Number of fast-path connection attempts.
    pub fn cached_attempt_count(&self) -> u32 {
        self.state.cached_attempts.load(Ordering::SeqCst)
    }

    /// Number of connections established (either path).
    pub fn connect_count(&self) -> u32 {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of disconnect calls.
    pub fn disconnect_count(&self) -> u32 {
        self.state.disconnects.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.state.connect_latency.lock().unwrap();
        if !latency.is_zero() {
            sleep(latency).await;
        }
    }
}

#[async_trait]
impl BottleTransport for MockTransport {
    async fn connect_cached(&self, identifier: &str) -> Result<Box<dyn BottleConnection>> {
        self.state.cached_attempts.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if !self.state.cached_known.load(Ordering::SeqCst)
            || identifier != self.state.identifier
        {
            return Err(Error::connection_failed(
                Some(identifier.to_string()),
                ConnectionFailureReason::OutOfRange,
            ));
        }
        if self
            .state
            .remaining_cached_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::connection_failed(
                Some(identifier.to_string()),
                ConnectionFailureReason::Timeout,
            ));
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }

    async fn connect_scanning(&self) -> Result<Box<dyn BottleConnection>> {
        self.state.scans.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self
            .state
            .remaining_scan_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(Error::ScanTimeout {
                duration: Duration::from_secs(10),
            });
        }

        self.state.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockConnection {
    state: Arc<MockState>,
}

#[async_trait]
impl BottleConnection for MockConnection {
    fn identifier(&self) -> &str {
        &self.state.identifier
    }

    async fn read_volume_payload(&self) -> Result<Vec<u8>> {
        if self.state.fail_volume_reads.load(Ordering::SeqCst) {
            return Err(Error::timeout("read volume", Duration::from_secs(10)));
        }
        if let Some(payload) = self.state.volume_queue.lock().unwrap().pop_front() {
            return Ok(payload);
        }
        Ok(self.state.volume_payload.lock().unwrap().clone())
    }

    async fn read_battery_payload(&self) -> Result<Vec<u8>> {
        self.state
            .battery_payload
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::characteristic_not_found("2a19"))
    }

    async fn read_battery_text_payload(&self) -> Result<Vec<u8>> {
        self.state
            .battery_text_payload
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::characteristic_not_found("fedcba98"))
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn encode_text(text: &str) -> Vec<u8> {
    BASE64.encode(text).into_bytes()
}

fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    BASE64.encode(bytes).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_serves_scripted_payloads() {
        let transport = MockTransport::new();
        transport.set_volume_text(" Volume: 321.0 mL");

        let conn = transport.connect_scanning().await.unwrap();
        let payload = conn.read_volume_payload().await.unwrap();
        assert_eq!(aquasync_types::decode_volume(&payload), Some(321));

        conn.disconnect().await.unwrap();
        assert_eq!(transport.connect_count(), 1);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_queue_precedes_current_payload() {
        let transport = MockTransport::new();
        transport.set_volume_text(" Volume: 100.0 mL");
        transport.push_volume_text(" Volume: 400.0 mL");

        let conn = transport.connect_scanning().await.unwrap();
        let first = conn.read_volume_payload().await.unwrap();
        let second = conn.read_volume_payload().await.unwrap();
        assert_eq!(aquasync_types::decode_volume(&first), Some(400));
        assert_eq!(aquasync_types::decode_volume(&second), Some(100));
    }

    #[tokio::test]
    async fn test_mock_cached_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_next_cached_connects(1);

        assert!(transport.connect_cached("mock-bottle-01").await.is_err());
        assert!(transport.connect_cached("mock-bottle-01").await.is_ok());
        assert_eq!(transport.cached_attempt_count(), 2);
        assert_eq!(transport.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_rejects_unknown_identifier() {
        let transport = MockTransport::new();
        assert!(transport.connect_cached("someone-else").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_scan_failure_injection() {
        let transport = MockTransport::new();
        transport.fail_next_scans(1);

        let err = match transport.connect_scanning().await {
            Err(e) => e,
            Ok(_) => panic!("expected scan failure"),
        };
        assert!(matches!(err, Error::ScanTimeout { .. }));
        assert!(transport.connect_scanning().await.is_ok());
        assert_eq!(transport.scan_count(), 2);
    }
}
