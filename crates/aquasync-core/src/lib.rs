//! BLE sync engine for AquaSense smart bottles.
//!
//! This crate drives the one-shot read cycle against a bottle sensor:
//! discover it by advertisement, connect (with a cached-identifier fast
//! path), discover services, let the firmware settle, read the volume
//! characteristic, decode it, disconnect, and cool down so the bottle can
//! resume advertising.
//!
//! # Features
//!
//! - **Discovery**: unfiltered advertisement scan matched against the bottle
//!   name allow-list and the volume service UUID
//! - **Fast reconnect**: a cached peripheral identifier skips the scan
//!   window on repeat syncs, falling back to a full scan on any failure
//! - **One cycle at a time**: overlapping `sync()` calls collapse onto a
//!   single in-flight cycle and share its outcome
//! - **Clean release**: every cycle that reaches a connected state
//!   disconnects before it resolves, on success and on every error path
//! - **Best-effort battery**: the standard battery level characteristic,
//!   with a vendor text fallback, never failing the volume flow
//!
//! # Quick Start
//!
//! ```no_run
//! use aquasync_core::SyncService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = SyncService::new();
//!
//!     match service.sync().await? {
//!         Some(ml) => println!("{} mL left in the bottle", ml),
//!         None => println!("bottle not settled yet, try again"),
//!     }
//!
//!     if let Some(percent) = service.read_battery_percent().await {
//!         println!("battery at {}%", percent);
//!     }
//!     Ok(())
//! }
//! ```

pub mod device;
pub mod error;
pub mod guard;
pub mod mock;
pub mod retry;
pub mod scan;
pub mod sync;
pub mod traits;

pub use device::{BleTransport, Bottle, ConnectionConfig};
pub use error::{ConnectionFailureReason, Error, Result};
pub use guard::ConnectionGuard;
pub use mock::MockTransport;
pub use retry::{RetryConfig, is_retryable, with_retry};
pub use scan::{DiscoveredBottle, ScanOptions, scan_for_bottles};
pub use sync::{CyclePhase, SyncConfig, SyncService};
pub use traits::{BottleConnection, BottleTransport};

// Re-export the leaf crate so consumers only need one dependency.
pub use aquasync_types as types;
