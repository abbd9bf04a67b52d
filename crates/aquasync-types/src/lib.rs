//! Platform-agnostic types for AquaSense smart bottles.
//!
//! This crate provides the pieces of the AquaSync stack that do not touch
//! Bluetooth at all: the UUID and name constants used to recognize a bottle,
//! the payload decoder for its characteristic values, and the intake
//! classifier that turns successive volume readings into hydration events.
//!
//! # Example
//!
//! ```
//! use aquasync_types::decode::parse_volume_text;
//! use aquasync_types::intake::{IntakeThresholds, classify, IntakeEvent};
//!
//! let ml = parse_volume_text(" Volume: 142.3 mL").unwrap();
//! assert_eq!(ml, 142);
//!
//! let event = classify(&IntakeThresholds::default(), Some(500.0), 400.0);
//! assert!(matches!(event, IntakeEvent::Consumed { .. }));
//! ```

pub mod ble;
pub mod decode;
pub mod intake;

pub use decode::{decode_battery, decode_volume};
pub use intake::{IntakeEvent, IntakeThresholds, ThresholdError, classify, ml_to_fl_oz};
