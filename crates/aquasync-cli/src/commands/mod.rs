//! Subcommand implementations.

pub mod battery;
pub mod goal;
pub mod scan;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};

use aquasync_core::Error;
use aquasync_store::Store;
use aquasync_types::IntakeEvent;

use crate::config::Config;

/// Open the store at the configured (or default) location.
pub fn open_store(config: &Config) -> Result<Store> {
    match &config.store_path {
        Some(path) => Store::open(path)
            .with_context(|| format!("failed to open store at {}", path.display())),
        None => Store::open_default().context("failed to open store"),
    }
}

/// One human-readable line per terminal failure.
pub fn user_message(error: &Error) -> String {
    match error {
        Error::ScanTimeout { .. } => {
            "Could not find the AquaSense bottle. Make sure it is powered on and nearby.".into()
        }
        Error::Bluetooth(_) | Error::NoAdapter => {
            "Bluetooth is unavailable. Check that it is turned on and try again.".into()
        }
        Error::ConnectionFailed { .. } => {
            "Could not connect to the bottle. Check Bluetooth and try again.".into()
        }
        Error::NoData => {
            "Bottle sent no data. Make sure it is stable and nearby, then sync again.".into()
        }
        other => other.to_string(),
    }
}

/// The user-facing summary of a classified sync.
pub fn event_message(event: &IntakeEvent, today_total_oz: f64, goal_oz: f64) -> String {
    match event {
        IntakeEvent::BaselineEstablished { ml } => {
            format!("Baseline set: {:.0} mL in bottle.", ml)
        }
        IntakeEvent::Consumed { ml, fl_oz, .. } => format!(
            "You drank {:.2} oz ({:.0} mL). Today: {:.2} / {:.0} oz.",
            fl_oz, ml, today_total_oz, goal_oz
        ),
        IntakeEvent::Refilled { ml } => format!(
            "Bottle refilled to {:.0} mL. Baseline reset; remember to sync after drinking and before refilling.",
            ml
        ),
        IntakeEvent::NoChange => "Bottle level unchanged.".into(),
    }
}
