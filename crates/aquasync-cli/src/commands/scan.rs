//! Scan command implementation.

use std::time::Duration;

use anyhow::{Result, bail};

use aquasync_core::scan::{get_adapter, scan_for_bottles};

use super::user_message;
use crate::config::Config;

pub async fn run(config: &Config, timeout: Option<u64>) -> Result<()> {
    let mut options = config.scan_options();
    if let Some(secs) = timeout {
        options = options.timeout(Duration::from_secs(secs));
    }

    let adapter = match get_adapter().await {
        Ok(adapter) => adapter,
        Err(e) => bail!("{}", user_message(&e)),
    };

    println!(
        "Scanning for bottles ({}s)...",
        options.timeout.as_secs()
    );

    let bottles = match scan_for_bottles(&adapter, &options).await {
        Ok(bottles) => bottles,
        Err(e) => bail!("{}", user_message(&e)),
    };

    if bottles.is_empty() {
        println!("No bottles found. Make sure the bottle is powered on and nearby.");
        return Ok(());
    }

    println!("Found {} bottle(s):", bottles.len());
    for bottle in &bottles {
        let rssi = bottle
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "?".into());
        println!(
            "  {}  {}  ({})",
            bottle.name.as_deref().unwrap_or("<unnamed>"),
            bottle.identifier,
            rssi
        );
    }

    Ok(())
}
