//! Battery command implementation.

use anyhow::Result;

use aquasync_core::SyncService;

use crate::config::Config;

pub async fn run(config: &Config) -> Result<()> {
    let service = SyncService::with_config(config.sync_config());

    // Best effort by contract: absorbed failures come back as None.
    match service.read_battery_percent().await {
        Some(percent) => println!("Battery: {}%", percent),
        None => println!("No battery reading. Keep the bottle nearby and try again."),
    }

    Ok(())
}
