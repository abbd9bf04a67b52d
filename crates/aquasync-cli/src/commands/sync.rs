//! Sync command implementation.

use anyhow::{Result, bail};
use serde_json::json;

use aquasync_core::{RetryConfig, SyncService, with_retry};
use aquasync_types::classify;

use super::{event_message, open_store, user_message};
use crate::OutputFormat;
use crate::config::Config;

pub async fn run(
    config: &Config,
    retries: u32,
    format: OutputFormat,
    no_battery: bool,
) -> Result<()> {
    let service = SyncService::with_config(config.sync_config());

    let retry = RetryConfig::for_scan().max_retries(retries);
    let outcome = with_retry(&retry, "sync", || service.sync()).await;

    let reading = match outcome {
        Ok(reading) => reading,
        Err(e) => bail!("{}", user_message(&e)),
    };

    let Some(ml) = reading else {
        // The bottle answered but had nothing parseable yet; same advice as
        // an empty characteristic.
        bail!("Bottle sent no data. Make sure it is stable and nearby, then sync again.");
    };

    let mut store = open_store(config)?;
    let today = aquasync_store::today();

    let baseline = store.baseline()?.map(|b| b.ml);
    let event = classify(&config.thresholds(), baseline, f64::from(ml));
    store.apply_event(today, &event)?;
    let today_total = store.day_total(today)?;

    let battery = if no_battery {
        None
    } else {
        service.read_battery_percent().await
    };

    match format {
        OutputFormat::Text => {
            println!("{}", event_message(&event, today_total, config.daily_goal_oz));
            if let Some(percent) = battery {
                println!("Battery: {}%", percent);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "ml_remaining": ml,
                "event": event,
                "today_total_oz": today_total,
                "daily_goal_oz": config.daily_goal_oz,
                "battery_percent": battery,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
