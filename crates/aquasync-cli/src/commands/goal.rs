//! Goal command implementation.

use std::path::Path;

use anyhow::{Result, bail};

use crate::config::Config;

pub fn run(config: &Config, config_path: Option<&Path>, ounces: Option<f64>) -> Result<()> {
    match ounces {
        None => {
            println!("Daily goal: {:.0} oz", config.daily_goal_oz);
        }
        Some(ounces) => {
            if !ounces.is_finite() || ounces <= 0.0 {
                bail!("The daily goal must be a positive number of ounces.");
            }
            let mut updated = config.clone();
            updated.daily_goal_oz = ounces;
            updated.save(config_path)?;
            println!("Daily goal set to {:.0} oz.", ounces);
        }
    }
    Ok(())
}
