//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use aquasync_core::{ConnectionConfig, ScanOptions, SyncConfig};
use aquasync_types::IntakeThresholds;

/// Configuration file structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Daily hydration goal in fluid ounces.
    #[serde(default = "default_daily_goal_oz")]
    pub daily_goal_oz: f64,

    /// Scan window in seconds.
    #[serde(default = "default_scan_timeout_secs")]
    pub scan_timeout_secs: u64,

    /// Level changes of at most this many mL are ignored.
    #[serde(default = "default_noise_floor_ml")]
    pub noise_floor_ml: f64,

    /// Level increases beyond this many mL are treated as a refill.
    #[serde(default = "default_refill_threshold_ml")]
    pub refill_threshold_ml: f64,

    /// Override for the advertised-name allow-list.
    #[serde(default)]
    pub bottle_names: Option<Vec<String>>,

    /// Override for the database location.
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_daily_goal_oz() -> f64 {
    75.0
}

fn default_scan_timeout_secs() -> u64 {
    10
}

fn default_noise_floor_ml() -> f64 {
    aquasync_types::intake::DEFAULT_NOISE_FLOOR_ML
}

fn default_refill_threshold_ml() -> f64 {
    aquasync_types::intake::DEFAULT_REFILL_THRESHOLD_ML
}

impl Default for Config {
    fn default() -> Self {
        Self {
            daily_goal_oz: default_daily_goal_oz(),
            scan_timeout_secs: default_scan_timeout_secs(),
            noise_floor_ml: default_noise_floor_ml(),
            refill_threshold_ml: default_refill_threshold_ml(),
            bottle_names: None,
            store_path: None,
        }
    }
}

/// Default config file path (`~/.config/aquasync/config.toml` on Linux).
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("aquasync")
        .join("config.toml")
}

impl Config {
    /// Load from the given path, or the default location.
    ///
    /// A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        config
            .thresholds()
            .validate()
            .context("invalid intake thresholds in config")?;
        Ok(config)
    }

    /// Write to the given path, or the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let path = path
            .map(Path::to_path_buf)
            .unwrap_or_else(default_config_path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let raw = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(&path, raw)
            .with_context(|| format!("failed to write config at {}", path.display()))?;
        Ok(())
    }

    /// Intake thresholds from the configured values.
    pub fn thresholds(&self) -> IntakeThresholds {
        IntakeThresholds::new()
            .noise_floor_ml(self.noise_floor_ml)
            .refill_threshold_ml(self.refill_threshold_ml)
    }

    /// Scanner options from the configured values.
    pub fn scan_options(&self) -> ScanOptions {
        let options = ScanOptions::default().timeout(Duration::from_secs(self.scan_timeout_secs));
        match &self.bottle_names {
            Some(names) if !names.is_empty() => options.names(names.clone()),
            _ => options,
        }
    }

    /// Full sync configuration.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig::default()
            .scan(self.scan_options())
            .connection(ConnectionConfig::default())
    }
}
