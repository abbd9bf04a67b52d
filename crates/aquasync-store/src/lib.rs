//! Local persistence for AquaSync.
//!
//! This crate stores the three pieces of state the hydration tracker keeps
//! between syncs: the baseline (the last bottle reading used as the
//! consumption reference point), the accumulated intake per calendar day,
//! and an append-only log of individual intake events.
//!
//! # Example
//!
//! ```no_run
//! use aquasync_store::Store;
//!
//! let store = Store::open_default()?;
//! let today = aquasync_store::today();
//!
//! println!("baseline: {:?}", store.baseline()?);
//! println!("today: {:.2} oz", store.day_total(today)?);
//! # Ok::<(), aquasync_store::Error>(())
//! ```

mod error;
mod store;

pub use error::{Error, Result};
pub use store::{Baseline, IntakeRecord, Store};

use time::OffsetDateTime;

/// Today's date in local time (UTC if the local offset is unavailable).
pub fn today() -> time::Date {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date()
}

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/aquasync/data.db`
/// - macOS: `~/Library/Application Support/aquasync/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\aquasync\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("aquasync")
        .join("data.db")
}
