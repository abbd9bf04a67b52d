//! Status command implementation.

use anyhow::{Context, Result};
use time::Date;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use super::open_store;
use crate::config::Config;

const DAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

pub fn run(config: &Config, date: Option<&str>) -> Result<()> {
    let day = match date {
        Some(raw) => Date::parse(raw, DAY_FORMAT)
            .with_context(|| format!("invalid date '{}', expected YYYY-MM-DD", raw))?,
        None => aquasync_store::today(),
    };

    let store = open_store(config)?;
    let total = store.day_total(day)?;
    let goal = config.daily_goal_oz;
    let percent = if goal > 0.0 {
        ((total / goal) * 100.0).clamp(0.0, 100.0).round() as u32
    } else {
        0
    };

    let day_label = day
        .format(DAY_FORMAT)
        .context("failed to format date")?;
    println!("{}: {:.2} / {:.0} oz ({}%)", day_label, total, goal, percent);

    if let Some(baseline) = store.baseline()? {
        println!("Last bottle level: {:.0} mL", baseline.ml);
    } else {
        println!("No baseline yet. Run `aquasync sync` to set one.");
    }

    let recent = store.recent_intakes(5)?;
    if !recent.is_empty() {
        println!("Recent intakes:");
        for record in recent {
            println!("  {:.2} oz ({:.0} mL)", record.fl_oz, record.ml);
        }
    }

    Ok(())
}
