//! `fleetctl pause`, `resume`, and `prune`

use anyhow::Result;
use chrono::{DateTime, Local};
use std::time::SystemTime;

use crate::Context;
use crate::client;
use crate::ui;

pub fn pause(ctx: &Context, minutes: u64) -> Result<()> {
    let config = super::load_config(ctx)?;
    let until: DateTime<Local> = client::pause(&config.sentinels, minutes, SystemTime::now())?.into();
    ui::success(&format!(
        "Scheduled runs paused until {}",
        until.format("%Y-%m-%d %H:%M")
    ));
    ui::dim(&format!(
        "Remove {} or run `fleetctl resume` to undo",
        config.sentinels.override_file.display()
    ));
    Ok(())
}

pub fn resume(ctx: &Context) -> Result<()> {
    let config = super::load_config(ctx)?;
    if client::resume(&config.sentinels)? {
        ui::success("Scheduled runs resumed");
    } else {
        ui::info("Scheduled runs were not paused");
    }
    Ok(())
}

pub fn prune(ctx: &Context) -> Result<()> {
    let config = super::load_config(ctx)?;
    let removed = client::prune(&config.outputs_dir, config.retention_days, SystemTime::now())?;
    for path in &removed {
        log::info!("Removed {}", path.display());
    }
    if !ctx.quiet {
        ui::success(&format!(
            "Removed {} run outputs older than {} days",
            removed.len(),
            config.retention_days
        ));
    }
    Ok(())
}
