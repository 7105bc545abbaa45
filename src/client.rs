//! Run-boundary housekeeping: sentinel files, the run lock, per-run output
//!
//! Scheduled runs are suppressed while an override marker is fresh or a
//! test-timestamp marker exists. Sentinels are only consulted before a run
//! starts; creating one mid-run does not stop it.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::Sentinels;

const CURRENT_LINK: &str = "chef.cur.out";
const LAST_LINK: &str = "chef.last.out";
const OUTPUT_PREFIX: &str = "chef.2";

// ============================================================================
// Sentinels
// ============================================================================

/// Whether a scheduled run may start
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Proceed,
    Suppressed(String),
}

fn age(path: &Path, now: SystemTime) -> Result<Option<Duration>> {
    match fs::metadata(path) {
        Ok(meta) => {
            let modified = meta.modified()?;
            Ok(Some(now.duration_since(modified).unwrap_or_default()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("Could not stat {}", path.display())),
    }
}

/// Check sentinels, removing a stale override marker
pub fn check_sentinels(sentinels: &Sentinels, now: SystemTime) -> Result<Gate> {
    let max_age = Duration::from_secs(sentinels.override_max_age_minutes * 60);
    if let Some(age) = age(&sentinels.override_file, now)? {
        if age < max_age {
            return Ok(Gate::Suppressed(format!(
                "{} is {} minutes old",
                sentinels.override_file.display(),
                age.as_secs() / 60
            )));
        }
        fs::remove_file(&sentinels.override_file).with_context(|| {
            format!("Could not remove {}", sentinels.override_file.display())
        })?;
        log::info!(
            "Removed stale override {} ({} minutes old)",
            sentinels.override_file.display(),
            age.as_secs() / 60
        );
    }

    if sentinels.test_timestamp.exists() {
        return Ok(Gate::Suppressed(format!(
            "{} exists",
            sentinels.test_timestamp.display()
        )));
    }
    Ok(Gate::Proceed)
}

/// Write the override marker so it goes stale `minutes` from `now`
pub fn pause(sentinels: &Sentinels, minutes: u64, now: SystemTime) -> Result<SystemTime> {
    let max_age = Duration::from_secs(sentinels.override_max_age_minutes * 60);
    let pause = Duration::from_secs(minutes * 60);
    let until = now + pause;
    // Expires when mtime + max_age passes
    let mtime = until.checked_sub(max_age).unwrap_or(SystemTime::UNIX_EPOCH);

    if let Some(parent) = sentinels.override_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let mut file = File::create(&sentinels.override_file)
        .with_context(|| format!("Could not create {}", sentinels.override_file.display()))?;
    let until_local: DateTime<Local> = until.into();
    writeln!(file, "paused until {}", until_local.to_rfc3339())?;
    file.set_modified(mtime)
        .with_context(|| format!("Could not set mtime on {}", sentinels.override_file.display()))?;
    log::debug!("Wrote {}", sentinels.override_file.display());
    Ok(until)
}

/// Remove the override marker; false when none was present
pub fn resume(sentinels: &Sentinels) -> Result<bool> {
    match fs::remove_file(&sentinels.override_file) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e)
            .with_context(|| format!("Could not remove {}", sentinels.override_file.display())),
    }
}

// ============================================================================
// Run Lock
// ============================================================================

/// Exclusive lock held for the duration of a run
///
/// Released when dropped.
pub struct RunLock {
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking; fails if another run holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .with_context(|| format!("Could not open lock {}", path.display()))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::debug!("Acquired run lock {}", path.display());
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                bail!("Another fleetctl run holds {}", path.display())
            }
            Err(e) => Err(e).with_context(|| format!("Could not lock {}", path.display())),
        }
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        log::debug!("Released run lock {}", self.path.display());
    }
}

// ============================================================================
// Run Output
// ============================================================================

/// `chef.<timestamp>.out` for the current run
///
/// `chef.cur.out` points at it while the run is in progress and
/// `chef.last.out` once it finishes.
pub struct RunOutput {
    file: File,
    dir: PathBuf,
    name: String,
}

impl RunOutput {
    pub fn start(dir: &Path, started: DateTime<Local>) -> Result<Self> {
        fs::create_dir_all(dir).with_context(|| format!("Could not create {}", dir.display()))?;
        let name = format!("chef.{}.out", started.format("%Y%m%d.%H%M%S"));
        let path = dir.join(&name);
        let file =
            File::create(&path).with_context(|| format!("Could not create {}", path.display()))?;
        relink(dir, CURRENT_LINK, &name)?;
        log::debug!("Writing run output to {}", path.display());
        Ok(Self {
            file,
            dir: dir.to_path_buf(),
            name,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Append a line; a failed write is logged and otherwise ignored
    pub fn line(&mut self, text: &str) {
        if let Err(e) = writeln!(self.file, "{text}") {
            log::warn!("Could not write to {}: {e}", self.path().display());
        }
    }

    /// Point `chef.last.out` at this run and drop `chef.cur.out`
    pub fn finish(mut self) -> Result<PathBuf> {
        self.file.flush()?;
        relink(&self.dir, LAST_LINK, &self.name)?;
        let current = self.dir.join(CURRENT_LINK);
        if current.symlink_metadata().is_ok() {
            fs::remove_file(&current)
                .with_context(|| format!("Could not remove {}", current.display()))?;
        }
        Ok(self.path())
    }
}

fn relink(dir: &Path, link: &str, target: &str) -> Result<()> {
    let link = dir.join(link);
    if link.symlink_metadata().is_ok() {
        fs::remove_file(&link).with_context(|| format!("Could not remove {}", link.display()))?;
    }
    std::os::unix::fs::symlink(target, &link)
        .with_context(|| format!("Could not link {} -> {target}", link.display()))
}

/// Delete `chef.2*` outputs older than `retention_days`
pub fn prune(dir: &Path, retention_days: u32, now: SystemTime) -> Result<Vec<PathBuf>> {
    let retention = Duration::from_secs(u64::from(retention_days) * 24 * 60 * 60);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Could not list {}", dir.display())),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().starts_with(OUTPUT_PREFIX) {
            continue;
        }
        let meta = entry.path().symlink_metadata()?;
        if !meta.file_type().is_file() {
            continue;
        }
        let age = now.duration_since(meta.modified()?).unwrap_or_default();
        if age > retention {
            fs::remove_file(entry.path())
                .with_context(|| format!("Could not remove {}", entry.path().display()))?;
            removed.push(entry.path());
        }
    }
    removed.sort();
    Ok(removed)
}
