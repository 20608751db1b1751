//! Snapshot matching and backup age classification.
//!
//! A snapshot belongs to a backup when it was taken on this host, carries
//! exactly the backup's tags in the same order, and covers exactly the
//! backup's data:
//!
//! | Data source | Snapshot requirement |
//! |-------------|----------------------|
//! | paths       | same paths, same order, compared after lexical cleaning |
//! | stdin       | a single path ending in `stdin_filename` |
//!
//! Order matters because restic records paths and tags in the order they
//! were given. Reordering a backup's `data` starts a new history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use strum::{Display, EnumString};
use tracing::warn;

use crate::config::{Backup, BackupAge, DataSource};
use crate::engine::snapshot::Snapshot;

/// Result of comparing a backup's age against its thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[derive(Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AgeStatus {
    Ok,
    Warn,
    Error,
}

/// Lexically normalize a path: collapse repeated separators, drop `.`
/// segments and trailing separators, resolve `..` against the preceding
/// segment. The filesystem is never consulted.
pub fn clean_path(path: &str) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                // `/..` is `/`
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return PathBuf::from(".");
    }
    parts.iter().collect()
}

/// Order-sensitive comparison of two path lists after cleaning.
pub fn same_paths(a: &[String], b: &[String]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| clean_path(x) == clean_path(y))
}

/// Hostname of this machine, or `None` if it cannot be determined. Without
/// a hostname no snapshot matches.
pub fn current_hostname() -> Option<String> {
    match hostname::get() {
        Ok(name) => Some(name.to_string_lossy().into_owned()),
        Err(e) => {
            warn!("Failed to get hostname: {}", e);
            None
        }
    }
}

/// Whether `snapshot` was produced by `backup` on host `hostname`.
pub fn snapshot_matches(backup: &Backup, snapshot: &Snapshot, hostname: Option<&str>) -> bool {
    let data_matches = match backup.data_source() {
        DataSource::Stdin { filename, .. } => {
            snapshot.paths.len() == 1 && snapshot.paths[0].ends_with(filename)
        }
        DataSource::Paths(paths) => same_paths(&snapshot.paths, paths),
    };

    data_matches
        && hostname.is_some_and(|host| snapshot.hostname == host)
        && snapshot.tags == backup.tags
}

/// Timestamp of the most recent snapshot belonging to `backup`, or `None`
/// when it has never been backed up from this host.
pub fn last_backup_time(
    backup: &Backup,
    snapshots: &[Snapshot],
    hostname: Option<&str>,
) -> Option<DateTime<Utc>> {
    snapshots
        .iter()
        .filter(|snapshot| snapshot_matches(backup, snapshot, hostname))
        .map(|snapshot| snapshot.time)
        .max()
}

/// Time elapsed since `last`; snapshots from the future count as fresh.
pub fn elapsed_since(last: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - last).to_std().unwrap_or(Duration::ZERO)
}

/// Classify a backup's age. Never backed up is always an error.
pub fn classify(last: Option<DateTime<Utc>>, now: DateTime<Utc>, age: &BackupAge) -> AgeStatus {
    let Some(last) = last else {
        return AgeStatus::Error;
    };
    let elapsed = elapsed_since(last, now);
    if elapsed > age.error.as_duration() {
        AgeStatus::Error
    } else if elapsed > age.warn.as_duration() {
        AgeStatus::Warn
    } else {
        AgeStatus::Ok
    }
}
