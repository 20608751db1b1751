//! Snapshot records parsed from `restic snapshots --json`.
//!
//! Only the fields needed to attribute a snapshot to a backup are kept;
//! everything else restic prints (ids, tree, uid/gid, summary) is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::{ResticCtlError, Result};

/// One completed capture as recorded by restic.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Snapshot {
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub paths: Vec<String>,
    /// restic omits the key (or prints null) for untagged snapshots
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a JSON snapshot listing. `null` is accepted as an empty listing.
pub fn parse_snapshots(output: &str) -> Result<Vec<Snapshot>> {
    let listing: Option<Vec<Snapshot>> = serde_json::from_str(output.trim())
        .map_err(|e| ResticCtlError::parse(format!("invalid snapshot listing: {}", e)))?;
    Ok(listing.unwrap_or_default())
}
