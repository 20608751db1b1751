//! Configuration file handling: locating, loading, saving and the example
//! document printed by `resticctl example-config`.
//!
//! Loading always resolves: defaults are applied and the result validated,
//! so a [`Config`] returned from here is safe to hand to the orchestrator.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{
    Backup, BackupAge, BackupHandler, BackupOptions, Check, Config, Repository,
};
use crate::duration::AgeDuration;
use crate::error::{ResticCtlError, Result};
use crate::logic::resolver;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RESTICCTL_CONFIG";

/// Default location: `<config dir>/resticctl/config.json`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("resticctl").join("config.json"))
}

/// Parse and resolve a configuration document.
pub fn load_from_str(content: &str) -> Result<Config> {
    let config: Config = serde_json::from_str(content)
        .map_err(|e| ResticCtlError::parse(format!("Failed to parse configuration JSON: {}", e)))?;
    resolver::resolve(config)
}

/// Parse and resolve a configuration document from a reader.
pub fn load_from_reader<R: Read>(mut reader: R) -> Result<Config> {
    let mut content = String::new();
    reader.read_to_string(&mut content)?;
    load_from_str(&content)
}

/// Load configuration from a JSON file, refusing world-accessible files.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    debug!("Loading configuration from {}", path.display());

    check_permissions(path)?;
    let content = fs::read_to_string(path).map_err(|e| {
        ResticCtlError::config(format!("Failed to read configuration from {}: {}", path.display(), e))
    })?;
    load_from_str(&content)
}

/// The file holds repository passwords; "other" must have no access.
#[cfg(unix)]
pub fn check_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Ok(metadata) = fs::metadata(path) else {
        // reading reports the missing file
        return Ok(());
    };
    if metadata.permissions().mode() & 0o007 != 0 {
        return Err(ResticCtlError::config(format!(
            "{} is accessible by other users. Please restrict its permissions (chmod o-rwx).",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn check_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Save configuration as pretty JSON. Empty fields are omitted.
pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> Result<()> {
    let json = to_json(config)?;
    fs::write(&path, json).map_err(|e| {
        ResticCtlError::config(format!(
            "Failed to write configuration to {}: {}",
            path.as_ref().display(),
            e
        ))
    })
}

pub fn to_json(config: &Config) -> Result<String> {
    Ok(serde_json::to_string_pretty(config)?)
}

/// A small but complete configuration: one repository, one backup of
/// paths and one stdin backup with age thresholds.
pub fn example_config() -> Config {
    let repository = Repository {
        name: "backup-repo".into(),
        url: "/srv/restic/backup-repo".into(),
        password: "a secure password".into(),
        check: Check {
            read_data_percentage: 5,
        },
        ..Default::default()
    };

    let documents = Backup {
        name: "documents".into(),
        repository: repository.name.clone(),
        data: vec!["/home/user/documents".into(), "/home/user/pictures".into()],
        exclude: vec!["*.tmp".into(), "*.swp".into()],
        one_file_system: true,
        tags: vec!["home".into(), "documents".into()],
        options: BackupOptions {
            handler: BackupHandler {
                before: "notify-send -t 1000 \"Backup {{.BackupName}} starting\"".into(),
                after: "notify-send -t 1000 \"Backup {{.BackupName}} finished\"".into(),
                success: "notify-send -t 1000 \"Backup {{.BackupName}} done\"".into(),
                failure: "notify-send \"Backup {{.BackupName}} to {{.RepositoryName}} failed\"".into(),
                ..Default::default()
            },
            ..Default::default()
        },
        ..Default::default()
    };

    let crontab = Backup {
        name: "crontab".into(),
        repository: repository.name.clone(),
        data_stdin_command: "crontab -l".into(),
        stdin_filename: "crontab.txt".into(),
        tags: vec!["cron".into()],
        options: BackupOptions {
            age: BackupAge {
                warn: AgeDuration::from_secs(6 * 3600),
                error: AgeDuration::from_secs(12 * 3600),
            },
            ..Default::default()
        },
        ..Default::default()
    };

    Config {
        repositories: vec![repository],
        backups: vec![documents, crontab],
        ..Default::default()
    }
}

/// [`example_config`] as pretty JSON.
pub fn example_config_json() -> Result<String> {
    to_json(&example_config())
}
