//! Type-safe restic argument contracts.
//!
//! Every restic subcommand the orchestrator uses has a struct implementing
//! [`EngineArgs`]. The struct is the single place where configuration fields
//! are mapped to restic flags, so a flag typo is a one-line diff with a test
//! next to it instead of a string scattered through the orchestrator.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{Backup, DataSource, Policy, Repository};

/// Trait for typed restic subcommand arguments.
///
/// # Contract
///
/// - `to_cli_args()`: subcommand name followed by its flags, exactly as
///   restic expects them. Global flags are added by the runner.
/// - `operation()`: short name used in logs and error messages.
pub trait EngineArgs {
    fn to_cli_args(&self) -> Vec<String>;

    fn operation(&self) -> &'static str;
}

/// Flags placed before the subcommand: transfer limits in KiB/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalFlags {
    pub limit_download: u32,
    pub limit_upload: u32,
}

impl GlobalFlags {
    pub fn for_repository(repository: &Repository) -> Self {
        Self {
            limit_download: repository.options.limit_download,
            limit_upload: repository.options.limit_upload,
        }
    }

    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.limit_download > 0 {
            args.push("--limit-download".to_string());
            args.push(self.limit_download.to_string());
        }
        if self.limit_upload > 0 {
            args.push("--limit-upload".to_string());
            args.push(self.limit_upload.to_string());
        }
        args
    }
}

/// `restic backup` for one configured backup.
#[derive(Debug, Clone, Copy)]
pub struct BackupArgs<'a> {
    pub backup: &'a Backup,
}

impl EngineArgs for BackupArgs<'_> {
    fn to_cli_args(&self) -> Vec<String> {
        let backup = self.backup;
        let mut args = vec!["backup".to_string()];

        if let DataSource::Paths(paths) = backup.data_source() {
            args.extend(paths.iter().cloned());
        }

        for exclude in &backup.exclude {
            args.push(format!("--exclude={}", exclude));
        }

        for tag in &backup.tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }

        if backup.one_file_system {
            args.push("--one-file-system".to_string());
        }

        args.extend(backup.custom_flags.iter().cloned());

        if let DataSource::Stdin { filename, .. } = backup.data_source() {
            args.push("--stdin".to_string());
            args.push("--stdin-filename".to_string());
            args.push(filename.to_string());
        }

        args
    }

    fn operation(&self) -> &'static str {
        "backup"
    }
}

/// How much pack data `restic check` reads back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadData {
    /// Structure check only
    None,
    /// `--read-data`
    Full,
    /// `--read-data-subset=index/total`, index is 1-based
    Subset { index: u32, total: u32 },
}

impl ReadData {
    /// Pick the read-verification mode for a percentage. Below 100 the data
    /// is split into `ceil(100 / percentage)` subsets and one is chosen at
    /// random, so repeated checks spread the read load.
    pub fn from_percentage<R: Rng + ?Sized>(percentage: u32, rng: &mut R) -> Self {
        match percentage {
            0 => Self::None,
            p if p >= 100 => Self::Full,
            p => {
                let total = 100u32.div_ceil(p);
                Self::Subset {
                    index: rng.random_range(1..=total),
                    total,
                }
            }
        }
    }
}

/// `restic check`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckArgs {
    pub read_data: ReadData,
}

impl CheckArgs {
    /// Check arguments for a repository, reseeding the subset choice from
    /// the clock on every call.
    pub fn for_repository(repository: &Repository) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            read_data: ReadData::from_percentage(repository.check.read_data_percentage, &mut rng),
        }
    }
}

impl EngineArgs for CheckArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["check".to_string()];
        match self.read_data {
            ReadData::None => {}
            ReadData::Full => args.push("--read-data".to_string()),
            ReadData::Subset { index, total } => {
                args.push(format!("--read-data-subset={}/{}", index, total))
            }
        }
        args
    }

    fn operation(&self) -> &'static str {
        "check"
    }
}

/// `restic forget --prune` with the repository's retention policy.
#[derive(Debug, Clone, Copy)]
pub struct ForgetArgs<'a> {
    pub policy: &'a Policy,
}

impl EngineArgs for ForgetArgs<'_> {
    fn to_cli_args(&self) -> Vec<String> {
        let policy = self.policy;
        let mut args = vec!["forget".to_string(), "--prune".to_string()];

        let counts = [
            ("--keep-last", policy.keep_last),
            ("--keep-hourly", policy.keep_hourly),
            ("--keep-daily", policy.keep_daily),
            ("--keep-weekly", policy.keep_weekly),
            ("--keep-monthly", policy.keep_monthly),
            ("--keep-yearly", policy.keep_yearly),
        ];
        for (flag, count) in counts {
            if count > 0 {
                args.push(flag.to_string());
                args.push(count.to_string());
            }
        }

        if !policy.keep_within.is_empty() {
            args.push("--keep-within".to_string());
            args.push(policy.keep_within.clone());
        }

        for tag in &policy.keep_tags {
            args.push("--keep-tag".to_string());
            args.push(tag.clone());
        }

        args
    }

    fn operation(&self) -> &'static str {
        "forget"
    }
}

/// `restic snapshots`, optionally machine readable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotsArgs {
    pub json: bool,
}

impl EngineArgs for SnapshotsArgs {
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec!["snapshots".to_string()];
        if self.json {
            args.push("--json".to_string());
        }
        args
    }

    fn operation(&self) -> &'static str {
        "snapshots"
    }
}

/// `restic unlock`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnlockArgs;

impl EngineArgs for UnlockArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec!["unlock".to_string()]
    }

    fn operation(&self) -> &'static str {
        "unlock"
    }
}

/// `restic init`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitArgs;

impl EngineArgs for InitArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec!["init".to_string()]
    }

    fn operation(&self) -> &'static str {
        "init"
    }
}

/// `restic mount <path>`
#[derive(Debug, Clone, Copy)]
pub struct MountArgs<'a> {
    pub mount_point: &'a Path,
}

impl EngineArgs for MountArgs<'_> {
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "mount".to_string(),
            self.mount_point.to_string_lossy().into_owned(),
        ]
    }

    fn operation(&self) -> &'static str {
        "mount"
    }
}

/// `restic version`, used as an availability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionArgs;

impl EngineArgs for VersionArgs {
    fn to_cli_args(&self) -> Vec<String> {
        vec!["version".to_string()]
    }

    fn operation(&self) -> &'static str {
        "version"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_global_flags() {
        assert!(GlobalFlags::default().to_cli_args().is_empty());
        let flags = GlobalFlags { limit_download: 100, limit_upload: 0 };
        assert_eq!(flags.to_cli_args(), strings(&["--limit-download", "100"]));
        let flags = GlobalFlags { limit_download: 100, limit_upload: 50 };
        assert_eq!(
            flags.to_cli_args(),
            strings(&["--limit-download", "100", "--limit-upload", "50"])
        );
    }

    #[test]
    fn test_backup_args_paths() {
        let backup = Backup {
            data: strings(&["/etc", "/home"]),
            exclude: strings(&["*.tmp"]),
            tags: strings(&["nightly", "host"]),
            one_file_system: true,
            custom_flags: strings(&["--ignore-inode"]),
            ..Default::default()
        };
        assert_eq!(
            BackupArgs { backup: &backup }.to_cli_args(),
            strings(&[
                "backup",
                "/etc",
                "/home",
                "--exclude=*.tmp",
                "--tag",
                "nightly",
                "--tag",
                "host",
                "--one-file-system",
                "--ignore-inode",
            ])
        );
    }

    #[test]
    fn test_backup_args_stdin() {
        let backup = Backup {
            data_stdin_command: "crontab -l".into(),
            stdin_filename: "crontab.txt".into(),
            ..Default::default()
        };
        assert_eq!(
            BackupArgs { backup: &backup }.to_cli_args(),
            strings(&["backup", "--stdin", "--stdin-filename", "crontab.txt"])
        );
    }

    #[test]
    fn test_read_data_selection() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(ReadData::from_percentage(0, &mut rng), ReadData::None);
        assert_eq!(ReadData::from_percentage(100, &mut rng), ReadData::Full);
        assert_eq!(ReadData::from_percentage(150, &mut rng), ReadData::Full);

        for percentage in [1, 5, 30, 33, 50, 99] {
            let expected_total = (100 + percentage - 1) / percentage;
            for _ in 0..50 {
                match ReadData::from_percentage(percentage, &mut rng) {
                    ReadData::Subset { index, total } => {
                        assert_eq!(total, expected_total);
                        assert!((1..=total).contains(&index));
                    }
                    other => panic!("unexpected {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_check_args() {
        assert_eq!(CheckArgs { read_data: ReadData::None }.to_cli_args(), strings(&["check"]));
        assert_eq!(
            CheckArgs { read_data: ReadData::Full }.to_cli_args(),
            strings(&["check", "--read-data"])
        );
        assert_eq!(
            CheckArgs { read_data: ReadData::Subset { index: 3, total: 20 } }.to_cli_args(),
            strings(&["check", "--read-data-subset=3/20"])
        );
    }

    #[test]
    fn test_check_args_for_repository() {
        let mut repository = Repository::default();
        repository.check.read_data_percentage = 5;
        match CheckArgs::for_repository(&repository).read_data {
            ReadData::Subset { index, total } => {
                assert_eq!(total, 20);
                assert!((1..=20).contains(&index));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_forget_args_skip_unset() {
        let policy = Policy::default();
        assert_eq!(ForgetArgs { policy: &policy }.to_cli_args(), strings(&["forget", "--prune"]));

        let policy = Policy {
            keep_last: 3,
            keep_daily: 7,
            keep_yearly: 2,
            keep_within: "2y5m".into(),
            keep_tags: strings(&["keep", "forever"]),
            ..Default::default()
        };
        assert_eq!(
            ForgetArgs { policy: &policy }.to_cli_args(),
            strings(&[
                "forget",
                "--prune",
                "--keep-last",
                "3",
                "--keep-daily",
                "7",
                "--keep-yearly",
                "2",
                "--keep-within",
                "2y5m",
                "--keep-tag",
                "keep",
                "--keep-tag",
                "forever",
            ])
        );
    }

    #[test]
    fn test_simple_subcommands() {
        assert_eq!(SnapshotsArgs { json: true }.to_cli_args(), strings(&["snapshots", "--json"]));
        assert_eq!(SnapshotsArgs { json: false }.to_cli_args(), strings(&["snapshots"]));
        assert_eq!(UnlockArgs.to_cli_args(), strings(&["unlock"]));
        assert_eq!(InitArgs.to_cli_args(), strings(&["init"]));
        assert_eq!(VersionArgs.to_cli_args(), strings(&["version"]));
        let mount_point = PathBuf::from("/mnt/restic");
        assert_eq!(
            MountArgs { mount_point: &mount_point }.to_cli_args(),
            strings(&["mount", "/mnt/restic"])
        );
    }
}
