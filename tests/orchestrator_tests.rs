//! Orchestrator integration tests
//!
//! Every test runs against a fake `restic`: a bash script in a temporary
//! directory that records its arguments and environment, prints canned
//! snapshot JSON and fails on demand. Hooks append to a log so their order
//! can be asserted.

#![cfg(unix)]

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use resticctl::config::Config;
use resticctl::config_file::load_from_str;
use resticctl::logic::matcher::{current_hostname, AgeStatus};
use resticctl::orchestrator::{Orchestrator, Outcome};
use resticctl::ResticCtlError;

// =============================================================================
// Fake engine
// =============================================================================

const FAKE_RESTIC: &str = r#"#!/usr/bin/env bash
dir="$(dirname "$0")"
echo "$*" >> "$dir/args.log"
echo "${RESTIC_REPOSITORY}|${RESTIC_PASSWORD}|${REPO_VAR:-}|${BACKUP_VAR:-}" >> "$dir/env.log"
while [[ "$1" == --limit-* ]]; do shift 2; done
cmd="$1"
if [[ -f "$dir/fail_$cmd" ]]; then
    echo "Fatal: $cmd failed" >&2
    exit 1
fi
case "$cmd" in
    version) echo "restic 0.17.3 (fake)" ;;
    snapshots)
        if [[ "$2" == "--json" ]]; then
            if [[ -f "$dir/snapshots.json" ]]; then cat "$dir/snapshots.json"; else echo "[]"; fi
        else
            echo "ID        Time                 Host"
        fi
        ;;
    backup)
        if [[ " $* " == *" --stdin "* ]]; then cat > "$dir/stdin.out"; fi
        ;;
esac
exit 0
"#;

const HOOK: &str = r#"#!/usr/bin/env bash
echo "$*" >> "$(dirname "$0")/hooks.log"
"#;

struct Fake {
    dir: TempDir,
}

impl Fake {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        write_executable(&dir.path().join("restic"), FAKE_RESTIC);
        write_executable(&dir.path().join("hook.sh"), HOOK);
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn restic(&self) -> String {
        self.path("restic").to_string_lossy().into_owned()
    }

    /// Hook template logging `label` and the rendered placeholders.
    fn hook(&self, label: &str) -> String {
        format!("{} {} {{{{.BackupName}}}} {{{{ .RepositoryName }}}}", self.path("hook.sh").display(), label)
    }

    fn fail(&self, subcommand: &str) {
        fs::write(self.path(&format!("fail_{}", subcommand)), "").unwrap();
    }

    fn set_snapshots(&self, snapshots: Value) {
        fs::write(self.path("snapshots.json"), snapshots.to_string()).unwrap();
    }

    fn lines(&self, name: &str) -> Vec<String> {
        fs::read_to_string(self.path(name))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn args(&self) -> Vec<String> {
        self.lines("args.log")
    }

    fn hooks(&self) -> Vec<String> {
        self.lines("hooks.log")
    }

    fn config(&self, backups: Value) -> Config {
        let document = json!({
            "restic_executable": self.restic(),
            "defaults": {
                "repositories": {
                    "limit_upload": 50,
                    "handler": {
                        "check_success": self.hook("check_success"),
                        "check_failure": self.hook("check_failure"),
                        "forget_success": self.hook("forget_success"),
                        "forget_failure": self.hook("forget_failure")
                    }
                },
                "backups": {
                    "handler": {
                        "before": self.hook("before"),
                        "after": self.hook("after"),
                        "success": self.hook("success"),
                        "failure": self.hook("failure"),
                        "age_warn": self.hook("age_warn"),
                        "age_error": self.hook("age_error")
                    },
                    "age": { "warn": "1h", "error": "2h" }
                }
            },
            "repositories": [{
                "name": "local",
                "url": "/srv/restic",
                "password": "s3cret",
                "environment": { "REPO_VAR": "repo", "BACKUP_VAR": "from-repo" },
                "check": { "read_data_percentage": 100 },
                "policy": { "keep_last": 3, "keep_within": "1y" }
            }],
            "backups": backups
        });
        load_from_str(&document.to_string()).unwrap()
    }
}

fn write_executable(path: &Path, content: &str) {
    fs::write(path, content).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn paths_backup() -> Value {
    json!({
        "name": "home",
        "repository": "local",
        "data": ["/home/user", "/etc/"],
        "exclude": ["*.tmp"],
        "tags": ["nightly"],
        "environment": { "BACKUP_VAR": "from-backup" }
    })
}

fn stdin_backup() -> Value {
    json!({
        "name": "db",
        "repository": "local",
        "data_stdin_command": "echo 'hello from producer'",
        "stdin_filename": "dump.sql"
    })
}

fn snapshot(minutes_ago: i64, paths: &[&str], tags: &[&str]) -> Value {
    json!({
        "time": (Utc::now() - ChronoDuration::minutes(minutes_ago)).to_rfc3339(),
        "hostname": current_hostname().expect("hostname"),
        "paths": paths,
        "tags": tags,
        "id": "0123abcd",
        "short_id": "0123abcd"
    })
}

// =============================================================================
// Backup
// =============================================================================

#[test]
fn test_backup_success_runs_all_stages() {
    let fake = Fake::new();
    let config = fake.config(json!([paths_backup()]));
    let orchestrator = Orchestrator::new(&config);

    assert_eq!(orchestrator.backup_outcome(&config.backups[0]), Outcome::Success);

    assert_eq!(
        fake.args(),
        vec![
            "--limit-upload 50 snapshots",
            "--limit-upload 50 unlock",
            "--limit-upload 50 backup /home/user /etc/ --exclude=*.tmp --tag nightly",
        ]
    );
    assert_eq!(
        fake.hooks(),
        vec!["before home local", "after home local", "success home local"]
    );
}

#[test]
fn test_backup_environment_layering() {
    let fake = Fake::new();
    let config = fake.config(json!([paths_backup()]));
    Orchestrator::new(&config)
        .backup(&config.backups[0], &config.repositories[0])
        .unwrap();

    // backup env overrides repository env, credentials always present
    for line in fake.lines("env.log") {
        assert_eq!(line, "/srv/restic|s3cret|repo|from-backup");
    }
}

#[test]
fn test_backup_failure_still_runs_after_hook() {
    let fake = Fake::new();
    fake.fail("backup");
    let config = fake.config(json!([paths_backup()]));
    let orchestrator = Orchestrator::new(&config);

    let err = orchestrator
        .backup(&config.backups[0], &config.repositories[0])
        .unwrap_err();
    assert!(matches!(err, ResticCtlError::Engine(_)));
    assert_eq!(
        fake.hooks(),
        vec!["before home local", "after home local", "failure home local"]
    );
    assert_eq!(orchestrator.backup_outcome(&config.backups[0]), Outcome::Failed);
}

#[test]
fn test_unlock_failure_aborts_with_failure_hook() {
    let fake = Fake::new();
    fake.fail("unlock");
    let config = fake.config(json!([paths_backup()]));

    assert!(Orchestrator::new(&config)
        .backup(&config.backups[0], &config.repositories[0])
        .is_err());
    assert_eq!(fake.hooks(), vec!["failure home local"]);
    assert!(!fake.args().iter().any(|line| line.contains(" backup ")));
}

#[test]
fn test_unreachable_repository_skips_unlock() {
    let fake = Fake::new();
    fake.fail("snapshots");
    let config = fake.config(json!([paths_backup()]));

    assert!(Orchestrator::new(&config)
        .backup(&config.backups[0], &config.repositories[0])
        .is_err());
    assert_eq!(fake.args(), vec!["--limit-upload 50 snapshots"]);
    assert_eq!(fake.hooks(), vec!["failure home local"]);
}

#[test]
fn test_stdin_backup_pipes_producer() {
    let fake = Fake::new();
    let config = fake.config(json!([stdin_backup()]));

    Orchestrator::new(&config)
        .backup(&config.backups[0], &config.repositories[0])
        .unwrap();

    assert_eq!(
        fs::read_to_string(fake.path("stdin.out")).unwrap(),
        "hello from producer\n"
    );
    assert_eq!(
        fake.args().last().map(String::as_str),
        Some("--limit-upload 50 backup --stdin --stdin-filename dump.sql")
    );
    assert_eq!(fake.hooks().last().map(String::as_str), Some("success db local"));
}

#[test]
fn test_stdin_producer_failure_fails_backup() {
    let fake = Fake::new();
    let mut backup = stdin_backup();
    backup["data_stdin_command"] = json!("sh -c 'echo partial; exit 2'");
    let config = fake.config(json!([backup]));

    let err = Orchestrator::new(&config)
        .backup(&config.backups[0], &config.repositories[0])
        .unwrap_err();
    assert!(err.to_string().contains("stdin command failed"));
    assert_eq!(
        fake.hooks(),
        vec!["before db local", "after db local", "failure db local"]
    );
}

// =============================================================================
// Age checks
// =============================================================================

#[test]
fn test_age_warn_between_thresholds() {
    let fake = Fake::new();
    fake.set_snapshots(json!([
        snapshot(300, &["/home/user", "/etc"], &["nightly"]),
        snapshot(90, &["/home/user", "/etc"], &["nightly"]),
        // different order, not this backup
        snapshot(5, &["/etc", "/home/user"], &["nightly"]),
    ]));
    let config = fake.config(json!([paths_backup()]));

    let status = Orchestrator::new(&config)
        .check_age(&config.backups[0], &config.repositories[0])
        .unwrap();
    assert_eq!(status, AgeStatus::Warn);
    assert_eq!(fake.hooks(), vec!["age_warn home local"]);
    assert_eq!(
        fake.args(),
        vec!["--limit-upload 50 unlock", "--limit-upload 50 snapshots --json"]
    );
}

#[test]
fn test_age_fresh_fires_nothing() {
    let fake = Fake::new();
    fake.set_snapshots(json!([snapshot(10, &["/home/user", "/etc"], &["nightly"])]));
    let config = fake.config(json!([paths_backup()]));

    let orchestrator = Orchestrator::new(&config);
    assert_eq!(
        orchestrator.check_age(&config.backups[0], &config.repositories[0]).unwrap(),
        AgeStatus::Ok
    );
    assert!(fake.hooks().is_empty());
}

#[test]
fn test_never_backed_up_is_error() {
    let fake = Fake::new();
    let config = fake.config(json!([paths_backup()]));

    let orchestrator = Orchestrator::new(&config);
    assert_eq!(
        orchestrator.check_age(&config.backups[0], &config.repositories[0]).unwrap(),
        AgeStatus::Error
    );
    assert_eq!(fake.hooks(), vec!["age_error home local"]);
    assert_eq!(orchestrator.check_age_outcome(&config.backups[0]), Outcome::Error);
}

#[test]
fn test_stdin_snapshot_matches_by_filename() {
    let fake = Fake::new();
    fake.set_snapshots(json!([snapshot(30, &["/stdin/dump.sql"], &[])]));
    let config = fake.config(json!([stdin_backup()]));

    let orchestrator = Orchestrator::new(&config);
    let last = orchestrator
        .last_backup_time(&config.backups[0], &config.repositories[0])
        .unwrap();
    assert!(last.is_some());
    assert_eq!(
        orchestrator.check_age(&config.backups[0], &config.repositories[0]).unwrap(),
        AgeStatus::Ok
    );
}

#[test]
fn test_age_check_unlock_failure_fires_age_error() {
    let fake = Fake::new();
    fake.fail("unlock");
    let config = fake.config(json!([paths_backup()]));

    let orchestrator = Orchestrator::new(&config);
    assert!(orchestrator
        .check_age(&config.backups[0], &config.repositories[0])
        .is_err());
    assert_eq!(fake.hooks(), vec!["age_error home local"]);
}

#[test]
fn test_unparseable_listing_fires_age_error() {
    let fake = Fake::new();
    fs::write(fake.path("snapshots.json"), "not json").unwrap();
    let config = fake.config(json!([paths_backup()]));

    let err = Orchestrator::new(&config)
        .check_age(&config.backups[0], &config.repositories[0])
        .unwrap_err();
    assert!(matches!(err, ResticCtlError::Parse(_)));
    assert_eq!(fake.hooks(), vec!["age_error home local"]);
}

// =============================================================================
// Repository maintenance
// =============================================================================

#[test]
fn test_check_reads_all_data() {
    let fake = Fake::new();
    let config = fake.config(json!([]));

    Orchestrator::new(&config).check(&config.repositories[0]).unwrap();
    assert_eq!(
        fake.args(),
        vec!["--limit-upload 50 unlock", "--limit-upload 50 check --read-data"]
    );
    assert_eq!(fake.hooks(), vec!["check_success local"]);
}

#[test]
fn test_check_failure_hook() {
    let fake = Fake::new();
    fake.fail("check");
    let config = fake.config(json!([]));

    let orchestrator = Orchestrator::new(&config);
    assert_eq!(orchestrator.check_outcome(&config.repositories[0]), Outcome::Failed);
    assert_eq!(fake.hooks(), vec!["check_failure local"]);
}

#[test]
fn test_forget_applies_policy() {
    let fake = Fake::new();
    let config = fake.config(json!([]));

    Orchestrator::new(&config).forget(&config.repositories[0]).unwrap();
    assert_eq!(
        fake.args().last().map(String::as_str),
        Some("--limit-upload 50 forget --prune --keep-last 3 --keep-within 1y")
    );
    assert_eq!(fake.hooks(), vec!["forget_success local"]);
}

#[test]
fn test_forget_unlock_failure() {
    let fake = Fake::new();
    fake.fail("unlock");
    let config = fake.config(json!([]));

    assert!(Orchestrator::new(&config).forget(&config.repositories[0]).is_err());
    assert_eq!(fake.hooks(), vec!["forget_failure local"]);
    assert_eq!(fake.args().len(), 1);
}

// =============================================================================
// Plain commands
// =============================================================================

#[test]
fn test_snapshots_listing() {
    let fake = Fake::new();
    let config = fake.config(json!([]));

    let listing = Orchestrator::new(&config)
        .snapshots(&config.repositories[0])
        .unwrap();
    assert!(listing.starts_with("ID"));
}

#[test]
fn test_init_and_mount() {
    let fake = Fake::new();
    let config = fake.config(json!([]));
    let orchestrator = Orchestrator::new(&config);

    orchestrator.init(&config.repositories[0]).unwrap();
    let mount_point = TempDir::new().unwrap();
    orchestrator
        .mount(&config.repositories[0], mount_point.path())
        .unwrap();

    let args = fake.args();
    assert_eq!(args[0], "--limit-upload 50 init");
    assert_eq!(args[1], "--limit-upload 50 unlock");
    assert_eq!(
        args[2],
        format!("--limit-upload 50 mount {}", mount_point.path().display())
    );
}
