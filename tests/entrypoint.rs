//! Drives the built binary through the container entrypoint scenarios.
#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_service-launcher");

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Writes a migration script that records each run and exits with `code`.
    fn migration_script(&self, code: i32) -> String {
        let script = self.path("migrate.sh");
        let marker = self.path("migrations.log");
        fs::write(
            &script,
            format!("echo run >> {}\nexit {}\n", marker.display(), code),
        )
        .expect("write migration script");
        format!("sh {}", script.display())
    }

    fn migration_runs(&self) -> usize {
        fs::read_to_string(self.path("migrations.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(BIN);
        cmd.current_dir(self.dir.path())
            .env_remove("DATABASE_URL")
            .env_remove("DATABASE_URI")
            .env_remove("LAUNCHER_CONFIG")
            .env_remove("LAUNCHER_MIGRATE_COMMAND")
            .env_remove("LAUNCHER_MIGRATIONS_DIR")
            .env_remove("LAUNCHER_LOG_FORMAT")
            .env_remove("LAUNCHER_LOG_LEVEL")
            .env_remove("RUST_LOG");
        cmd
    }
}

fn run(cmd: &mut Command) -> Output {
    cmd.output().expect("run service-launcher")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn unset_database_url_skips_migration() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);

    let output = run(sandbox
        .command()
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .arg("true"));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(sandbox.migration_runs(), 0);
}

#[test]
fn empty_database_url_skips_migration() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
    assert_eq!(sandbox.migration_runs(), 0);
}

#[test]
fn successful_migration_runs_once_then_hands_off() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "postgres://shop:secret@db/shop")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
    assert_eq!(sandbox.migration_runs(), 1);
    assert!(!String::from_utf8_lossy(&output.stderr).contains("secret"));
}

#[test]
fn failed_migration_does_not_block_hand_off() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(4);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "not-a-valid-connection-string")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
    assert_eq!(sandbox.migration_runs(), 1);
}

#[test]
fn missing_migration_tool_does_not_block_hand_off() {
    let sandbox = Sandbox::new();

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "postgres://db/shop")
        .env("LAUNCHER_MIGRATE_COMMAND", "service-launcher-no-such-tool upgrade")
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
}

#[test]
fn missing_command_exits_non_zero() {
    let sandbox = Sandbox::new();

    let output = run(sandbox.command().arg("service-launcher-no-such-binary"));

    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn missing_command_fails_even_after_migration() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "postgres://db/shop")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .arg("service-launcher-no-such-binary"));

    assert_eq!(output.status.code(), Some(127));
    assert_eq!(sandbox.migration_runs(), 1);
}

#[test]
fn exit_code_of_command_is_forwarded() {
    let sandbox = Sandbox::new();

    let output = run(sandbox.command().args(["sh", "-c", "exit 7"]));

    assert_eq!(output.status.code(), Some(7));
}

#[test]
fn hyphenated_arguments_belong_to_the_command() {
    let sandbox = Sandbox::new();

    let output = run(sandbox.command().args(["echo", "-n", "--config", "x"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "--config x");
}

#[test]
fn blank_migrate_command_override_still_hands_off() {
    let sandbox = Sandbox::new();

    let output = run(sandbox
        .command()
        .env("LAUNCHER_MIGRATE_COMMAND", "")
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
}

#[test]
fn log_format_override_is_case_insensitive() {
    let sandbox = Sandbox::new();

    let output = run(sandbox
        .command()
        .env("LAUNCHER_LOG_FORMAT", "JSON")
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
}

#[test]
fn unknown_log_format_override_still_hands_off() {
    let sandbox = Sandbox::new();

    let output = run(sandbox
        .command()
        .env("LAUNCHER_LOG_FORMAT", "xml")
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown log format xml"));
}

#[test]
fn migrations_dir_override_wins_over_migrate_command() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);
    let migrations = sandbox.path("migrations");
    fs::create_dir(&migrations).expect("create migrations dir");
    let database = sandbox.path("shop.db");

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", format!("sqlite://{}", database.display()))
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .env("LAUNCHER_MIGRATIONS_DIR", &migrations)
        .args(["echo", "ok"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "ok\n");
    assert_eq!(sandbox.migration_runs(), 0);
    assert!(String::from_utf8_lossy(&output.stderr).contains("ignoring LAUNCHER_MIGRATE_COMMAND"));
}

#[test]
fn no_command_and_no_default_exits_non_zero() {
    let sandbox = Sandbox::new();

    let output = run(&mut sandbox.command());

    assert_eq!(output.status.code(), Some(127));
}

#[test]
fn config_file_supplies_default_command() {
    let sandbox = Sandbox::new();
    let config = sandbox.path("launcher.yaml");
    fs::write(&config, "handoff:\n  command: [\"echo\", \"from-config\"]\n")
        .expect("write config");

    let output = run(sandbox.command().arg("--config").arg(&config));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "from-config\n");
}

#[test]
fn unreadable_config_file_is_fatal() {
    let sandbox = Sandbox::new();

    let output = run(sandbox
        .command()
        .arg("--config")
        .arg(sandbox.path("missing.yaml"))
        .arg("true"));

    assert_eq!(output.status.code(), Some(78));
}

#[test]
fn skip_migrations_flag_wins_over_database_url() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(0);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "postgres://db/shop")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .args(["--skip-migrations", "true"]));

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(sandbox.migration_runs(), 0);
}

#[test]
fn migrate_only_reports_failure() {
    let sandbox = Sandbox::new();
    let migrate = sandbox.migration_script(2);

    let output = run(sandbox
        .command()
        .env("DATABASE_URL", "postgres://db/shop")
        .env("LAUNCHER_MIGRATE_COMMAND", &migrate)
        .arg("--migrate-only"));

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(sandbox.migration_runs(), 1);
}

#[test]
fn migrate_only_without_database_url_succeeds() {
    let sandbox = Sandbox::new();

    let output = run(sandbox.command().arg("--migrate-only"));

    assert_eq!(output.status.code(), Some(0));
}

#[test]
fn sql_migrations_apply_against_sqlite() {
    let sandbox = Sandbox::new();
    let migrations = sandbox.path("migrations");
    fs::create_dir(&migrations).expect("create migrations dir");
    fs::write(
        migrations.join("1_create_products.sql"),
        "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT NOT NULL);",
    )
    .expect("write migration");
    let database = sandbox.path("shop.db");

    for _ in 0..2 {
        let output = run(sandbox
            .command()
            .env("DATABASE_URL", format!("sqlite://{}", database.display()))
            .env("LAUNCHER_MIGRATIONS_DIR", &migrations)
            .arg("--migrate-only"));
        assert_eq!(output.status.code(), Some(0), "{:?}", output);
    }

    assert!(Path::new(&database).exists());
}
