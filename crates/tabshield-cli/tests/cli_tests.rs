use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn binary() -> Command {
    Command::cargo_bin("tabshield").unwrap()
}

struct TestContext {
    _dir: TempDir,
    table_path: PathBuf,
    cells_path: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let table_path = dir.path().join("input.tab");
        let cells_path = dir.path().join("cells.csv");

        fs::write(&table_path, "input table").unwrap();
        fs::write(&cells_path, "index,status,weight\n0,u,3.0\n1,s,1.0\n2,u,7.5\n").unwrap();

        Self {
            _dir: dir,
            table_path,
            cells_path,
        }
    }
}

#[test]
fn test_help_lists_subcommands() {
    let help = binary().arg("--help").assert().success();

    let stdout = String::from_utf8_lossy(&help.get_output().stdout).to_string();
    assert!(stdout.contains("probe"));
    assert!(stdout.contains("search"));
}

#[test]
fn test_missing_table_fails() {
    let ctx = TestContext::new();
    binary()
        .args(["search", "--table", "does-not-exist.tab", "--cells"])
        .arg(&ctx.cells_path)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_unreachable_server_fails() {
    let ctx = TestContext::new();
    // Nothing listens on port 1.
    binary()
        .args(["--host", "127.0.0.1", "--port", "1", "search", "--table"])
        .arg(&ctx.table_path)
        .arg("--cells")
        .arg(&ctx.cells_path)
        .assert()
        .failure()
        .code(1);
}

#[test]
fn test_milestones_logged_by_default() {
    let ctx = TestContext::new();
    let run = binary()
        .env_remove("RUST_LOG")
        .args(["--host", "127.0.0.1", "--port", "1", "search", "--table"])
        .arg(&ctx.table_path)
        .arg("--groups")
        .arg("3")
        .assert()
        .failure();

    let stdout = String::from_utf8_lossy(&run.get_output().stdout).to_string();
    assert!(stdout.contains("Initializing TabShield"), "{}", stdout);
    assert!(stdout.contains("Solver server: http://127.0.0.1:1"), "{}", stdout);
}

#[test]
fn test_source_is_required() {
    let ctx = TestContext::new();
    // clap usage error
    binary()
        .args(["search", "--table"])
        .arg(&ctx.table_path)
        .assert()
        .failure()
        .code(2);
}
