//! Integration tests for Shipyard

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Command isolated from the user's config and state
    fn shipyard(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("shipyard");
        cmd.env("SHIPYARD_STATE_DIR", home.path().join("state"))
            .env("SHIPYARD_CONFIG", home.path().join("config.toml"))
            .env_remove("RUST_LOG")
            .arg("--no-local");
        cmd
    }

    fn project(home: &TempDir) -> std::path::PathBuf {
        let dir = home.path().join("project");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("Cargo.toml"),
            "[package]\nname = \"demo\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Multi-target build"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("shipyard"));
    }

    #[test]
    fn matrix_lists_four_targets() {
        let home = TempDir::new().unwrap();
        let dir = project(&home);
        shipyard(&home)
            .args(["matrix", "--format", "plain", "--project"])
            .arg(&dir)
            .assert()
            .success()
            .stdout(
                predicate::str::contains("x86_64-unknown-linux-gnu")
                    .and(predicate::str::contains("x86_64-apple-darwin"))
                    .and(predicate::str::contains("aarch64-apple-darwin"))
                    .and(predicate::str::contains("x86_64-pc-windows-msvc")),
            );
    }

    #[test]
    fn matrix_shows_binary_from_manifest() {
        let home = TempDir::new().unwrap();
        let dir = project(&home);
        shipyard(&home)
            .args(["matrix", "--project"])
            .arg(&dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("demo"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[release]"));
    }

    #[test]
    fn config_set_then_show() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["config", "set", "release.retention_days", "14"])
            .assert()
            .success();
        shipyard(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("retention_days = 14"));
    }

    #[test]
    fn config_set_unknown_key() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["config", "set", "vm.cpus", "4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown config key"));
    }

    #[test]
    fn runs_list_empty() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["runs", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn runs_show_missing() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["runs", "show", "deadbeef"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Run not found"));
    }

    #[test]
    fn artifacts_list_empty() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["artifacts", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_clear_requires_target() {
        let home = TempDir::new().unwrap();
        shipyard(&home).args(["cache", "clear"]).assert().failure();
    }

    #[test]
    fn completions_bash() {
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("shipyard"));
    }

    #[test]
    fn status_runs() {
        // Missing tools are reported, not returned as errors
        let home = TempDir::new().unwrap();
        shipyard(&home)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Shipyard Status").and(predicate::str::contains("Toolchain:")));
    }

    #[test]
    fn run_skips_non_trigger_branch() {
        let home = TempDir::new().unwrap();
        let dir = project(&home);
        shipyard(&home)
            .args(["run", "--branch", "feature", "--revision", "abc", "--project"])
            .arg(&dir)
            .assert()
            .success()
            .stdout(predicate::str::contains("does not trigger"));
        shipyard(&home)
            .args(["runs", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn run_json_keeps_progress_off_stdout() {
        let home = TempDir::new().unwrap();
        let dir = project(&home);
        let output = shipyard(&home)
            .args(["run", "--branch", "feature", "--revision", "abc", "--format", "json", "--project"])
            .arg(&dir)
            .output()
            .unwrap();
        assert!(output.status.success());
        assert!(output.stdout.is_empty());
        assert!(String::from_utf8_lossy(&output.stderr).contains("does not trigger"));
    }

    /// Host triple when it is one of the default release targets and rustup can install it
    fn releasable_host() -> Option<String> {
        let host = shipyard::pipeline::TargetTriple::host()?.to_string();
        let defaults = [
            "x86_64-unknown-linux-gnu",
            "x86_64-apple-darwin",
            "aarch64-apple-darwin",
            "x86_64-pc-windows-msvc",
        ];
        if !defaults.contains(&host.as_str()) {
            return None;
        }
        let rustup = std::process::Command::new("rustup")
            .arg("--version")
            .output()
            .ok()?;
        rustup.status.success().then_some(host)
    }

    #[test]
    fn forced_run_publishes_host_artifact() {
        let Some(host) = releasable_host() else {
            eprintln!("skipping: host target not releasable here");
            return;
        };
        let home = TempDir::new().unwrap();
        let dir = project(&home);
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();

        let output = shipyard(&home)
            .env_remove("CARGO_TARGET_DIR")
            .env_remove("CARGO_BUILD_TARGET")
            .args(["run", "--force", "--no-cache", "--format", "json"])
            .args(["--branch", "main", "--revision", "abc", "--target", &host, "--project"])
            .arg(&dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "run failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );

        // stdout holds exactly the run record
        let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(record["status"], "success");

        let output = shipyard(&home)
            .args(["artifacts", "list", "--format", "json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let artifacts: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0]["name"], host.as_str());
        assert_eq!(artifacts[0]["run_id"], record["id"]);
    }
}
