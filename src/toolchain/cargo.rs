//! Cargo + rustup toolchain

use crate::config::schema::TERM_COLOR_VAR;
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::TargetTriple;
use crate::pipeline::stage::Profile;
use crate::toolchain::process::{discard_output, run_streaming, OutputSink};
use crate::toolchain::Toolchain;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Toolchain backed by the `cargo` and `rustup` executables on PATH
pub struct CargoToolchain {
    cargo: String,
    rustup: String,
    env: BTreeMap<String, String>,
    /// rustup does not lock its component manifest; installs go one at a time
    install_lock: Mutex<()>,
}

impl CargoToolchain {
    /// Create a toolchain that passes `env` to every process it starts.
    /// `CARGO_TERM_COLOR=always` is added unless `env` sets it.
    pub fn new(mut env: BTreeMap<String, String>) -> Self {
        env.entry(TERM_COLOR_VAR.to_string())
            .or_insert_with(|| "always".to_string());
        Self {
            cargo: std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()),
            rustup: "rustup".to_string(),
            env,
            install_lock: Mutex::new(()),
        }
    }

    async fn tool_installed(program: &str) -> bool {
        Command::new(program)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Arguments for `cargo build`
    pub fn build_args(profile: Profile, target: Option<&TargetTriple>) -> Vec<String> {
        let mut args = vec!["build".to_string()];
        if profile == Profile::Release {
            args.push("--release".to_string());
        }
        if let Some(t) = target {
            args.push("--target".to_string());
            args.push(t.to_string());
        }
        args
    }

    /// Arguments for `cargo test`
    pub fn test_args(target: Option<&TargetTriple>) -> Vec<String> {
        let mut args = vec!["test".to_string()];
        if let Some(t) = target {
            args.push("--target".to_string());
            args.push(t.to_string());
        }
        args
    }
}

#[async_trait]
impl Toolchain for CargoToolchain {
    async fn is_available(&self) -> bool {
        Self::tool_installed(&self.cargo).await
    }

    async fn build(
        &self,
        project_dir: &Path,
        profile: Profile,
        target: Option<&TargetTriple>,
        on_output: OutputSink,
    ) -> ShipyardResult<()> {
        let args = Self::build_args(profile, target);
        let outcome = run_streaming(&self.cargo, &args, project_dir, &self.env, &on_output).await?;

        if outcome.success {
            Ok(())
        } else {
            Err(ShipyardError::Compile {
                profile: profile.to_string(),
                target: target.map(|t| t.to_string()),
                output: outcome.tail(),
            })
        }
    }

    async fn test(
        &self,
        project_dir: &Path,
        target: Option<&TargetTriple>,
        on_output: OutputSink,
    ) -> ShipyardResult<()> {
        let args = Self::test_args(target);
        let outcome = run_streaming(&self.cargo, &args, project_dir, &self.env, &on_output).await?;

        if outcome.success {
            Ok(())
        } else {
            Err(ShipyardError::Test {
                output: outcome.tail(),
            })
        }
    }

    async fn install_target(&self, target: &TargetTriple) -> ShipyardResult<()> {
        let _guard = self.install_lock.lock().await;
        if self.installed_targets().await?.iter().any(|t| t == target) {
            debug!("Target {} already installed", target);
            return Ok(());
        }

        info!("Installing target {}", target);
        let args = vec!["target".to_string(), "add".to_string(), target.to_string()];
        let outcome = run_streaming(
            &self.rustup,
            &args,
            Path::new("."),
            &self.env,
            &discard_output(),
        )
        .await
        .map_err(|e| ShipyardError::ToolchainInstall {
            target: target.to_string(),
            reason: e.to_string(),
        })?;

        if outcome.success {
            Ok(())
        } else {
            Err(ShipyardError::ToolchainInstall {
                target: target.to_string(),
                reason: outcome.tail(),
            })
        }
    }

    async fn installed_targets(&self) -> ShipyardResult<Vec<TargetTriple>> {
        let output = Command::new(&self.rustup)
            .args(["target", "list", "--installed"])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ShipyardError::ToolNotFound {
                name: self.rustup.clone(),
                hint: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(ShipyardError::command_exec(
                "rustup target list --installed",
                String::from_utf8_lossy(&output.stderr),
            ));
        }

        Ok(parse_target_list(&String::from_utf8_lossy(&output.stdout)))
    }

    fn name(&self) -> &'static str {
        "cargo"
    }
}

/// Parse `rustup target list --installed` output, ignoring junk lines
fn parse_target_list(stdout: &str) -> Vec<TargetTriple> {
    stdout
        .lines()
        .filter_map(|line| TargetTriple::parse(line.trim()).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_build_args() {
        assert_eq!(CargoToolchain::build_args(Profile::Debug, None), vec!["build"]);
    }

    #[test]
    fn release_build_args() {
        let target = TargetTriple::parse("aarch64-apple-darwin").unwrap();
        assert_eq!(
            CargoToolchain::build_args(Profile::Release, Some(&target)),
            vec!["build", "--release", "--target", "aarch64-apple-darwin"]
        );
    }

    #[test]
    fn test_args_follow_target() {
        assert_eq!(CargoToolchain::test_args(None), vec!["test"]);
        let target = TargetTriple::parse("x86_64-apple-darwin").unwrap();
        assert_eq!(
            CargoToolchain::test_args(Some(&target)),
            vec!["test", "--target", "x86_64-apple-darwin"]
        );
    }

    #[test]
    fn term_color_always_set() {
        let toolchain = CargoToolchain::new(BTreeMap::new());
        assert_eq!(toolchain.env.get(TERM_COLOR_VAR).map(String::as_str), Some("always"));

        let mut env = BTreeMap::new();
        env.insert(TERM_COLOR_VAR.to_string(), "never".to_string());
        let toolchain = CargoToolchain::new(env);
        assert_eq!(toolchain.env.get(TERM_COLOR_VAR).map(String::as_str), Some("never"));
    }

    /// Fake rustup that records when two `target add` calls overlap
    #[cfg(unix)]
    #[tokio::test]
    async fn target_installs_do_not_overlap() {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::Arc;

        let dir = tempfile::TempDir::new().unwrap();
        let state = dir.path().display().to_string();
        let script = dir.path().join("rustup");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 [ \"$2\" = list ] && exit 0\n\
                 mkdir {state}/busy 2>/dev/null || echo \"$3\" >> {state}/overlap\n\
                 sleep 0.2\n\
                 rmdir {state}/busy 2>/dev/null\n\
                 exit 0\n"
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let mut toolchain = CargoToolchain::new(BTreeMap::new());
        toolchain.rustup = script.display().to_string();
        let toolchain = Arc::new(toolchain);

        let handles: Vec<_> = [
            "x86_64-unknown-linux-gnu",
            "x86_64-apple-darwin",
            "aarch64-apple-darwin",
            "x86_64-pc-windows-msvc",
        ]
        .into_iter()
        .map(|triple| {
            let toolchain = Arc::clone(&toolchain);
            let target = TargetTriple::parse(triple).unwrap();
            tokio::spawn(async move { toolchain.install_target(&target).await })
        })
        .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert!(!dir.path().join("overlap").exists());
    }

    #[test]
    fn parses_installed_targets() {
        let out = "x86_64-unknown-linux-gnu\naarch64-apple-darwin\n\nwarning: something\n";
        let targets = parse_target_list(out);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[1].as_str(), "aarch64-apple-darwin");
    }
}
