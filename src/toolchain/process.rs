//! Child process helpers shared by toolchain implementations

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;

use crate::error::{ShipyardError, ShipyardResult};

/// Max number of output lines to include in build error messages.
const BUILD_ERROR_TAIL_LINES: usize = 50;

/// Callback receiving each line of toolchain output
pub type OutputSink = Arc<dyn Fn(String) + Send + Sync>;

/// Sink that discards output
pub fn discard_output() -> OutputSink {
    Arc::new(|_| {})
}

/// Outcome of a finished child process
#[derive(Debug)]
pub struct ProcessOutcome {
    pub success: bool,
    pub code: Option<i32>,
    pub lines: Vec<String>,
}

impl ProcessOutcome {
    /// Last lines of output, for error messages
    pub fn tail(&self) -> String {
        let total = self.lines.len();
        let start = total.saturating_sub(BUILD_ERROR_TAIL_LINES);
        self.lines[start..].join("\n")
    }
}

/// Run `program args...` in `dir` with `env`, streaming every output line
/// to `on_output`.
pub async fn run_streaming(
    program: &str,
    args: &[String],
    dir: &Path,
    env: &BTreeMap<String, String>,
    on_output: &OutputSink,
) -> ShipyardResult<ProcessOutcome> {
    let command = format!("{} {}", program, args.join(" "));
    debug!("Executing: {} (in {})", command, dir.display());

    let mut child = Command::new(program)
        .args(args)
        .current_dir(dir)
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| ShipyardError::command_failed(command.clone(), e))?;

    let lines = stream_child_output(&mut child, on_output).await;
    let status = child
        .wait()
        .await
        .map_err(|e| ShipyardError::command_failed(command, e))?;

    Ok(ProcessOutcome {
        success: status.success(),
        code: status.code(),
        lines,
    })
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &OutputSink,
) -> Vec<String> {
    let mut all_output = Vec::new();
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return all_output;
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    all_output
}
