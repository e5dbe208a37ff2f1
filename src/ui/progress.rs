//! Progress indicators with CI fallback

use super::context::UiContext;
use crate::pipeline::orchestrator::RunObserver;
use crate::pipeline::record::{JobRecord, JobStatus};
use crate::pipeline::stage::{JobSpec, Stage, Step};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// A task spinner with CI fallback
pub struct TaskSpinner {
    spinner: Option<cliclack::ProgressBar>,
    interactive: bool,
}

impl TaskSpinner {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            spinner: None,
            interactive: ctx.use_fancy_output(),
        }
    }

    /// Start the spinner with a message
    pub fn start(&mut self, message: &str) {
        if self.interactive {
            let spinner = cliclack::spinner();
            spinner.start(message);
            self.spinner = Some(spinner);
        } else {
            println!("{} {}", style("...").dim(), message);
        }
    }

    /// Stop with success message
    pub fn stop(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.stop(message);
        } else {
            println!("{} {}", style("[OK]").green(), message);
        }
    }

    /// Stop with error message
    pub fn stop_error(&mut self, message: &str) {
        if let Some(spinner) = self.spinner.take() {
            spinner.error(message);
        } else {
            println!("{} {}", style("[FAIL]").red(), message);
        }
    }
}

/// Live view of a pipeline run.
///
/// Interactive terminals get one indicatif bar per running job, advanced
/// by cargo's `Compiling <crate>` lines. Elsewhere each step and outcome is
/// printed as a plain line, on stderr when stdout carries JSON or plain
/// output for scripts.
pub struct RunProgress {
    multi: Option<MultiProgress>,
    bars: Mutex<HashMap<String, ProgressBar>>,
    stderr: bool,
}

impl RunProgress {
    pub fn new(ctx: &UiContext) -> Self {
        Self {
            multi: ctx.use_fancy_output().then(MultiProgress::new),
            bars: Mutex::new(HashMap::new()),
            stderr: false,
        }
    }

    /// Keep stdout free for the run result
    pub fn on_stderr(mut self, stderr: bool) -> Self {
        self.stderr = stderr;
        self
    }

    fn plain_line(&self, line: &str) {
        if self.stderr {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    fn print(&self, line: String) {
        match self.multi {
            Some(ref multi) => {
                if multi.println(&line).is_err() {
                    self.plain_line(&line);
                }
            }
            None => self.plain_line(&line),
        }
    }

    fn with_bar(&self, job: &str, f: impl FnOnce(&ProgressBar)) {
        if let Ok(bars) = self.bars.lock() {
            if let Some(bar) = bars.get(job) {
                f(bar);
            }
        }
    }

    fn job_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("  {spinner:.blue} {prefix:<26} {pos:>4} crates  {msg:.dim}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
    }

    /// Clear any bars left behind
    pub fn finish(&self) {
        if let Ok(mut bars) = self.bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}

impl RunObserver for RunProgress {
    fn stage_started(&self, stage: &Stage) {
        self.print(format!(
            "{} {} ({} job{})",
            style("==>").blue().bold(),
            style(&stage.name).bold(),
            stage.jobs.len(),
            if stage.jobs.len() == 1 { "" } else { "s" }
        ));
    }

    fn stage_blocked(&self, stage: &Stage, blocked_on: &[String]) {
        self.print(format!(
            "{} {} {}",
            style("[-]").dim(),
            style(&stage.name).dim(),
            style(format!("blocked (requires {})", blocked_on.join(", "))).dim()
        ));
    }

    fn job_started(&self, _stage: &str, job: &JobSpec) {
        match self.multi {
            Some(ref multi) => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(Self::job_style());
                bar.set_prefix(job.name.clone());
                bar.enable_steady_tick(Duration::from_millis(120));
                if let Ok(mut bars) = self.bars.lock() {
                    bars.insert(job.name.clone(), bar);
                }
            }
            None => self.plain_line(&format!("  [{}] started", job.name)),
        }
    }

    fn job_step(&self, job: &str, step: Step) {
        if self.multi.is_some() {
            self.with_bar(job, |bar| bar.set_message(step.to_string()));
        } else {
            self.plain_line(&format!("  [{}] {}", job, step));
        }
    }

    fn job_output(&self, job: &str, line: &str) {
        if let Some(krate) = parse_compiling_line(line) {
            self.with_bar(job, |bar| {
                bar.inc(1);
                bar.set_message(format!("compiling {}", krate));
            });
        }
    }

    fn job_finished(&self, stage: &str, record: &JobRecord) {
        if let Ok(mut bars) = self.bars.lock() {
            if let Some(bar) = bars.remove(&record.name) {
                bar.finish_and_clear();
            }
        }
        self.print(format_job_line(stage, record));
    }
}

/// One-line outcome of a finished job
pub fn format_job_line(stage: &str, record: &JobRecord) -> String {
    let name = format!("{}/{}", stage, record.name);
    let elapsed = record
        .duration_secs()
        .map(|s| format!(" ({}s)", s))
        .unwrap_or_default();

    match record.status {
        JobStatus::Success => {
            let cache = match record.cache_hit {
                Some(true) => " [cache hit]",
                Some(false) => " [cache miss]",
                None => "",
            };
            format!(
                "  {} {}{}{}",
                style("✓").green(),
                name,
                style(elapsed).dim(),
                style(cache).dim()
            )
        }
        JobStatus::Failure => {
            let reason = record
                .failure
                .as_ref()
                .map(|f| match f.step {
                    Some(step) => format!("{} failed ({})", step, f.kind),
                    None => format!("{} failure", f.kind),
                })
                .unwrap_or_else(|| "failed".to_string());
            format!("  {} {}: {}{}", style("✗").red(), name, style(reason).red(), style(elapsed).dim())
        }
        JobStatus::Skipped => format!(
            "  {} {} {}",
            style("-").dim(),
            style(name).dim(),
            style(record.skip_reason.as_deref().unwrap_or("skipped")).dim()
        ),
        JobStatus::Running => format!("  {} {}", style("~").yellow(), name),
    }
}

/// Crate name from a cargo `Compiling <crate> v<version>` line
fn parse_compiling_line(line: &str) -> Option<String> {
    let plain = console::strip_ansi_codes(line);
    let rest = plain.trim().strip_prefix("Compiling ")?;
    rest.split_whitespace().next().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matrix::TargetTriple;
    use crate::pipeline::record::JobFailure;

    fn record(status: JobStatus) -> JobRecord {
        let job = JobSpec::verify(TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap(), false);
        let mut record = JobRecord::start(&job);
        record.status = status;
        record
    }

    #[test]
    fn spinner_non_interactive() {
        let ctx = UiContext::non_interactive();
        let mut spinner = TaskSpinner::new(&ctx);
        spinner.start("Checking toolchain...");
        spinner.stop("cargo found");
    }

    #[test]
    fn parses_compiling_lines() {
        assert_eq!(
            parse_compiling_line("   Compiling serde v1.0.219").as_deref(),
            Some("serde")
        );
        assert_eq!(
            parse_compiling_line("\u{1b}[1m\u{1b}[32m   Compiling\u{1b}[0m tokio v1.49.0").as_deref(),
            Some("tokio")
        );
        assert!(parse_compiling_line("    Finished `release` profile").is_none());
        assert!(parse_compiling_line("").is_none());
    }

    #[test]
    fn failed_job_line_names_step_and_kind() {
        let mut rec = record(JobStatus::Failure);
        rec.failure = Some(JobFailure {
            step: Some(Step::Test),
            kind: "test".to_string(),
            message: String::new(),
        });
        let line = console::strip_ansi_codes(&format_job_line("verify", &rec)).to_string();
        assert!(line.contains("verify/verify"));
        assert!(line.contains("test failed (test)"));
    }

    #[test]
    fn skipped_job_line_shows_reason() {
        let mut rec = record(JobStatus::Running);
        rec.skip("windows-latest jobs do not run on this host");
        let line = console::strip_ansi_codes(&format_job_line("release", &rec)).to_string();
        assert!(line.contains("do not run on this host"));
    }

    #[test]
    fn plain_progress_does_not_panic() {
        let progress = RunProgress::new(&UiContext::non_interactive());
        let job = JobSpec::verify(TargetTriple::parse("x86_64-unknown-linux-gnu").unwrap(), true);
        progress.job_started("verify", &job);
        progress.job_step("verify", Step::Test);
        progress.job_output("verify", "   Compiling serde v1.0.219");
        progress.job_finished("verify", &record(JobStatus::Success));
        progress.finish();
    }
}
