//! Output functions for consistent CLI formatting
//!
//! Every helper has two renderings: cliclack log lines when the terminal is
//! interactive, and bracketed plain-text markers otherwise so CI logs stay
//! greppable.

use super::context::UiContext;
use console::{style, Style};

/// Severity marker for a single output line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Ok,
    Warn,
    Info,
    Skip,
}

impl Mark {
    fn plain(self) -> String {
        match self {
            Mark::Ok => style("[OK]").green().to_string(),
            Mark::Warn => style("[WARN]").yellow().to_string(),
            Mark::Info => style("[INFO]").cyan().to_string(),
            Mark::Skip => style("[-]").dim().to_string(),
        }
    }
}

fn emit(ctx: &UiContext, mark: Mark, message: &str) {
    if ctx.use_fancy_output() {
        let _ = match mark {
            Mark::Ok => cliclack::log::success(message),
            Mark::Warn => cliclack::log::warning(message),
            Mark::Info => cliclack::log::info(message),
            Mark::Skip => cliclack::log::remark(message),
        };
    } else {
        println!("  {} {}", mark.plain(), message);
    }
}

/// Display intro banner
pub fn intro(ctx: &UiContext, title: &str) {
    if ctx.use_fancy_output() {
        cliclack::intro(style(title).blue().bold()).ok();
    } else {
        println!("{}", style(title).blue().bold());
        println!();
    }
}

/// Display success outro
pub fn outro_success(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::outro(style(message).green().bold()).ok();
    } else {
        println!();
        println!("{} {}", Mark::Ok.plain(), message);
    }
}

/// Display a section header
pub fn section(ctx: &UiContext, title: &str) {
    println!();
    if ctx.use_fancy_output() {
        cliclack::log::info(style(title).bold()).ok();
    } else {
        println!("{}", style(title).bold());
    }
}

/// Header for one stage of a run report
pub fn stage_header(ctx: &UiContext, name: &str, status: &str, ok: bool) {
    let status = if ok {
        style(status).green()
    } else {
        style(status).red()
    };
    section(ctx, &format!("{} ({})", name, status));
}

/// A stage that never ran because a dependency did not succeed
pub fn stage_blocked(ctx: &UiContext, name: &str, dependencies: &[String]) {
    let reason = format!("blocked (requires {})", dependencies.join(", "));
    if ctx.use_fancy_output() {
        cliclack::log::remark(format!("{} - {}", style(name).dim(), style(reason).dim())).ok();
    } else {
        println!("  {} {} {}", Mark::Skip.plain(), name, reason);
    }
}

pub fn step_ok(ctx: &UiContext, message: &str) {
    emit(ctx, Mark::Ok, message);
}

pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    emit(ctx, Mark::Ok, &format!("{} ({})", message, style(detail).dim()));
}

pub fn step_warn(ctx: &UiContext, message: &str) {
    emit(ctx, Mark::Warn, message);
}

pub fn step_warn_hint(ctx: &UiContext, message: &str, hint: &str) {
    emit(ctx, Mark::Warn, &format!("{} - {}", message, style(hint).dim()));
}

pub fn step_info(ctx: &UiContext, message: &str) {
    emit(ctx, Mark::Info, message);
}

/// Display a remark/hint
pub fn remark(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        cliclack::log::remark(message).ok();
    } else {
        println!("  {}", style(message).dim());
    }
}

/// Indented detail line under a job (log excerpt, artifact path, warning)
pub fn job_detail(marker: Option<&str>, message: &str) {
    match marker {
        Some(marker) => println!("      {} {}", marker, message),
        None => println!("      {}", style(message).dim()),
    }
}

/// Print styled key-value pair
pub fn key_value(ctx: &UiContext, key: &str, value: &str) {
    if ctx.use_fancy_output() {
        println!("  {}: {}", style(key).dim(), value);
    } else {
        println!("  {}: {}", key, value);
    }
}

/// Key-value pair colored green when `ok`, yellow otherwise
pub fn key_value_status(ctx: &UiContext, key: &str, value: &str, ok: bool) {
    if ctx.use_fancy_output() {
        let value_style = if ok {
            Style::new().green()
        } else {
            Style::new().yellow()
        };
        println!("  {}: {}", style(key).dim(), value_style.apply_to(value));
    } else {
        let mark = if ok { Mark::Ok } else { Mark::Warn };
        println!("  {} {}: {}", mark.plain(), key, value);
    }
}
