//! UI module for consistent CLI output
//!
//! Uses `cliclack` for prompts and log lines and `indicatif` for live job
//! progress, with automatic fallback to plain output in CI and other
//! non-interactive environments.
//!
//! # Example
//!
//! ```rust,ignore
//! use shipyard::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "Cache GC");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Scanning caches...");
//! spinner.stop("3 caches found");
//!
//! if ui::confirm(&ctx, "Remove 2 caches?", false).await? {
//!     // ...
//! }
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    intro, job_detail, key_value, key_value_status, outro_success, remark, section,
    stage_blocked, stage_header, step_info, step_ok, step_ok_detail, step_warn, step_warn_hint,
};
pub use progress::{format_job_line, RunProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, ShipyardTheme};
