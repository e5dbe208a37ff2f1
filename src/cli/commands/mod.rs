//! CLI command implementations

pub mod artifacts;
pub mod cache;
pub mod completions;
pub mod config;
pub mod matrix;
pub mod run;
pub mod runs;
pub mod status;

pub use artifacts::execute as artifacts;
pub use cache::execute as cache;
pub use completions::execute as completions;
pub use config::execute as config;
pub use matrix::execute as matrix;
pub use run::execute as run;
pub use runs::execute as runs;
pub use status::execute as status;
