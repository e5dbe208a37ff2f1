//! Shipyard - Multi-target build and release pipeline
//!
//! Verifies a Rust project with a debug build and its test suite, then
//! cross-compiles release binaries for every platform in the matrix and
//! publishes each one as an artifact named after its target triple.

pub mod artifact;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod pipeline;
pub mod toolchain;
pub mod ui;

pub use error::{ShipyardError, ShipyardResult};
