//! Language toolchain abstraction
//!
//! The pipeline only needs four operations from the toolchain: debug and
//! release builds, running the test suite, and installing a target
//! component. `CargoToolchain` shells out to cargo/rustup; tests plug in a
//! scripted implementation.

mod cargo;
pub mod process;

pub use cargo::CargoToolchain;
pub use process::{discard_output, OutputSink};

use crate::error::ShipyardResult;
use crate::pipeline::matrix::TargetTriple;
use crate::pipeline::stage::Profile;
use async_trait::async_trait;
use std::path::Path;

/// Abstract build toolchain
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Check if the toolchain is installed on this system
    async fn is_available(&self) -> bool;

    /// Compile the project. `target = None` builds for the host.
    async fn build(
        &self,
        project_dir: &Path,
        profile: Profile,
        target: Option<&TargetTriple>,
        on_output: OutputSink,
    ) -> ShipyardResult<()>;

    /// Run the test suite in debug mode. `target = None` tests on the host.
    async fn test(
        &self,
        project_dir: &Path,
        target: Option<&TargetTriple>,
        on_output: OutputSink,
    ) -> ShipyardResult<()>;

    /// Ensure the standard library for `target` is installed
    async fn install_target(&self, target: &TargetTriple) -> ShipyardResult<()>;

    /// Targets whose component is currently installed
    async fn installed_targets(&self) -> ShipyardResult<Vec<TargetTriple>>;

    /// Human-readable toolchain name for display
    fn name(&self) -> &'static str;
}
