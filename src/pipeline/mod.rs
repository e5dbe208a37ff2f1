//! Build-and-release pipeline
//!
//! A run is a two-stage graph: `verify` (debug build + tests on the
//! reference target) gates `release` (one cross-compiled job per matrix
//! entry, each publishing an artifact named after its target triple).

pub mod matrix;
pub mod orchestrator;
pub mod plan;
pub mod record;
pub mod stage;
pub mod trigger;

pub use matrix::{Host, HostPolicy, MatrixEntry, TargetTriple};
pub use orchestrator::{NoopObserver, Orchestrator, RunObserver, RunSettings};
pub use plan::{build_plan, Plan, PlanOptions};
pub use record::{JobRecord, JobStatus, RunHistory, RunRecord, RunStatus, StageRecord, StageStatus};
pub use stage::{JobSpec, Profile, Stage, StageGraph, Step};
pub use trigger::{EventKind, Trigger};
