//! Build artifact publication and retention
//!
//! Every successful release job publishes its binary under the job's target
//! triple. The store, not the pipeline, deletes artifacts once their
//! retention period has elapsed (`shipyard artifacts prune`).

pub mod store;

pub use store::{ArtifactPublisher, BuildArtifact, FsArtifactStore, RunPublisher};
