//! Error types for Shipyard
//!
//! All modules use `ShipyardResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Shipyard operations
pub type ShipyardResult<T> = Result<T, ShipyardError>;

/// All errors that can occur in Shipyard
#[derive(Error, Debug)]
pub enum ShipyardError {
    // Toolchain errors
    #[error("Required tool not found: {name}. {hint}")]
    ToolNotFound { name: String, hint: String },

    #[error("Compile failed ({profile} build{}):\n{output}", target_suffix(.target))]
    Compile {
        profile: String,
        target: Option<String>,
        output: String,
    },

    #[error("Test suite failed:\n{output}")]
    Test { output: String },

    #[error("Failed to install target toolchain component {target}: {reason}")]
    ToolchainInstall { target: String, reason: String },

    // Artifact errors
    #[error("Failed to publish artifact {name}: {reason}")]
    ArtifactPublish { name: String, reason: String },

    #[error("Artifact {name} already published in run {run_id}")]
    ArtifactDuplicate { name: String, run_id: String },

    #[error("Artifact not found: {0}")]
    ArtifactNotFound(PathBuf),

    // Cache errors
    #[error("Invalid cache key: {0}")]
    CacheKeyInvalid(String),

    #[error("Cache key {0} is already in use by another job in this run")]
    CacheKeyContention(String),

    #[error("Failed to save cache {key}: {reason}")]
    CacheSave { key: String, reason: String },

    // Pipeline errors
    #[error("Invalid pipeline: {0}")]
    PipelineInvalid(String),

    #[error("Circular stage dependency: {path}")]
    CircularDependency { path: String },

    #[error("Invalid target triple: {0}")]
    TargetInvalid(String),

    #[error("Duplicate matrix target: {0}")]
    MatrixDuplicate(String),

    #[error("Pipeline run {run_id} failed: {failed}")]
    RunFailed { run_id: String, failed: String },

    #[error("Run not found: {0}")]
    RunNotFound(String),

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

fn target_suffix(target: &Option<String>) -> String {
    match target {
        Some(t) => format!(" for {}", t),
        None => String::new(),
    }
}

impl ShipyardError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Short label for the failure class, used in run records
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Compile { .. } => "compile",
            Self::Test { .. } => "test",
            Self::ToolchainInstall { .. } | Self::ToolNotFound { .. } => "toolchain",
            Self::ArtifactPublish { .. }
            | Self::ArtifactDuplicate { .. }
            | Self::ArtifactNotFound(_) => "publish",
            Self::CacheKeyInvalid(_) | Self::CacheKeyContention(_) | Self::CacheSave { .. } => {
                "cache"
            }
            _ => "internal",
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ToolchainInstall { .. } => {
                Some("Check that rustup is installed and the target is available: rustup target list")
            }
            Self::ToolNotFound { .. } => Some("Install Rust via https://rustup.rs"),
            Self::RunFailed { .. } => Some("Inspect per-job detail with: shipyard runs show <id>"),
            Self::ConfigInvalid { .. } => Some("Validate your configuration with: shipyard config show"),
            Self::CacheKeyContention(_) => Some("Each matrix target may appear only once per run"),
            _ => None,
        }
    }
}
