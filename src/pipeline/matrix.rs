//! Release matrix: one immutable entry per (host, target triple) pair

use crate::error::{ShipyardError, ShipyardResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

/// Hosted runner image a matrix entry is meant for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Host {
    #[serde(rename = "ubuntu-latest")]
    UbuntuLatest,
    #[serde(rename = "macos-latest")]
    MacosLatest,
    #[serde(rename = "windows-latest")]
    WindowsLatest,
}

/// Operating system family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Linux,
    MacOS,
    Windows,
    Other,
}

impl OsFamily {
    /// OS family of the machine running shipyard
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOS
        } else if cfg!(target_os = "windows") {
            Self::Windows
        } else {
            Self::Other
        }
    }
}

impl Host {
    /// OS family this host runs
    pub fn os(&self) -> OsFamily {
        match self {
            Self::UbuntuLatest => OsFamily::Linux,
            Self::MacosLatest => OsFamily::MacOS,
            Self::WindowsLatest => OsFamily::Windows,
        }
    }

    /// Whether this host matches the machine running shipyard
    pub fn is_native(&self) -> bool {
        self.os() == OsFamily::current()
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UbuntuLatest => "ubuntu-latest",
            Self::MacosLatest => "macos-latest",
            Self::WindowsLatest => "windows-latest",
        };
        write!(f, "{}", name)
    }
}

/// How to treat matrix entries whose host OS differs from the local one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HostPolicy {
    /// Attempt every entry (cross-compile)
    #[default]
    All,
    /// Record foreign-host entries as skipped
    Native,
}

/// A validated target triple, e.g. `x86_64-unknown-linux-gnu`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TargetTriple(String);

impl TargetTriple {
    /// Parse and validate a triple: `arch-vendor-os[-abi]`, lowercase
    /// alphanumerics, `_` and `.` only.
    pub fn parse(s: &str) -> ShipyardResult<Self> {
        let parts: Vec<&str> = s.split('-').collect();
        let well_formed = (3..=4).contains(&parts.len())
            && parts.iter().all(|p| {
                !p.is_empty()
                    && p.chars()
                        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '.')
            });
        if !well_formed {
            return Err(ShipyardError::TargetInvalid(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The triple as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether binaries for this target carry an `.exe` suffix
    pub fn is_windows(&self) -> bool {
        self.0.contains("-windows")
    }

    /// Triple of the machine running shipyard, when it is one we know
    pub fn host() -> Option<Self> {
        let triple = match (std::env::consts::ARCH, std::env::consts::OS) {
            ("x86_64", "linux") => "x86_64-unknown-linux-gnu",
            ("aarch64", "linux") => "aarch64-unknown-linux-gnu",
            ("x86_64", "macos") => "x86_64-apple-darwin",
            ("aarch64", "macos") => "aarch64-apple-darwin",
            ("x86_64", "windows") => "x86_64-pc-windows-msvc",
            ("aarch64", "windows") => "aarch64-pc-windows-msvc",
            _ => return None,
        };
        Some(Self(triple.to_string()))
    }
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TargetTriple {
    type Error = ShipyardError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TargetTriple> for String {
    fn from(value: TargetTriple) -> Self {
        value.0
    }
}

/// Matrix entry as written in configuration; the artifact path is optional
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntryConfig {
    pub host: Host,
    pub target: TargetTriple,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_path: Option<PathBuf>,
}

/// One resolved (host, target, artifact path) tuple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixEntry {
    /// Runner image the entry is meant for
    pub host: Host,
    /// Target triple; also the artifact name and cache key
    pub target: TargetTriple,
    /// Binary location relative to the project root
    pub artifact_path: PathBuf,
}

impl MatrixEntry {
    /// Create an entry with the conventional cargo output path
    pub fn new(host: Host, target: TargetTriple, binary: &str) -> Self {
        let artifact_path = default_artifact_path(&target, binary);
        Self {
            host,
            target,
            artifact_path,
        }
    }

    /// Name under which the entry's binary is published
    pub fn artifact_name(&self) -> &str {
        self.target.as_str()
    }
}

/// `target/<triple>/release/<binary>[.exe]`
pub fn default_artifact_path(target: &TargetTriple, binary: &str) -> PathBuf {
    let file = if target.is_windows() {
        format!("{}.exe", binary)
    } else {
        binary.to_string()
    };
    PathBuf::from("target")
        .join(target.as_str())
        .join("release")
        .join(file)
}

/// The built-in four-platform matrix
pub fn default_matrix(binary: &str) -> Vec<MatrixEntry> {
    [
        (Host::UbuntuLatest, "x86_64-unknown-linux-gnu"),
        (Host::MacosLatest, "x86_64-apple-darwin"),
        (Host::MacosLatest, "aarch64-apple-darwin"),
        (Host::WindowsLatest, "x86_64-pc-windows-msvc"),
    ]
    .into_iter()
    .map(|(host, triple)| MatrixEntry::new(host, TargetTriple(triple.to_string()), binary))
    .collect()
}

/// Resolve configured entries (or the default matrix) against a binary name
/// and reject duplicate targets.
pub fn resolve_matrix(
    configured: &[MatrixEntryConfig],
    binary: &str,
) -> ShipyardResult<Vec<MatrixEntry>> {
    let entries = if configured.is_empty() {
        default_matrix(binary)
    } else {
        configured
            .iter()
            .map(|c| MatrixEntry {
                host: c.host,
                target: c.target.clone(),
                artifact_path: c
                    .artifact_path
                    .clone()
                    .unwrap_or_else(|| default_artifact_path(&c.target, binary)),
            })
            .collect()
    };

    validate_matrix(&entries)?;
    Ok(entries)
}

/// Each target may appear once, so artifact names and cache keys never collide.
pub fn validate_matrix(entries: &[MatrixEntry]) -> ShipyardResult<()> {
    if entries.is_empty() {
        return Err(ShipyardError::PipelineInvalid(
            "release matrix has no entries".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    for entry in entries {
        if !seen.insert(&entry.target) {
            return Err(ShipyardError::MatrixDuplicate(entry.target.to_string()));
        }
    }
    Ok(())
}

/// Keep only entries whose target is in `targets` (no filter when empty)
pub fn filter_targets(
    entries: Vec<MatrixEntry>,
    targets: &[String],
) -> ShipyardResult<Vec<MatrixEntry>> {
    if targets.is_empty() {
        return Ok(entries);
    }
    for wanted in targets {
        if !entries.iter().any(|e| e.target.as_str() == wanted) {
            return Err(ShipyardError::User(format!(
                "Target {} is not in the release matrix",
                wanted
            )));
        }
    }
    Ok(entries
        .into_iter()
        .filter(|e| targets.iter().any(|t| t == e.target.as_str()))
        .collect())
}
