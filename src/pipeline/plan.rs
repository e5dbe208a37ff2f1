//! Building a stage graph from configuration and a project checkout

use crate::config::schema::Config;
use crate::error::{ShipyardError, ShipyardResult};
use crate::pipeline::matrix::{filter_targets, resolve_matrix, MatrixEntry, TargetTriple};
use crate::pipeline::stage::{JobSpec, StageGraph};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Binary name used when neither config nor Cargo.toml names one
pub const DEFAULT_BINARY: &str = "sso-profiles";

/// Per-invocation overrides
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    /// Restrict the release matrix to these triples (empty = all)
    pub targets: Vec<String>,
    /// Disable cache restore/save steps
    pub no_cache: bool,
}

/// Everything needed to execute a run
#[derive(Debug)]
pub struct Plan {
    pub binary: String,
    /// Triple whose namespace the verify cache lives in
    pub reference: TargetTriple,
    pub matrix: Vec<MatrixEntry>,
    pub cache: bool,
    pub graph: StageGraph,
}

/// Resolve the matrix and build the verify → release graph
pub fn build_plan(config: &Config, project_dir: &Path, options: &PlanOptions) -> ShipyardResult<Plan> {
    let binary = resolve_binary_name(config, project_dir)?;
    let reference = resolve_reference_target(config)?;

    let matrix = resolve_matrix(&config.release.matrix, &binary)?;
    let matrix = filter_targets(matrix, &options.targets)?;
    let cache = config.cache.enabled && !options.no_cache;

    debug!(
        binary = %binary,
        reference = %reference,
        entries = matrix.len(),
        cache,
        "Resolved pipeline plan"
    );

    let mut verify = JobSpec::verify(reference.clone(), cache);
    if TargetTriple::host().as_ref() != Some(&reference) {
        debug!(reference = %reference, "Reference target is not the host; verify passes --target");
        verify = verify.with_explicit_target();
    }
    let release = matrix
        .iter()
        .cloned()
        .map(|entry| JobSpec::release(entry, cache))
        .collect();
    let graph = StageGraph::verify_then_release(verify, release)?;

    Ok(Plan {
        binary,
        reference,
        matrix,
        cache,
        graph,
    })
}

#[derive(Deserialize)]
struct CargoManifest {
    package: Option<CargoPackage>,
    #[serde(default)]
    bin: Vec<CargoBin>,
}

#[derive(Deserialize)]
struct CargoPackage {
    name: String,
}

#[derive(Deserialize)]
struct CargoBin {
    name: Option<String>,
}

/// Configured binary, else the manifest's first `[[bin]]` or package name,
/// else the default.
pub fn resolve_binary_name(config: &Config, project_dir: &Path) -> ShipyardResult<String> {
    if let Some(ref name) = config.project.binary {
        return Ok(name.clone());
    }

    let manifest_path = project_dir.join("Cargo.toml");
    if !manifest_path.exists() {
        debug!("No Cargo.toml in {}, using default binary name", project_dir.display());
        return Ok(DEFAULT_BINARY.to_string());
    }

    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| ShipyardError::io(format!("reading {}", manifest_path.display()), e))?;
    let manifest: CargoManifest = toml::from_str(&content)?;

    let name = manifest
        .bin
        .into_iter()
        .find_map(|b| b.name)
        .or(manifest.package.map(|p| p.name))
        .unwrap_or_else(|| DEFAULT_BINARY.to_string());
    Ok(name)
}

/// Configured reference target, else the triple of this machine
pub fn resolve_reference_target(config: &Config) -> ShipyardResult<TargetTriple> {
    match config.project.reference_target {
        Some(ref triple) => TargetTriple::parse(triple),
        None => TargetTriple::host().ok_or_else(|| {
            ShipyardError::PipelineInvalid(
                "cannot determine the host target; set project.reference_target".to_string(),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::{Step, RELEASE_STAGE, VERIFY_STAGE};
    use tempfile::TempDir;

    fn config() -> Config {
        let mut config = Config::default();
        config.project.reference_target = Some("x86_64-unknown-linux-gnu".to_string());
        config
    }

    #[test]
    fn default_plan_has_verify_then_four_release_jobs() {
        let dir = TempDir::new().unwrap();
        let plan = build_plan(&config(), dir.path(), &PlanOptions::default()).unwrap();

        assert_eq!(plan.binary, DEFAULT_BINARY);
        let stages = plan.graph.stages();
        assert_eq!(stages[0].name, VERIFY_STAGE);
        assert_eq!(stages[1].name, RELEASE_STAGE);
        assert_eq!(stages[1].depends_on, vec![VERIFY_STAGE.to_string()]);
        assert_eq!(stages[1].jobs.len(), 4);
        assert_eq!(stages[0].jobs[0].steps.first(), Some(&Step::RestoreCache));
    }

    #[test]
    fn binary_name_from_manifest() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"awsp\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();

        let plan = build_plan(&config(), dir.path(), &PlanOptions::default()).unwrap();
        assert_eq!(plan.binary, "awsp");
        let windows = plan
            .matrix
            .iter()
            .find(|e| e.target.is_windows())
            .unwrap();
        assert!(windows.artifact_path.ends_with("awsp.exe"));
    }

    #[test]
    fn bin_target_wins_over_package_name() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"awsp-core\"\n\n[[bin]]\nname = \"awsp\"\npath = \"src/main.rs\"\n",
        )
        .unwrap();

        assert_eq!(resolve_binary_name(&config(), dir.path()).unwrap(), "awsp");
    }

    #[test]
    fn configured_binary_wins() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.project.binary = Some("tool".to_string());
        assert_eq!(resolve_binary_name(&config, dir.path()).unwrap(), "tool");
    }

    #[test]
    fn target_filter_and_no_cache() {
        let dir = TempDir::new().unwrap();
        let options = PlanOptions {
            targets: vec!["aarch64-apple-darwin".to_string()],
            no_cache: true,
        };
        let plan = build_plan(&config(), dir.path(), &options).unwrap();

        assert!(!plan.cache);
        assert_eq!(plan.matrix.len(), 1);
        let release = &plan.graph.stages()[1];
        assert_eq!(release.jobs[0].name, "aarch64-apple-darwin");
        assert!(!release.jobs[0].steps.contains(&Step::RestoreCache));
    }

    #[test]
    fn unknown_filter_target_rejected() {
        let dir = TempDir::new().unwrap();
        let options = PlanOptions {
            targets: vec!["riscv64gc-unknown-linux-gnu".to_string()],
            no_cache: false,
        };
        assert!(build_plan(&config(), dir.path(), &options).is_err());
    }

    #[test]
    fn foreign_reference_target_builds_explicitly() {
        let dir = TempDir::new().unwrap();
        let mut config = config();
        let foreign = ["x86_64-pc-windows-msvc", "aarch64-apple-darwin"]
            .into_iter()
            .map(|t| TargetTriple::parse(t).unwrap())
            .find(|t| TargetTriple::host().as_ref() != Some(t))
            .unwrap();
        config.project.reference_target = Some(foreign.to_string());

        let plan = build_plan(&config, dir.path(), &PlanOptions::default()).unwrap();
        let verify = &plan.graph.stages()[0].jobs[0];
        assert_eq!(verify.build_target(), Some(&foreign));
    }

    #[test]
    fn host_reference_target_builds_for_host() {
        let Some(host) = TargetTriple::host() else {
            return;
        };
        let dir = TempDir::new().unwrap();
        let mut config = config();
        config.project.reference_target = Some(host.to_string());

        let plan = build_plan(&config, dir.path(), &PlanOptions::default()).unwrap();
        assert_eq!(plan.graph.stages()[0].jobs[0].build_target(), None);
    }

    #[test]
    fn invalid_reference_target_rejected() {
        let mut config = config();
        config.project.reference_target = Some("Not A Triple".to_string());
        assert!(matches!(
            resolve_reference_target(&config),
            Err(ShipyardError::TargetInvalid(_))
        ));
    }
}
