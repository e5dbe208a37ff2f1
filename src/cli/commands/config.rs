//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager, LOCAL_CONFIG_FILE};
use crate::error::{ShipyardError, ShipyardResult};
use crate::ui::{self, UiContext};
use std::path::{Path, PathBuf};
use tokio::fs;
use toml_edit::{Array, DocumentMut, Item, Value};

/// Execute the config command
pub async fn execute(
    args: ConfigArgs,
    config: &Config,
    manager: &ConfigManager,
    local_path: Option<&Path>,
) -> ShipyardResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => show_path(manager, local_path),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value, local }) => {
            let path = if local {
                match local_path {
                    Some(p) => p.to_path_buf(),
                    None => std::env::current_dir()
                        .map_err(|e| ShipyardError::io("getting current directory", e))?
                        .join(LOCAL_CONFIG_FILE),
                }
            } else {
                manager.path().to_path_buf()
            };
            set_value(&path, &key, &value).await?
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> ShipyardResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn show_path(manager: &ConfigManager, local_path: Option<&Path>) {
    println!("{}", manager.path().display());
    if let Some(local) = local_path {
        println!("{}", local.display());
    }
}

async fn init_config(manager: &ConfigManager, force: bool) -> ShipyardResult<()> {
    let ctx = UiContext::detect();
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &ctx,
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    ui::step_ok_detail(
        &ctx,
        "Configuration initialized",
        &path.display().to_string(),
    );

    Ok(())
}

/// Edit one key in `path`, keeping the file's comments and layout
async fn set_value(path: &PathBuf, key: &str, value: &str) -> ShipyardResult<()> {
    let ctx = UiContext::detect();
    let kind = key_kind(key)?;

    let content = if path.exists() {
        fs::read_to_string(path)
            .await
            .map_err(|e| ShipyardError::io(format!("reading {}", path.display()), e))?
    } else {
        String::new()
    };
    let mut doc: DocumentMut = content.parse().map_err(|e: toml_edit::TomlError| {
        ShipyardError::ConfigInvalid {
            path: path.clone(),
            reason: e.to_string(),
        }
    })?;

    set_document_value(&mut doc, key, typed_value(kind, value)?)?;

    // Refuse to write something the loader would reject
    let updated = doc.to_string();
    toml::from_str::<Config>(&updated).map_err(|e| ShipyardError::ConfigInvalid {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| ShipyardError::ConfigDirCreate {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    fs::write(path, updated)
        .await
        .map_err(|e| ShipyardError::io(format!("writing {}", path.display()), e))?;

    ui::step_ok(
        &ctx,
        &format!("Set {} = {} in {}", key, value, path.display()),
    );
    Ok(())
}

/// Value type stored under a config key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Bool,
    Int,
    Str,
    List,
}

fn key_kind(key: &str) -> ShipyardResult<KeyKind> {
    let parts: Vec<&str> = key.split('.').collect();
    match parts.as_slice() {
        ["general", "run_log"] | ["cache", "enabled"] => Ok(KeyKind::Bool),
        ["release", "retention_days"] | ["cache", "gc_days"] => Ok(KeyKind::Int),
        ["general", "log_format"]
        | ["project", "binary" | "reference_target"]
        | ["release", "host_policy"] => Ok(KeyKind::Str),
        ["env", name] if !name.is_empty() => Ok(KeyKind::Str),
        ["trigger", "branches"] => Ok(KeyKind::List),
        _ => Err(ShipyardError::User(format!(
            "Unknown config key: {}. Valid keys: {}",
            key,
            VALID_KEYS.join(", ")
        ))),
    }
}

const VALID_KEYS: &[&str] = &[
    "general.log_format",
    "general.run_log",
    "project.binary",
    "project.reference_target",
    "trigger.branches",
    "release.retention_days",
    "release.host_policy",
    "cache.enabled",
    "cache.gc_days",
    "env.<NAME>",
];

fn typed_value(kind: KeyKind, raw: &str) -> ShipyardResult<Value> {
    match kind {
        KeyKind::Bool => match raw.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true.into()),
            "false" | "0" | "no" => Ok(false.into()),
            _ => Err(ShipyardError::User(format!(
                "Invalid boolean value: {}. Use true/false",
                raw
            ))),
        },
        KeyKind::Int => raw
            .parse::<u32>()
            .map(|n| Value::from(i64::from(n)))
            .map_err(|_| ShipyardError::User(format!("Invalid number: {}", raw))),
        KeyKind::Str => Ok(raw.into()),
        KeyKind::List => {
            let mut items = Array::new();
            for item in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                items.push(item);
            }
            Ok(Value::Array(items))
        }
    }
}

/// Set a dot-separated key, creating intermediate tables as needed
fn set_document_value(doc: &mut DocumentMut, key: &str, value: Value) -> ShipyardResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((leaf, tables)) = parts.split_last() else {
        return Err(ShipyardError::User("Empty config key".to_string()));
    };

    let mut table = doc.as_table_mut();
    for part in tables {
        let item = table.entry(part).or_insert(toml_edit::table());
        table = item
            .as_table_mut()
            .ok_or_else(|| ShipyardError::User(format!("{} is not a table", part)))?;
    }

    table.insert(leaf, Item::Value(value));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::matrix::HostPolicy;
    use tempfile::TempDir;

    #[test]
    fn edit_preserves_comments() {
        let mut doc: DocumentMut = "# release settings\n[release]\nretention_days = 7 # one week\n"
            .parse()
            .unwrap();
        set_document_value(&mut doc, "release.retention_days", Value::from(14i64)).unwrap();

        let out = doc.to_string();
        assert!(out.contains("# release settings"));
        assert!(out.contains("retention_days = 14"));
    }

    #[test]
    fn creates_missing_tables() {
        let mut doc = DocumentMut::new();
        set_document_value(&mut doc, "env.RUSTFLAGS", Value::from("-D warnings")).unwrap();
        let config: Config = toml::from_str(&doc.to_string()).unwrap();
        assert_eq!(config.env.0.get("RUSTFLAGS").map(String::as_str), Some("-D warnings"));
    }

    #[test]
    fn key_kinds() {
        assert_eq!(key_kind("cache.enabled").unwrap(), KeyKind::Bool);
        assert_eq!(key_kind("release.retention_days").unwrap(), KeyKind::Int);
        assert_eq!(key_kind("trigger.branches").unwrap(), KeyKind::List);
        assert_eq!(key_kind("env.CARGO_TERM_COLOR").unwrap(), KeyKind::Str);
        assert!(key_kind("vm.name").is_err());
    }

    #[test]
    fn typed_values() {
        assert_eq!(typed_value(KeyKind::Bool, "no").unwrap().as_bool(), Some(false));
        assert!(typed_value(KeyKind::Int, "-3").is_err());
        let list = typed_value(KeyKind::List, "main, release ,").unwrap();
        assert_eq!(list.as_array().map(|a| a.len()), Some(2));
        // Env values stay strings even when numeric
        assert_eq!(typed_value(KeyKind::Str, "1").unwrap().as_str(), Some("1"));
    }

    #[tokio::test]
    async fn set_value_writes_loadable_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCAL_CONFIG_FILE);

        set_value(&path, "release.host_policy", "native").await.unwrap();
        set_value(&path, "trigger.branches", "main,release").await.unwrap();

        let config: Config = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(config.release.host_policy, HostPolicy::Native);
        assert_eq!(config.trigger.branches, vec!["main", "release"]);
    }

    #[tokio::test]
    async fn set_value_rejects_invalid_result() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(LOCAL_CONFIG_FILE);

        let result = set_value(&path, "release.host_policy", "sometimes").await;
        assert!(matches!(result, Err(ShipyardError::ConfigInvalid { .. })));
        assert!(!path.exists());
    }
}
