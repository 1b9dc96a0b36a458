//! Settings and declaration loading
//!
//! Declarations are `.toml` or `.json` documents with a top-level
//! `resources` list. Both formats end up as the same JSON tree so the engine
//! only ever sees one representation.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use declarative::Node;

use crate::paths;

/// File name of the optional settings file in the config directory
pub const SETTINGS_FILE: &str = "settings.toml";

/// User settings from `settings.toml`
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directories searched for `static` assets, after the declaration's own
    #[serde(default)]
    pub search_path: Vec<String>,

    /// Where the saved events file is kept
    #[serde(default)]
    pub state_dir: Option<String>,
}

impl Settings {
    /// Load settings from the config directory. A missing file is not an error.
    pub fn load() -> Result<Self> {
        let path = paths::config_dir()?.join(SETTINGS_FILE);
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read settings file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }

    /// Asset search path for a declaration at `declaration`.
    ///
    /// `CONVERGE_PATH` entries come first, then the declaration's directory,
    /// then the configured `search_path`.
    pub fn search_path(&self, declaration: &Path) -> Vec<PathBuf> {
        let mut search_path = paths::env_search_path();
        if let Some(parent) = declaration.parent() {
            let parent = if parent.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                parent.to_path_buf()
            };
            search_path.push(parent);
        }
        search_path.extend(self.search_path.iter().map(|p| paths::expand(p)));
        search_path
    }

    /// State directory: the command line wins, then settings, then the default.
    pub fn state_dir(&self, cli: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = cli {
            return Ok(dir.to_path_buf());
        }
        if std::env::var_os(paths::ENV_STATE_DIR).is_none()
            && let Some(dir) = &self.state_dir
        {
            return Ok(paths::expand(dir));
        }
        paths::state_dir()
    }
}

/// A loaded declaration document
#[derive(Debug, Clone)]
pub struct Declaration {
    pub path: PathBuf,
    document: Value,
}

impl Declaration {
    /// Read and parse a declaration file. The format follows the extension.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read declaration: {}", path.display()))?;
        let document = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => {
                let table: toml::Table = toml::from_str(&content).map_err(|e| {
                    declarative::Error::parse(format!(
                        "Invalid TOML format in {}: {e}",
                        path.display()
                    ))
                })?;
                toml_to_json(toml::Value::Table(table))
            }
            Some("json") => serde_json::from_str(&content).map_err(|e| {
                declarative::Error::parse(format!(
                    "Invalid JSON format in {}: {e}",
                    path.display()
                ))
            })?,
            _ => bail!(
                "Unsupported declaration format: {} (expected .toml or .json)",
                path.display()
            ),
        };
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// The `resources` list, anchored at the declaration file.
    ///
    /// A document without resources declares an empty bundle.
    pub fn resources(&self) -> Node {
        let root = Node::root(self.document.clone(), Some(&self.path));
        let resources = root.get_key("resources");
        if resources.is_missing() {
            return Node::new(Value::Array(Vec::new()), resources.anchor().clone());
        }
        resources
    }
}

/// `toml::Datetime` serializes as a private wrapper struct, so datetimes are
/// turned into plain strings here.
fn toml_to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Value::from(f),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paths::tests::{env_lock, with_env_var, without_env_var};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_load_toml_declaration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.toml");
        fs::write(
            &path,
            r#"
[[resources]]
[resources.File]
name = "/etc/motd"
mode = 644

[[resources]]
[[resources.Execute]]
name = "one"
command = "true"

[[resources.Execute]]
name = "two"
command = "true"
"#,
        )
        .unwrap();

        let declaration = Declaration::load(&path).unwrap();
        let items = declaration.resources().get_iterable().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].get_key("File").get_key("mode").as_int().unwrap(),
            644
        );
        assert!(items[1].get_key("Execute").is_list());
    }

    #[test]
    fn test_load_json_declaration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.json");
        fs::write(
            &path,
            json!({"resources": [{"Directory": {"name": "/srv"}}]}).to_string(),
        )
        .unwrap();

        let declaration = Declaration::load(&path).unwrap();
        let items = declaration.resources().get_iterable().unwrap();
        assert_eq!(
            items[0].get_key("Directory").get_key("name").as_string().unwrap(),
            "/srv"
        );
    }

    #[test]
    fn test_invalid_declaration_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "resources = [").unwrap();

        let err = Declaration::load(&path).unwrap_err();
        let engine = err.downcast_ref::<declarative::Error>().unwrap();
        assert_eq!(engine.returncode(), 128);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site.yaml");
        fs::write(&path, "resources: []").unwrap();
        assert!(Declaration::load(&path).is_err());
    }

    #[test]
    fn test_missing_resources_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.json");
        fs::write(&path, "{}").unwrap();
        let declaration = Declaration::load(&path).unwrap();
        assert!(declaration.resources().get_iterable().unwrap().is_empty());
    }

    #[test]
    fn test_toml_datetime_becomes_string() {
        let table: toml::Table = toml::from_str("at = 2024-01-02T03:04:05Z").unwrap();
        assert_eq!(
            toml_to_json(toml::Value::Table(table)),
            json!({"at": "2024-01-02T03:04:05Z"})
        );
    }

    #[test]
    fn test_settings_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load_from(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert!(settings.search_path.is_empty());
        assert!(settings.state_dir.is_none());
    }

    #[test]
    fn test_settings_rejects_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "serach_path = []").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }

    #[test]
    fn test_search_path_order() {
        let _guard = env_lock();
        let settings = Settings {
            search_path: vec!["/opt/assets".into()],
            state_dir: None,
        };
        with_env_var(paths::ENV_SEARCH_PATH, "/srv/assets", || {
            assert_eq!(
                settings.search_path(Path::new("/etc/converge/site.toml")),
                vec![
                    PathBuf::from("/srv/assets"),
                    PathBuf::from("/etc/converge"),
                    PathBuf::from("/opt/assets"),
                ]
            );
        });
    }

    #[test]
    fn test_state_dir_priority() {
        let _guard = env_lock();
        let settings = Settings {
            search_path: Vec::new(),
            state_dir: Some("/var/lib/converge".into()),
        };
        assert_eq!(
            settings.state_dir(Some(Path::new("/tmp/state"))).unwrap(),
            PathBuf::from("/tmp/state")
        );
        without_env_var(paths::ENV_STATE_DIR, || {
            assert_eq!(
                settings.state_dir(None).unwrap(),
                PathBuf::from("/var/lib/converge")
            );
        });
        with_env_var(paths::ENV_STATE_DIR, "/run/converge", || {
            assert_eq!(
                settings.state_dir(None).unwrap(),
                PathBuf::from("/run/converge")
            );
        });
    }
}
