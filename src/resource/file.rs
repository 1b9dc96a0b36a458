//! Files: contents, ownership and mode, removal and watching

use declarative::{
    ArgumentKind, Assertion, Context, Error, Field, Policy, Provider, Resource, ResourceType, Result,
};
use std::path::Path;

use super::{attributes, check_path};
use crate::changes::{EnsureFile, ShellCommand};

const FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::FullPath).required(),
    Field::new("owner", ArgumentKind::String),
    Field::new("group", ArgumentKind::String),
    Field::new("mode", ArgumentKind::Octal),
    Field::new("contents", ArgumentKind::String),
    Field::new("static", ArgumentKind::String),
];

const APPLY: &[Assertion] = &[
    Assertion::Present("name"),
    Assertion::Nand(&[Assertion::Present("contents"), Assertion::Present("static")]),
];

/// Only the name may be declared
const NAME_ONLY: &[Assertion] = &[
    Assertion::Present("name"),
    Assertion::Absent("owner"),
    Assertion::Absent("group"),
    Assertion::Absent("mode"),
    Assertion::Absent("contents"),
    Assertion::Absent("static"),
];

pub fn resource_type() -> ResourceType {
    ResourceType::new("File", FIELDS)
        .with_policy(Policy::new("apply").as_default().signature(APPLY))
        .with_policy(Policy::new("remove").signature(NAME_ONLY))
        .with_policy(Policy::new("watched").signature(NAME_ONLY))
        .with_provider(FileProvider)
        .with_provider(RemoveFile)
        .with_provider(WatchFile)
}

/// Creates the file and keeps its contents and attributes in line
struct FileProvider;

impl Provider for FileProvider {
    fn name(&self) -> &'static str {
        "file"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["apply"]
    }

    fn test(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<()> {
        if let Some(asset) = resource.get_str("static") {
            ctx.locate_file(asset)?;
        }
        Ok(())
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let path = Path::new(resource.name());
        check_path(path, ctx)?;

        let contents = match (resource.get_str("contents"), resource.get_str("static")) {
            (Some(contents), _) => Some(contents.as_bytes().to_vec()),
            (None, Some(asset)) => Some(std::fs::read(ctx.locate_file(asset)?)?),
            (None, None) => None,
        };

        EnsureFile {
            path,
            contents,
            sensitive: false,
            attributes: attributes(resource),
        }
        .apply(ctx)
    }
}

struct RemoveFile;

impl Provider for RemoveFile {
    fn name(&self) -> &'static str {
        "remove-file"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["remove"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let path = Path::new(resource.name());
        if !ctx.transport.exists(path) {
            return Ok(false);
        }
        if !ctx.transport.isfile(path) {
            return Err(Error::InvalidProvider(format!(
                "{} exists and is not a file",
                path.display()
            )));
        }
        ctx.change(&mut ShellCommand::new(["rm", resource.name()]))
    }
}

/// Reports a change when the file was modified during this run
struct WatchFile;

impl Provider for WatchFile {
    fn name(&self) -> &'static str {
        "watch-file"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["watched"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let changed = resource.hash(ctx)?.as_deref() != resource.original_hash();
        if changed {
            ctx.changelog.info(format!("{} has changed", resource.name()));
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{apply, check_apply};
    use serde_json::json;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_create_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("motd");
        let declaration = json!([{"File": {"name": path, "contents": "hello\n", "mode": 600}}]);

        assert!(check_apply(&declaration));
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        assert!(check_apply(&json!([{"File": {"name": path}}])));
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn test_static_contents() {
        let dir = TempDir::new().unwrap();
        let asset = dir.path().join("asset.txt");
        fs::write(&asset, "from asset").unwrap();
        let path = dir.path().join("copy");

        assert!(check_apply(&json!([{"File": {"name": path, "static": asset}}])));
        assert_eq!(fs::read_to_string(&path).unwrap(), "from asset");
    }

    #[test]
    fn test_contents_and_static_conflict() {
        let dir = TempDir::new().unwrap();
        let declaration = json!([{"File": {
            "name": dir.path().join("x"),
            "contents": "a",
            "static": "/etc/hostname",
        }}]);
        assert_eq!(apply(&declaration, true).unwrap_err().returncode(), 136);
    }

    #[test]
    fn test_missing_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("file");
        let declaration = json!([{"File": {"name": path}}]);

        assert!(apply(&declaration, true).unwrap());
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 146);
    }

    #[test]
    fn test_remove_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doomed");
        fs::write(&path, "").unwrap();

        assert!(check_apply(&json!([{"File": {"name": path, "policy": "remove"}}])));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_directory_is_invalid() {
        let dir = TempDir::new().unwrap();
        let declaration = json!([{"File": {"name": dir.path(), "policy": "remove"}}]);
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 139);
    }

    #[test]
    fn test_remove_with_contents_does_not_conform() {
        let dir = TempDir::new().unwrap();
        let declaration = json!([{"File": {
            "name": dir.path().join("x"),
            "policy": "remove",
            "contents": "a",
        }}]);
        assert_eq!(apply(&declaration, true).unwrap_err().returncode(), 136);
    }

    #[test]
    fn test_watched_file_triggers_restart() {
        let dir = TempDir::new().unwrap();
        let watched = dir.path().join("generated");
        let marker = dir.path().join("restarted");
        let declaration = json!([
            {"Execute": {
                "name": "generate",
                "command": format!("sh -c 'date +%N > {}'", watched.display()),
                "watch": [watched],
            }},
            {"Execute": {
                "name": "restart",
                "command": format!("touch {}", marker.display()),
                "policy": {"execute": {"when": "watched", "on": format!("File[{}]", watched.display())}},
            }},
        ]);

        assert!(apply(&declaration, false).unwrap());
        assert!(marker.exists());
    }
}
