//! Directories and their removal

use declarative::{
    ArgumentKind, Assertion, Context, DefaultValue, Error, Field, Policy, Provider, Resource,
    ResourceType, Result,
};
use std::path::Path;

use super::{attributes, check_path};
use crate::changes::{EnsureDirectory, ShellCommand};

const FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::FullPath).required(),
    Field::new("owner", ArgumentKind::String),
    Field::new("group", ArgumentKind::String),
    Field::new("mode", ArgumentKind::Octal),
    Field::new("parents", ArgumentKind::Boolean).with_default(DefaultValue::Bool(false)),
];

const REMOVE: &[Assertion] = &[
    Assertion::Present("name"),
    Assertion::Absent("owner"),
    Assertion::Absent("group"),
    Assertion::Absent("mode"),
];

pub fn resource_type() -> ResourceType {
    ResourceType::new("Directory", FIELDS)
        .with_policy(
            Policy::new("apply")
                .as_default()
                .signature(&[Assertion::Present("name")]),
        )
        .with_policy(Policy::new("remove").signature(REMOVE))
        .with_policy(Policy::new("remove-recursive").signature(REMOVE))
        .with_provider(DirectoryProvider)
        .with_provider(RemoveDirectory { recursive: false })
        .with_provider(RemoveDirectory { recursive: true })
}

struct DirectoryProvider;

impl Provider for DirectoryProvider {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["apply"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let path = Path::new(resource.name());
        let parents = resource.get_bool("parents").unwrap_or(false);
        if !parents {
            check_path(path, ctx)?;
        }
        EnsureDirectory {
            path,
            parents,
            attributes: attributes(resource),
        }
        .apply(ctx)
    }
}

/// `rmdir`, or `rm -rf` when recursive
struct RemoveDirectory {
    recursive: bool,
}

impl Provider for RemoveDirectory {
    fn name(&self) -> &'static str {
        if self.recursive {
            "remove-directory-recursive"
        } else {
            "remove-directory"
        }
    }

    fn policies(&self) -> &'static [&'static str] {
        if self.recursive {
            &["remove-recursive"]
        } else {
            &["remove"]
        }
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let path = Path::new(resource.name());
        if !ctx.transport.exists(path) {
            return Ok(false);
        }
        if !ctx.transport.isdir(path) {
            return Err(Error::InvalidProvider(format!(
                "{} exists and is not a directory",
                path.display()
            )));
        }
        let mut command = if self.recursive {
            ShellCommand::new(["rm", "-rf", resource.name()])
        } else {
            ShellCommand::new(["rmdir", resource.name()])
        };
        ctx.change(&mut command)
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
    fn test_create_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("srv");
        assert!(check_apply(&json!([{"Directory": {"name": path, "mode": "0700"}}])));
        assert!(path.is_dir());
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn test_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("c");

        let declaration = json!([{"Directory": {"name": path}}]);
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 146);

        assert!(check_apply(&json!([{"Directory": {"name": path, "parents": "yes"}}])));
        assert!(path.is_dir());
    }

    #[test]
    fn test_remove_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        fs::create_dir(&path).unwrap();
        assert!(check_apply(&json!([{"Directory": {"name": path, "policy": "remove"}}])));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_non_empty_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("full");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("file"), "").unwrap();
        let declaration = json!([{"Directory": {"name": path, "policy": "remove"}}]);
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 133);
    }

    #[test]
    fn test_remove_recursive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("full");
        fs::create_dir_all(path.join("nested")).unwrap();
        fs::write(path.join("nested").join("file"), "").unwrap();
        assert!(check_apply(
            &json!([{"Directory": {"name": path, "policy": "remove-recursive"}}])
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_file_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "").unwrap();
        let declaration = json!([{"Directory": {"name": path, "policy": "remove"}}]);
        assert_eq!(apply(&declaration, false).unwrap_err().returncode(), 139);
    }
}
