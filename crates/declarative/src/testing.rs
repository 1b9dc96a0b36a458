//! Mock resource types and an in-memory transport for engine tests

use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use crate::argument::{ArgumentKind, Field};
use crate::context::{CommandOutput, Context, Group, Invocation, Passwd, Stat, Transport};
use crate::error::{Error, Result};
use crate::node::Node;
use crate::policy::{Assertion, Policy};
use crate::provider::Provider;
use crate::registry::{Registry, ResourceType};
use crate::resource::Resource;

/// Files kept in memory
#[derive(Debug, Default)]
pub struct MockTransport {
    files: RefCell<BTreeMap<PathBuf, Vec<u8>>>,
}

impl MockTransport {
    pub fn write(&self, path: &str, contents: &str) {
        self.files
            .borrow_mut()
            .insert(PathBuf::from(path), contents.as_bytes().to_vec());
    }
}

impl Transport for MockTransport {
    fn execute(&self, _command: &Invocation) -> Result<CommandOutput> {
        Ok(CommandOutput::default())
    }

    fn exists(&self, path: &Path) -> bool {
        self.isfile(path) || self.isdir(path)
    }

    fn isfile(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn isdir(&self, path: &Path) -> bool {
        self.files
            .borrow()
            .keys()
            .any(|f| f != path && f.starts_with(path))
    }

    fn islink(&self, _path: &Path) -> bool {
        false
    }

    fn stat(&self, path: &Path) -> Result<Stat> {
        let size = self.get(path)?.len() as u64;
        Ok(Stat {
            uid: 0,
            gid: 0,
            mode: 0o644,
            size,
        })
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        Err(Error::OperationFailed(format!("{} is not a link", path.display())))
    }

    fn get(&self, path: &Path) -> Result<Vec<u8>> {
        self.files
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound).into())
    }

    fn put(&self, path: &Path, contents: &[u8], _mode: u32) -> Result<()> {
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn makedirs(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        self.files.borrow_mut().remove(path);
        Ok(())
    }

    fn getpwnam(&self, name: &str) -> Result<Option<Passwd>> {
        Ok((name == "root").then(|| Passwd {
            name: "root".into(),
            uid: 0,
            gid: 0,
            home: PathBuf::from("/root"),
        }))
    }

    fn getgrnam(&self, name: &str) -> Result<Option<Group>> {
        Ok((name == "root").then(|| Group {
            name: "root".into(),
            gid: 0,
        }))
    }

    fn whoami(&self) -> Result<String> {
        Ok("root".into())
    }
}

/// Writes `contents` (default empty) when the file differs
struct MockFile;

impl Provider for MockFile {
    fn name(&self) -> &'static str {
        "file"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["apply"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        let path = Path::new(resource.name());
        let contents = resource.get_str("contents").unwrap_or_default().as_bytes();
        if ctx.transport.isfile(path) && ctx.transport.get(path)? == contents {
            return Ok(false);
        }
        if !ctx.simulate {
            ctx.transport.put(path, contents, 0o644)?;
        }
        Ok(true)
    }
}

struct MockRemoveFile;

impl Provider for MockRemoveFile {
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
        if !ctx.simulate {
            ctx.transport.unlink(path)?;
        }
        Ok(true)
    }
}

struct MockWatchFile;

impl Provider for MockWatchFile {
    fn name(&self) -> &'static str {
        "watch-file"
    }

    fn policies(&self) -> &'static [&'static str] {
        &["watched"]
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        Ok(resource.hash(ctx)?.as_deref() != resource.original_hash())
    }
}

/// Records its own name as provider output and reports a change.
///
/// A `command` of `fail` fails; watched paths are rewritten.
pub struct RecordingProvider {
    name: &'static str,
    policies: &'static [&'static str],
}

impl RecordingProvider {
    pub fn new(name: &'static str, policies: &'static [&'static str]) -> Self {
        Self { name, policies }
    }
}

impl Provider for RecordingProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    fn policies(&self) -> &'static [&'static str] {
        self.policies
    }

    fn apply(&self, resource: &Resource, ctx: &mut Context<'_>) -> Result<bool> {
        if resource.get_str("command") == Some("fail") {
            return Err(Error::Command {
                message: format!("{} returned 1", resource.id()),
                stderr: String::new(),
            });
        }
        if !ctx.simulate {
            for path in resource.watch() {
                ctx.transport.put(Path::new(&path), b"rotated", 0o644)?;
            }
        }
        ctx.changelog.info(self.name);
        Ok(true)
    }
}

const FILE_FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::FullPath).required(),
    Field::new("contents", ArgumentKind::String),
];

const EXECUTE_FIELDS: &[Field] = &[
    Field::new("name", ArgumentKind::String).required(),
    Field::new("command", ArgumentKind::String),
    Field::new("commands", ArgumentKind::List),
];

const WIDGET_FIELDS: &[Field] = &[Field::new("name", ArgumentKind::String).required()];

/// `File`, `Execute` and an ambiguous `Widget` type
pub fn mock_registry() -> Registry {
    let mut registry = Registry::new();
    let file = ResourceType::new("File", FILE_FIELDS)
        .with_policy(
            Policy::new("apply")
                .as_default()
                .signature(&[Assertion::Present("name")]),
        )
        .with_policy(Policy::new("remove").signature(&[Assertion::Absent("contents")]))
        .with_policy(Policy::new("watched"))
        .with_provider(MockFile)
        .with_provider(MockRemoveFile)
        .with_provider(MockWatchFile);
    let execute = ResourceType::new("Execute", EXECUTE_FIELDS)
        .with_policy(Policy::new("execute").as_default())
        .with_policy(Policy::new("restart"))
        .with_provider(RecordingProvider::new("execute", &["execute"]))
        .with_provider(RecordingProvider::new("restart", &["restart"]));
    let widget = ResourceType::new("Widget", WIDGET_FIELDS)
        .with_policy(Policy::new("apply").as_default())
        .with_provider(RecordingProvider::new("left", &["apply"]))
        .with_provider(RecordingProvider::new("right", &["apply"]));

    for resource_type in [file, execute, widget] {
        registry.register(resource_type).unwrap();
    }
    registry
}

/// Build a resource of `kind` from a JSON declaration.
pub fn resource(registry: &Registry, kind: &str, value: Value) -> Resource {
    let node = Node::root(json!({ kind: value }), None).get_key(kind);
    Resource::new(registry.get(kind).unwrap(), &node).unwrap()
}
