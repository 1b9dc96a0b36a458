//! Execution context, transport and progress traits
//!
//! These traits allow the engine to be used without depending on how
//! commands are run or how progress is displayed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::changelog::{Change, ChangeLog, Outcome};
use crate::error::{Error, Result};
use crate::event::EventState;

/// A command to run on the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invocation {
    pub argv: Vec<String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub stdin: Option<Vec<u8>>,
    pub umask: Option<u32>,
}

impl Invocation {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The command line as it would be typed in a shell.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// Output of a command run on the target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub returncode: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.returncode == 0
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Ownership and permission bits of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits, including setuid, setgid and sticky
    pub mode: u32,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passwd {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub gid: u32,
}

/// Access to the machine being converged
///
/// Only providers and changes use the transport. Mutating methods are never
/// called in simulate mode.
pub trait Transport {
    fn execute(&self, command: &Invocation) -> Result<CommandOutput>;
    fn exists(&self, path: &Path) -> bool;
    fn isfile(&self, path: &Path) -> bool;
    fn isdir(&self, path: &Path) -> bool;
    fn islink(&self, path: &Path) -> bool;
    fn stat(&self, path: &Path) -> Result<Stat>;

    /// Like [`stat`](Self::stat) but does not follow a final symlink.
    fn lstat(&self, path: &Path) -> Result<Stat> {
        self.stat(path)
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf>;
    fn get(&self, path: &Path) -> Result<Vec<u8>>;
    fn put(&self, path: &Path, contents: &[u8], mode: u32) -> Result<()>;
    fn makedirs(&self, path: &Path) -> Result<()>;
    fn unlink(&self, path: &Path) -> Result<()>;
    fn getpwnam(&self, name: &str) -> Result<Option<Passwd>>;
    fn getgrnam(&self, name: &str) -> Result<Option<Group>>;
    fn whoami(&self) -> Result<String>;
}

/// Progress callback for a bundle apply
pub trait ProgressCallback: Send {
    /// Called before the first resource is applied
    fn on_apply_start(&mut self, total: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, id: &str, position: usize, total: usize);

    /// Called when a resource apply completes
    fn on_resource_complete(&mut self, id: &str, outcome: &Outcome);

    /// Called after the last resource
    fn on_apply_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_apply_start(&mut self, _total: usize) {}
    fn on_resource_start(&mut self, _id: &str, _position: usize, _total: usize) {}
    fn on_resource_complete(&mut self, _id: &str, _outcome: &Outcome) {}
    fn on_apply_complete(&mut self) {}
}

/// Context passed to resources, providers and changes
pub struct Context<'a> {
    /// Decide everything, change nothing
    pub simulate: bool,
    pub verbose: bool,
    pub transport: &'a dyn Transport,
    pub changelog: ChangeLog,
    pub state: EventState,
    search_path: Vec<PathBuf>,
}

impl<'a> Context<'a> {
    /// Create a context with an in-memory event state
    pub fn new(transport: &'a dyn Transport, simulate: bool) -> Self {
        Self {
            simulate,
            verbose: false,
            transport,
            changelog: ChangeLog::new(),
            state: EventState::new(),
            search_path: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: EventState) -> Self {
        self.state = state;
        self
    }

    /// Directories searched, in order, by [`locate_file`](Self::locate_file).
    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run `f` bracketed as the changelog record of resource `id`.
    pub fn resource<F>(&mut self, id: &str, f: F) -> Result<bool>
    where
        F: FnOnce(&mut Self) -> Result<bool>,
    {
        self.changelog.begin(id);
        let result = f(self);
        self.changelog.finish(Outcome::of(&result));
        result
    }

    /// Apply `change` and record it under the current resource.
    pub fn change(&mut self, change: &mut dyn Change) -> Result<bool> {
        let description = change.describe();
        let changed = change.apply(self)?;
        self.changelog.record_change(&description, changed);
        Ok(changed)
    }

    /// Find a local asset (such as a `static` file) on the search path.
    pub fn locate_file(&self, name: &str) -> Result<PathBuf> {
        let path = Path::new(name);
        if path.is_absolute() {
            return if path.exists() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::MissingAsset(name.to_string()))
            };
        }
        self.search_path
            .iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.exists())
            .ok_or_else(|| Error::MissingAsset(name.to_string()))
    }
}
