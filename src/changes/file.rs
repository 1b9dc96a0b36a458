//! Writing file contents

use declarative::{Change, Context, Result};
use similar::TextDiff;
use std::path::{Path, PathBuf};

use super::attributes::AttributeChanger;
use super::shell::ShellCommand;

const DEFAULT_MODE: u32 = 0o644;

/// Replace the contents of a file
#[derive(Debug, Clone)]
pub struct WriteFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub mode: u32,
}

impl Change for WriteFile {
    fn describe(&self) -> String {
        format!("write {}", self.path.display())
    }

    fn apply(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        if !ctx.simulate {
            ctx.transport.put(&self.path, &self.contents, self.mode)?;
        }
        Ok(true)
    }
}

/// A file with the given contents and attributes.
///
/// Without contents the file is created empty, or emptied.
#[derive(Debug, Clone)]
pub struct EnsureFile<'a> {
    pub path: &'a Path,
    pub contents: Option<Vec<u8>>,
    /// Never show the contents in a diff
    pub sensitive: bool,
    pub attributes: AttributeChanger<'a>,
}

impl EnsureFile<'_> {
    pub fn apply(&self, ctx: &mut Context<'_>) -> Result<bool> {
        let changed = match &self.contents {
            None => self.empty(ctx)?,
            Some(contents) => self.write(contents, ctx)?,
        };
        let attributes = self.attributes.apply(self.path, ctx)?;
        Ok(changed || attributes)
    }

    fn empty(&self, ctx: &mut Context<'_>) -> Result<bool> {
        let target = self.path.display().to_string();
        if !ctx.transport.exists(self.path) {
            return ctx.change(&mut ShellCommand::new(["touch", target.as_str()]));
        }
        if ctx.transport.stat(self.path)?.size != 0 {
            return ctx.change(&mut ShellCommand::new(["cp", "/dev/null", target.as_str()]));
        }
        Ok(false)
    }

    fn write(&self, contents: &[u8], ctx: &mut Context<'_>) -> Result<bool> {
        let current = if ctx.transport.isfile(self.path) {
            Some(ctx.transport.get(self.path)?)
        } else {
            None
        };
        if current.as_deref() == Some(contents) {
            return Ok(false);
        }

        if !self.sensitive
            && let Some(diff) =
                unified_diff(current.as_deref().unwrap_or_default(), contents, self.path)
        {
            ctx.changelog.info(diff);
        }

        let mode = self.attributes.mode.unwrap_or(DEFAULT_MODE);
        ctx.change(&mut WriteFile {
            path: self.path.to_path_buf(),
            contents: contents.to_vec(),
            mode,
        })
    }
}

/// Unified diff of two text files, or `None` if either side is binary.
pub fn unified_diff(old: &[u8], new: &[u8], path: &Path) -> Option<String> {
    let old = std::str::from_utf8(old).ok()?;
    let new = std::str::from_utf8(new).ok()?;
    let name = path.display().to_string();
    Some(
        TextDiff::from_lines(old, new)
            .unified_diff()
            .header(&name, &name)
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use std::fs;
    use tempfile::TempDir;

    fn ensure<'a>(path: &'a Path, contents: Option<&str>) -> EnsureFile<'a> {
        EnsureFile {
            path,
            contents: contents.map(|c| c.as_bytes().to_vec()),
            sensitive: false,
            attributes: AttributeChanger::default(),
        }
    }

    #[test]
    fn test_writes_contents_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("motd");
        let transport = LocalTransport::new();
        let file = ensure(&path, Some("hello\n"));

        let mut ctx = Context::new(&transport, true);
        assert!(file.apply(&mut ctx).unwrap());
        assert!(!path.exists());

        let mut ctx = Context::new(&transport, false);
        ctx.changelog.begin("File[motd]");
        assert!(file.apply(&mut ctx).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "hello\n");
        assert!(ctx.changelog.records()[0].messages[0].contains("+hello"));
        assert!(!file.apply(&mut ctx).unwrap());
    }

    #[test]
    fn test_sensitive_contents_are_not_shown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret");
        let transport = LocalTransport::new();
        let file = EnsureFile {
            sensitive: true,
            ..ensure(&path, Some("hunter2"))
        };
        let mut ctx = Context::new(&transport, false);
        ctx.changelog.begin("File[secret]");
        assert!(file.apply(&mut ctx).unwrap());
        assert!(ctx.changelog.records()[0].messages.is_empty());
    }

    #[test]
    fn test_without_contents_touches_then_empties() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        let transport = LocalTransport::new();
        let file = ensure(&path, None);
        let mut ctx = Context::new(&transport, false);

        assert!(file.apply(&mut ctx).unwrap());
        assert!(path.exists());
        assert!(!file.apply(&mut ctx).unwrap());

        fs::write(&path, "data").unwrap();
        assert!(file.apply(&mut ctx).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"");
    }

    #[test]
    fn test_binary_contents_have_no_diff() {
        assert!(unified_diff(b"", &[0xff, 0xfe], Path::new("/bin/x")).is_none());
        let diff = unified_diff(b"a\n", b"b\n", Path::new("/etc/x")).unwrap();
        assert!(diff.contains("-a"));
        assert!(diff.contains("+b"));
    }
}
