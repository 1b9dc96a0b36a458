//! Owner, group and mode of a path

use declarative::{Context, Error, Result, Stat};
use std::path::Path;

use super::shell::ShellCommand;

const SETUID: u32 = 0o4000;
const SETGID: u32 = 0o2000;

/// Brings the owner, group and mode of a path in line.
///
/// Missing users and groups are an error, except in simulate mode where
/// they may be created by an earlier resource.
#[derive(Debug, Clone, Default)]
pub struct AttributeChanger<'a> {
    pub owner: Option<&'a str>,
    pub group: Option<&'a str>,
    pub mode: Option<u32>,
    /// Act on a symlink itself rather than what it points at
    pub no_dereference: bool,
}

impl AttributeChanger<'_> {
    pub fn apply(&self, path: &Path, ctx: &mut Context<'_>) -> Result<bool> {
        let present = ctx.transport.exists(path) || ctx.transport.islink(path);
        let stat = if present {
            Some(if self.no_dereference {
                ctx.transport.lstat(path)?
            } else {
                ctx.transport.stat(path)?
            })
        } else {
            None
        };
        let target = path.display().to_string();
        let mut changed = false;

        if let Some(owner) = self.owner {
            let uid = match ctx.transport.getpwnam(owner)? {
                Some(passwd) => Some(passwd.uid),
                None if ctx.simulate => {
                    ctx.changelog
                        .info(format!("User '{owner}' not found, assuming it will be created"));
                    None
                }
                None => return Err(Error::InvalidUser(owner.to_string())),
            };
            if uid.is_none() || stat.map(|s| s.uid) != uid {
                changed |= ctx.change(&mut self.command("chown", owner, &target))?;
            }
        }

        if let Some(group) = self.group {
            let gid = match ctx.transport.getgrnam(group)? {
                Some(entry) => Some(entry.gid),
                None if ctx.simulate => {
                    ctx.changelog
                        .info(format!("Group '{group}' not found, assuming it will be created"));
                    None
                }
                None => return Err(Error::InvalidGroup(group.to_string())),
            };
            if gid.is_none() || stat.map(|s| s.gid) != gid {
                changed |= ctx.change(&mut self.command("chgrp", group, &target))?;
            }
        }

        if let Some(mode) = self.mode {
            changed |= Self::apply_mode(mode, stat, &target, ctx)?;
        }

        Ok(changed)
    }

    fn command(&self, program: &str, value: &str, target: &str) -> ShellCommand {
        if self.no_dereference {
            ShellCommand::new([program, "-h", value, target])
        } else {
            ShellCommand::new([program, value, target])
        }
    }

    fn apply_mode(mode: u32, stat: Option<Stat>, target: &str, ctx: &mut Context<'_>) -> Result<bool> {
        let current = stat.map(|s| s.mode & 0o7777);
        if current == Some(mode) {
            return Ok(false);
        }
        let mut changed = ctx.change(&mut ShellCommand::new([
            "chmod".to_string(),
            format!("{mode:o}"),
            target.to_string(),
        ]))?;

        // chmod with octal digits leaves setuid and setgid on directories
        if let Some(current) = current {
            if current & SETGID != 0 && mode & SETGID == 0 {
                changed |= ctx.change(&mut ShellCommand::new(["chmod", "g-s", target]))?;
            }
            if current & SETUID != 0 && mode & SETUID == 0 {
                changed |= ctx.change(&mut ShellCommand::new(["chmod", "u-s", target]))?;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LocalTransport;
    use declarative::Transport;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    #[test]
    fn test_mode_change_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        let transport = LocalTransport::new();
        let changer = AttributeChanger {
            mode: Some(0o600),
            ..AttributeChanger::default()
        };

        let mut ctx = Context::new(&transport, true);
        assert!(changer.apply(&path, &mut ctx).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o644);

        let mut ctx = Context::new(&transport, false);
        assert!(changer.apply(&path, &mut ctx).unwrap());
        assert_eq!(fs::metadata(&path).unwrap().permissions().mode() & 0o7777, 0o600);
        assert!(!changer.apply(&path, &mut ctx).unwrap());
    }

    #[test]
    fn test_current_owner_is_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "").unwrap();
        let transport = LocalTransport::new();
        let me = transport.whoami().unwrap();
        let changer = AttributeChanger {
            owner: Some(&me),
            ..AttributeChanger::default()
        };
        let mut ctx = Context::new(&transport, false);
        // whoami falls back to a numeric uid when there is no passwd entry
        if transport.getpwnam(&me).unwrap().is_some() {
            assert!(!changer.apply(&path, &mut ctx).unwrap());
        }
    }

    #[test]
    fn test_missing_user() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "").unwrap();
        let transport = LocalTransport::new();
        let changer = AttributeChanger {
            owner: Some("no-such-user-for-converge"),
            ..AttributeChanger::default()
        };

        let mut ctx = Context::new(&transport, false);
        assert_eq!(changer.apply(&path, &mut ctx).unwrap_err().returncode(), 141);

        let mut ctx = Context::new(&transport, true);
        assert!(changer.apply(&path, &mut ctx).unwrap());
    }

    #[test]
    fn test_missing_group() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file");
        fs::write(&path, "").unwrap();
        let transport = LocalTransport::new();
        let changer = AttributeChanger {
            group: Some("no-such-group-for-converge"),
            ..AttributeChanger::default()
        };
        let mut ctx = Context::new(&transport, false);
        assert_eq!(changer.apply(&path, &mut ctx).unwrap_err().returncode(), 140);
    }
}
