//! Local machine transport
//!
//! Runs commands with `std::process` and reads the filesystem directly.
//! Commands for another user go through `sudo`; a umask is applied by a
//! small `sh` wrapper so the target program is still exec'd directly.

use declarative::{CommandOutput, Error, Group, Invocation, Passwd, Result, Stat, Transport};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const PASSWD_FILE: &str = "/etc/passwd";
const GROUP_FILE: &str = "/etc/group";

/// Transport for the machine converge is running on
#[derive(Debug, Clone)]
pub struct LocalTransport {
    passwd_file: PathBuf,
    group_file: PathBuf,
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self {
            passwd_file: PathBuf::from(PASSWD_FILE),
            group_file: PathBuf::from(GROUP_FILE),
        }
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use alternative user and group databases.
    #[cfg(test)]
    pub fn with_databases(passwd_file: impl Into<PathBuf>, group_file: impl Into<PathBuf>) -> Self {
        Self {
            passwd_file: passwd_file.into(),
            group_file: group_file.into(),
        }
    }

    fn passwd_entries(&self) -> Result<Vec<Passwd>> {
        let content = fs::read_to_string(&self.passwd_file)?;
        Ok(content.lines().filter_map(parse_passwd_line).collect())
    }

    fn group_entries(&self) -> Result<Vec<Group>> {
        let content = fs::read_to_string(&self.group_file)?;
        Ok(content.lines().filter_map(parse_group_line).collect())
    }

    /// Full argv to run, with sudo and umask wrappers applied.
    fn argv(&self, command: &Invocation) -> Result<Vec<String>> {
        let mut argv = Vec::new();

        if self.needs_sudo(command)? {
            argv.push("sudo".to_string());
            argv.push("-n".to_string());
            if let Some(user) = &command.user {
                argv.extend(["-u".to_string(), user.clone()]);
            }
            if let Some(group) = &command.group {
                argv.extend(["-g".to_string(), group.clone()]);
            }
            argv.push("--".to_string());
        }

        if let Some(umask) = command.umask {
            argv.extend([
                "/bin/sh".to_string(),
                "-c".to_string(),
                format!("umask {umask:04o}; exec \"$@\""),
                "sh".to_string(),
            ]);
        }

        argv.extend(command.argv.iter().cloned());
        Ok(argv)
    }

    fn needs_sudo(&self, command: &Invocation) -> Result<bool> {
        if let Some(user) = &command.user
            && *user != self.whoami()?
        {
            return Ok(true);
        }
        if let Some(group) = &command.group {
            let gid = self
                .getgrnam(group)?
                .ok_or_else(|| Error::InvalidGroup(group.clone()))?
                .gid;
            // SAFETY: getegid has no preconditions and cannot fail
            let current = unsafe { libc::getegid() };
            return Ok(gid != current);
        }
        Ok(false)
    }
}

impl Transport for LocalTransport {
    fn execute(&self, command: &Invocation) -> Result<CommandOutput> {
        let argv = self.argv(command)?;
        let Some((program, args)) = argv.split_first() else {
            return Err(Error::Execution("empty command".to_string()));
        };
        log::trace!("exec {}", argv.join(" "));

        let mut cmd = Command::new(program);
        cmd.args(args)
            .env_clear()
            .envs(&command.env)
            .stdin(if command.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Execution(format!("{}: {e}", command.display())))?;
        if let (Some(input), Some(mut stdin)) = (&command.stdin, child.stdin.take()) {
            stdin.write_all(input)?;
        }
        let output = child
            .wait_with_output()
            .map_err(|e| Error::Execution(format!("{}: {e}", command.display())))?;

        let returncode = output
            .status
            .code()
            .or_else(|| output.status.signal().map(|s| 128 + s))
            .unwrap_or(-1);
        Ok(CommandOutput {
            returncode,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn isfile(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn isdir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn islink(&self, path: &Path) -> bool {
        path.is_symlink()
    }

    fn stat(&self, path: &Path) -> Result<Stat> {
        Ok(to_stat(&fs::metadata(path)?))
    }

    fn lstat(&self, path: &Path) -> Result<Stat> {
        Ok(to_stat(&fs::symlink_metadata(path)?))
    }

    fn readlink(&self, path: &Path) -> Result<PathBuf> {
        Ok(fs::read_link(path)?)
    }

    fn get(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(fs::read(path)?)
    }

    fn put(&self, path: &Path, contents: &[u8], mode: u32) -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(path)?;
        file.write_all(contents)?;
        Ok(())
    }

    fn makedirs(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn unlink(&self, path: &Path) -> Result<()> {
        Ok(fs::remove_file(path)?)
    }

    fn getpwnam(&self, name: &str) -> Result<Option<Passwd>> {
        Ok(self.passwd_entries()?.into_iter().find(|p| p.name == name))
    }

    fn getgrnam(&self, name: &str) -> Result<Option<Group>> {
        Ok(self.group_entries()?.into_iter().find(|g| g.name == name))
    }

    fn whoami(&self) -> Result<String> {
        // SAFETY: geteuid has no preconditions and cannot fail
        let uid = unsafe { libc::geteuid() };
        Ok(self
            .passwd_entries()?
            .into_iter()
            .find(|p| p.uid == uid)
            .map_or_else(|| uid.to_string(), |p| p.name))
    }
}

fn to_stat(metadata: &fs::Metadata) -> Stat {
    Stat {
        uid: metadata.uid(),
        gid: metadata.gid(),
        mode: metadata.mode() & 0o7777,
        size: metadata.size(),
    }
}

/// `name:password:uid:gid:gecos:home:shell`
fn parse_passwd_line(line: &str) -> Option<Passwd> {
    if line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 6 {
        return None;
    }
    Some(Passwd {
        name: fields[0].to_string(),
        uid: fields[2].parse().ok()?,
        gid: fields[3].parse().ok()?,
        home: PathBuf::from(fields[5]),
    })
}

/// `name:password:gid:members`
fn parse_group_line(line: &str) -> Option<Group> {
    if line.starts_with('#') {
        return None;
    }
    let fields: Vec<&str> = line.split(':').collect();
    if fields.len() < 3 {
        return None;
    }
    Some(Group {
        name: fields[0].to_string(),
        gid: fields[2].parse().ok()?,
    })
}
