//! Running commands on the target

use declarative::{Change, CommandOutput, Context, Error, Invocation, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// `PATH` every command starts with
pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// A command run through the transport
///
/// In simulate mode nothing is executed and the command reports success.
#[derive(Debug, Clone, Default)]
pub struct ShellCommand {
    pub argv: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub umask: Option<u32>,
    pub stdin: Option<Vec<u8>>,
    /// Return code that counts as success; `None` accepts any
    pub expected: Option<i32>,
    /// Output of the last run
    pub output: Option<CommandOutput>,
}

impl ShellCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            expected: Some(0),
            ..Self::default()
        }
    }

    /// Parse a shell-like command line into words.
    pub fn parse(command: &str) -> Result<Self> {
        Ok(Self::new(split_command(command)?))
    }

    /// Accept any return code; the caller inspects [`returncode`](Self::returncode).
    pub fn unchecked(mut self) -> Self {
        self.expected = None;
        self
    }

    pub fn returncode(&self) -> i32 {
        self.output.as_ref().map_or(0, |o| o.returncode)
    }

    fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([("PATH".to_string(), DEFAULT_PATH.to_string())]);
        env.extend(self.env.clone());
        env
    }

    /// Whether the program named by `argv[0]` can be found.
    fn binary_exists(&self, ctx: &Context<'_>, env: &BTreeMap<String, String>) -> bool {
        let Some(program) = self.argv.first() else {
            return false;
        };
        let program = Path::new(program);
        if program.is_absolute() {
            return ctx.transport.exists(program);
        }
        if program.components().count() > 1 {
            let base = self.cwd.clone().unwrap_or_else(|| PathBuf::from("/"));
            return ctx.transport.exists(&base.join(program));
        }
        env.get("PATH")
            .map(String::as_str)
            .unwrap_or(DEFAULT_PATH)
            .split(':')
            .filter(|dir| !dir.is_empty())
            .any(|dir| ctx.transport.exists(&Path::new(dir).join(program)))
    }

    /// The user and group to run as must exist.
    fn check_identity(&self, ctx: &Context<'_>) -> Result<()> {
        if let Some(user) = &self.user
            && ctx.transport.getpwnam(user)?.is_none()
        {
            return Err(Error::InvalidUser(user.clone()));
        }
        if let Some(group) = &self.group
            && ctx.transport.getgrnam(group)?.is_none()
        {
            return Err(Error::InvalidGroup(group.clone()));
        }
        Ok(())
    }

    fn invocation(&self) -> Invocation {
        Invocation {
            argv: self.argv.clone(),
            user: self.user.clone(),
            group: self.group.clone(),
            cwd: self.cwd.clone(),
            env: self.environment(),
            stdin: self.stdin.clone(),
            umask: self.umask,
        }
    }

    fn run(&mut self, ctx: &Context<'_>) -> Result<i32> {
        let invocation = self.invocation();
        let output = ctx.transport.execute(&invocation)?;
        for line in output.stdout_str().lines() {
            log::debug!("  {line}");
        }
        let returncode = output.returncode;
        let stderr = output.stderr_str();
        self.output = Some(output);
        if let Some(expected) = self.expected
            && returncode != expected
        {
            return Err(Error::Command {
                message: format!("{} failed with return code {returncode}", invocation.display()),
                stderr,
            });
        }
        Ok(returncode)
    }

    /// Run a read-only check, even in simulate mode.
    ///
    /// Not recorded in the changelog. Returns the return code.
    pub fn query(&mut self, ctx: &Context<'_>) -> Result<i32> {
        self.check_identity(ctx)?;
        if !self.binary_exists(ctx, &self.environment()) {
            return Err(Error::BinaryMissing(self.argv.first().cloned().unwrap_or_default()));
        }
        self.run(ctx)
    }
}

impl Change for ShellCommand {
    fn describe(&self) -> String {
        format!("# {}", self.argv.join(" "))
    }

    fn apply(&mut self, ctx: &mut Context<'_>) -> Result<bool> {
        match self.check_identity(ctx) {
            Ok(()) => {}
            Err(e) if ctx.simulate => {
                ctx.changelog.info(format!("{e}, assuming it will be created"));
            }
            Err(e) => return Err(e),
        }

        if !self.binary_exists(ctx, &self.environment()) {
            let program = self.argv.first().cloned().unwrap_or_default();
            if !ctx.simulate {
                return Err(Error::BinaryMissing(program));
            }
            ctx.changelog
                .info(format!("'{program}' is not available yet, assuming it will be"));
        }

        if ctx.simulate {
            self.output = Some(CommandOutput::default());
            return Ok(true);
        }
        self.run(ctx)?;
        Ok(true)
    }
}

/// Split a command line into words the way a POSIX shell would,
/// honouring single quotes, double quotes and backslash escapes.
pub fn split_command(command: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut word = String::new();
    let mut in_word = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => word.push(c),
                        None => return Err(unbalanced(command)),
                    }
                }
            }
            '"' => {
                in_word = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(c @ ('"' | '\\' | '$' | '`')) => word.push(c),
                            Some(c) => {
                                word.push('\\');
                                word.push(c);
                            }
                            None => return Err(unbalanced(command)),
                        },
                        Some(c) => word.push(c),
                        None => return Err(unbalanced(command)),
                    }
                }
            }
            '\\' => {
                in_word = true;
                if let Some(c) = chars.next() {
                    word.push(c);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut word));
                    in_word = false;
                }
            }
            c => {
                in_word = true;
                word.push(c);
            }
        }
    }
    if in_word {
        words.push(word);
    }
    Ok(words)
}

fn unbalanced(command: &str) -> Error {
    Error::Execution(format!("unbalanced quotes in command: {command}"))
}
