use declarative::{Context, Error, Result};
use std::path::Path;

use super::attributes::AttributeChanger;
use super::shell::ShellCommand;

/// A directory with the given attributes
#[derive(Debug, Clone)]
pub struct EnsureDirectory<'a> {
    pub path: &'a Path,
    /// Create missing parents as well
    pub parents: bool,
    pub attributes: AttributeChanger<'a>,
}

impl EnsureDirectory<'_> {
    pub fn apply(&self, ctx: &mut Context<'_>) -> Result<bool> {
        let target = self.path.display().to_string();
        let mut changed = false;

        if !ctx.transport.isdir(self.path) {
            if ctx.transport.exists(self.path) {
                return Err(Error::InvalidProvider(format!(
                    "{target} exists and is not a directory"
                )));
            }
            let mut mkdir = if self.parents {
                ShellCommand::new(["mkdir", "-p", target.as_str()])
            } else {
                ShellCommand::new(["mkdir", target.as_str()])
            };
            changed = ctx.change(&mut mkdir)?;
        }

        Ok(self.attributes.apply(self.path, ctx)? || changed)
    }
}
