//! Units of work performed on the target
//!
//! [`ShellCommand`] and `WriteFile` are the primitive changes recorded in
//! the changelog. The `Ensure*` types and [`AttributeChanger`] compose them.

mod attributes;
mod directory;
mod file;
mod shell;

pub use attributes::AttributeChanger;
pub use directory::EnsureDirectory;
pub use file::EnsureFile;
pub use shell::ShellCommand;
