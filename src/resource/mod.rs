//! Resource types for converging a local machine
//!
//! Every type is a static field table plus policies and providers registered
//! with the engine:
//! - `File`: contents, ownership and mode of a file
//! - `Directory`: a directory and its attributes
//! - `Link`: a symbolic link
//! - `Execute`: a command, run once or guarded by `creates`/`unless`
//! - `Service`: start, stop, restart or reconfigure a service

mod directory;
mod execute;
mod file;
mod link;
mod service;

use declarative::{Context, Error, Registry, Resource, Result};
use std::path::Path;

use crate::changes::AttributeChanger;

/// A registry holding every resource type.
pub fn registry() -> Result<Registry> {
    let mut registry = Registry::new();
    registry.register(file::resource_type())?;
    registry.register(directory::resource_type())?;
    registry.register(link::resource_type())?;
    registry.register(execute::resource_type())?;
    registry.register(service::resource_type())?;
    Ok(registry)
}

/// Check that every directory above `path` exists.
///
/// In simulate mode a missing directory may be created by an earlier
/// resource, so it is only reported.
fn check_path(path: &Path, ctx: &mut Context<'_>) -> Result<()> {
    let mut ancestors: Vec<&Path> = path.ancestors().skip(1).collect();
    ancestors.reverse();
    for dir in ancestors {
        if dir.as_os_str().is_empty() || dir == Path::new("/") {
            continue;
        }
        if !ctx.transport.exists(dir) {
            if ctx.simulate {
                ctx.changelog.info(format!(
                    "Directory {} does not exist, assuming it will be created",
                    dir.display()
                ));
                return Ok(());
            }
            return Err(Error::PathComponentMissing(dir.to_path_buf()));
        }
        if !ctx.transport.isdir(dir) {
            return Err(Error::PathComponentNotDirectory(dir.to_path_buf()));
        }
    }
    Ok(())
}

/// Owner, group and mode declared on a resource.
fn attributes(resource: &Resource) -> AttributeChanger<'_> {
    AttributeChanger {
        owner: resource.get_str("owner"),
        group: resource.get_str("group"),
        mode: resource.get_mode("mode"),
        no_dereference: false,
    }
}
