//! `converge test` - validate a declaration without touching the machine

use anyhow::Result;
use declarative::{Context as RunContext, ResourceBundle};
use std::path::Path;

use crate::Context;
use crate::config::{Declaration, Settings};
use crate::resource;
use crate::transport::LocalTransport;
use crate::ui;

pub fn run(ctx: &Context, file: &Path) -> Result<()> {
    let settings = Settings::load()?;
    let declaration = Declaration::load(file)?;
    let count = check(&declaration, &settings)?;
    if !ctx.quiet {
        ui::success(&format!(
            "{}: {count} resource(s) valid",
            declaration.path.display()
        ));
    }
    Ok(())
}

/// Bind, validate and run the pre-flight checks of every resource.
pub fn check(declaration: &Declaration, settings: &Settings) -> Result<usize> {
    let registry = resource::registry()?;
    let mut bundle = ResourceBundle::from_node(&registry, &declaration.resources())?;
    let transport = LocalTransport::new();
    let mut run_ctx =
        RunContext::new(&transport, true).with_search_path(settings.search_path(&declaration.path));
    bundle.test(&mut run_ctx)?;
    Ok(bundle.len())
}
