//! Provisioning the local machine from a declaration
//!
//! Events fired during a run are saved in the state directory. When a run
//! aborts, the saved events stay behind and the next run must either resume
//! them or discard them explicitly.

use anyhow::{Context as _, Result};
use declarative::{
    ApplySummary, Context, Error, EventState, ProgressCallback, Registry, ResourceBundle,
    ResourceRecord, SAVE_FILE, Transport,
};
use std::fs;
use std::path::PathBuf;

use crate::config::Declaration;

/// Options for a provision run
#[derive(Debug, Clone, Default)]
pub struct ProvisionOptions {
    pub simulate: bool,
    /// Continue with events saved by an aborted run
    pub resume: bool,
    /// Throw away events saved by an aborted run
    pub no_resume: bool,
    pub state_dir: PathBuf,
    pub search_path: Vec<PathBuf>,
    pub verbose: bool,
}

/// What a completed run did
#[derive(Debug)]
pub struct Report {
    pub changed: bool,
    pub summary: ApplySummary,
    pub records: Vec<ResourceRecord>,
}

/// Event state for this run, honouring `--resume`/`--no-resume`.
fn event_state(options: &ProvisionOptions) -> Result<EventState> {
    let save_file = options.state_dir.join(SAVE_FILE);
    let mut state = EventState::with_save_file(&save_file, options.simulate);
    if !save_file.exists() {
        return Ok(state);
    }

    if options.resume {
        state.load()?;
        log::info!("Resuming events saved in {}", save_file.display());
    } else if options.no_resume {
        log::info!("Discarding events saved in {}", save_file.display());
        state.discard()?;
        // Simulating leaves the file alone, so mark it read and forget it.
        state.load()?;
        state.reset();
    } else {
        return Err(Error::SavedEventsAndNoInstruction(save_file).into());
    }
    Ok(state)
}

/// Apply every resource of `declaration` through `transport`.
pub fn provision(
    declaration: &Declaration,
    registry: &Registry,
    transport: &dyn Transport,
    options: &ProvisionOptions,
    progress: &mut dyn ProgressCallback,
) -> Result<Report> {
    let mut bundle = ResourceBundle::from_node(registry, &declaration.resources())?;
    log::debug!(
        "{} resource(s) declared in {}",
        bundle.len(),
        declaration.path.display()
    );

    if !options.simulate {
        fs::create_dir_all(&options.state_dir).with_context(|| {
            format!(
                "Could not create state directory: {}",
                options.state_dir.display()
            )
        })?;
    }
    let state = event_state(options)?;

    let mut ctx = Context::new(transport, options.simulate)
        .with_state(state)
        .with_search_path(options.search_path.clone())
        .with_verbose(options.verbose);

    let changed = bundle.apply_with_progress(&mut ctx, progress)?;
    ctx.state.discard()?;

    Ok(Report {
        changed,
        summary: ctx.changelog.summary(),
        records: ctx.changelog.records().to_vec(),
    })
}
