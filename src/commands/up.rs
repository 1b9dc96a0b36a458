//! `converge up` - provision this machine

use anyhow::Result;

use crate::Context;
use crate::cli::UpArgs;
use crate::config::{Declaration, Settings};
use crate::provision::{self, ProvisionOptions, Report};
use crate::resource;
use crate::transport::LocalTransport;
use crate::ui::{self, BarProgress};

/// Returns whether anything changed.
pub fn run(ctx: &Context, args: UpArgs) -> Result<bool> {
    let settings = Settings::load()?;
    let declaration = Declaration::load(&args.file)?;
    let options = ProvisionOptions {
        simulate: args.simulate,
        resume: args.resume,
        no_resume: args.no_resume,
        state_dir: settings.state_dir(args.state_dir.as_deref())?,
        search_path: settings.search_path(&declaration.path),
        verbose: ctx.verbose > 0,
    };

    if !ctx.quiet {
        let mode = if options.simulate { " (simulate)" } else { "" };
        ui::header(&format!("Converging {}{mode}", declaration.path.display()));
        if ctx.verbose > 0 {
            ui::kv("State", &options.state_dir.display().to_string());
        }
    }

    let registry = resource::registry()?;
    let transport = LocalTransport::new();
    let mut progress = BarProgress::new(!ctx.quiet);
    let report = provision::provision(&declaration, &registry, &transport, &options, &mut progress)?;

    if !ctx.quiet {
        show(&report, options.simulate, ctx.verbose > 0);
        ui::summary(&report.summary, options.simulate);
    }
    Ok(report.changed)
}

/// List the changes made, or that would be made when simulating.
fn show(report: &Report, simulate: bool, verbose: bool) {
    if !simulate && !verbose {
        return;
    }
    for record in &report.records {
        if record.changes.is_empty() && (!verbose || record.messages.is_empty()) {
            continue;
        }
        ui::info(&record.id);
        for change in &record.changes {
            ui::dim(change);
        }
        if verbose {
            for message in &record.messages {
                for line in message.lines() {
                    ui::dim(line);
                }
            }
        }
    }
}
