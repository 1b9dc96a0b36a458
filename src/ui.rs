use colored::Colorize;
use declarative::{ApplySummary, Outcome, ProgressCallback};
use indicatif::{ProgressBar, ProgressStyle};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Print the outcome counts of a run
pub fn summary(summary: &ApplySummary, simulate: bool) {
    let verb = if simulate { "would change" } else { "changed" };
    let line = format!(
        "{} {verb}, {} unchanged, {} failed",
        summary.changed, summary.unchanged, summary.failed
    );
    if !summary.is_success() {
        error(&line);
    } else if summary.changed == 0 {
        info(&line);
    } else {
        success(&line);
    }
}

/// Progress bar over the resources of a bundle
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        Self { bar }
    }
}

impl ProgressCallback for BarProgress {
    fn on_apply_start(&mut self, total: usize) {
        self.bar.set_length(total as u64);
    }

    fn on_resource_start(&mut self, id: &str, _position: usize, _total: usize) {
        self.bar.set_message(id.to_string());
    }

    fn on_resource_complete(&mut self, id: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Changed => self
                .bar
                .suspend(|| println!("{} {}", "✓".green(), id)),
            Outcome::Unchanged => {}
            Outcome::Failed { error } => self
                .bar
                .suspend(|| eprintln!("{} {}: {}", "✗".red(), id, error)),
        }
        self.bar.inc(1);
    }

    fn on_apply_complete(&mut self) {
        self.bar.finish_and_clear();
    }
}
