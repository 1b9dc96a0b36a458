//! Audit trail of a run
//!
//! Each resource apply is bracketed as a [`ResourceRecord`]. Changes made
//! by providers are recorded under the record that was open at the time.

use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::Result;

/// A unit of work performed by a provider
pub trait Change {
    /// Human readable summary, e.g. `chmod 644 /etc/motd`
    fn describe(&self) -> String;

    /// Perform the change. Returns whether the target was modified.
    ///
    /// Implementations must not mutate the target when `ctx.simulate` is set,
    /// but must still report whether they would have.
    fn apply(&mut self, ctx: &mut Context<'_>) -> Result<bool>;
}

/// How a resource apply ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Changed,
    Unchanged,
    Failed { error: String },
}

impl Outcome {
    /// Outcome of a resource apply that returned `result`.
    pub fn of(result: &Result<bool>) -> Self {
        match result {
            Ok(true) => Self::Changed,
            Ok(false) => Self::Unchanged,
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed)
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// Everything recorded while one resource was applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    /// Descriptions of changes that modified the target
    pub changes: Vec<String>,
    /// Informational output from providers
    pub messages: Vec<String>,
    pub outcome: Option<Outcome>,
}

/// Counts of resource outcomes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplySummary {
    pub changed: usize,
    pub unchanged: usize,
    pub failed: usize,
}

impl ApplySummary {
    pub fn total(&self) -> usize {
        self.changed + self.unchanged + self.failed
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn add_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Changed => self.changed += 1,
            Outcome::Unchanged => self.unchanged += 1,
            Outcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Records of every resource applied in a run
#[derive(Debug, Default)]
pub struct ChangeLog {
    records: Vec<ResourceRecord>,
    current: Option<usize>,
    changed: bool,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the record for `id`.
    pub fn begin(&mut self, id: &str) {
        self.records.push(ResourceRecord {
            id: id.to_string(),
            changes: Vec::new(),
            messages: Vec::new(),
            outcome: None,
        });
        self.current = Some(self.records.len() - 1);
    }

    /// Close the open record.
    pub fn finish(&mut self, outcome: Outcome) {
        if let Some(record) = self.current.take().and_then(|i| self.records.get_mut(i)) {
            if let Outcome::Failed { error } = &outcome {
                log::error!("[{}] {}", record.id, error);
            }
            record.outcome = Some(outcome);
        }
    }

    /// Id of the resource being applied.
    pub fn current(&self) -> Option<&str> {
        self.current
            .and_then(|i| self.records.get(i))
            .map(|r| r.id.as_str())
    }

    /// Record the outcome of a change under the open resource.
    pub fn record_change(&mut self, description: &str, changed: bool) {
        if !changed {
            log::debug!("[{}] {} (no change)", self.current().unwrap_or("-"), description);
            return;
        }
        self.changed = true;
        log::info!("[{}] {}", self.current().unwrap_or("-"), description);
        if let Some(record) = self.current.and_then(|i| self.records.get_mut(i)) {
            record.changes.push(description.to_string());
        }
    }

    /// Provider output for the open resource.
    pub fn info(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::info!("[{}] {}", self.current().unwrap_or("-"), message);
        if let Some(record) = self.current.and_then(|i| self.records.get_mut(i)) {
            record.messages.push(message);
        }
    }

    /// Whether any recorded change modified the target.
    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn records(&self) -> &[ResourceRecord] {
        &self.records
    }

    pub fn summary(&self) -> ApplySummary {
        let mut summary = ApplySummary::default();
        for outcome in self.records.iter().filter_map(|r| r.outcome.as_ref()) {
            summary.add_outcome(outcome);
        }
        summary
    }
}
