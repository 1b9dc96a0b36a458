//! Pending policy overrides produced by fired events
//!
//! When a resource changes, observers bound to it get an override so their
//! next apply uses the triggered policy. The table can be persisted so a run
//! that aborts part way can be resumed with the same pending overrides.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Name of the save file within the state directory
pub const SAVE_FILE: &str = "events.saved";

/// Run-scoped table of `resource id -> policy name` overrides
#[derive(Debug, Default)]
pub struct EventState {
    overrides: BTreeMap<String, String>,
    save_file: Option<PathBuf>,
    simulate: bool,
    loaded: bool,
}

impl EventState {
    /// In-memory state, never persisted.
    pub fn new() -> Self {
        Self {
            loaded: true,
            ..Self::default()
        }
    }

    /// State persisted to `path` on every change, unless simulating.
    ///
    /// Existing saved overrides are only read by [`load`](Self::load) or on
    /// the first change.
    pub fn with_save_file(path: impl Into<PathBuf>, simulate: bool) -> Self {
        Self {
            overrides: BTreeMap::new(),
            save_file: Some(path.into()),
            simulate,
            loaded: false,
        }
    }

    pub fn save_file(&self) -> Option<&Path> {
        self.save_file.as_deref()
    }

    /// Read saved overrides, once.
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        self.loaded = true;
        let Some(path) = &self.save_file else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(path)?;
        self.overrides = serde_json::from_str(&data).map_err(|source| Error::EventState {
            path: path.clone(),
            source,
        })?;
        log::info!(
            "resuming with {} pending event(s) from {}",
            self.overrides.len(),
            path.display()
        );
        Ok(())
    }

    /// Make `resource` use `policy` on its next apply.
    pub fn override_policy(&mut self, resource: &str, policy: &str) -> Result<()> {
        self.load()?;
        self.overrides
            .insert(resource.to_string(), policy.to_string());
        self.save()
    }

    /// Consume the override of `resource`, if any.
    pub fn clear_override(&mut self, resource: &str) -> Result<()> {
        self.load()?;
        if self.overrides.remove(resource).is_some() {
            self.save()?;
        }
        Ok(())
    }

    pub fn overridden_policy(&self, resource: &str) -> Option<&str> {
        self.overrides.get(resource).map(String::as_str)
    }

    pub fn overrides(&self) -> &BTreeMap<String, String> {
        &self.overrides
    }

    /// Forget every override without touching the save file.
    pub fn reset(&mut self) {
        self.overrides.clear();
    }

    /// Write the table to the save file. Does nothing when simulating.
    pub fn save(&self) -> Result<()> {
        if self.simulate {
            return Ok(());
        }
        let Some(path) = &self.save_file else {
            return Ok(());
        };
        let data = serde_json::to_string(&self.overrides).map_err(|source| Error::EventState {
            path: path.clone(),
            source,
        })?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Remove the save file after a completed run. Does nothing when simulating.
    pub fn discard(&self) -> Result<()> {
        if self.simulate {
            return Ok(());
        }
        if let Some(path) = &self.save_file
            && path.exists()
        {
            fs::remove_file(path)?;
            log::debug!("removed {}", path.display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_in_memory_override_and_clear() {
        let mut state = EventState::new();
        state.override_policy("Service[x]", "restart").unwrap();
        assert_eq!(state.overridden_policy("Service[x]"), Some("restart"));
        state.clear_override("Service[x]").unwrap();
        assert_eq!(state.overridden_policy("Service[x]"), None);
    }

    #[test]
    fn test_overrides_are_persisted_and_resumed() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SAVE_FILE);

        let mut first = EventState::with_save_file(&path, false);
        first.override_policy("Service[x]", "restart").unwrap();
        first.override_policy("Execute[y]", "execute").unwrap();
        first.clear_override("Execute[y]").unwrap();
        assert!(path.exists());

        let mut resumed = EventState::with_save_file(&path, false);
        assert_eq!(resumed.overridden_policy("Service[x]"), None);
        resumed.load().unwrap();
        assert_eq!(resumed.overridden_policy("Service[x]"), Some("restart"));
        assert_eq!(resumed.overridden_policy("Execute[y]"), None);

        resumed.discard().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_simulate_never_writes() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SAVE_FILE);
        let mut state = EventState::with_save_file(&path, true);
        state.override_policy("Service[x]", "restart").unwrap();
        assert_eq!(state.overridden_policy("Service[x]"), Some("restart"));
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_save_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(SAVE_FILE);
        fs::write(&path, "not json").unwrap();
        let mut state = EventState::with_save_file(&path, false);
        let err = state.load().unwrap_err();
        assert!(matches!(err, Error::EventState { .. }));
    }
}
