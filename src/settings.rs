#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::TaskminderError;

pub const LEAD_TIME_KEY: &str = "notification_lead_time";
pub const DEFAULT_LEAD_TIME_MINUTES: u32 = 10;
pub const LEAD_TIME_OPTIONS: [u32; 5] = [5, 10, 15, 30, 60];

/// Single persisted preference: minutes before the due time a reminder fires.
///
/// The store does not validate values; callers offering a choice to the user
/// go through [`validate_lead_time`].
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("settings.toml"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persisted lead time, or the default when unset or unreadable.
    #[must_use]
    pub fn get(&self) -> u32 {
        match self.try_get() {
            Ok(Some(minutes)) => minutes,
            Ok(None) => DEFAULT_LEAD_TIME_MINUTES,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to read settings; using default lead time");
                DEFAULT_LEAD_TIME_MINUTES
            }
        }
    }

    pub fn try_get(&self) -> anyhow::Result<Option<u32>> {
        let doc = self.load_doc()?;
        let Some(item) = doc.get(LEAD_TIME_KEY) else {
            return Ok(None);
        };
        let raw = item
            .as_integer()
            .with_context(|| format!("{LEAD_TIME_KEY} must be an integer"))?;
        let minutes = u32::try_from(raw)
            .with_context(|| format!("{LEAD_TIME_KEY} out of range: {raw}"))?;
        Ok(Some(minutes))
    }

    pub fn set(&self, minutes: u32) -> anyhow::Result<()> {
        let mut doc = self.load_doc()?;
        doc.insert(LEAD_TIME_KEY, toml_edit::value(i64::from(minutes)));

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&self.path, doc.to_string())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        tracing::debug!(minutes, "stored notification lead time");
        Ok(())
    }

    fn load_doc(&self) -> anyhow::Result<toml_edit::DocumentMut> {
        if !self.path.exists() {
            return Ok(toml_edit::DocumentMut::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        raw.parse::<toml_edit::DocumentMut>()
            .with_context(|| format!("failed to parse TOML in {}", self.path.display()))
    }
}

pub fn validate_lead_time(minutes: u32) -> Result<u32, TaskminderError> {
    if LEAD_TIME_OPTIONS.contains(&minutes) {
        Ok(minutes)
    } else {
        Err(TaskminderError::InvalidLeadTime(minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_lead_time_defaults_to_ten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path());
        assert_eq!(store.try_get().unwrap(), None);
        assert_eq!(store.get(), 10);
    }

    #[test]
    fn set_persists_and_keeps_other_content() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path());
        std::fs::write(store.path(), "# user notes\ntheme = \"dark\"\n").unwrap();

        store.set(30).unwrap();
        assert_eq!(store.get(), 30);

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("# user notes"));
        assert!(raw.contains("notification_lead_time = 30"));
    }

    #[test]
    fn store_accepts_values_outside_presets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path());
        store.set(7).unwrap();
        assert_eq!(store.get(), 7);
        assert!(validate_lead_time(7).is_err());
        assert_eq!(validate_lead_time(15).unwrap(), 15);
    }

    #[test]
    fn unreadable_value_falls_back_to_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SettingsStore::new(dir.path());
        std::fs::write(store.path(), "notification_lead_time = \"soon\"\n").unwrap();
        assert!(store.try_get().is_err());
        assert_eq!(store.get(), DEFAULT_LEAD_TIME_MINUTES);
    }
}
