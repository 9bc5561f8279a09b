#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

/// On-disk layout of everything taskminder persists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn tasks(&self) -> PathBuf {
        self.root.join("tasks")
    }

    #[must_use]
    pub fn jobs(&self) -> PathBuf {
        self.root.join("jobs")
    }

    #[must_use]
    pub fn notifications(&self) -> PathBuf {
        self.root.join("notifications")
    }

    #[must_use]
    pub fn deeplinks(&self) -> PathBuf {
        self.root.join("deeplinks")
    }

    #[must_use]
    pub fn history(&self) -> PathBuf {
        self.root.join("reminders.jsonl")
    }

    #[must_use]
    pub fn worker_lock(&self) -> PathBuf {
        self.root.join("worker.lock")
    }

    #[must_use]
    pub fn worker_stop(&self) -> PathBuf {
        self.root.join("worker.stop")
    }
}
