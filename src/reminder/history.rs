#![forbid(unsafe_code)]

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Delivered,
    Failed,
}

/// Result of one fired reminder job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobOutcome {
    pub job_id: String,
    pub task_id: Option<i64>,
    pub task_title: Option<String>,
    pub status: OutcomeStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    #[serde(default)]
    pub error: Option<String>,
}

/// Append-only JSONL log of fired reminders.
#[derive(Debug, Clone)]
pub struct ReminderHistory {
    path: PathBuf,
}

impl ReminderHistory {
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, outcome: &JobOutcome) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Newest first.
    pub fn list(&self) -> anyhow::Result<Vec<JobOutcome>> {
        let mut out = self.read_all()?;
        out.reverse();
        Ok(out)
    }

    /// Drops entries finished before `now - retention_days`. Returns how many.
    pub fn prune(&self, retention_days: u64, now: OffsetDateTime) -> anyhow::Result<usize> {
        const MAX_DAYS: i64 = i64::MAX / 86_400;
        if !self.path.exists() {
            return Ok(0);
        }
        let retention_days = i64::try_from(retention_days)
            .unwrap_or(MAX_DAYS)
            .min(MAX_DAYS);
        let cutoff = now
            .checked_sub(time::Duration::days(retention_days))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);

        let all = self.read_all()?;
        let before = all.len();
        let kept: Vec<JobOutcome> = all.into_iter().filter(|o| o.finished_at >= cutoff).collect();
        let removed = before - kept.len();
        if removed == 0 {
            return Ok(0);
        }

        let mut data = String::new();
        for o in &kept {
            data.push_str(&serde_json::to_string(o)?);
            data.push('\n');
        }
        let tmp = self.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path).with_context(|| {
            format!("failed to rename {} -> {}", tmp.display(), self.path.display())
        })?;
        Ok(removed)
    }

    fn read_all(&self) -> anyhow::Result<Vec<JobOutcome>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        Ok(raw
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn outcome(job: &str, finished_at: OffsetDateTime) -> JobOutcome {
        JobOutcome {
            job_id: job.to_owned(),
            task_id: Some(1),
            task_title: Some("t".to_owned()),
            status: OutcomeStatus::Delivered,
            fire_at: finished_at,
            finished_at,
            error: None,
        }
    }

    #[test]
    fn list_returns_newest_first() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = ReminderHistory::new(dir.path().join("reminders.jsonl"));
        let now = OffsetDateTime::now_utc();
        history.append(&outcome("a", now - Duration::minutes(2))).unwrap();
        history.append(&outcome("b", now)).unwrap();

        let ids: Vec<String> = history.list().unwrap().into_iter().map(|o| o.job_id).collect();
        assert_eq!(ids, ["b", "a"]);
    }

    #[test]
    fn prune_drops_entries_past_retention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let history = ReminderHistory::new(dir.path().join("reminders.jsonl"));
        let now = OffsetDateTime::now_utc();
        history.append(&outcome("old", now - Duration::days(40))).unwrap();
        history.append(&outcome("new", now - Duration::days(1))).unwrap();

        assert_eq!(history.prune(30, now).unwrap(), 1);
        let left = history.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].job_id, "new");
        assert_eq!(history.prune(30, now).unwrap(), 0);
    }
}
