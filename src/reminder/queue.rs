#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::task::storage::write_atomic;

/// Data handed to the dispatcher when a job fires.
///
/// Both fields are optional on disk so that a damaged job still loads and can
/// be rejected by the dispatcher instead of being silently dropped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobPayload {
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub task_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub tag: String,
    pub payload: JobPayload,
    #[serde(with = "time::serde::rfc3339")]
    pub fire_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub enqueued_at: OffsetDateTime,
}

impl JobRecord {
    #[must_use]
    pub fn new_id() -> String {
        let id = Uuid::new_v4().simple().to_string();
        let short: String = id.chars().take(12).collect();
        format!("job-{short}")
    }

    #[must_use]
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.fire_at <= now
    }
}

/// Durable one-shot job table. Jobs outlive the process that enqueued them
/// and are removed by tag or after the worker has run them.
#[derive(Debug, Clone)]
pub struct JobQueue {
    dir: PathBuf,
}

impl JobQueue {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create job dir {}", self.dir.display()))
    }

    pub fn enqueue(
        &self,
        tag: &str,
        payload: JobPayload,
        fire_at: OffsetDateTime,
    ) -> anyhow::Result<JobRecord> {
        self.ensure_dir()?;
        let job = JobRecord {
            job_id: JobRecord::new_id(),
            tag: tag.to_owned(),
            payload,
            fire_at,
            enqueued_at: OffsetDateTime::now_utc(),
        };
        write_atomic(&self.job_path(&job.job_id), &serde_json::to_vec_pretty(&job)?)?;
        Ok(job)
    }

    /// Removes every job carrying `tag`. Returns how many were removed.
    pub fn cancel_by_tag(&self, tag: &str) -> anyhow::Result<usize> {
        let mut removed = 0;
        for job in self.list()? {
            if job.tag == tag && self.remove(&job.job_id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn pending_for_tag(&self, tag: &str) -> anyhow::Result<Vec<JobRecord>> {
        let mut jobs = self.list()?;
        jobs.retain(|j| j.tag == tag);
        Ok(jobs)
    }

    pub fn due(&self, now: OffsetDateTime) -> anyhow::Result<Vec<JobRecord>> {
        let mut jobs = self.list()?;
        jobs.retain(|j| j.is_due(now));
        Ok(jobs)
    }

    /// All jobs ordered by fire time.
    pub fn list(&self) -> anyhow::Result<Vec<JobRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut jobs: Vec<JobRecord> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?
        {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = std::fs::read(&path) else {
                continue;
            };
            match serde_json::from_slice(&data) {
                Ok(job) => jobs.push(job),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable job");
                }
            }
        }
        jobs.sort_by(|a: &JobRecord, b: &JobRecord| {
            a.fire_at.cmp(&b.fire_at).then_with(|| a.job_id.cmp(&b.job_id))
        });
        Ok(jobs)
    }

    /// Returns whether the job existed. A job already run or cancelled is not
    /// an error.
    pub fn remove(&self, job_id: &str) -> anyhow::Result<bool> {
        let path = self.job_path(job_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    fn job_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{job_id}.json"))
    }
}
