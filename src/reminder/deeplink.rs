#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::task::storage::write_atomic;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeepLink {
    pub task_id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One-shot navigation events from activated notifications.
///
/// Every pushed link is returned by exactly one `drain` call.
#[derive(Debug, Clone)]
pub struct DeepLinkQueue {
    dir: PathBuf,
}

impl DeepLinkQueue {
    #[must_use]
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn push(&self, task_id: i64) -> anyhow::Result<DeepLink> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let link = DeepLink {
            task_id,
            created_at: OffsetDateTime::now_utc(),
        };
        // Name sorts by creation time so drain order follows push order.
        let name = format!(
            "link-{:020}-{}.json",
            link.created_at.unix_timestamp_nanos(),
            Uuid::new_v4().simple()
        );
        write_atomic(&self.dir.join(name), &serde_json::to_vec_pretty(&link)?)?;
        Ok(link)
    }

    /// Takes every pending link, oldest first.
    ///
    /// A link is only returned if this call was the one that removed its file,
    /// so two concurrent drains never both see the same event.
    pub fn drain(&self) -> anyhow::Result<Vec<DeepLink>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut links = Vec::new();
        for path in paths {
            let Ok(data) = std::fs::read(&path) else {
                continue;
            };
            if std::fs::remove_file(&path).is_err() {
                continue;
            }
            match serde_json::from_slice::<DeepLink>(&data) {
                Ok(link) => links.push(link),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "dropping unreadable deep link");
                }
            }
        }
        Ok(links)
    }

    /// The most recent pending link target, consuming all pending links.
    pub fn take_latest(&self) -> anyhow::Result<Option<i64>> {
        Ok(self.drain()?.last().map(|l| l.task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn links_are_consumed_exactly_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = DeepLinkQueue::new(dir.path().join("deeplinks"));

        assert!(queue.drain().unwrap().is_empty());
        queue.push(3).unwrap();
        queue.push(8).unwrap();

        let ids: Vec<i64> = queue.drain().unwrap().iter().map(|l| l.task_id).collect();
        assert_eq!(ids, [3, 8]);
        assert!(queue.drain().unwrap().is_empty());
    }

    #[test]
    fn take_latest_keeps_newest_and_clears_rest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let queue = DeepLinkQueue::new(dir.path().to_path_buf());
        queue.push(1).unwrap();
        queue.push(2).unwrap();
        assert_eq!(queue.take_latest().unwrap(), Some(2));
        assert_eq!(queue.take_latest().unwrap(), None);
    }
}
