#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::TaskminderError;
use crate::reminder::deeplink::{DeepLink, DeepLinkQueue};
use crate::task::storage::write_atomic;

pub const REMINDER_TITLE: &str = "Task Reminder";

/// What happens when the user activates a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationAction {
    OpenTask { task_id: i64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Same as the task id; a newer notification for the task replaces the old one.
    pub id: i64,
    pub title: String,
    pub body: String,
    pub action: NotificationAction,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Notification {
    #[must_use]
    pub fn reminder(task_id: i64, task_title: &str) -> Self {
        Self {
            id: task_id,
            title: REMINDER_TITLE.to_owned(),
            body: format!("Your task \"{task_title}\" is due soon."),
            action: NotificationAction::OpenTask { task_id },
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn show(&self, notification: &Notification) -> Result<(), TaskminderError>;
}

/// Keeps shown notifications on disk until the user opens or dismisses them.
#[derive(Debug, Clone)]
pub struct InboxNotifier {
    dir: PathBuf,
    links: DeepLinkQueue,
}

impl InboxNotifier {
    #[must_use]
    pub fn new(dir: PathBuf, links: DeepLinkQueue) -> Self {
        Self { dir, links }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Newest first.
    pub fn list(&self) -> anyhow::Result<Vec<Notification>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut out: Vec<Notification> = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Ok(data) = std::fs::read(&path) else {
                continue;
            };
            let Ok(n) = serde_json::from_slice(&data) else {
                continue;
            };
            out.push(n);
        }
        out.sort_by(|a: &Notification, b: &Notification| b.created_at.cmp(&a.created_at));
        Ok(out)
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<Notification>> {
        let path = self.path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let n = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(n))
    }

    pub fn dismiss(&self, id: i64) -> anyhow::Result<bool> {
        let path = self.path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
        }
    }

    /// Simulates a tap: removes the notification and emits its deep link.
    pub fn activate(&self, id: i64) -> anyhow::Result<DeepLink> {
        let n = self
            .get(id)?
            .ok_or(TaskminderError::NotificationNotFound(id))?;
        let NotificationAction::OpenTask { task_id } = n.action;
        let link = self.links.push(task_id)?;
        self.dismiss(id)?;
        tracing::info!(notification = id, task_id, "notification opened");
        Ok(link)
    }

    pub fn clear(&self) -> anyhow::Result<usize> {
        let mut removed = 0;
        for n in self.list()? {
            if self.dismiss(n.id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("notification-{id}.json"))
    }
}

impl Notifier for InboxNotifier {
    fn show(&self, notification: &Notification) -> Result<(), TaskminderError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| TaskminderError::IoPath {
            path: self.dir.clone(),
            source,
        })?;
        let data = serde_json::to_vec_pretty(notification)
            .map_err(|e| TaskminderError::Other(format!("failed to encode notification: {e}")))?;
        write_atomic(&self.path(notification.id), &data)
            .map_err(|e| TaskminderError::Other(format!("{e:#}")))
    }
}

/// Hands notifications to an external program such as `notify-send`.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    pub command: String,
}

impl CommandNotifier {
    #[must_use]
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

impl Notifier for CommandNotifier {
    fn show(&self, notification: &Notification) -> Result<(), TaskminderError> {
        let status = Command::new(&self.command)
            .arg(&notification.title)
            .arg(&notification.body)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .status()
            .map_err(|e| {
                TaskminderError::Other(format!("failed to run {}: {e}", self.command))
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(TaskminderError::Other(format!(
                "{} failed with exit code {code}",
                self.command,
                code = status.code().unwrap_or(1)
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inbox(dir: &Path) -> (InboxNotifier, DeepLinkQueue) {
        let links = DeepLinkQueue::new(dir.join("deeplinks"));
        (
            InboxNotifier::new(dir.join("notifications"), links.clone()),
            links,
        )
    }

    #[test]
    fn reminder_text_interpolates_title() {
        let n = Notification::reminder(4, "Pay rent");
        assert_eq!(n.id, 4);
        assert_eq!(n.title, "Task Reminder");
        assert_eq!(n.body, "Your task \"Pay rent\" is due soon.");
        assert_eq!(n.action, NotificationAction::OpenTask { task_id: 4 });
    }

    #[test]
    fn same_task_replaces_instead_of_stacking() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inbox, _links) = inbox(dir.path());
        inbox.show(&Notification::reminder(1, "old title")).unwrap();
        inbox.show(&Notification::reminder(1, "new title")).unwrap();
        inbox.show(&Notification::reminder(2, "other")).unwrap();

        let all = inbox.list().unwrap();
        assert_eq!(all.len(), 2);
        let first = inbox.get(1).unwrap().unwrap();
        assert!(first.body.contains("new title"));
    }

    #[test]
    fn activate_dismisses_and_pushes_deep_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inbox, links) = inbox(dir.path());
        inbox.show(&Notification::reminder(12, "call mom")).unwrap();

        let link = inbox.activate(12).unwrap();
        assert_eq!(link.task_id, 12);
        assert!(inbox.get(12).unwrap().is_none());
        assert_eq!(links.take_latest().unwrap(), Some(12));

        let err = inbox.activate(12).unwrap_err();
        assert!(err.to_string().contains("notification not found: 12"));
    }

    #[test]
    fn failed_deep_link_keeps_the_notification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inbox, _links) = inbox(dir.path());
        inbox.show(&Notification::reminder(7, "water plants")).unwrap();
        // A plain file where the link directory should be makes push fail.
        std::fs::write(dir.path().join("deeplinks"), b"").unwrap();

        assert!(inbox.activate(7).is_err());
        assert!(inbox.get(7).unwrap().is_some());
    }

    #[test]
    fn clear_removes_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (inbox, _links) = inbox(dir.path());
        inbox.show(&Notification::reminder(1, "a")).unwrap();
        inbox.show(&Notification::reminder(2, "b")).unwrap();
        assert_eq!(inbox.clear().unwrap(), 2);
        assert!(inbox.list().unwrap().is_empty());
    }

    #[test]
    fn failing_command_is_reported() {
        let notifier = CommandNotifier::new("taskminder-no-such-notifier".to_owned());
        let err = notifier
            .show(&Notification::reminder(1, "x"))
            .unwrap_err();
        assert!(err.to_string().contains("failed to run"));
    }
}
