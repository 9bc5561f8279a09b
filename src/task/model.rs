#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Category suggestions offered by the add/edit flows. Stored as free text.
pub const CATEGORIES: [&str; 4] = ["Personal", "Work", "Shopping", "Other"];

#[must_use]
pub fn default_category() -> String {
    CATEGORIES[0].to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    pub creation_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub due_time: OffsetDateTime,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub is_notification_enabled: bool,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// A task before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub due_time: OffsetDateTime,
    pub is_notification_enabled: bool,
    pub attachments: Vec<String>,
}

impl NewTask {
    #[must_use]
    pub fn new(title: impl Into<String>, due_time: OffsetDateTime) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            category: default_category(),
            due_time,
            is_notification_enabled: true,
            attachments: Vec::new(),
        }
    }

    #[must_use]
    pub fn into_task(self, id: i64, creation_time: OffsetDateTime) -> Task {
        Task {
            id,
            title: self.title,
            description: self.description,
            category: self.category,
            creation_time,
            due_time: self.due_time,
            is_completed: false,
            is_notification_enabled: self.is_notification_enabled,
            attachments: self.attachments,
        }
    }
}

impl Task {
    /// Whether the reminder subsystem should keep a job for this task.
    #[must_use]
    pub fn wants_reminder(&self) -> bool {
        self.is_notification_enabled && !self.is_completed
    }

    #[must_use]
    pub fn with_completed(&self, is_completed: bool) -> Self {
        Self {
            is_completed,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_notification(&self, is_notification_enabled: bool) -> Self {
        Self {
            is_notification_enabled,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_json_uses_rfc3339_and_defaults() {
        let raw = r#"{
            "id": 7,
            "title": "Buy milk",
            "creation_time": "2026-01-01T10:00:00Z",
            "due_time": "2026-01-02T10:00:00Z"
        }"#;
        let task: Task = serde_json::from_str(raw).unwrap();
        assert_eq!(task.id, 7);
        assert_eq!(task.category, "Personal");
        assert!(!task.is_completed);
        assert!(!task.is_notification_enabled);
        assert!(task.attachments.is_empty());

        let out = serde_json::to_string(&task).unwrap();
        assert!(out.contains("\"due_time\":\"2026-01-02T10:00:00Z\""));
    }

    #[test]
    fn copies_replace_single_fields() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let task = NewTask::new("t", now).into_task(1, now);
        let done = task.with_completed(true);
        assert!(done.is_completed);
        assert_eq!(done.id, task.id);
        assert!(!done.wants_reminder());
        assert!(task.wants_reminder());
        assert!(!task.with_notification(false).wants_reminder());
    }
}
