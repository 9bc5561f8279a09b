#![forbid(unsafe_code)]

use thiserror::Error;

use crate::error::TaskminderError;
use crate::reminder::notifier::{Notification, Notifier};
use crate::reminder::queue::JobPayload;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// The job can never succeed; it is not retried.
    #[error("reminder job has no task title")]
    MissingTitle,

    #[error("notification could not be shown: {0}")]
    Notify(#[from] TaskminderError),
}

/// Identity used when a job lost its task id. Opening it resolves to no task.
pub const UNKNOWN_TASK_ID: i64 = -1;

/// Runs when a reminder job fires: turns the payload into a notification and
/// hands it to the display facility.
pub struct ReminderDispatcher<'a> {
    notifier: &'a dyn Notifier,
}

impl<'a> ReminderDispatcher<'a> {
    #[must_use]
    pub fn new(notifier: &'a dyn Notifier) -> Self {
        Self { notifier }
    }

    pub fn dispatch(&self, payload: &JobPayload) -> Result<Notification, DispatchError> {
        let title = payload
            .task_title
            .as_deref()
            .ok_or(DispatchError::MissingTitle)?;
        let task_id = payload.task_id.unwrap_or(UNKNOWN_TASK_ID);

        let notification = Notification::reminder(task_id, title);
        self.notifier.show(&notification)?;
        tracing::info!(task_id, "reminder delivered");
        Ok(notification)
    }
}
