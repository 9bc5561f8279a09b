#![forbid(unsafe_code)]

use std::sync::Arc;

use crate::clock;
use crate::data_dir::DataDir;
use crate::reminder::queue::JobQueue;
use crate::reminder::scheduler::{ReminderScheduler, ScheduleOutcome};
use crate::settings::SettingsStore;
use crate::task::model::{NewTask, Task};
use crate::task::storage::TaskStore;

/// What the list views show: a search over title, description and category,
/// optionally without completed tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    pub query: String,
    pub hide_completed: bool,
}

impl TaskFilter {
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if self.hide_completed && task.is_completed {
            return false;
        }
        let q = self.query.trim().to_lowercase();
        if q.is_empty() {
            return true;
        }
        task.title.to_lowercase().contains(&q)
            || task.description.to_lowercase().contains(&q)
            || task.category.to_lowercase().contains(&q)
    }
}

#[must_use]
pub fn filter_tasks<'a>(tasks: &'a [Task], filter: &TaskFilter) -> Vec<&'a Task> {
    tasks.iter().filter(|t| filter.matches(t)).collect()
}

/// Mutates tasks and keeps their reminders in step.
///
/// Disk work runs on the blocking pool so interactive callers never stall.
#[derive(Debug, Clone)]
pub struct TaskController {
    store: Arc<TaskStore>,
    scheduler: ReminderScheduler,
}

impl TaskController {
    #[must_use]
    pub fn new(store: Arc<TaskStore>, scheduler: ReminderScheduler) -> Self {
        Self { store, scheduler }
    }

    pub fn open(data_dir: &DataDir) -> anyhow::Result<Self> {
        let store = TaskStore::open(data_dir.tasks())?;
        let scheduler = ReminderScheduler::new(
            JobQueue::new(data_dir.jobs()),
            SettingsStore::new(data_dir.root()),
        );
        Ok(Self::new(Arc::new(store), scheduler))
    }

    #[must_use]
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    #[must_use]
    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// Closes the store once no other handle shares it.
    pub fn close(self) {
        match Arc::try_unwrap(self.store) {
            Ok(store) => store.close(),
            Err(_) => tracing::debug!("task store still shared; left open"),
        }
    }

    pub async fn add(&self, new: NewTask) -> anyhow::Result<(Task, ScheduleOutcome)> {
        let this = self.clone();
        blocking(move || {
            let task = this.store.insert(new)?;
            let outcome = this.sync_reminder(&task)?;
            Ok((task, outcome))
        })
        .await
    }

    pub async fn update(&self, task: Task) -> anyhow::Result<ScheduleOutcome> {
        let this = self.clone();
        blocking(move || {
            this.store.update(&task)?;
            this.sync_reminder(&task)
        })
        .await
    }

    pub async fn set_completed(
        &self,
        id: i64,
        is_completed: bool,
    ) -> anyhow::Result<(Task, ScheduleOutcome)> {
        self.modify(id, move |t| t.with_completed(is_completed)).await
    }

    pub async fn set_notification(
        &self,
        id: i64,
        enabled: bool,
    ) -> anyhow::Result<(Task, ScheduleOutcome)> {
        self.modify(id, move |t| t.with_notification(enabled)).await
    }

    /// Deletes the task and cancels its reminder. Returns the removed task.
    pub async fn delete(&self, id: i64) -> anyhow::Result<Option<Task>> {
        let this = self.clone();
        blocking(move || {
            let Some(task) = this.store.get(id)? else {
                return Ok(None);
            };
            this.store.delete(id)?;
            this.scheduler.cancel_notification(&task)?;
            Ok(Some(task))
        })
        .await
    }

    /// Re-runs scheduling for every enabled, incomplete task so a new lead
    /// time takes effect. Returns how many reminders are now pending.
    pub async fn reschedule_active(&self) -> anyhow::Result<usize> {
        let this = self.clone();
        blocking(move || {
            let mut scheduled = 0;
            for task in this.store.list()? {
                if !task.wants_reminder() {
                    continue;
                }
                if let ScheduleOutcome::Scheduled { .. } =
                    this.scheduler.schedule_notification(&task)?
                {
                    scheduled += 1;
                }
            }
            tracing::info!(scheduled, "rescheduled active reminders");
            Ok(scheduled)
        })
        .await
    }

    async fn modify(
        &self,
        id: i64,
        change: impl FnOnce(&Task) -> Task + Send + 'static,
    ) -> anyhow::Result<(Task, ScheduleOutcome)> {
        let this = self.clone();
        blocking(move || {
            let current = this.store.require(id)?;
            let task = change(&current);
            this.store.update(&task)?;
            let outcome = this.sync_reminder(&task)?;
            Ok((task, outcome))
        })
        .await
    }

    // Completed tasks keep no reminder; everything else follows the scheduler.
    fn sync_reminder(&self, task: &Task) -> anyhow::Result<ScheduleOutcome> {
        if task.is_completed {
            self.scheduler.cancel_notification(task)?;
            return Ok(ScheduleOutcome::Disabled);
        }
        self.scheduler.schedule_notification(task)
    }
}

#[must_use]
pub fn describe_outcome(outcome: ScheduleOutcome) -> String {
    match outcome {
        ScheduleOutcome::Scheduled { fire_at } => {
            format!("reminder at {}", clock::format_local(fire_at))
        }
        ScheduleOutcome::Disabled => "no reminder".to_owned(),
        ScheduleOutcome::InsideLeadWindow => "too close to due time for a reminder".to_owned(),
    }
}

async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}
