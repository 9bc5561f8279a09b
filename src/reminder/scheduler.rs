#![forbid(unsafe_code)]

use time::{Duration, OffsetDateTime};

use crate::reminder::queue::{JobPayload, JobQueue};
use crate::settings::SettingsStore;
use crate::task::model::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Scheduled { fire_at: OffsetDateTime },
    /// Reminders are switched off for the task.
    Disabled,
    /// The due time is already inside the lead window (or past).
    InsideLeadWindow,
}

/// Time left until a reminder should fire, if one should fire at all.
#[must_use]
pub fn reminder_delay(
    due_time: OffsetDateTime,
    now: OffsetDateTime,
    lead_time_minutes: u32,
) -> Option<Duration> {
    let delay = due_time - now - Duration::minutes(i64::from(lead_time_minutes));
    delay.is_positive().then_some(delay)
}

/// Keeps at most one pending reminder job per task, tagged by task id.
#[derive(Debug, Clone)]
pub struct ReminderScheduler {
    jobs: JobQueue,
    settings: SettingsStore,
}

impl ReminderScheduler {
    #[must_use]
    pub fn new(jobs: JobQueue, settings: SettingsStore) -> Self {
        Self { jobs, settings }
    }

    #[must_use]
    pub fn jobs(&self) -> &JobQueue {
        &self.jobs
    }

    #[must_use]
    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn schedule_notification(&self, task: &Task) -> anyhow::Result<ScheduleOutcome> {
        self.schedule_at(task, OffsetDateTime::now_utc())
    }

    pub fn schedule_at(&self, task: &Task, now: OffsetDateTime) -> anyhow::Result<ScheduleOutcome> {
        self.cancel_notification(task)?;

        if !task.is_notification_enabled {
            tracing::debug!(task_id = task.id, "reminder disabled; nothing scheduled");
            return Ok(ScheduleOutcome::Disabled);
        }

        let lead = self.settings.get();
        let Some(delay) = reminder_delay(task.due_time, now, lead) else {
            tracing::debug!(
                task_id = task.id,
                lead_minutes = lead,
                "due time inside lead window; nothing scheduled"
            );
            return Ok(ScheduleOutcome::InsideLeadWindow);
        };

        let fire_at = now + delay;
        let payload = JobPayload {
            task_id: Some(task.id),
            task_title: Some(task.title.clone()),
        };
        let job = self
            .jobs
            .enqueue(&tag_for(task.id), payload, fire_at)
            .inspect_err(|e| {
                tracing::warn!(task_id = task.id, error = %e, "failed to enqueue reminder");
            })?;
        tracing::debug!(task_id = task.id, job_id = %job.job_id, %fire_at, "reminder scheduled");
        Ok(ScheduleOutcome::Scheduled { fire_at })
    }

    pub fn cancel_notification(&self, task: &Task) -> anyhow::Result<()> {
        let removed = self.jobs.cancel_by_tag(&tag_for(task.id))?;
        if removed > 0 {
            tracing::debug!(task_id = task.id, removed, "cancelled pending reminder");
        }
        Ok(())
    }
}

#[must_use]
pub fn tag_for(task_id: i64) -> String {
    task_id.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::model::NewTask;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: SettingsStore,
        scheduler: ReminderScheduler,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("tempdir");
        let settings = SettingsStore::new(dir.path());
        let jobs = JobQueue::new(dir.path().join("jobs"));
        let scheduler = ReminderScheduler::new(jobs, settings.clone());
        Fixture {
            _dir: dir,
            settings,
            scheduler,
        }
    }

    fn task_due(id: i64, now: OffsetDateTime, in_minutes: i64) -> Task {
        NewTask::new(format!("task {id}"), now + Duration::minutes(in_minutes)).into_task(id, now)
    }

    fn pending(f: &Fixture, id: i64) -> usize {
        f.scheduler.jobs().pending_for_tag(&tag_for(id)).unwrap().len()
    }

    #[test]
    fn due_in_twenty_minutes_fires_ten_minutes_from_now() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let task = task_due(1, now, 20);

        let outcome = f.scheduler.schedule_at(&task, now).unwrap();
        assert_eq!(
            outcome,
            ScheduleOutcome::Scheduled {
                fire_at: now + Duration::minutes(10)
            }
        );

        let jobs = f.scheduler.jobs().pending_for_tag("1").unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].fire_at, now + Duration::minutes(10));
        assert_eq!(jobs[0].payload.task_id, Some(1));
        assert_eq!(jobs[0].payload.task_title.as_deref(), Some("task 1"));
    }

    #[test]
    fn due_inside_lead_window_schedules_nothing() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();

        let soon = task_due(1, now, 5);
        assert_eq!(
            f.scheduler.schedule_at(&soon, now).unwrap(),
            ScheduleOutcome::InsideLeadWindow
        );
        assert_eq!(pending(&f, 1), 0);

        let exactly = task_due(2, now, 10);
        assert_eq!(
            f.scheduler.schedule_at(&exactly, now).unwrap(),
            ScheduleOutcome::InsideLeadWindow
        );

        let overdue = task_due(3, now, -30);
        f.scheduler.schedule_at(&overdue, now).unwrap();
        assert!(f.scheduler.jobs().list().unwrap().is_empty());
    }

    #[test]
    fn disabled_reminder_never_leaves_a_job() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let task = task_due(4, now, 120);
        f.scheduler.schedule_at(&task, now).unwrap();
        assert_eq!(pending(&f, 4), 1);

        let muted = task.with_notification(false);
        assert_eq!(
            f.scheduler.schedule_at(&muted, now).unwrap(),
            ScheduleOutcome::Disabled
        );
        assert_eq!(pending(&f, 4), 0);
    }

    #[test]
    fn moving_due_time_into_window_removes_prior_job() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let task = task_due(5, now, 60);
        f.scheduler.schedule_at(&task, now).unwrap();

        let moved = Task {
            due_time: now + Duration::minutes(3),
            ..task
        };
        f.scheduler.schedule_at(&moved, now).unwrap();
        assert_eq!(pending(&f, 5), 0);
    }

    #[test]
    fn rescheduling_keeps_a_single_job_per_task() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let task = task_due(6, now, 90);
        f.scheduler.schedule_at(&task, now).unwrap();
        f.scheduler.schedule_at(&task, now).unwrap();
        f.scheduler.schedule_notification(&task).unwrap();
        assert_eq!(pending(&f, 6), 1);
    }

    #[test]
    fn lead_time_is_read_on_every_call() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let task = task_due(7, now, 20);

        f.settings.set(30).unwrap();
        assert_eq!(
            f.scheduler.schedule_at(&task, now).unwrap(),
            ScheduleOutcome::InsideLeadWindow
        );

        f.settings.set(5).unwrap();
        assert_eq!(
            f.scheduler.schedule_at(&task, now).unwrap(),
            ScheduleOutcome::Scheduled {
                fire_at: now + Duration::minutes(15)
            }
        );
    }

    #[test]
    fn cancel_without_pending_job_is_harmless() {
        let f = fixture();
        let now = OffsetDateTime::now_utc();
        let other = task_due(8, now, 60);
        f.scheduler.schedule_at(&other, now).unwrap();

        f.scheduler
            .cancel_notification(&task_due(9, now, 60))
            .unwrap();
        assert_eq!(pending(&f, 8), 1);
    }

    #[test]
    fn delay_is_strictly_positive() {
        let now = OffsetDateTime::UNIX_EPOCH;
        assert_eq!(reminder_delay(now + Duration::minutes(10), now, 10), None);
        assert_eq!(
            reminder_delay(now + Duration::minutes(11), now, 10),
            Some(Duration::minutes(1))
        );
    }
}
