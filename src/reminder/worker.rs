#![forbid(unsafe_code)]

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::data_dir::DataDir;
use crate::reminder::dispatcher::ReminderDispatcher;
use crate::reminder::history::{JobOutcome, OutcomeStatus, ReminderHistory};
use crate::reminder::notifier::Notifier;
use crate::reminder::queue::{JobQueue, JobRecord};

#[derive(Clone)]
pub struct WorkerConfig {
    pub data_dir: DataDir,
    pub poll_interval: Duration,
    /// Run the due jobs once and exit instead of polling.
    pub once: bool,
    pub history_retention_days: u64,
    pub auto_cleanup: bool,
    pub notifier: Arc<dyn Notifier>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerLock {
    pub pid: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatusReport {
    pub running: bool,
    pub pid: Option<u32>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub stop_requested: bool,
    pub pending_jobs: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub next_fire_at: Option<OffsetDateTime>,
}

pub fn load_worker_lock(data_dir: &DataDir) -> anyhow::Result<Option<WorkerLock>> {
    let path = data_dir.worker_lock();
    if !path.exists() {
        return Ok(None);
    }
    let data =
        std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
    let lock: WorkerLock = serde_json::from_slice(&data)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(lock))
}

pub fn worker_status(data_dir: &DataDir) -> anyhow::Result<WorkerStatusReport> {
    let lock = load_worker_lock(data_dir)?;
    let jobs = JobQueue::new(data_dir.jobs()).list()?;

    Ok(WorkerStatusReport {
        running: lock.is_some(),
        pid: lock.as_ref().map(|l| l.pid),
        started_at: lock.as_ref().map(|l| l.started_at),
        stop_requested: data_dir.worker_stop().exists(),
        pending_jobs: jobs.len(),
        next_fire_at: jobs.first().map(|j| j.fire_at),
    })
}

pub async fn request_stop(data_dir: &DataDir, timeout: Duration) -> anyhow::Result<bool> {
    if load_worker_lock(data_dir)?.is_none() {
        return Ok(false);
    }
    let stop = data_dir.worker_stop();
    std::fs::write(&stop, b"stop\n")
        .with_context(|| format!("failed to write {}", stop.display()))?;

    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if !data_dir.worker_lock().exists() {
            return Ok(true);
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    Ok(false)
}

/// Polls the job queue and fires every due reminder until stopped.
pub async fn run_worker(cfg: WorkerConfig) -> anyhow::Result<()> {
    let root = cfg.data_dir.root();
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create {}", root.display()))?;

    let queue = JobQueue::new(cfg.data_dir.jobs());
    let history = ReminderHistory::new(cfg.data_dir.history());

    let lock_file = cfg.data_dir.worker_lock();
    if lock_file.exists() {
        anyhow::bail!("worker already running ({} exists)", lock_file.display());
    }

    let lock = WorkerLock {
        pid: std::process::id(),
        started_at: OffsetDateTime::now_utc(),
    };
    std::fs::write(&lock_file, serde_json::to_vec_pretty(&lock)?)
        .with_context(|| format!("failed to write {}", lock_file.display()))?;

    let stop_file = cfg.data_dir.worker_stop();
    let _guard = WorkerGuard {
        lock_file: lock_file.clone(),
        stop_file: stop_file.clone(),
    };
    tracing::info!(pid = lock.pid, data_dir = %root.display(), "reminder worker started");

    if cfg.auto_cleanup && cfg.history_retention_days > 0 {
        match history.prune(cfg.history_retention_days, OffsetDateTime::now_utc()) {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "pruned reminder history"),
            Err(e) => tracing::warn!(error = %e, "reminder history cleanup failed"),
        }
    }

    if cfg.once {
        for job in queue.due(OffsetDateTime::now_utc())? {
            let queue = queue.clone();
            let history = history.clone();
            let notifier = Arc::clone(&cfg.notifier);
            let job_id = job.job_id.clone();
            let res =
                tokio::task::spawn_blocking(move || run_job(&queue, &history, notifier.as_ref(), &job))
                    .await;
            match res {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!(%job_id, error = %e, "reminder job bookkeeping failed"),
                Err(e) => tracing::warn!(%job_id, error = %e, "reminder job join error"),
            }
        }
        tracing::info!("reminder worker finished single pass");
        return Ok(());
    }

    let mut ticker = tokio::time::interval(cfg.poll_interval);
    let mut joinset: tokio::task::JoinSet<(String, anyhow::Result<OutcomeStatus>)> =
        tokio::task::JoinSet::new();
    let mut in_flight: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break;
            }
            _ = ticker.tick() => {}
            Some(res) = joinset.join_next() => {
                finish(res, &mut in_flight);
            }
        }

        if stop_file.exists() {
            break;
        }

        while let Some(res) = joinset.try_join_next() {
            finish(res, &mut in_flight);
        }

        let due = match queue.due(OffsetDateTime::now_utc()) {
            Ok(due) => due,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read job queue");
                continue;
            }
        };

        for job in due {
            if !in_flight.insert(job.job_id.clone()) {
                continue;
            }
            let queue = queue.clone();
            let history = history.clone();
            let notifier = Arc::clone(&cfg.notifier);
            joinset.spawn_blocking(move || {
                let res = run_job(&queue, &history, notifier.as_ref(), &job);
                (job.job_id, res)
            });
        }
    }

    // Graceful shutdown: let in-flight deliveries finish.
    while let Some(res) = joinset.join_next().await {
        finish(res, &mut in_flight);
    }
    tracing::info!("reminder worker stopped");

    Ok(())
}

fn finish(
    res: Result<(String, anyhow::Result<OutcomeStatus>), tokio::task::JoinError>,
    in_flight: &mut HashSet<String>,
) {
    match res {
        Ok((job_id, outcome)) => {
            in_flight.remove(&job_id);
            if let Err(e) = outcome {
                tracing::warn!(%job_id, error = %e, "reminder job bookkeeping failed");
            }
        }
        // A panicked job leaves its id behind; it is not retried.
        Err(e) => tracing::warn!(error = %e, "reminder job join error"),
    }
}

/// Runs one fired job. The job is removed whatever the dispatch result: a
/// failed reminder is recorded, never retried.
pub fn run_job(
    queue: &JobQueue,
    history: &ReminderHistory,
    notifier: &dyn Notifier,
    job: &JobRecord,
) -> anyhow::Result<OutcomeStatus> {
    let result = ReminderDispatcher::new(notifier).dispatch(&job.payload);
    let (status, error) = match result {
        Ok(_) => (OutcomeStatus::Delivered, None),
        Err(e) => {
            tracing::warn!(job_id = %job.job_id, tag = %job.tag, error = %e, "reminder job failed");
            (OutcomeStatus::Failed, Some(e.to_string()))
        }
    };

    queue.remove(&job.job_id)?;
    history.append(&JobOutcome {
        job_id: job.job_id.clone(),
        task_id: job.payload.task_id,
        task_title: job.payload.task_title.clone(),
        status,
        fire_at: job.fire_at,
        finished_at: OffsetDateTime::now_utc(),
        error,
    })?;
    Ok(status)
}

struct WorkerGuard {
    lock_file: PathBuf,
    stop_file: PathBuf,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.lock_file);
        let _ = std::fs::remove_file(&self.stop_file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reminder::inbox;
    use crate::reminder::queue::JobPayload;

    #[test]
    fn run_job_removes_job_and_records_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = DataDir::new(dir.path().to_path_buf());
        let queue = JobQueue::new(data_dir.jobs());
        let history = ReminderHistory::new(data_dir.history());
        let notifier = inbox(&data_dir);

        let job = queue
            .enqueue(
                "4",
                JobPayload {
                    task_id: Some(4),
                    task_title: None,
                },
                OffsetDateTime::now_utc(),
            )
            .unwrap();

        let status = run_job(&queue, &history, &notifier, &job).unwrap();
        assert_eq!(status, OutcomeStatus::Failed);
        assert!(queue.list().unwrap().is_empty());
        assert!(notifier.list().unwrap().is_empty());

        let recorded = history.list().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(
            recorded[0].error.as_deref(),
            Some("reminder job has no task title")
        );
    }

    #[tokio::test]
    async fn single_pass_delivers_due_jobs_and_keeps_future_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = DataDir::new(dir.path().to_path_buf());
        let queue = JobQueue::new(data_dir.jobs());
        let now = OffsetDateTime::now_utc();

        let payload = |id: i64| JobPayload {
            task_id: Some(id),
            task_title: Some(format!("task {id}")),
        };
        queue
            .enqueue("1", payload(1), now - time::Duration::minutes(5))
            .unwrap();
        let future = queue
            .enqueue("2", payload(2), now + time::Duration::hours(1))
            .unwrap();

        let notifier = Arc::new(inbox(&data_dir));
        run_worker(WorkerConfig {
            data_dir: data_dir.clone(),
            poll_interval: Duration::from_millis(10),
            once: true,
            history_retention_days: 30,
            auto_cleanup: true,
            notifier: notifier.clone(),
        })
        .await
        .unwrap();

        assert_eq!(queue.list().unwrap(), vec![future]);
        let shown = notifier.list().unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].id, 1);
        assert!(!data_dir.worker_lock().exists());

        let status = worker_status(&data_dir).unwrap();
        assert!(!status.running);
        assert_eq!(status.pending_jobs, 1);
    }

    async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
        let start = std::time::Instant::now();
        while !cond() {
            assert!(start.elapsed() < Duration::from_secs(10), "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn polling_worker_fires_once_and_stops_on_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = DataDir::new(dir.path().to_path_buf());
        let queue = JobQueue::new(data_dir.jobs());
        let history = ReminderHistory::new(data_dir.history());
        let notifier = Arc::new(inbox(&data_dir));

        let worker = tokio::spawn(run_worker(WorkerConfig {
            data_dir: data_dir.clone(),
            poll_interval: Duration::from_millis(10),
            once: false,
            history_retention_days: 30,
            auto_cleanup: true,
            notifier: notifier.clone(),
        }));
        wait_until("worker lock", || data_dir.worker_lock().exists()).await;

        queue
            .enqueue(
                "9",
                JobPayload {
                    task_id: Some(9),
                    task_title: Some("Renew passport".to_owned()),
                },
                OffsetDateTime::now_utc() - time::Duration::seconds(1),
            )
            .unwrap();

        wait_until("delivery", || {
            queue.list().unwrap().is_empty() && !history.list().unwrap().is_empty()
        })
        .await;
        assert_eq!(notifier.get(9).unwrap().map(|n| n.id), Some(9));

        // Several more ticks must not fire the same job again.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(history.list().unwrap().len(), 1);

        assert!(request_stop(&data_dir, Duration::from_secs(10)).await.unwrap());
        worker.await.unwrap().unwrap();
        assert!(!data_dir.worker_lock().exists());
        assert!(!data_dir.worker_stop().exists());
    }

    #[tokio::test]
    async fn single_pass_keeps_going_after_a_bookkeeping_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = DataDir::new(dir.path().to_path_buf());
        let queue = JobQueue::new(data_dir.jobs());
        // A directory where the history file belongs makes every append fail.
        std::fs::create_dir_all(data_dir.history()).unwrap();

        let past = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        for id in [1, 2] {
            queue
                .enqueue(
                    &id.to_string(),
                    JobPayload {
                        task_id: Some(id),
                        task_title: Some(format!("task {id}")),
                    },
                    past,
                )
                .unwrap();
        }

        let notifier = Arc::new(inbox(&data_dir));
        run_worker(WorkerConfig {
            data_dir: data_dir.clone(),
            poll_interval: Duration::from_millis(10),
            once: true,
            history_retention_days: 0,
            auto_cleanup: false,
            notifier: notifier.clone(),
        })
        .await
        .unwrap();

        assert!(queue.list().unwrap().is_empty());
        assert_eq!(notifier.list().unwrap().len(), 2);
    }

    #[test]
    fn finished_jobs_leave_the_in_flight_set_even_on_error() {
        let mut in_flight: HashSet<String> = ["a".to_owned(), "b".to_owned()].into();
        finish(Ok(("a".to_owned(), Ok(OutcomeStatus::Delivered))), &mut in_flight);
        finish(
            Ok(("b".to_owned(), Err(anyhow::anyhow!("history unwritable")))),
            &mut in_flight,
        );
        assert!(in_flight.is_empty());
    }

    #[tokio::test]
    async fn refuses_to_start_twice() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir = DataDir::new(dir.path().to_path_buf());
        std::fs::write(data_dir.worker_lock(), b"{}").unwrap();

        let err = run_worker(WorkerConfig {
            data_dir: data_dir.clone(),
            poll_interval: Duration::from_millis(10),
            once: true,
            history_retention_days: 0,
            auto_cleanup: false,
            notifier: Arc::new(inbox(&data_dir)),
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("worker already running"));
        assert!(!request_stop(&DataDir::new(dir.path().join("other")), Duration::ZERO)
            .await
            .unwrap());
    }
}
