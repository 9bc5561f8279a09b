#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::error::TaskminderError;
use crate::task::model::{NewTask, Task};

/// Snapshot of every task, published after each mutation.
pub type TaskSet = Arc<Vec<Task>>;

/// File-backed task table: one JSON record per task plus an id sequence.
///
/// The store is opened explicitly and passed down to whoever needs it.
/// Subscribers receive the full task set every time it changes.
#[derive(Debug)]
pub struct TaskStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    tx: watch::Sender<TaskSet>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Sequence {
    next_id: i64,
}

impl TaskStore {
    pub fn open(dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create task dir {}", dir.display()))?;
        let tasks = read_all(&dir)?;
        tracing::debug!(dir = %dir.display(), count = tasks.len(), "opened task store");
        let (tx, _rx) = watch::channel(Arc::new(tasks));
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
            tx,
        })
    }

    /// Closes the store. Subscribers observe the channel closing.
    pub fn close(self) {
        tracing::debug!(dir = %self.dir.display(), "closed task store");
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TaskSet> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn snapshot(&self) -> TaskSet {
        self.tx.borrow().clone()
    }

    pub fn insert(&self, new: NewTask) -> anyhow::Result<Task> {
        let _guard = self.lock()?;
        let id = self.next_id()?;
        let task = new.into_task(id, OffsetDateTime::now_utc());
        self.write(&task)?;
        self.publish()?;
        tracing::debug!(id, title = %task.title, "inserted task");
        Ok(task)
    }

    pub fn update(&self, task: &Task) -> anyhow::Result<()> {
        let _guard = self.lock()?;
        if !self.task_path(task.id).exists() {
            return Err(TaskminderError::TaskNotFound(task.id).into());
        }
        self.write(task)?;
        self.publish()?;
        tracing::debug!(id = task.id, "updated task");
        Ok(())
    }

    /// Returns whether a record was removed.
    pub fn delete(&self, id: i64) -> anyhow::Result<bool> {
        let _guard = self.lock()?;
        let path = self.task_path(id);
        let removed = match std::fs::remove_file(&path) {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(source) => return Err(TaskminderError::IoPath { path, source }.into()),
        };
        if removed {
            self.publish()?;
            tracing::debug!(id, "deleted task");
        }
        Ok(removed)
    }

    pub fn get(&self, id: i64) -> anyhow::Result<Option<Task>> {
        let path = self.task_path(id);
        if !path.exists() {
            return Ok(None);
        }
        let data =
            std::fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let task = serde_json::from_slice(&data)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(task))
    }

    pub fn require(&self, id: i64) -> anyhow::Result<Task> {
        self.get(id)?
            .ok_or_else(|| TaskminderError::TaskNotFound(id).into())
    }

    /// Tasks ordered by due time, then id.
    pub fn list(&self) -> anyhow::Result<Vec<Task>> {
        read_all(&self.dir)
    }

    /// Re-reads the table and publishes it when another process changed it.
    pub fn refresh(&self) -> anyhow::Result<bool> {
        let tasks = read_all(&self.dir)?;
        Ok(self.tx.send_if_modified(|current| {
            if current.as_slice() == tasks.as_slice() {
                return false;
            }
            *current = Arc::new(tasks);
            true
        }))
    }

    fn publish(&self) -> anyhow::Result<()> {
        let tasks = read_all(&self.dir)?;
        self.tx.send_replace(Arc::new(tasks));
        Ok(())
    }

    fn lock(&self) -> anyhow::Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("task store lock poisoned"))
    }

    fn next_id(&self) -> anyhow::Result<i64> {
        let path = self.seq_path();
        let mut seq = if path.exists() {
            let data = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&data)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Sequence::default()
        };

        // Never hand out an id at or below one already on disk.
        let max_existing = read_all(&self.dir)?.iter().map(|t| t.id).max().unwrap_or(0);
        let id = seq.next_id.max(max_existing + 1).max(1);
        seq.next_id = id + 1;
        write_atomic(&path, &serde_json::to_vec_pretty(&seq)?)?;
        Ok(id)
    }

    fn write(&self, task: &Task) -> anyhow::Result<()> {
        let path = self.task_path(task.id);
        write_atomic(&path, &serde_json::to_vec_pretty(task)?)
    }

    fn task_path(&self, id: i64) -> PathBuf {
        self.dir.join(format!("task-{id}.json"))
    }

    fn seq_path(&self) -> PathBuf {
        self.dir.join("seq.json")
    }
}

pub(crate) fn write_atomic(path: &Path, data: &[u8]) -> anyhow::Result<()> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, data).with_context(|| format!("failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
    Ok(())
}

fn read_all(dir: &Path) -> anyhow::Result<Vec<Task>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut tasks: Vec<Task> = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_record = path
            .file_name()
            .and_then(|s| s.to_str())
            .is_some_and(|name| name.starts_with("task-") && name.ends_with(".json"));
        if !is_record {
            continue;
        }
        let Ok(data) = std::fs::read(&path) else {
            continue;
        };
        match serde_json::from_slice(&data) {
            Ok(task) => tasks.push(task),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable task record"),
        }
    }
    tasks.sort_by(|a, b| a.due_time.cmp(&b.due_time).then_with(|| a.id.cmp(&b.id)));
    Ok(tasks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn new_task(title: &str) -> NewTask {
        NewTask::new(title, OffsetDateTime::now_utc() + Duration::hours(1))
    }

    #[test]
    fn insert_assigns_monotonic_ids_that_survive_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path().join("tasks")).unwrap();

        let a = store.insert(new_task("a")).unwrap();
        let b = store.insert(new_task("b")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);

        assert!(store.delete(b.id).unwrap());
        let c = store.insert(new_task("c")).unwrap();
        assert_eq!(c.id, 3);

        // Reopening keeps the sequence.
        store.close();
        let store = TaskStore::open(dir.path().join("tasks")).unwrap();
        let d = store.insert(new_task("d")).unwrap();
        assert_eq!(d.id, 4);
    }

    #[test]
    fn update_overwrites_whole_record_and_requires_existing_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path().to_path_buf()).unwrap();
        let task = store.insert(new_task("write report")).unwrap();

        let edited = Task {
            title: "write final report".to_owned(),
            ..task.with_completed(true)
        };
        store.update(&edited).unwrap();
        assert_eq!(store.require(task.id).unwrap(), edited);

        let ghost = Task { id: 99, ..edited };
        let err = store.update(&ghost).unwrap_err();
        assert!(err.to_string().contains("task not found: 99"));
    }

    #[test]
    fn delete_missing_is_not_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path().to_path_buf()).unwrap();
        assert!(!store.delete(42).unwrap());
        assert!(store.get(42).unwrap().is_none());
    }

    #[test]
    fn subscribers_see_each_mutation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path().to_path_buf()).unwrap();
        let mut rx = store.subscribe();
        assert!(rx.borrow_and_update().is_empty());

        let task = store.insert(new_task("a")).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        store.update(&task.with_completed(true)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update()[0].is_completed);

        store.delete(task.id).unwrap();
        assert!(rx.borrow_and_update().is_empty());
    }

    #[test]
    fn refresh_publishes_only_external_changes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = TaskStore::open(dir.path().to_path_buf()).unwrap();
        let second = TaskStore::open(dir.path().to_path_buf()).unwrap();

        assert!(!second.refresh().unwrap());
        first.insert(new_task("from elsewhere")).unwrap();
        assert!(second.refresh().unwrap());
        assert_eq!(second.snapshot().len(), 1);
        assert!(!second.refresh().unwrap());
    }

    #[test]
    fn list_orders_by_due_time() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path().to_path_buf()).unwrap();
        let now = OffsetDateTime::now_utc();
        store.insert(NewTask::new("late", now + Duration::days(2))).unwrap();
        store.insert(NewTask::new("soon", now + Duration::hours(1))).unwrap();

        let titles: Vec<String> = store.list().unwrap().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, ["soon", "late"]);
    }
}
