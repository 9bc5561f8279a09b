use std::sync::Arc;
use std::time::Duration;

use taskminder::app::TaskController;
use taskminder::data_dir::DataDir;
use taskminder::reminder::deeplink::DeepLinkQueue;
use taskminder::reminder::history::{OutcomeStatus, ReminderHistory};
use taskminder::reminder::inbox;
use taskminder::reminder::scheduler::{ScheduleOutcome, tag_for};
use taskminder::reminder::worker::{WorkerConfig, run_worker};
use taskminder::task::model::NewTask;
use time::OffsetDateTime;

#[tokio::test]
async fn reminder_fires_lands_in_inbox_and_opens_task_once() {
    let td = tempfile::tempdir().expect("tempdir");
    let data_dir = DataDir::new(td.path().join("data"));
    let ctl = TaskController::open(&data_dir).expect("open controller");
    let now = OffsetDateTime::now_utc();

    let (rent, outcome) = ctl
        .add(NewTask::new("Pay rent", now + time::Duration::hours(2)))
        .await
        .expect("add rent");
    assert!(matches!(outcome, ScheduleOutcome::Scheduled { .. }));

    let (call, outcome) = ctl
        .add(NewTask::new("Call the bank", now + time::Duration::minutes(5)))
        .await
        .expect("add call");
    assert_eq!(outcome, ScheduleOutcome::InsideLeadWindow);

    // Scheduled an hour ago, the reminder for `call` is already due.
    let outcome = ctl
        .scheduler()
        .schedule_at(&call, now - time::Duration::hours(1))
        .expect("backdated schedule");
    assert!(matches!(outcome, ScheduleOutcome::Scheduled { fire_at } if fire_at < now));

    let notifier = Arc::new(inbox(&data_dir));
    run_worker(WorkerConfig {
        data_dir: data_dir.clone(),
        poll_interval: Duration::from_millis(20),
        once: true,
        history_retention_days: 30,
        auto_cleanup: true,
        notifier: notifier.clone(),
    })
    .await
    .expect("worker pass");

    let jobs = ctl.scheduler().jobs();
    assert!(jobs.pending_for_tag(&tag_for(call.id)).unwrap().is_empty());
    assert_eq!(jobs.pending_for_tag(&tag_for(rent.id)).unwrap().len(), 1);

    let history = ReminderHistory::new(data_dir.history()).list().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].task_id, Some(call.id));
    assert_eq!(history[0].status, OutcomeStatus::Delivered);

    let shown = notifier.list().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "Your task \"Call the bank\" is due soon.");

    notifier.activate(shown[0].id).expect("activate");
    assert!(notifier.list().unwrap().is_empty());

    let links = DeepLinkQueue::new(data_dir.deeplinks());
    assert_eq!(links.take_latest().unwrap(), Some(call.id));
    assert_eq!(links.take_latest().unwrap(), None);

    ctl.set_completed(rent.id, true).await.expect("complete rent");
    assert!(jobs.pending_for_tag(&tag_for(rent.id)).unwrap().is_empty());
}

#[tokio::test]
async fn deleted_tasks_keep_their_ids_retired() {
    let td = tempfile::tempdir().expect("tempdir");
    let data_dir = DataDir::new(td.path().to_path_buf());
    let due = OffsetDateTime::now_utc() + time::Duration::days(1);

    let first_id = {
        let ctl = TaskController::open(&data_dir).expect("open");
        let (first, _) = ctl.add(NewTask::new("first", due)).await.unwrap();
        ctl.delete(first.id).await.unwrap();
        assert!(ctl.scheduler().jobs().list().unwrap().is_empty());
        first.id
    };

    // A fresh controller over the same directory continues the sequence.
    let ctl = TaskController::open(&data_dir).expect("reopen");
    let (second, _) = ctl.add(NewTask::new("second", due)).await.unwrap();
    assert!(second.id > first_id);
    assert_eq!(ctl.store().list().unwrap().len(), 1);
}
