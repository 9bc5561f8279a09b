#![forbid(unsafe_code)]

pub mod deeplink;
pub mod dispatcher;
pub mod history;
pub mod notifier;
pub mod queue;
pub mod scheduler;
pub mod worker;

use std::sync::Arc;

use crate::config::{Config, NotifierBackend};
use crate::data_dir::DataDir;
use crate::reminder::deeplink::DeepLinkQueue;
use crate::reminder::notifier::{CommandNotifier, InboxNotifier, Notifier};

#[must_use]
pub fn inbox(data_dir: &DataDir) -> InboxNotifier {
    InboxNotifier::new(
        data_dir.notifications(),
        DeepLinkQueue::new(data_dir.deeplinks()),
    )
}

/// The display facility selected by `reminders.notifier`.
#[must_use]
pub fn notifier_from_config(cfg: &Config, data_dir: &DataDir) -> Arc<dyn Notifier> {
    match cfg.reminders.notifier {
        NotifierBackend::Inbox => Arc::new(inbox(data_dir)),
        NotifierBackend::Command => Arc::new(CommandNotifier::new(
            cfg.reminders.notify_command.clone(),
        )),
    }
}
