#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskminderError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("task not found: {0}")]
    TaskNotFound(i64),

    #[error("notification not found: {0}")]
    NotificationNotFound(i64),

    #[error("invalid lead time {0} minutes (allowed: 5, 10, 15, 30, 60)")]
    InvalidLeadTime(u32),

    #[error("invalid due time '{0}': use RFC 3339, 'YYYY-MM-DD HH:MM' or '+<duration>'")]
    InvalidDueTime(String),

    #[error("io error at {path}: {source}")]
    IoPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}
