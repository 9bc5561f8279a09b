#![forbid(unsafe_code)]
#![allow(clippy::missing_errors_doc)]

pub mod app;
pub mod cli;
pub mod clock;
pub mod config;
pub mod data_dir;
pub mod error;
pub mod output;
pub mod reminder;
pub mod settings;
pub mod task;
pub mod tui;
