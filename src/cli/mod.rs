#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{CommandFactory as _, Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use time::OffsetDateTime;

use crate::app::{TaskController, TaskFilter, describe_outcome, filter_tasks};
use crate::clock;
use crate::config::{self, Config};
use crate::data_dir::DataDir;
use crate::error::TaskminderError;
use crate::output::table::{Table, truncate};
use crate::reminder::deeplink::DeepLinkQueue;
use crate::reminder::history::{OutcomeStatus, ReminderHistory};
use crate::reminder::queue::{JobQueue, JobRecord};
use crate::reminder::scheduler::tag_for;
use crate::reminder::worker::{self, WorkerConfig};
use crate::reminder::{self, notifier_from_config};
use crate::settings::{self, LEAD_TIME_OPTIONS, SettingsStore};
use crate::task::model::{NewTask, Task, default_category};
use crate::tui;
use crate::tui::app::TuiOptions;

#[derive(Debug, Parser)]
#[command(name = "taskminder", version, about = "Task list with deferred due-date reminders")]
pub struct Cli {
    /// Only log errors
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
    /// Log debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub cmd: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    Add(AddArgs),
    List(ListArgs),
    Show(ShowArgs),
    Edit(EditArgs),
    Done(IdArgs),
    Undo(IdArgs),
    #[command(alias = "remove")]
    Rm(IdArgs),
    Import(ImportArgs),
    Settings(SettingsArgs),
    Config(ConfigArgs),
    Reminders(RemindersArgs),
    Worker(WorkerArgs),
    Inbox(InboxArgs),
    Completion(CompletionArgs),
    Version,
}

#[derive(Debug, Parser)]
pub struct AddArgs {
    /// Task title
    pub title: String,
    /// Due time: +30m, +2h, "YYYY-MM-DD HH:MM" (local) or RFC 3339
    #[arg(short = 'd', long = "due")]
    pub due: String,
    #[arg(long = "description", default_value = "")]
    pub description: String,
    #[arg(short = 'c', long = "category")]
    pub category: Option<String>,
    /// Do not remind before the due time
    #[arg(long = "no-notify")]
    pub no_notify: bool,
    /// Attachment reference (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct ListArgs {
    /// Case-insensitive match on title, description or category
    #[arg(short = 's', long = "search", default_value = "")]
    pub search: String,
    #[arg(long = "hide-completed")]
    pub hide_completed: bool,
    /// Show completed tasks even when ui.hide_completed is set
    #[arg(short = 'a', long = "all", conflicts_with = "hide_completed")]
    pub all: bool,
    /// Re-render whenever the task set changes
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,
    #[arg(long = "json")]
    pub json: bool,
    #[arg(long = "csv")]
    pub csv: bool,
}

#[derive(Debug, Parser)]
pub struct ShowArgs {
    pub id: i64,
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct EditArgs {
    pub id: i64,
    #[arg(long = "title")]
    pub title: Option<String>,
    #[arg(short = 'd', long = "due")]
    pub due: Option<String>,
    #[arg(long = "description")]
    pub description: Option<String>,
    #[arg(short = 'c', long = "category")]
    pub category: Option<String>,
    #[arg(long = "notify", conflicts_with = "no_notify")]
    pub notify: bool,
    #[arg(long = "no-notify")]
    pub no_notify: bool,
    /// Replace attachments (repeatable)
    #[arg(long = "attach")]
    pub attachments: Vec<String>,
}

#[derive(Debug, Parser)]
pub struct IdArgs {
    pub id: i64,
}

#[derive(Debug, Parser)]
pub struct ImportArgs {
    /// YAML file with a `tasks` list
    #[arg(short = 'f', long = "file")]
    pub file: PathBuf,
}

#[derive(Debug, Parser)]
pub struct SettingsArgs {
    #[command(subcommand)]
    pub cmd: SettingsCmd,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SettingKey {
    /// Minutes before the due time a reminder fires
    LeadTime,
}

#[derive(Debug, Subcommand)]
pub enum SettingsCmd {
    Get { key: SettingKey },
    Set { key: SettingKey, value: u32 },
}

#[derive(Debug, Parser)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub cmd: ConfigCmd,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCmd {
    List,
    Set(ConfigSetArgs),
    Get(ConfigGetArgs),
}

#[derive(Debug, Parser)]
pub struct ConfigSetArgs {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Parser)]
pub struct ConfigGetArgs {
    pub key: String,
}

#[derive(Debug, Parser)]
pub struct RemindersArgs {
    #[command(subcommand)]
    pub cmd: RemindersCmd,
}

#[derive(Debug, Subcommand)]
pub enum RemindersCmd {
    /// Pending reminder jobs
    List {
        #[arg(long = "json")]
        json: bool,
    },
    /// Fired reminders, newest first
    History {
        #[arg(long = "limit", default_value_t = 20)]
        limit: usize,
        #[arg(long = "json")]
        json: bool,
    },
}

#[derive(Debug, Parser)]
pub struct WorkerArgs {
    #[command(subcommand)]
    pub cmd: WorkerCmd,
}

#[derive(Debug, Subcommand)]
pub enum WorkerCmd {
    Start(WorkerStartArgs),
    Stop(WorkerStopArgs),
    Status(WorkerStatusArgs),
}

#[derive(Debug, Parser)]
pub struct WorkerStartArgs {
    /// Fire due reminders once and exit
    #[arg(long = "once")]
    pub once: bool,
    #[arg(long = "daemon", conflicts_with = "once")]
    pub daemon: bool,
    /// Poll interval, overrides reminders.poll_interval
    #[arg(long = "interval")]
    pub interval: Option<String>,
}

#[derive(Debug, Parser)]
pub struct WorkerStopArgs {
    #[arg(long = "timeout", default_value = "30s")]
    pub timeout: String,
}

#[derive(Debug, Parser)]
pub struct WorkerStatusArgs {
    #[arg(long = "json")]
    pub json: bool,
}

#[derive(Debug, Parser)]
pub struct InboxArgs {
    #[command(subcommand)]
    pub cmd: InboxCmd,
}

#[derive(Debug, Subcommand)]
pub enum InboxCmd {
    List {
        #[arg(long = "json")]
        json: bool,
    },
    /// Open a notification, jumping to its task
    Open { id: i64 },
    Clear,
}

#[derive(Debug, Parser)]
pub struct CompletionArgs {
    pub shell: clap_complete::Shell,
}

pub async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_tracing(cli.quiet, cli.verbose) {
        eprintln!("{err}");
        return ExitCode::from(1);
    }

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(1)
        }
    }
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("TASKMINDER_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.cmd {
        None => cmd_default().await,
        Some(Commands::Completion(args)) => {
            let mut cmd = Cli::command();
            clap_complete::generate(args.shell, &mut cmd, "taskminder", &mut std::io::stdout());
            Ok(ExitCode::SUCCESS)
        }
        Some(Commands::Config(args)) => cmd_config(args),
        Some(Commands::Add(args)) => cmd_add(args).await,
        Some(Commands::List(args)) => cmd_list(&args).await,
        Some(Commands::Show(args)) => cmd_show(&args).await,
        Some(Commands::Edit(args)) => cmd_edit(args).await,
        Some(Commands::Done(args)) => cmd_set_completed(args.id, true).await,
        Some(Commands::Undo(args)) => cmd_set_completed(args.id, false).await,
        Some(Commands::Rm(args)) => cmd_rm(args.id).await,
        Some(Commands::Import(args)) => cmd_import(&args).await,
        Some(Commands::Settings(args)) => cmd_settings(args).await,
        Some(Commands::Reminders(args)) => cmd_reminders(args).await,
        Some(Commands::Worker(args)) => cmd_worker(args).await,
        Some(Commands::Inbox(args)) => cmd_inbox(args).await,
        Some(Commands::Version) => Ok(cmd_version()),
    }
}

async fn load_env() -> anyhow::Result<(Config, DataDir)> {
    tokio::task::spawn_blocking(|| -> anyhow::Result<(Config, DataDir)> {
        let (cfg, _paths) = config::load()?;
        let data_dir = cfg.data_dir()?;
        std::fs::create_dir_all(data_dir.root())
            .with_context(|| format!("failed to create {}", data_dir.root().display()))?;
        Ok((cfg, data_dir))
    })
    .await?
}

async fn open_controller(data_dir: &DataDir) -> anyhow::Result<TaskController> {
    let data_dir = data_dir.clone();
    tokio::task::spawn_blocking(move || TaskController::open(&data_dir)).await?
}

async fn cmd_default() -> anyhow::Result<ExitCode> {
    let (cfg, data_dir) = load_env().await?;

    if tui::is_tty() {
        run_tui(&cfg, &data_dir).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let args = ListArgs {
        search: String::new(),
        hide_completed: cfg.ui.hide_completed,
        all: false,
        watch: false,
        json: false,
        csv: false,
    };
    list_tasks(&cfg, &data_dir, &args).await
}

async fn run_tui(cfg: &Config, data_dir: &DataDir) -> anyhow::Result<()> {
    let ctl = open_controller(data_dir).await?;
    tui::app::run(
        ctl,
        DeepLinkQueue::new(data_dir.deeplinks()),
        TuiOptions {
            icons: cfg.ui.icons,
            hide_completed: cfg.ui.hide_completed,
        },
    )
    .await
}

async fn cmd_add(args: AddArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let title = args.title.trim().to_owned();
    if title.is_empty() {
        anyhow::bail!("task title must not be empty");
    }
    let due = clock::parse_due(&args.due, OffsetDateTime::now_utc())?;

    let new = NewTask {
        description: args.description,
        category: args.category.unwrap_or_else(default_category),
        is_notification_enabled: !args.no_notify,
        attachments: args.attachments,
        ..NewTask::new(title, due)
    };

    let ctl = open_controller(&data_dir).await?;
    let (task, outcome) = ctl.add(new).await?;
    println!(
        "Added task {}: {} (due {}, {})",
        task.id,
        task.title,
        clock::format_local(task.due_time),
        describe_outcome(outcome)
    );
    Ok(ExitCode::SUCCESS)
}

fn list_filter(cfg: &Config, args: &ListArgs) -> TaskFilter {
    TaskFilter {
        query: args.search.clone(),
        hide_completed: !args.all && (args.hide_completed || cfg.ui.hide_completed),
    }
}

async fn cmd_list(args: &ListArgs) -> anyhow::Result<ExitCode> {
    let (cfg, data_dir) = load_env().await?;
    list_tasks(&cfg, &data_dir, args).await
}

async fn list_tasks(cfg: &Config, data_dir: &DataDir, args: &ListArgs) -> anyhow::Result<ExitCode> {
    let ctl = open_controller(data_dir).await?;
    let filter = list_filter(cfg, args);

    if args.watch && !args.json && !args.csv {
        list_watch(cfg, &ctl, &filter).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let all = ctl.store().snapshot();
    let tasks = filter_tasks(&all, &filter);

    if args.json {
        let mut s = serde_json::to_string_pretty(&tasks)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    if args.csv {
        let mut t = Table::new([
            "id",
            "title",
            "category",
            "due_time",
            "completed",
            "notify",
        ]);
        for task in &tasks {
            t.row([
                task.id.to_string(),
                task.title.clone(),
                task.category.clone(),
                clock::format_rfc3339(task.due_time),
                task.is_completed.to_string(),
                task.is_notification_enabled.to_string(),
            ]);
        }
        t.write_csv()?;
        return Ok(ExitCode::SUCCESS);
    }

    if tasks.is_empty() {
        println!("No tasks found.");
        return Ok(ExitCode::SUCCESS);
    }
    task_table(cfg, &tasks, OffsetDateTime::now_utc()).print()?;
    Ok(ExitCode::SUCCESS)
}

fn task_table(cfg: &Config, tasks: &[&Task], now: OffsetDateTime) -> Table {
    let mut t = Table::new(["ID", "DUE", "WHEN", "CATEGORY", "REMIND", "TITLE"]);
    for task in tasks {
        let id = if cfg.ui.icons {
            format!("{} {}", completion_icon(task), task.id)
        } else {
            task.id.to_string()
        };
        t.row([
            id,
            clock::format_local(task.due_time),
            clock::relative(task.due_time, now),
            task.category.clone(),
            if task.is_notification_enabled {
                "on".to_owned()
            } else {
                "off".to_owned()
            },
            truncate(&task.title, 60),
        ]);
    }
    t
}

fn completion_icon(task: &Task) -> &'static str {
    if task.is_completed { "✓" } else { "○" }
}

/// Redraws on every store notification; the ticker re-reads the directory so
/// edits from other processes show up too.
async fn list_watch(cfg: &Config, ctl: &TaskController, filter: &TaskFilter) -> anyhow::Result<()> {
    let mut rx = ctl.store().subscribe();
    let mut ticker = tokio::time::interval(Duration::from_secs(2));

    let render = |all: &[Task]| -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        print!("\x1b[H\x1b[2J");
        println!("Tasks - Updated: {}", clock::format_local(now));
        println!();
        let tasks = filter_tasks(all, filter);
        if tasks.is_empty() {
            println!("No tasks found.");
        } else {
            task_table(cfg, &tasks, now).print()?;
        }
        println!("\n[Press Ctrl+C to exit]");
        Ok(())
    };

    let initial = rx.borrow_and_update().clone();
    render(&initial)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                return Ok(());
            }
            changed = rx.changed() => {
                changed?;
                let all = rx.borrow_and_update().clone();
                render(&all)?;
            }
            _ = ticker.tick() => {
                let store = Arc::clone(ctl.store());
                tokio::task::spawn_blocking(move || store.refresh()).await??;
            }
        }
    }
}

async fn cmd_show(args: &ShowArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let ctl = open_controller(&data_dir).await?;
    let task = ctl.store().require(args.id)?;

    if args.json {
        let mut s = serde_json::to_string_pretty(&task)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    let pending = ctl.scheduler().jobs().pending_for_tag(&tag_for(task.id))?;
    print_task_details(&task, pending.first());
    Ok(ExitCode::SUCCESS)
}

fn print_task_details(task: &Task, pending: Option<&JobRecord>) {
    let now = OffsetDateTime::now_utc();
    println!("Task: {} (ID: {})", task.title, task.id);
    println!("Category: {}", task.category);
    println!(
        "Due: {} ({})",
        clock::format_local(task.due_time),
        clock::relative(task.due_time, now)
    );
    println!("Created: {}", clock::format_local(task.creation_time));
    println!(
        "Status: {}",
        if task.is_completed { "done" } else { "open" }
    );
    println!(
        "Notifications: {}",
        if task.is_notification_enabled {
            "on"
        } else {
            "off"
        }
    );
    match pending {
        Some(job) => println!("Reminder: {}", clock::format_local(job.fire_at)),
        None => println!("Reminder: none pending"),
    }

    if !task.description.trim().is_empty() {
        println!("\nDescription:\n{}", task.description);
    }
    if !task.attachments.is_empty() {
        println!("\nAttachments:");
        for a in &task.attachments {
            println!("- {a}");
        }
    }
}

async fn cmd_edit(args: EditArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let ctl = open_controller(&data_dir).await?;
    let mut task = ctl.store().require(args.id)?;

    if let Some(title) = args.title {
        let title = title.trim().to_owned();
        if title.is_empty() {
            anyhow::bail!("task title must not be empty");
        }
        task.title = title;
    }
    if let Some(due) = args.due.as_deref() {
        task.due_time = clock::parse_due(due, OffsetDateTime::now_utc())?;
    }
    if let Some(description) = args.description {
        task.description = description;
    }
    if let Some(category) = args.category {
        task.category = category;
    }
    if args.notify {
        task.is_notification_enabled = true;
    } else if args.no_notify {
        task.is_notification_enabled = false;
    }
    if !args.attachments.is_empty() {
        task.attachments = args.attachments;
    }

    let id = task.id;
    let outcome = ctl.update(task).await?;
    println!("Updated task {id} ({})", describe_outcome(outcome));
    Ok(ExitCode::SUCCESS)
}

async fn cmd_set_completed(id: i64, is_completed: bool) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let ctl = open_controller(&data_dir).await?;
    let (task, outcome) = ctl.set_completed(id, is_completed).await?;
    if task.is_completed {
        println!("Completed task {}: {}", task.id, task.title);
    } else {
        println!(
            "Reopened task {}: {} ({})",
            task.id,
            task.title,
            describe_outcome(outcome)
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_rm(id: i64) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let ctl = open_controller(&data_dir).await?;
    match ctl.delete(id).await? {
        Some(task) => {
            println!("Deleted task {}: {}", task.id, task.title);
            Ok(ExitCode::SUCCESS)
        }
        None => Err(TaskminderError::TaskNotFound(id).into()),
    }
}

#[derive(Debug, Deserialize)]
struct ImportFile {
    #[serde(default = "default_import_version")]
    version: String,
    tasks: Vec<ImportEntry>,
}

#[derive(Debug, Deserialize)]
struct ImportEntry {
    title: String,
    due: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default = "default_notify")]
    notify: bool,
    #[serde(default)]
    attachments: Vec<String>,
}

fn default_import_version() -> String {
    "1.0".to_owned()
}

fn default_notify() -> bool {
    true
}

/// Parses and validates every entry before anything is written.
fn parse_import_file(path: &Path, now: OffsetDateTime) -> anyhow::Result<Vec<NewTask>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task file: {}", path.display()))?;
    let def: ImportFile = serde_yaml::from_str(&data)
        .with_context(|| format!("failed to parse YAML: {}", path.display()))?;

    if def.version.trim() != "1.0" {
        anyhow::bail!(
            "unsupported task file version: {} (expected 1.0)",
            def.version
        );
    }

    def.tasks
        .into_iter()
        .enumerate()
        .map(|(i, entry)| {
            let title = entry.title.trim().to_owned();
            if title.is_empty() {
                anyhow::bail!("task #{}: title is required", i + 1);
            }
            let due = clock::parse_due(&entry.due, now)
                .with_context(|| format!("task #{} ({title})", i + 1))?;
            Ok(NewTask {
                description: entry.description,
                category: entry.category.unwrap_or_else(default_category),
                is_notification_enabled: entry.notify,
                attachments: entry.attachments,
                ..NewTask::new(title, due)
            })
        })
        .collect()
}

async fn cmd_import(args: &ImportArgs) -> anyhow::Result<ExitCode> {
    let entries = parse_import_file(&args.file, OffsetDateTime::now_utc())?;
    let (_cfg, data_dir) = load_env().await?;
    let ctl = open_controller(&data_dir).await?;

    let mut t = Table::new(["ID", "TITLE", "DUE", "REMINDER"]);
    for new in entries {
        let (task, outcome) = ctl.add(new).await?;
        t.row([
            task.id.to_string(),
            truncate(&task.title, 50),
            clock::format_local(task.due_time),
            describe_outcome(outcome),
        ]);
    }
    if t.is_empty() {
        println!("No tasks in {}.", args.file.display());
    } else {
        t.print()?;
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_settings(args: SettingsArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    let store = SettingsStore::new(data_dir.root());
    match args.cmd {
        SettingsCmd::Get {
            key: SettingKey::LeadTime,
        } => {
            println!("{}", store.get());
        }
        SettingsCmd::Set {
            key: SettingKey::LeadTime,
            value,
        } => {
            let minutes = settings::validate_lead_time(value)?;
            store.set(minutes)?;
            let ctl = open_controller(&data_dir).await?;
            let scheduled = ctl.reschedule_active().await?;
            println!(
                "Set lead-time = {minutes} minutes ({scheduled} reminder(s) pending; options: {})",
                LEAD_TIME_OPTIONS
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<ExitCode> {
    match args.cmd {
        ConfigCmd::List => {
            print!("{}", config::list_resolved_toml()?);
        }
        ConfigCmd::Set(set) => {
            config::set_value_string(&set.key, &set.value)?;
            println!("Set {} = {}", set.key, set.value);
        }
        ConfigCmd::Get(get) => match config::get_value_string(&get.key)? {
            Some(v) => println!("{v}"),
            None => anyhow::bail!(
                "configuration key '{}' not found - use 'taskminder config list' to see available keys",
                get.key
            ),
        },
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_reminders(args: RemindersArgs) -> anyhow::Result<ExitCode> {
    let (_cfg, data_dir) = load_env().await?;
    match args.cmd {
        RemindersCmd::List { json } => {
            let jobs = JobQueue::new(data_dir.jobs()).list()?;
            if json {
                let mut s = serde_json::to_string_pretty(&jobs)?;
                s.push('\n');
                print!("{s}");
                return Ok(ExitCode::SUCCESS);
            }
            if jobs.is_empty() {
                println!("No pending reminders.");
                return Ok(ExitCode::SUCCESS);
            }
            let now = OffsetDateTime::now_utc();
            let mut t = Table::new(["JOB", "TASK", "TITLE", "FIRES", "WHEN"]);
            for job in &jobs {
                t.row([
                    job.job_id.clone(),
                    job.tag.clone(),
                    truncate(job.payload.task_title.as_deref().unwrap_or("-"), 40),
                    clock::format_local(job.fire_at),
                    clock::relative(job.fire_at, now),
                ]);
            }
            t.print()?;
        }
        RemindersCmd::History { limit, json } => {
            let mut outcomes = ReminderHistory::new(data_dir.history()).list()?;
            outcomes.truncate(limit);
            if json {
                let mut s = serde_json::to_string_pretty(&outcomes)?;
                s.push('\n');
                print!("{s}");
                return Ok(ExitCode::SUCCESS);
            }
            if outcomes.is_empty() {
                println!("No reminders have fired yet.");
                return Ok(ExitCode::SUCCESS);
            }
            let mut t = Table::new(["FINISHED", "TASK", "TITLE", "STATUS", "ERROR"]);
            for o in &outcomes {
                t.row([
                    clock::format_local(o.finished_at),
                    o.task_id.map_or_else(|| "-".to_owned(), |id| id.to_string()),
                    truncate(o.task_title.as_deref().unwrap_or("-"), 40),
                    match o.status {
                        OutcomeStatus::Delivered => "delivered".to_owned(),
                        OutcomeStatus::Failed => "failed".to_owned(),
                    },
                    o.error.clone().unwrap_or_else(|| "-".to_owned()),
                ]);
            }
            t.print()?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_worker(args: WorkerArgs) -> anyhow::Result<ExitCode> {
    let (cfg, data_dir) = load_env().await?;
    match args.cmd {
        WorkerCmd::Start(start) => worker_start(&cfg, &data_dir, start).await,
        WorkerCmd::Stop(stop) => worker_stop(&data_dir, &stop).await,
        WorkerCmd::Status(status) => worker_status(&data_dir, &status),
    }
}

async fn worker_start(
    cfg: &Config,
    data_dir: &DataDir,
    args: WorkerStartArgs,
) -> anyhow::Result<ExitCode> {
    let poll_interval = match args.interval.as_deref() {
        Some(s) => config::parse_duration(s)?,
        None => cfg.poll_interval()?,
    };
    if poll_interval.is_zero() {
        anyhow::bail!("poll interval must be greater than zero");
    }

    if args.daemon {
        let exe = std::env::current_exe().context("failed to resolve current executable")?;
        let mut cmd = tokio::process::Command::new(exe);
        cmd.arg("worker").arg("start");
        if let Some(interval) = args.interval.as_deref() {
            cmd.args(["--interval", interval]);
        }
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::null());
        let child = cmd.spawn().context("failed to spawn worker process")?;
        match child.id() {
            Some(pid) => println!("Started reminder worker (pid={pid})"),
            None => println!("Started reminder worker"),
        }
        return Ok(ExitCode::SUCCESS);
    }

    if !args.once {
        println!("Starting reminder worker (poll every {poll_interval:?})");
    }

    worker::run_worker(WorkerConfig {
        data_dir: data_dir.clone(),
        poll_interval,
        once: args.once,
        history_retention_days: cfg.reminders.history_retention_days,
        auto_cleanup: cfg.reminders.auto_cleanup,
        notifier: notifier_from_config(cfg, data_dir),
    })
    .await?;

    if !args.once {
        println!("Reminder worker stopped.");
    }
    Ok(ExitCode::SUCCESS)
}

async fn worker_stop(data_dir: &DataDir, args: &WorkerStopArgs) -> anyhow::Result<ExitCode> {
    let timeout = config::parse_duration(&args.timeout)?;

    if worker::load_worker_lock(data_dir)?.is_none() {
        println!("No worker running.");
        return Ok(ExitCode::SUCCESS);
    }

    if worker::request_stop(data_dir, timeout).await? {
        println!("Reminder worker stopped.");
        return Ok(ExitCode::SUCCESS);
    }

    anyhow::bail!("timed out waiting for worker to stop (timeout: {timeout:?})")
}

fn worker_status(data_dir: &DataDir, args: &WorkerStatusArgs) -> anyhow::Result<ExitCode> {
    let report = worker::worker_status(data_dir)?;

    if args.json {
        let mut s = serde_json::to_string_pretty(&report)?;
        s.push('\n');
        print!("{s}");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Worker running: {}", report.running);
    println!(
        "Data dir: {}",
        config::tilde_path(&data_dir.root().to_string_lossy())
    );
    if let Some(pid) = report.pid {
        println!("PID: {pid}");
    }
    if let Some(started) = report.started_at {
        println!("Started: {}", clock::format_local(started));
    }
    println!("Stop requested: {}", report.stop_requested);
    println!("Pending reminders: {}", report.pending_jobs);
    if let Some(next) = report.next_fire_at {
        println!(
            "Next reminder: {} ({})",
            clock::format_local(next),
            clock::relative(next, OffsetDateTime::now_utc())
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn cmd_inbox(args: InboxArgs) -> anyhow::Result<ExitCode> {
    let (cfg, data_dir) = load_env().await?;
    let inbox = reminder::inbox(&data_dir);
    match args.cmd {
        InboxCmd::List { json } => {
            let notifications = inbox.list()?;
            if json {
                let mut s = serde_json::to_string_pretty(&notifications)?;
                s.push('\n');
                print!("{s}");
                return Ok(ExitCode::SUCCESS);
            }
            if notifications.is_empty() {
                println!("Inbox is empty.");
                return Ok(ExitCode::SUCCESS);
            }
            let mut t = Table::new(["ID", "TITLE", "MESSAGE", "RECEIVED"]);
            for n in &notifications {
                t.row([
                    n.id.to_string(),
                    n.title.clone(),
                    truncate(&n.body, 60),
                    clock::format_local(n.created_at),
                ]);
            }
            t.print()?;
        }
        InboxCmd::Open { id } => {
            inbox.activate(id)?;
            if tui::is_tty() {
                run_tui(&cfg, &data_dir).await?;
                return Ok(ExitCode::SUCCESS);
            }
            // Without a terminal UI the link is consumed here.
            let links = DeepLinkQueue::new(data_dir.deeplinks());
            let Some(task_id) = links.take_latest()? else {
                return Ok(ExitCode::SUCCESS);
            };
            let ctl = open_controller(&data_dir).await?;
            match ctl.store().get(task_id)? {
                Some(task) => {
                    let pending = ctl.scheduler().jobs().pending_for_tag(&tag_for(task_id))?;
                    print_task_details(&task, pending.first());
                }
                None => println!("Task {task_id} no longer exists."),
            }
        }
        InboxCmd::Clear => {
            let removed = inbox.clear()?;
            println!("Cleared {removed} notification(s).");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_version() -> ExitCode {
    println!("taskminder version {}", env!("CARGO_PKG_VERSION"));
    if let Some(commit) = option_env!("TASKMINDER_GIT_COMMIT") {
        println!("  commit: {commit}");
    }
    println!("  rust: {}", rustc_version_runtime::version());
    println!(
        "  os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    ExitCode::SUCCESS
}
