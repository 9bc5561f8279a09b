#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyModifiers};
use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState, Wrap};
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::app::{TaskController, TaskFilter, describe_outcome, filter_tasks};
use crate::clock;
use crate::reminder::deeplink::DeepLinkQueue;
use crate::settings::{DEFAULT_LEAD_TIME_MINUTES, LEAD_TIME_OPTIONS};
use crate::task::model::{CATEGORIES, NewTask, Task};
use crate::task::storage::TaskSet;
use crate::tui::input::{self, TextInput};
use crate::tui::{self, TerminalGuard};

/// How often the browser looks for changes made by other processes
/// (CLI edits, deep links pushed from the inbox).
const EXTERNAL_POLL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuiOptions {
    pub icons: bool,
    pub hide_completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Normal,
    Search,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DialogField {
    Title,
    Description,
    Due,
    Category,
    Notify,
}

impl DialogField {
    const ORDER: [Self; 5] = [
        Self::Title,
        Self::Description,
        Self::Due,
        Self::Category,
        Self::Notify,
    ];

    fn index(self) -> usize {
        Self::ORDER.iter().position(|&f| f == self).unwrap_or(0)
    }

    fn next(self) -> Self {
        Self::ORDER[(self.index() + 1) % Self::ORDER.len()]
    }

    fn prev(self) -> Self {
        Self::ORDER[(self.index() + Self::ORDER.len() - 1) % Self::ORDER.len()]
    }
}

/// Add or edit form. `editing` holds the task being edited.
#[derive(Debug, Clone)]
struct TaskDialog {
    editing: Option<Task>,
    field: DialogField,
    title: TextInput,
    description: TextInput,
    due: TextInput,
    category: String,
    notify: bool,
    error: Option<String>,
}

impl TaskDialog {
    fn new_task() -> Self {
        Self {
            editing: None,
            field: DialogField::Title,
            title: TextInput::default(),
            description: TextInput::default(),
            due: TextInput::new("+1h"),
            category: CATEGORIES[0].to_owned(),
            notify: true,
            error: None,
        }
    }

    fn edit(task: &Task) -> Self {
        Self {
            editing: Some(task.clone()),
            field: DialogField::Title,
            title: TextInput::new(task.title.clone()),
            description: TextInput::new(task.description.clone()),
            due: TextInput::new(clock::format_local(task.due_time)),
            category: task.category.clone(),
            notify: task.is_notification_enabled,
            error: None,
        }
    }

    fn cycle_category(&mut self, forward: bool) {
        let n = CATEGORIES.len();
        let next = match CATEGORIES.iter().position(|&c| c == self.category) {
            Some(i) if forward => (i + 1) % n,
            Some(i) => (i + n - 1) % n,
            None => 0,
        };
        CATEGORIES[next].clone_into(&mut self.category);
    }

    /// The due time as entered. An untouched edit keeps the stored value,
    /// which carries more precision than the displayed minutes.
    fn due_time(&self, now: OffsetDateTime) -> Result<OffsetDateTime, String> {
        if let Some(task) = &self.editing
            && self.due.as_str() == clock::format_local(task.due_time)
        {
            return Ok(task.due_time);
        }
        clock::parse_due(self.due.as_str(), now).map_err(|e| e.to_string())
    }
}

#[derive(Debug, Clone)]
struct ConfirmDelete {
    id: i64,
    title: String,
}

struct Toast {
    message: String,
    until: Instant,
}

impl Toast {
    fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            until: Instant::now() + Duration::from_secs(3),
        }
    }
}

struct AppState {
    ctl: TaskController,
    links: DeepLinkQueue,
    icons: bool,

    rx: watch::Receiver<TaskSet>,
    all: TaskSet,
    visible: Vec<Task>,
    filter: TaskFilter,
    table_state: TableState,

    mode: Mode,
    search_input: TextInput,
    search_backup: String,
    dialog: Option<TaskDialog>,
    confirm: Option<ConfirmDelete>,
    show_help: bool,
    lead_time: u32,

    toast: Option<Toast>,
    last_error: Option<String>,
    should_quit: bool,
}

impl AppState {
    fn new(ctl: TaskController, links: DeepLinkQueue, opts: TuiOptions) -> Self {
        let rx = ctl.store().subscribe();
        let all = rx.borrow().clone();
        let mut app = Self {
            ctl,
            links,
            icons: opts.icons,
            rx,
            all,
            visible: Vec::new(),
            filter: TaskFilter {
                query: String::new(),
                hide_completed: opts.hide_completed,
            },
            table_state: TableState::default(),
            mode: Mode::Normal,
            search_input: TextInput::default(),
            search_backup: String::new(),
            dialog: None,
            confirm: None,
            show_help: false,
            lead_time: DEFAULT_LEAD_TIME_MINUTES,
            toast: None,
            last_error: None,
            should_quit: false,
        };
        app.recompute();
        app
    }

    fn sync_from_store(&mut self) {
        if self.rx.has_changed().unwrap_or(false) {
            self.all = self.rx.borrow_and_update().clone();
            self.recompute();
        }
    }

    /// Re-applies the filter, keeping the selected task selected if it is
    /// still visible.
    fn recompute(&mut self) {
        let keep = self.selected_task().map(|t| t.id);
        let fallback = self.table_state.selected().unwrap_or(0);
        self.visible = filter_tasks(&self.all, &self.filter)
            .into_iter()
            .cloned()
            .collect();
        if self.visible.is_empty() {
            self.table_state.select(None);
            return;
        }
        let idx = keep
            .and_then(|id| self.visible.iter().position(|t| t.id == id))
            .unwrap_or_else(|| fallback.min(self.visible.len() - 1));
        self.table_state.select(Some(idx));
    }

    fn selected_task(&self) -> Option<&Task> {
        self.table_state.selected().and_then(|i| self.visible.get(i))
    }

    fn move_selection(&mut self, delta: i64) {
        if self.visible.is_empty() {
            return;
        }
        let cur = i64::try_from(self.table_state.selected().unwrap_or(0)).unwrap_or(0);
        let max = i64::try_from(self.visible.len().saturating_sub(1)).unwrap_or(0);
        let next = usize::try_from((cur + delta).clamp(0, max)).unwrap_or(0);
        self.table_state.select(Some(next));
    }

    /// Selects the task, clearing the filter when it hides it. Returns false
    /// when the task no longer exists.
    fn focus_task(&mut self, id: i64) -> bool {
        if !self.visible.iter().any(|t| t.id == id) {
            if !self.all.iter().any(|t| t.id == id) {
                return false;
            }
            self.filter = TaskFilter::default();
            self.recompute();
        }
        let idx = self.visible.iter().position(|t| t.id == id);
        self.table_state.select(idx);
        idx.is_some()
    }

    /// Resumes into the edit form of the linked task.
    fn open_link(&mut self, id: i64) {
        if !self.focus_task(id) {
            self.toast = Some(Toast::info(format!("Task {id} no longer exists")));
            return;
        }
        if let Some(task) = self.selected_task() {
            let dialog = TaskDialog::edit(task);
            self.confirm = None;
            self.show_help = false;
            self.mode = Mode::Normal;
            self.dialog = Some(dialog);
            self.toast = Some(Toast::info(format!("Opened task {id} from reminder")));
        }
    }
}

/// Runs the interactive task browser until the user quits.
pub async fn run(
    ctl: TaskController,
    links: DeepLinkQueue,
    opts: TuiOptions,
) -> anyhow::Result<()> {
    let terminal = tui::init_terminal()?;
    let mut guard = TerminalGuard::new(terminal);

    let mut app = AppState::new(ctl, links, opts);
    poll_external(&mut app).await;
    let mut last_poll = Instant::now();

    loop {
        if let Some(toast) = &app.toast
            && Instant::now() >= toast.until
        {
            app.toast = None;
        }

        app.sync_from_store();
        if last_poll.elapsed() >= EXTERNAL_POLL {
            poll_external(&mut app).await;
            last_poll = Instant::now();
        }

        guard.terminal_mut()?.draw(|f| draw(f, &mut app))?;

        if app.should_quit {
            break;
        }

        if event::poll(Duration::from_millis(50))?
            && let Event::Key(key) = event::read()?
            && let Err(e) = handle_key(key, &mut app).await
        {
            app.last_error = Some(e.to_string());
        }
    }

    app.ctl.close();
    Ok(())
}

/// Picks up tasks written by other processes, the current lead time and the
/// newest pending deep link.
async fn poll_external(app: &mut AppState) {
    let store = Arc::clone(app.ctl.store());
    let links = app.links.clone();
    let settings = app.ctl.scheduler().settings().clone();
    let res = tokio::task::spawn_blocking(move || -> anyhow::Result<(Option<i64>, u32)> {
        store.refresh()?;
        Ok((links.take_latest()?, settings.get()))
    })
    .await;

    match res {
        Ok(Ok((link, lead_time))) => {
            app.lead_time = lead_time;
            app.sync_from_store();
            if let Some(id) = link {
                app.open_link(id);
            }
        }
        Ok(Err(e)) => app.last_error = Some(e.to_string()),
        Err(e) => app.last_error = Some(e.to_string()),
    }
}

async fn handle_key(key: KeyEvent, app: &mut AppState) -> anyhow::Result<()> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c')) {
        app.should_quit = true;
        return Ok(());
    }

    // Modals take precedence
    if app.confirm.is_some() {
        return handle_confirm_key(key, app).await;
    }
    if app.dialog.is_some() {
        return handle_dialog_key(key, app).await;
    }
    if app.show_help {
        if matches!(
            key.code,
            KeyCode::Esc | KeyCode::Char('q' | '?') | KeyCode::Enter
        ) {
            app.show_help = false;
        }
        return Ok(());
    }
    if app.mode == Mode::Search {
        handle_search_key(key, app);
        return Ok(());
    }

    app.last_error = None;
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.should_quit = true,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Up | KeyCode::Char('k') => app.move_selection(-1),
        KeyCode::Down | KeyCode::Char('j') => app.move_selection(1),
        KeyCode::PageUp => app.move_selection(-10),
        KeyCode::PageDown => app.move_selection(10),
        KeyCode::Home | KeyCode::Char('g') => app.move_selection(i64::MIN / 2),
        KeyCode::End | KeyCode::Char('G') => app.move_selection(i64::MAX / 2),
        KeyCode::Char('/') => {
            app.search_backup.clone_from(&app.filter.query);
            app.search_input = TextInput::new(app.filter.query.clone());
            app.mode = Mode::Search;
        }
        KeyCode::Char('h') => {
            app.filter.hide_completed = !app.filter.hide_completed;
            app.recompute();
            app.toast = Some(Toast::info(if app.filter.hide_completed {
                "Hiding completed tasks"
            } else {
                "Showing completed tasks"
            }));
        }
        KeyCode::Char(' ' | 'x') => toggle_completed(app).await?,
        KeyCode::Char('m') => toggle_notification(app).await?,
        KeyCode::Char('d') | KeyCode::Delete => {
            if let Some(task) = app.selected_task() {
                app.confirm = Some(ConfirmDelete {
                    id: task.id,
                    title: task.title.clone(),
                });
            }
        }
        KeyCode::Char('n') => app.dialog = Some(TaskDialog::new_task()),
        KeyCode::Char('e') | KeyCode::Enter => {
            if let Some(task) = app.selected_task() {
                app.dialog = Some(TaskDialog::edit(task));
            }
        }
        KeyCode::Char('L') => cycle_lead_time(app).await?,
        KeyCode::Char('r') => poll_external(app).await,
        _ => {}
    }
    Ok(())
}

fn handle_search_key(key: KeyEvent, app: &mut AppState) {
    match key.code {
        KeyCode::Esc => {
            app.filter.query = std::mem::take(&mut app.search_backup);
            app.mode = Mode::Normal;
            app.recompute();
        }
        KeyCode::Enter => app.mode = Mode::Normal,
        KeyCode::Up => app.move_selection(-1),
        KeyCode::Down => app.move_selection(1),
        _ => {
            if app.search_input.handle_key(key) {
                app.filter.query = app.search_input.as_str().to_owned();
                app.recompute();
            }
        }
    }
}

async fn handle_confirm_key(key: KeyEvent, app: &mut AppState) -> anyhow::Result<()> {
    match key.code {
        KeyCode::Char('n') | KeyCode::Esc => app.confirm = None,
        KeyCode::Char('y') => {
            let Some(confirm) = app.confirm.take() else {
                return Ok(());
            };
            if app.ctl.delete(confirm.id).await?.is_some() {
                app.toast = Some(Toast::info(format!("Deleted \"{}\"", confirm.title)));
            }
            app.sync_from_store();
        }
        _ => {}
    }
    Ok(())
}

async fn handle_dialog_key(key: KeyEvent, app: &mut AppState) -> anyhow::Result<()> {
    let Some(dialog) = app.dialog.as_mut() else {
        return Ok(());
    };

    match key.code {
        KeyCode::Esc => {
            app.dialog = None;
            return Ok(());
        }
        KeyCode::Tab | KeyCode::Down => dialog.field = dialog.field.next(),
        KeyCode::BackTab | KeyCode::Up => dialog.field = dialog.field.prev(),
        KeyCode::Enter if dialog.field != DialogField::Notify => {
            dialog.field = dialog.field.next();
        }
        KeyCode::Enter => return submit_dialog(app).await,
        _ => match dialog.field {
            DialogField::Title => {
                dialog.title.handle_key(key);
            }
            DialogField::Description => {
                dialog.description.handle_key(key);
            }
            DialogField::Due => {
                dialog.due.handle_key(key);
            }
            DialogField::Category => match key.code {
                KeyCode::Left => dialog.cycle_category(false),
                KeyCode::Right | KeyCode::Char(' ') => dialog.cycle_category(true),
                _ => {}
            },
            DialogField::Notify => {
                if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
                    dialog.notify = !dialog.notify;
                }
            }
        },
    }
    Ok(())
}

async fn submit_dialog(app: &mut AppState) -> anyhow::Result<()> {
    let Some(dialog) = app.dialog.as_mut() else {
        return Ok(());
    };

    let title = dialog.title.as_str().trim().to_owned();
    if title.is_empty() {
        dialog.error = Some("title is required".to_owned());
        dialog.field = DialogField::Title;
        return Ok(());
    }
    let due = match dialog.due_time(OffsetDateTime::now_utc()) {
        Ok(due) => due,
        Err(e) => {
            dialog.error = Some(e);
            dialog.field = DialogField::Due;
            return Ok(());
        }
    };
    let description = dialog.description.as_str().to_owned();
    let category = dialog.category.clone();
    let notify = dialog.notify;

    let Some(original) = dialog.editing.clone() else {
        let new = NewTask {
            description,
            category,
            is_notification_enabled: notify,
            ..NewTask::new(title, due)
        };
        let (task, outcome) = app.ctl.add(new).await?;
        app.dialog = None;
        app.sync_from_store();
        app.focus_task(task.id);
        app.toast = Some(Toast::info(format!(
            "Added \"{}\" ({})",
            task.title,
            describe_outcome(outcome)
        )));
        return Ok(());
    };

    // Start from the stored record so changes made elsewhere survive.
    let current = app
        .all
        .iter()
        .find(|t| t.id == original.id)
        .cloned()
        .unwrap_or(original);
    let task = Task {
        title,
        description,
        due_time: due,
        category,
        is_notification_enabled: notify,
        ..current
    };
    let id = task.id;
    let outcome = app.ctl.update(task).await?;
    app.dialog = None;
    app.sync_from_store();
    app.focus_task(id);
    app.toast = Some(Toast::info(format!(
        "Saved task {id} ({})",
        describe_outcome(outcome)
    )));
    Ok(())
}

async fn toggle_completed(app: &mut AppState) -> anyhow::Result<()> {
    let Some(task) = app.selected_task().cloned() else {
        return Ok(());
    };
    let (updated, outcome) = app.ctl.set_completed(task.id, !task.is_completed).await?;
    app.sync_from_store();
    app.toast = Some(Toast::info(if updated.is_completed {
        format!("Completed \"{}\"", updated.title)
    } else {
        format!(
            "Reopened \"{}\" ({})",
            updated.title,
            describe_outcome(outcome)
        )
    }));
    Ok(())
}

async fn toggle_notification(app: &mut AppState) -> anyhow::Result<()> {
    let Some(task) = app.selected_task().cloned() else {
        return Ok(());
    };
    let (updated, outcome) = app
        .ctl
        .set_notification(task.id, !task.is_notification_enabled)
        .await?;
    app.sync_from_store();
    app.toast = Some(Toast::info(format!(
        "\"{}\": {}",
        updated.title,
        describe_outcome(outcome)
    )));
    Ok(())
}

async fn cycle_lead_time(app: &mut AppState) -> anyhow::Result<()> {
    let next = next_lead_time(app.lead_time);
    let settings = app.ctl.scheduler().settings().clone();
    tokio::task::spawn_blocking(move || settings.set(next)).await??;
    let scheduled = app.ctl.reschedule_active().await?;
    app.lead_time = next;
    app.toast = Some(Toast::info(format!(
        "Lead time {next}m, {scheduled} reminder(s) pending"
    )));
    Ok(())
}

fn next_lead_time(current: u32) -> u32 {
    LEAD_TIME_OPTIONS
        .iter()
        .position(|&m| m == current)
        .map_or(LEAD_TIME_OPTIONS[0], |i| {
            LEAD_TIME_OPTIONS[(i + 1) % LEAD_TIME_OPTIONS.len()]
        })
}

fn draw(f: &mut Frame<'_>, app: &mut AppState) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(1), Constraint::Length(1)])
        .split(area);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(root[0]);

    draw_task_table(f, body[0], app);
    draw_task_detail(f, body[1], app);
    draw_footer(f, root[1], app);

    if let Some(confirm) = &app.confirm {
        draw_confirm(f, confirm);
    }
    if let Some(dialog) = &app.dialog {
        draw_task_dialog(f, dialog);
    }
    if app.show_help {
        draw_help(f);
    }
    if app.mode == Mode::Search {
        draw_search_popup(f, app);
    }
}

fn completion_icon(task: &Task) -> &'static str {
    if task.is_completed { "✓" } else { "○" }
}

fn draw_task_table(f: &mut Frame<'_>, area: Rect, app: &mut AppState) {
    let now = OffsetDateTime::now_utc();
    let headers = Row::new(vec!["ID", "DUE", "CATEGORY", "REMIND", "TITLE"])
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = app.visible.iter().map(|t| {
        let id = if app.icons {
            format!("{} {}", completion_icon(t), t.id)
        } else {
            t.id.to_string()
        };
        let due_style = if !t.is_completed && t.due_time < now {
            Style::default().fg(Color::Red)
        } else {
            Style::default()
        };
        let title_style = if t.is_completed {
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::CROSSED_OUT)
        } else {
            Style::default()
        };
        Row::new(vec![
            Cell::from(id),
            Cell::from(clock::format_local(t.due_time)).style(due_style),
            Cell::from(t.category.clone()),
            Cell::from(if t.is_notification_enabled { "on" } else { "off" }),
            Cell::from(t.title.clone()).style(title_style),
        ])
    });

    let table = Table::new(
        rows,
        vec![
            Constraint::Length(8),
            Constraint::Length(17),
            Constraint::Length(10),
            Constraint::Length(6),
            Constraint::Min(10),
        ],
    )
    .header(headers)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Tasks ({}/{})", app.visible.len(), app.all.len())),
    )
    .row_highlight_style(
        Style::default()
            .fg(Color::Black)
            .bg(Color::LightBlue)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");

    f.render_stateful_widget(table, area, &mut app.table_state);
}

fn draw_task_detail(f: &mut Frame<'_>, area: Rect, app: &AppState) {
    let block = Block::default().borders(Borders::ALL).title("Details");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(t) = app.selected_task() else {
        let msg = if app.all.is_empty() {
            "No tasks yet. Press n to add one."
        } else {
            "No tasks match the current filter."
        };
        f.render_widget(Paragraph::new(msg).wrap(Wrap { trim: true }), inner);
        return;
    };

    let now = OffsetDateTime::now_utc();
    let bold = Style::default().add_modifier(Modifier::BOLD);
    let mut lines = vec![
        Line::from(vec![
            Span::styled("Task: ", bold),
            Span::raw(t.title.as_str()),
        ]),
        Line::from(format!("ID: {}", t.id)),
        Line::from(format!("Category: {}", t.category)),
        Line::from(format!(
            "Due: {} ({})",
            clock::format_local(t.due_time),
            clock::relative(t.due_time, now)
        )),
        Line::from(format!("Created: {}", clock::format_local(t.creation_time))),
        Line::from(format!(
            "Status: {}",
            if t.is_completed { "done" } else { "open" }
        )),
        Line::from(if t.is_notification_enabled {
            format!("Reminder: {}m before due", app.lead_time)
        } else {
            "Reminder: off".to_owned()
        }),
        Line::from(""),
        Line::from(Span::styled("Description:", bold)),
        Line::from(if t.description.trim().is_empty() {
            "-".to_owned()
        } else {
            t.description.clone()
        }),
    ];

    if !t.attachments.is_empty() {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled("Attachments:", bold)));
        lines.extend(t.attachments.iter().map(|a| Line::from(format!("- {a}"))));
    }

    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, app: &AppState) {
    let mut left = if app.confirm.is_some() {
        "y delete • n cancel".to_owned()
    } else if app.dialog.is_some() {
        "Enter next/save • Tab switch field • ←/→ change • Esc cancel".to_owned()
    } else if app.mode == Mode::Search {
        "Type to filter • Enter keep • Esc cancel".to_owned()
    } else {
        "q quit • j/k move • / search • h hide done • x done • m remind • n new • e edit • d delete • L lead time • ? help"
            .to_owned()
    };

    if let Some(err) = &app.last_error {
        left = format!("Error: {err}");
    } else if let Some(toast) = &app.toast {
        left.clone_from(&toast.message);
    }

    let right = format!(
        "Lead: {}m • Search: {} • Hide done: {}",
        app.lead_time,
        if app.filter.query.is_empty() {
            "-"
        } else {
            app.filter.query.as_str()
        },
        if app.filter.hide_completed {
            "on"
        } else {
            "off"
        },
    );

    let spans = vec![
        Span::styled(left, Style::default().fg(Color::White).bg(Color::Blue)),
        Span::raw(" "),
        Span::styled(
            right,
            Style::default()
                .fg(Color::White)
                .bg(Color::Blue)
                .add_modifier(Modifier::DIM),
        ),
    ];

    let p = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::Blue));
    f.render_widget(p, area);
}

fn draw_confirm(f: &mut Frame<'_>, confirm: &ConfirmDelete) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title("Delete task");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let lines = vec![
        Line::from(format!(
            "Delete \"{}\" (ID {}) and its reminder?",
            confirm.title, confirm.id
        )),
        Line::from(""),
        Line::from("[y] Delete    [n] Cancel"),
    ];
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), inner);
}

fn draw_task_dialog(f: &mut Frame<'_>, dialog: &TaskDialog) {
    let area = centered_rect(70, 50, f.area());
    f.render_widget(Clear, area);
    let title = match &dialog.editing {
        Some(task) => format!("Edit task {}", task.id),
        None => "New task".to_owned(),
    };
    let block = Block::default().borders(Borders::ALL).title(title);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let label = |field: DialogField, text: &'static str| {
        if dialog.field == field {
            Span::styled(
                text,
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
        } else {
            Span::styled(text, Style::default().add_modifier(Modifier::BOLD))
        }
    };

    let mut lines = vec![
        Line::from(vec![
            label(DialogField::Title, "Title:       "),
            Span::raw(dialog.title.as_str()),
        ]),
        Line::from(vec![
            label(DialogField::Description, "Description: "),
            Span::raw(dialog.description.as_str()),
        ]),
        Line::from(vec![
            label(DialogField::Due, "Due:         "),
            Span::raw(dialog.due.as_str()),
        ]),
        Line::from(vec![
            label(DialogField::Category, "Category:    "),
            Span::raw(format!("‹ {} ›", dialog.category)),
        ]),
        Line::from(vec![
            label(DialogField::Notify, "Remind me:   "),
            Span::raw(if dialog.notify { "[x]" } else { "[ ]" }),
        ]),
        Line::from(""),
        Line::from(Span::styled(
            "Due accepts +30m, +2h, YYYY-MM-DD HH:MM or RFC 3339.",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    if let Some(err) = &dialog.error {
        lines.push(Line::from(Span::styled(
            format!("Error: {err}"),
            Style::default().fg(Color::Red),
        )));
    }
    f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);

    let (row, text) = match dialog.field {
        DialogField::Title => (0, &dialog.title),
        DialogField::Description => (1, &dialog.description),
        DialogField::Due => (2, &dialog.due),
        DialogField::Category | DialogField::Notify => return,
    };
    let prefix = u16::try_from("Title:       ".chars().count()).unwrap_or(0);
    f.set_cursor_position((inner.x + prefix + input::cursor_x(text), inner.y + row));
}

fn draw_search_popup(f: &mut Frame<'_>, app: &AppState) {
    let area = popup_rect(f.area());
    f.render_widget(Clear, area);
    let block = Block::default().borders(Borders::ALL).title("Task search");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let prefix = "Search: ";
    let line = Line::from(vec![
        Span::styled(prefix, Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(app.search_input.as_str()),
    ]);
    f.render_widget(Paragraph::new(line), inner);

    let x = inner.x
        + u16::try_from(prefix.chars().count()).unwrap_or(0)
        + input::cursor_x(&app.search_input);
    f.set_cursor_position((x, inner.y));
}

fn draw_help(f: &mut Frame<'_>) {
    let area = centered_rect(60, 60, f.area());
    f.render_widget(Clear, area);
    let lines = vec![
        Line::from("Keys:"),
        Line::from("  j/k, ↑/↓    Move"),
        Line::from("  g/G         Top / bottom"),
        Line::from("  /           Search title, description, category"),
        Line::from("  h           Hide or show completed tasks"),
        Line::from("  x, Space    Toggle completed"),
        Line::from("  m           Toggle reminder"),
        Line::from("  n           New task"),
        Line::from("  e, Enter    Edit task"),
        Line::from("  d, Del      Delete task"),
        Line::from("  L           Cycle reminder lead time"),
        Line::from("  r           Reload from disk"),
        Line::from("  q/Esc       Quit"),
    ];
    let popup = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Help"))
        .wrap(Wrap { trim: false });
    f.render_widget(popup, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn popup_rect(area: Rect) -> Rect {
    let w = area.width.min(80);
    Rect {
        x: area.x + (area.width.saturating_sub(w)) / 2,
        y: area.y + 1,
        width: w,
        height: 3,
    }
}
