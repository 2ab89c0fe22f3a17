//! Terminal wizard for the wire-pod installer.
//!
//! Layout:
//! - Centered "installer window" frame titled "wire-pod installer"
//! - Left banner panel, main content panel with three pages (Preferences, Installing, Complete)
//! - Bottom button row: [ Back ] [ Install/Next/Exit ] [ Cancel ]
//! - Modal overlays for warnings, the install failure notice, cancel confirmation and the
//!   folder browser
//!
//! The install itself runs on a worker thread with its own tokio runtime. The UI thread polls
//! the context's progress cells once per tick and never blocks on the worker.
//!
//! Note: Logging is file-only in TUI mode (stdout logging is disabled) to avoid corrupting the
//! terminal UI.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use log::{error, info};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Gauge, Paragraph, Wrap};
use ratatui::Terminal;
use std::io::{self, Stdout};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::api::installer::{run_install, InstallReport};
use crate::models::progress::ProgressReporter;
use crate::models::settings::{InstallSettings, SettingsDraft};
use crate::models::state::InstallerContext;

const BANNER: &str = r#"
       _
 __ __(_)_ _ ___ ___ ___ ___  __| |
 \ V  V / | '_/ -_)___| '_ \/ _ \/ _` |
  \_/\_/|_|_| \___|   | .__/\___/\__,_|
                      |_|
"#;

const DETAIL_LINES: usize = 8;

/// How the wizard ended.
#[derive(Debug, Clone)]
pub enum TuiOutcome {
    Cancelled,
    Installed {
        report: InstallReport,
        start_after_exit: bool,
    },
    Failed {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Preferences,
    Installing,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonFocus {
    Back,
    Next,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FocusTarget {
    Field(usize),
    Button(ButtonFocus),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Modal {
    ConfirmCancel,
    Message {
        title: String,
        body: String,
        return_to: Option<Page>,
    },
    InstallFailed {
        body: String,
    },
    BrowseFolder {
        current: PathBuf,
        entries: Vec<PathBuf>,
        selected: usize,
    },
}

/// What the event loop must do after a key press.
#[derive(Debug)]
enum Action {
    None,
    StartInstall(InstallSettings),
}

#[derive(Debug)]
enum UiMsg {
    InstallFinished(std::result::Result<InstallReport, String>),
}

#[derive(Debug, Clone)]
struct TextInput {
    value: String,
    cursor: usize,
}

impl TextInput {
    fn new(value: impl Into<String>) -> Self {
        let v = value.into();
        Self {
            cursor: v.len(),
            value: v,
        }
    }

    fn set(&mut self, value: impl Into<String>) {
        self.value = value.into();
        self.cursor = self.value.len();
    }

    fn handle_key(&mut self, code: KeyCode) -> bool {
        match code {
            KeyCode::Char(c) => {
                self.value.insert(self.cursor, c);
                self.cursor += c.len_utf8();
                true
            }
            KeyCode::Backspace => {
                if let Some((idx, _)) = self.value[..self.cursor].char_indices().next_back() {
                    self.value.remove(idx);
                    self.cursor = idx;
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.value.len() {
                    self.value.remove(self.cursor);
                }
                true
            }
            KeyCode::Left => {
                if let Some((idx, _)) = self.value[..self.cursor].char_indices().next_back() {
                    self.cursor = idx;
                }
                true
            }
            KeyCode::Right => {
                if let Some(c) = self.value[self.cursor..].chars().next() {
                    self.cursor += c.len_utf8();
                }
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.value.len();
                true
            }
            _ => false,
        }
    }
}

struct WizardState {
    page: Page,
    modal: Option<Modal>,
    focus: FocusTarget,
    quit: bool,
    release_tag: String,

    // Preferences
    launch_on_login: bool,
    auto_update: bool,
    install_path: TextInput,
    web_port: TextInput,

    // Installing
    install_percent: f64,
    install_status: String,
    install_detail: Vec<String>,

    // Complete
    report: Option<InstallReport>,
    start_after_exit: bool,

    outcome: Option<TuiOutcome>,
}

impl WizardState {
    fn new(draft: SettingsDraft, release_tag: &str) -> Self {
        Self {
            page: Page::Preferences,
            modal: None,
            focus: FocusTarget::Field(0),
            quit: false,
            release_tag: release_tag.to_string(),
            launch_on_login: draft.launch_on_login,
            auto_update: draft.auto_update,
            install_path: TextInput::new(draft.install_path),
            web_port: TextInput::new(draft.web_port),
            install_percent: 0.0,
            install_status: String::new(),
            install_detail: Vec::new(),
            report: None,
            start_after_exit: true,
            outcome: None,
        }
    }

    fn draft(&self) -> SettingsDraft {
        SettingsDraft {
            launch_on_login: self.launch_on_login,
            auto_update: self.auto_update,
            install_path: self.install_path.value.clone(),
            web_port: self.web_port.value.clone(),
        }
    }

    fn finish(&mut self, outcome: TuiOutcome) {
        self.outcome = Some(outcome);
        self.quit = true;
    }
}

fn page_title(page: Page) -> &'static str {
    match page {
        Page::Preferences => "Installation Preferences",
        Page::Installing => "Installing wire-pod",
        Page::Complete => "Installation Complete",
    }
}

fn next_label(page: Page) -> &'static str {
    match page {
        Page::Preferences => "Install",
        Page::Installing => "Next",
        Page::Complete => "Exit",
    }
}

fn can_go_back(_page: Page) -> bool {
    // Preferences is the first page and nothing is undone once the install has started.
    false
}

fn can_go_next(page: Page) -> bool {
    page != Page::Installing
}

fn can_cancel(page: Page) -> bool {
    page == Page::Preferences
}

fn page_field_count(page: Page) -> usize {
    match page {
        Page::Preferences => 4,
        Page::Installing => 0,
        Page::Complete => 1,
    }
}

fn focused_text_input_mut(state: &mut WizardState) -> Option<&mut TextInput> {
    match (state.page, state.focus) {
        (Page::Preferences, FocusTarget::Field(2)) => Some(&mut state.install_path),
        (Page::Preferences, FocusTarget::Field(3)) => Some(&mut state.web_port),
        _ => None,
    }
}

fn focus_order(page: Page) -> Vec<FocusTarget> {
    let mut order: Vec<FocusTarget> = (0..page_field_count(page)).map(FocusTarget::Field).collect();
    if can_go_back(page) {
        order.push(FocusTarget::Button(ButtonFocus::Back));
    }
    if can_go_next(page) {
        order.push(FocusTarget::Button(ButtonFocus::Next));
    }
    if can_cancel(page) {
        order.push(FocusTarget::Button(ButtonFocus::Cancel));
    }
    order
}

fn move_focus(state: &mut WizardState, forward: bool) {
    let order = focus_order(state.page);
    if order.is_empty() {
        return;
    }
    let idx = order.iter().position(|f| *f == state.focus).unwrap_or(0);
    let next = if forward {
        (idx + 1) % order.len()
    } else {
        (idx + order.len() - 1) % order.len()
    };
    state.focus = order[next];
}

fn focused_button(state: &WizardState) -> ButtonFocus {
    match state.focus {
        FocusTarget::Button(b) => b,
        _ => ButtonFocus::Next,
    }
}

fn set_focused_button(state: &mut WizardState, b: ButtonFocus) {
    state.focus = FocusTarget::Button(b);
}

fn toggle_focused_checkbox(state: &mut WizardState) -> bool {
    match (state.page, state.focus) {
        (Page::Preferences, FocusTarget::Field(0)) => {
            state.launch_on_login = !state.launch_on_login;
            true
        }
        (Page::Preferences, FocusTarget::Field(1)) => {
            state.auto_update = !state.auto_update;
            true
        }
        (Page::Complete, FocusTarget::Field(0)) => {
            state.start_after_exit = !state.start_after_exit;
            true
        }
        _ => false,
    }
}

fn browse_folder_entries(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let rd = match std::fs::read_dir(dir) {
        Ok(r) => r,
        Err(_) => return out,
    };

    for entry in rd.flatten() {
        let p = entry.path();
        if p.is_dir() {
            out.push(p);
        }
    }

    out.sort_by_key(|a| a.to_string_lossy().to_lowercase());
    out
}

/// Folder to open the browser in: the install path's parent when it exists, else the cwd.
fn browse_start(install_path: &str) -> PathBuf {
    let raw = install_path.trim();
    let parent = Path::new(raw).parent().filter(|p| !p.as_os_str().is_empty());
    match parent {
        Some(p) if p.is_dir() => p.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

pub fn run(ctx: Arc<InstallerContext>) -> Result<TuiOutcome> {
    info!("[PHASE: tui] [STEP: start] Starting TUI wizard");

    let mut terminal = setup_terminal()?;
    let result = run_loop(&mut terminal, ctx);
    restore_terminal(&mut terminal)?;

    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    ctx: Arc<InstallerContext>,
) -> Result<TuiOutcome> {
    let tick_rate = Duration::from_millis(100);
    let mut last_tick = Instant::now();
    let mut state = WizardState::new(
        SettingsDraft::from_config(ctx.config()),
        ctx.release_tag(),
    );
    let (tx, rx) = mpsc::channel::<UiMsg>();

    while !state.quit {
        if state.page == Page::Installing {
            poll_progress(&mut state, ctx.progress());
        }
        drain_messages(&mut state, &rx);
        terminal.draw(|f| draw(f.size(), f, &state))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_millis(0));

        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Action::StartInstall(settings) = handle_key(&mut state, key.code) {
                        spawn_install(Arc::clone(&ctx), settings, tx.clone());
                    }
                }
            }
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    }

    Ok(state.outcome.unwrap_or(TuiOutcome::Cancelled))
}

fn spawn_install(ctx: Arc<InstallerContext>, settings: InstallSettings, tx: mpsc::Sender<UiMsg>) {
    thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build();
        let result = match rt {
            Ok(rt) => rt
                .block_on(run_install(&ctx, &settings))
                .map_err(|e| e.to_string()),
            Err(e) => Err(format!("Internal error starting installer: {}", e)),
        };
        if let Err(message) = &result {
            error!("[PHASE: tui] [STEP: install] Install worker finished with error: {}", message);
        }
        let _ = tx.send(UiMsg::InstallFinished(result));
    });
}

fn poll_progress(state: &mut WizardState, progress: &ProgressReporter) {
    state.install_percent = progress.latest_percent();
    let status = progress.latest_status();
    if !status.trim().is_empty() && status != state.install_status {
        state.install_detail.push(status.clone());
        if state.install_detail.len() > DETAIL_LINES {
            let start = state.install_detail.len() - DETAIL_LINES;
            state.install_detail.drain(..start);
        }
        state.install_status = status;
    }
}

fn drain_messages(state: &mut WizardState, rx: &mpsc::Receiver<UiMsg>) {
    while let Ok(msg) = rx.try_recv() {
        apply_message(state, msg);
    }
}

fn apply_message(state: &mut WizardState, msg: UiMsg) {
    match msg {
        UiMsg::InstallFinished(Ok(report)) => {
            state.install_percent = 100.0;
            state.report = Some(report);
            state.page = Page::Complete;
            state.focus = FocusTarget::Field(0);
        }
        UiMsg::InstallFinished(Err(message)) => {
            state.modal = Some(Modal::InstallFailed {
                body: format!(
                    "Error installing wire-pod: {}\n\nThe installation has been reverted. Press Enter to exit.",
                    message
                ),
            });
            set_focused_button(state, ButtonFocus::Next);
        }
    }
}

fn handle_key(state: &mut WizardState, code: KeyCode) -> Action {
    // Modal handling
    if let Some(modal) = state.modal.clone() {
        match modal {
            Modal::ConfirmCancel => match code {
                KeyCode::Left | KeyCode::Right | KeyCode::Tab => {
                    let next = match focused_button(state) {
                        ButtonFocus::Cancel => ButtonFocus::Next,
                        _ => ButtonFocus::Cancel,
                    };
                    set_focused_button(state, next);
                }
                KeyCode::Enter => {
                    let confirm = focused_button(state) == ButtonFocus::Cancel;
                    state.modal = None;
                    if confirm {
                        info!("[PHASE: tui] [STEP: cancel] User cancelled before installing");
                        state.finish(TuiOutcome::Cancelled);
                    }
                }
                KeyCode::Esc => {
                    state.modal = None;
                }
                _ => {}
            },
            Modal::Message { return_to, .. } => {
                if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                    state.modal = None;
                    if let Some(p) = return_to {
                        state.page = p;
                    }
                }
            }
            Modal::InstallFailed { body } => {
                if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                    state.modal = None;
                    state.finish(TuiOutcome::Failed { message: body });
                }
            }
            Modal::BrowseFolder {
                mut current,
                mut entries,
                mut selected,
            } => {
                match code {
                    KeyCode::Up => {
                        selected = selected.saturating_sub(1);
                    }
                    KeyCode::Down => {
                        if !entries.is_empty() {
                            selected = (selected + 1).min(entries.len().saturating_sub(1));
                        }
                    }
                    KeyCode::Enter => {
                        if let Some(next) = entries.get(selected).cloned() {
                            current = next;
                            entries = browse_folder_entries(&current);
                            selected = 0;
                        }
                    }
                    KeyCode::Backspace => {
                        if let Some(parent) = current.parent() {
                            current = parent.to_path_buf();
                            entries = browse_folder_entries(&current);
                            selected = 0;
                        }
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => {
                        state
                            .install_path
                            .set(current.join("wire-pod").to_string_lossy().to_string());
                        state.modal = None;
                        return Action::None;
                    }
                    KeyCode::Esc => {
                        state.modal = None;
                        return Action::None;
                    }
                    _ => {}
                }

                state.modal = Some(Modal::BrowseFolder {
                    current,
                    entries,
                    selected,
                });
            }
        }
        return Action::None;
    }

    // Global keys
    if matches!(code, KeyCode::Esc) && can_cancel(state.page) {
        state.modal = Some(Modal::ConfirmCancel);
        set_focused_button(state, ButtonFocus::Next); // "No"
        return Action::None;
    }

    // Text input handling (when a field is focused)
    if let Some(input) = focused_text_input_mut(state) {
        if input.handle_key(code) {
            return Action::None;
        }
    }

    match code {
        KeyCode::Tab | KeyCode::Down => move_focus(state, true),
        KeyCode::BackTab | KeyCode::Up => move_focus(state, false),
        KeyCode::Char(' ') => {
            toggle_focused_checkbox(state);
        }
        KeyCode::Char('b') | KeyCode::Char('B') if state.page == Page::Preferences => {
            let current = browse_start(&state.install_path.value);
            let entries = browse_folder_entries(&current);
            state.modal = Some(Modal::BrowseFolder {
                current,
                entries,
                selected: 0,
            });
        }
        KeyCode::Left | KeyCode::Right if matches!(state.focus, FocusTarget::Button(_)) => {
            move_focus(state, code == KeyCode::Right);
            if !matches!(state.focus, FocusTarget::Button(_)) {
                let order = focus_order(state.page);
                let buttons: Vec<FocusTarget> = order
                    .into_iter()
                    .filter(|f| matches!(f, FocusTarget::Button(_)))
                    .collect();
                if let Some(b) = if code == KeyCode::Right {
                    buttons.first()
                } else {
                    buttons.last()
                } {
                    state.focus = *b;
                }
            }
        }
        KeyCode::Enter => {
            if toggle_focused_checkbox(state) {
                return Action::None;
            }
            if matches!(state.focus, FocusTarget::Field(_)) {
                move_focus(state, true);
                return Action::None;
            }
            match focused_button(state) {
                ButtonFocus::Back => {}
                ButtonFocus::Next => return press_next(state),
                ButtonFocus::Cancel => {
                    if can_cancel(state.page) {
                        state.modal = Some(Modal::ConfirmCancel);
                        set_focused_button(state, ButtonFocus::Next);
                    }
                }
            }
        }
        _ => {}
    }
    Action::None
}

fn press_next(state: &mut WizardState) -> Action {
    match state.page {
        Page::Preferences => match state.draft().freeze() {
            Ok(settings) => {
                info!(
                    "[PHASE: tui] [STEP: preferences] Preferences accepted (install_path={:?}, web_port={})",
                    settings.install_path(),
                    settings.web_port()
                );
                state.page = Page::Installing;
                state.install_percent = 0.0;
                state.install_status = "Starting installation...".to_string();
                state.install_detail = vec![state.install_status.clone()];
                Action::StartInstall(settings)
            }
            Err(e) => {
                info!(
                    "[PHASE: tui] [STEP: preferences] Preferences rejected: {}",
                    e
                );
                state.modal = Some(Modal::Message {
                    title: "Warning".to_string(),
                    body: e.to_string(),
                    return_to: Some(Page::Preferences),
                });
                Action::None
            }
        },
        Page::Installing => Action::None,
        Page::Complete => {
            match state.report.clone() {
                Some(report) => state.finish(TuiOutcome::Installed {
                    report,
                    start_after_exit: state.start_after_exit,
                }),
                None => state.finish(TuiOutcome::Cancelled),
            }
            Action::None
        }
    }
}

fn checkbox(label: &str, checked: bool, focused: bool) -> Line<'static> {
    let mark = if checked { "[x]" } else { "[ ]" };
    let style = if focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    Line::from(Span::styled(format!("{} {}", mark, label), style))
}

fn text_field(label: &str, input: &TextInput, focused: bool) -> Vec<Line<'static>> {
    let style = if focused {
        Style::default().add_modifier(Modifier::UNDERLINED)
    } else {
        Style::default()
    };
    vec![
        Line::from(label.to_string()),
        Line::from(Span::styled(format!("> {}", input.value), style)),
    ]
}

fn draw(area: Rect, f: &mut ratatui::Frame<'_>, state: &WizardState) {
    let window_area = centered_window(area, 90, 24);

    // Outer frame
    let outer_block = Block::default()
        .borders(Borders::ALL)
        .title("wire-pod installer");
    f.render_widget(outer_block, window_area);

    // Inner layout: banner + content + buttons row
    let inner = window_area.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(1)].as_ref())
        .split(inner);

    let body = rows[0];
    let buttons = rows[1];

    let cols = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(42), Constraint::Min(0)].as_ref())
        .split(body);

    // Left banner
    let banner = Paragraph::new(Text::from(format!(
        "{}\n  Release: {}",
        BANNER, state.release_tag
    )))
    .block(Block::default().borders(Borders::ALL))
    .alignment(Alignment::Left);
    f.render_widget(banner, cols[0]);

    // Right content
    let content_block = Block::default()
        .borders(Borders::ALL)
        .title(page_title(state.page));
    f.render_widget(content_block, cols[1]);
    let content_inner = cols[1].inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });

    match state.page {
        Page::Preferences => {
            let focus = |i: usize| state.focus == FocusTarget::Field(i);
            let mut lines = vec![
                checkbox("Launch wire-pod on login", state.launch_on_login, focus(0)),
                checkbox(
                    "Auto-update wire-pod (not implemented yet)",
                    state.auto_update,
                    focus(1),
                ),
                Line::from(""),
            ];
            lines.extend(text_field(
                "Installation Directory (B to browse)",
                &state.install_path,
                focus(2),
            ));
            lines.push(Line::from(""));
            lines.extend(text_field("Web Configurator Port", &state.web_port, focus(3)));
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Tab moves, Space toggles, Enter on Install starts.",
                Style::default().fg(Color::DarkGray),
            )));
            let p = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
            f.render_widget(p, content_inner);
        }
        Page::Installing => {
            let parts = Layout::default()
                .direction(Direction::Vertical)
                .constraints(
                    [
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Min(0),
                    ]
                    .as_ref(),
                )
                .split(content_inner);

            let status = Paragraph::new(format!("Current action: {}", state.install_status));
            f.render_widget(status, parts[0]);

            let pct = state.install_percent.clamp(0.0, 100.0).round() as u16;
            let gauge = Gauge::default()
                .gauge_style(Style::default().fg(Color::Green))
                .percent(pct);
            f.render_widget(gauge, parts[1]);

            let lines: Vec<Line> = state
                .install_detail
                .iter()
                .map(|l| Line::from(l.clone()))
                .collect();
            let detail = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
            f.render_widget(detail, parts[3]);
        }
        Page::Complete => {
            let mut lines = vec![Line::from("wire-pod has finished installing!"), Line::from("")];
            if let Some(report) = state.report.as_ref() {
                lines.push(Line::from(format!(
                    "Installed to: {}",
                    report.install_path.to_string_lossy()
                )));
                lines.push(Line::from(""));
            }
            lines.push(checkbox(
                "Start wire-pod after exit?",
                state.start_after_exit,
                state.focus == FocusTarget::Field(0),
            ));
            let p = Paragraph::new(Text::from(lines)).wrap(Wrap { trim: false });
            f.render_widget(p, content_inner);
        }
    }

    // Bottom buttons row (right-aligned)
    draw_buttons(f, buttons, state);

    // Modal overlay
    if let Some(modal) = state.modal.as_ref() {
        match modal {
            Modal::ConfirmCancel => draw_cancel_modal(f, window_area, state),
            Modal::Message { title, body, .. } => {
                draw_message_modal(f, window_area, title, body, state)
            }
            Modal::InstallFailed { body } => {
                draw_message_modal(f, window_area, "Installation failed", body, state)
            }
            Modal::BrowseFolder {
                current,
                entries,
                selected,
            } => draw_browse_folder_modal(f, window_area, current, entries, *selected),
        }
    }
}

fn centered_window(area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(area.width);
    let h = height.min(area.height);
    let x = area.x + (area.width.saturating_sub(w)) / 2;
    let y = area.y + (area.height.saturating_sub(h)) / 2;
    Rect {
        x,
        y,
        width: w,
        height: h,
    }
}

fn modal_rect(window_area: Rect, width: u16, height: u16) -> Rect {
    let w = width.min(window_area.width.saturating_sub(4)).max(20);
    let h = height.min(window_area.height.saturating_sub(4)).max(5);
    Rect {
        x: window_area.x + (window_area.width.saturating_sub(w)) / 2,
        y: window_area.y + (window_area.height.saturating_sub(h)) / 2,
        width: w,
        height: h,
    }
}

fn draw_buttons(f: &mut ratatui::Frame<'_>, area: Rect, state: &WizardState) {
    let back = button_text(
        "Back",
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Back)),
        can_go_back(state.page),
    );
    let next = button_text(
        next_label(state.page),
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Next)),
        can_go_next(state.page),
    );
    let cancel = button_text(
        "Cancel",
        matches!(state.focus, FocusTarget::Button(ButtonFocus::Cancel)),
        can_cancel(state.page),
    );

    let line = Line::from(vec![back, Span::raw(" "), next, Span::raw(" "), cancel]);
    let p = Paragraph::new(Text::from(line)).alignment(Alignment::Right);
    f.render_widget(p, area);
}

fn button_text(label: &str, focused: bool, enabled: bool) -> Span<'static> {
    let mut style = Style::default();
    if !enabled {
        style = style.fg(Color::DarkGray);
    }
    if focused && enabled {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(format!("[ {} ]", label), style)
}

fn reversed_if(focused: bool) -> Style {
    if focused {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    }
}

fn draw_cancel_modal(f: &mut ratatui::Frame<'_>, window_area: Rect, state: &WizardState) {
    let area = modal_rect(window_area, 56, 7);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Cancel Setup?");
    let body = Paragraph::new(Text::from(vec![
        Line::from("wire-pod has not been installed yet. Exit the installer?"),
        Line::from(""),
        Line::from(""),
    ]))
    .block(block)
    .wrap(Wrap { trim: false });
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(body, area);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width - 2,
        height: 1,
    };
    let yes = Span::styled(
        "[ Yes, cancel ]",
        reversed_if(focused_button(state) == ButtonFocus::Cancel),
    );
    let no = Span::styled("[ No ]", reversed_if(focused_button(state) == ButtonFocus::Next));
    let p = Paragraph::new(Text::from(Line::from(vec![yes, Span::raw(" "), no])))
        .alignment(Alignment::Right);
    f.render_widget(p, buttons_area);
}

fn draw_message_modal(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    title: &str,
    body: &str,
    state: &WizardState,
) {
    let area = modal_rect(window_area, 70, 10);

    let block = Block::default().borders(Borders::ALL).title(title.to_string());
    let p = Paragraph::new(Text::from(body.to_string()))
        .block(block)
        .wrap(Wrap { trim: false });
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(p, area);

    let buttons_area = Rect {
        x: area.x + 1,
        y: area.y + area.height - 2,
        width: area.width - 2,
        height: 1,
    };
    let ok = Span::styled(
        "[ OK ]",
        reversed_if(matches!(state.focus, FocusTarget::Button(ButtonFocus::Next))),
    );
    let p = Paragraph::new(Text::from(Line::from(vec![ok]))).alignment(Alignment::Right);
    f.render_widget(p, buttons_area);
}

fn draw_browse_folder_modal(
    f: &mut ratatui::Frame<'_>,
    window_area: Rect,
    current: &Path,
    entries: &[PathBuf],
    selected: usize,
) {
    let area = modal_rect(window_area, 78, 16);

    let block = Block::default()
        .borders(Borders::ALL)
        .title("Browse for Folder");
    f.render_widget(ratatui::widgets::Clear, area);
    f.render_widget(block, area);

    let inner = area.inner(&ratatui::layout::Margin {
        vertical: 1,
        horizontal: 1,
    });
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(2),
                Constraint::Min(0),
                Constraint::Length(1),
            ]
            .as_ref(),
        )
        .split(inner);

    let header = Paragraph::new(Text::from(vec![
        Line::from(format!("Current: {}", current.to_string_lossy())),
        Line::from("Enter=open  Backspace=up  S=select  Esc=cancel"),
    ]))
    .wrap(Wrap { trim: true });
    f.render_widget(header, rows[0]);

    let list_height = rows[1].height as usize;
    let start = selected.saturating_sub(list_height / 2);
    let end = (start + list_height).min(entries.len());

    let mut lines: Vec<Line> = Vec::new();
    if entries.is_empty() {
        lines.push(Line::from("(no subfolders)"));
    } else {
        for (i, p) in entries.iter().enumerate().take(end).skip(start) {
            let name = p.file_name().and_then(|s| s.to_str()).unwrap_or("<folder>");
            lines.push(Line::from(Span::styled(name.to_string(), reversed_if(i == selected))));
        }
    }
    f.render_widget(Paragraph::new(Text::from(lines)), rows[1]);

    let footer = Paragraph::new("Select installs into a \"wire-pod\" folder inside the current one.")
        .wrap(Wrap { trim: true });
    f.render_widget(footer, rows[2]);
}
