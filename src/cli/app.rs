use std::io;
use std::path::PathBuf;

use anyhow::Result;
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers, MouseEvent, MouseEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::backend::{Backend, CrosstermBackend};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::Modifier;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::{Frame, Terminal};

use crate::agent::AgentProgressEvent;
use crate::catalog::CatalogTools;
use crate::cli::commands::{Command, HELP_TEXT, is_command_line, parse_command};
use crate::cli::theme::Theme;
use crate::cli::timeline::{ChatTurnState, OutputKind, StepEvent, Timeline};
use crate::config::ThemeToken;
use crate::llm::provider::LlmProvider;
use crate::session::ChatSession;

const INPUT_PLACEHOLDER: &str = "Tanya apa ... ";
const SCROLL_PAGE: u16 = 10;
const MISSING_KEY_MESSAGE: &str = "Assistant unavailable: missing GOOGLE_API_KEY. Configure it in your shell, config.toml or .env file (example: GOOGLE_API_KEY=your_key).";

/// Everything the screen shows, kept apart from the session so a turn in
/// flight can redraw while the session is mutably borrowed.
pub(crate) struct UiState {
    session_id: String,
    trace_path: Option<PathBuf>,
    theme: Theme,
    pub(crate) timeline: Timeline,
    pub(crate) input: String,
    pub(crate) show_steps: bool,
    scroll_from_bottom: u16,
    pub(crate) should_quit: bool,
}

pub struct ChatApp<P, C> {
    session: Option<ChatSession<P, C>>,
    catalog: C,
    ui: UiState,
}

impl<P: LlmProvider + Sync, C: CatalogTools> ChatApp<P, C> {
    /// `session` is `None` when no API key is configured; catalog commands
    /// still work in that case.
    pub fn new(
        session_id: String,
        session: Option<ChatSession<P, C>>,
        catalog: C,
        theme: Theme,
        trace_path: Option<PathBuf>,
    ) -> Self {
        Self {
            session,
            catalog,
            ui: UiState {
                session_id,
                trace_path,
                theme,
                timeline: Timeline::new(),
                input: String::new(),
                show_steps: true,
                scroll_from_bottom: 0,
                should_quit: false,
            },
        }
    }

    pub fn should_quit(&self) -> bool {
        self.ui.should_quit
    }

    pub fn draw<B: Backend>(&self, terminal: &mut Terminal<B>) -> Result<()> {
        terminal.draw(|frame| self.ui.render(frame))?;
        Ok(())
    }

    pub async fn handle_key<B: Backend>(
        &mut self,
        key: KeyEvent,
        terminal: &mut Terminal<B>,
    ) -> Result<()> {
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => self.ui.should_quit = true,
            KeyCode::Char('t') if ctrl => self.ui.show_steps = !self.ui.show_steps,
            KeyCode::Esc => self.ui.should_quit = true,
            KeyCode::Enter => {
                let line = std::mem::take(&mut self.ui.input);
                self.ui.scroll_from_bottom = 0;
                self.handle_line(&line, terminal).await?;
            }
            KeyCode::Backspace => {
                self.ui.input.pop();
            }
            KeyCode::Up => self.ui.scroll_up(1),
            KeyCode::Down => self.ui.scroll_down(1),
            KeyCode::PageUp => self.ui.scroll_up(SCROLL_PAGE),
            KeyCode::PageDown => self.ui.scroll_down(SCROLL_PAGE),
            KeyCode::Char(ch) if !ctrl => self.ui.input.push(ch),
            _ => {}
        }
        Ok(())
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) {
        match mouse.kind {
            MouseEventKind::ScrollUp => self.ui.scroll_up(3),
            MouseEventKind::ScrollDown => self.ui.scroll_down(3),
            _ => {}
        }
    }

    async fn handle_line<B: Backend>(&mut self, line: &str, terminal: &mut Terminal<B>) -> Result<()> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(());
        }

        if is_command_line(line) {
            self.ui.timeline.push_user_input_command(line);
            match parse_command(line) {
                Ok(command) => self.run_command(command),
                Err(err) => self
                    .ui
                    .timeline
                    .push_output(OutputKind::SystemError, err.message()),
            }
            return Ok(());
        }

        let Some(session) = self.session.as_mut() else {
            let idx = self.ui.timeline.push_chat_turn(line.to_string());
            if let Some(turn) = self.ui.timeline.chat_turn_mut(idx) {
                turn.state = ChatTurnState::Failed(MISSING_KEY_MESSAGE.to_string());
            }
            return Ok(());
        };

        let ui = &mut self.ui;
        let idx = ui.timeline.push_chat_turn(line.to_string());
        terminal.draw(|frame| ui.render(frame))?;

        let result = session
            .send_with_events(line, &mut |event| {
                if let Some(step) = step_event(&event) {
                    if let Some(turn) = ui.timeline.chat_turn_mut(idx) {
                        turn.events.push(step);
                    }
                }
                // A failed redraw is retried by the next frame.
                let _ = terminal.draw(|frame| ui.render(frame));
            })
            .await;

        if let Some(turn) = ui.timeline.chat_turn_mut(idx) {
            turn.state = match result {
                Ok(outcome) => ChatTurnState::Answered(outcome.answer),
                Err(err) => ChatTurnState::Failed(err.to_string()),
            };
        }
        Ok(())
    }

    fn run_command(&mut self, command: Command) {
        let timeline = &mut self.ui.timeline;
        match command {
            Command::Help => timeline.push_output(OutputKind::SystemInfo, HELP_TEXT),
            Command::Clear => timeline.clear(),
            Command::Tables => match self.catalog.list_tables() {
                Ok(tables) if tables.is_empty() => {
                    timeline.push_output(OutputKind::SystemInfo, "No tables found.")
                }
                Ok(tables) => timeline.push_output(OutputKind::SystemInfo, &tables.join("\n")),
                Err(err) => timeline.push_output(OutputKind::SystemError, &err.to_string()),
            },
            Command::Describe { table } => match self.catalog.describe_table(&table) {
                Ok(columns) if columns.is_empty() => timeline.push_output(
                    OutputKind::SystemError,
                    &format!("table '{table}' not found"),
                ),
                Ok(columns) => {
                    let text = columns
                        .iter()
                        .map(|column| format!("{} {}", column.name, column.column_type))
                        .collect::<Vec<_>>()
                        .join("\n");
                    timeline.push_output(OutputKind::SystemInfo, &text);
                }
                Err(err) => timeline.push_output(OutputKind::SystemError, &err.to_string()),
            },
            Command::Transcript => {
                let entries = self
                    .session
                    .as_ref()
                    .map(ChatSession::display_transcript)
                    .unwrap_or_default();
                if entries.is_empty() {
                    timeline.push_output(OutputKind::SystemInfo, "Transcript is empty.");
                }
                for (role, text) in entries {
                    timeline.push_output(OutputKind::AssistantText, &format!("[{role}] {text}"));
                }
            }
            Command::Trace => match &self.ui.trace_path {
                Some(path) => timeline.push_output(
                    OutputKind::SystemInfo,
                    &format!("Trace file: {}", path.display()),
                ),
                None => timeline.push_output(OutputKind::SystemError, "Trace file unavailable."),
            },
            Command::Steps(Some(show)) => {
                self.ui.show_steps = show;
                timeline.push_output(OutputKind::SystemInfo, &format!("Steps: {}", on_off(show)));
            }
            Command::Steps(None) => {
                let message = format!("Steps: {}", on_off(self.ui.show_steps));
                timeline.push_output(OutputKind::SystemInfo, &message);
            }
            Command::Quit => self.ui.should_quit = true,
        }
    }
}

impl UiState {
    fn scroll_up(&mut self, rows: u16) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(rows);
    }

    fn scroll_down(&mut self, rows: u16) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(rows);
    }

    pub(crate) fn render(&self, frame: &mut Frame<'_>) {
        let [timeline_area, input_area, status_area] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(3),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        self.render_timeline(frame, timeline_area);
        self.render_input(frame, input_area);

        let status = format!(
            "IOH Virtual Sales Assistant | Session: {} | Steps: {} (Ctrl-T)",
            self.session_id,
            on_off(self.show_steps)
        );
        frame.render_widget(
            Paragraph::new(Line::from(Span::styled(
                status,
                self.theme.style(ThemeToken::Status),
            ))),
            status_area,
        );
    }

    fn render_timeline(&self, frame: &mut Frame<'_>, area: Rect) {
        let lines = self.timeline.render_lines(&self.theme, self.show_steps);
        let width = usize::from(area.width.max(1));
        let total_rows = lines
            .iter()
            .map(|line| line.width().div_ceil(width).max(1))
            .sum::<usize>();
        let max_top = total_rows.saturating_sub(usize::from(area.height));
        let top = max_top.saturating_sub(usize::from(self.scroll_from_bottom));
        let top = u16::try_from(top).unwrap_or(u16::MAX);

        frame.render_widget(
            Paragraph::new(lines)
                .wrap(Wrap { trim: false })
                .scroll((top, 0)),
            area,
        );
    }

    fn render_input(&self, frame: &mut Frame<'_>, area: Rect) {
        let style = self.theme.style(ThemeToken::InputBlock);
        let block = Block::default().borders(Borders::ALL).style(style);
        let inner = block.inner(area);

        let content = if self.input.is_empty() {
            Line::from(Span::styled(
                INPUT_PLACEHOLDER,
                style.add_modifier(Modifier::DIM),
            ))
        } else {
            // Keep the cursor end of long input visible.
            let visible = self
                .input
                .chars()
                .rev()
                .take(usize::from(inner.width.saturating_sub(1)))
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect::<String>();
            Line::from(Span::styled(visible, self.theme.style(ThemeToken::UserInput)))
        };
        frame.render_widget(Paragraph::new(content).block(block), area);

        let typed = u16::try_from(self.input.chars().count()).unwrap_or(u16::MAX);
        let cursor_x = inner.x + typed.min(inner.width.saturating_sub(1));
        frame.set_cursor_position((cursor_x, inner.y));
    }
}

fn step_event(event: &AgentProgressEvent) -> Option<StepEvent> {
    match event {
        AgentProgressEvent::ToolRequest {
            name, args_json, ..
        } => Some(StepEvent::ToolRequest {
            text: format!("-> {name} {args_json}"),
        }),
        AgentProgressEvent::ToolResult {
            name,
            response_json,
            ..
        } => Some(StepEvent::ToolResult {
            text: format!("<- {name}: {}", summarize_tool_result(response_json)),
        }),
        AgentProgressEvent::Retrying {
            attempt,
            delay,
            error,
            ..
        } => Some(StepEvent::Retry {
            text: format!(
                "!! attempt {attempt} failed ({error}), retrying in {} ms",
                delay.as_millis()
            ),
        }),
        AgentProgressEvent::StepStarted { .. } | AgentProgressEvent::ModelResponse { .. } => None,
    }
}

fn summarize_tool_result(response_json: &serde_json::Value) -> String {
    let result = &response_json["result"];
    if response_json["ok"].as_bool() != Some(true) {
        let code = response_json["error"]["code"].as_str().unwrap_or("error");
        return format!("error {code}");
    }
    if let Some(rows) = result["rows"].as_array() {
        return match rows.len() {
            1 => "1 row".to_string(),
            n => format!("{n} rows"),
        };
    }
    if let Some(tables) = result["tables"].as_array() {
        return format!("{} tables", tables.len());
    }
    if let Some(columns) = result["columns"].as_array() {
        return format!("{} columns", columns.len());
    }
    "ok".to_string()
}

fn on_off(value: bool) -> &'static str {
    if value { "On" } else { "Off" }
}

pub async fn run_app<P: LlmProvider + Sync, C: CatalogTools>(app: &mut ChatApp<P, C>) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = event_loop(app, &mut terminal).await;

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;
    result
}

async fn event_loop<B: Backend, P: LlmProvider + Sync, C: CatalogTools>(
    app: &mut ChatApp<P, C>,
    terminal: &mut Terminal<B>,
) -> Result<()> {
    while !app.should_quit() {
        app.draw(terminal)?;
        match event::read()? {
            Event::Key(key) => app.handle_key(key, terminal).await?,
            Event::Mouse(mouse) => app.handle_mouse(mouse),
            _ => {}
        }
    }
    Ok(())
}
