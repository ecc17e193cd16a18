use crate::cli::theme::Theme;
use crate::config::ThemeToken;
use ratatui::text::{Line, Span};

pub(crate) const TITLE: &str = "🤖 IOH Virtual Sales Assistant!";
pub(crate) const USER_PROMPT: &str = "kamu> ";
pub(crate) const ASSISTANT_PROMPT: &str = "robyn> ";
pub(crate) const TURN_FAILED_APOLOGY: &str =
    "Maaf kak, Robyn lagi ada gangguan. Coba tanya lagi sebentar ya.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OutputKind {
    AssistantText,
    SystemInfo,
    SystemError,
}

#[derive(Debug, Clone)]
pub(crate) enum TimelineEntry {
    UserInputCommand(String),
    OutputLine { kind: OutputKind, text: String },
    ChatTurn(ChatTurn),
}

#[derive(Debug, Clone)]
pub(crate) struct ChatTurn {
    pub(crate) prompt: String,
    pub(crate) events: Vec<StepEvent>,
    pub(crate) state: ChatTurnState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ChatTurnState {
    InFlight,
    Answered(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum StepEvent {
    ToolRequest { text: String },
    ToolResult { text: String },
    Retry { text: String },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push_output(&mut self, kind: OutputKind, text: &str) {
        for line in split_output_lines(text) {
            self.entries.push(TimelineEntry::OutputLine {
                kind,
                text: line.to_string(),
            });
        }
    }

    pub(crate) fn push_user_input_command(&mut self, text: &str) {
        self.entries
            .push(TimelineEntry::UserInputCommand(text.trim().to_string()));
    }

    pub(crate) fn push_chat_turn(&mut self, prompt: String) -> usize {
        let index = self.entries.len();
        self.entries.push(TimelineEntry::ChatTurn(ChatTurn {
            prompt,
            events: Vec::new(),
            state: ChatTurnState::InFlight,
        }));
        index
    }

    pub(crate) fn chat_turn_mut(&mut self, index: usize) -> Option<&mut ChatTurn> {
        match self.entries.get_mut(index) {
            Some(TimelineEntry::ChatTurn(turn)) => Some(turn),
            _ => None,
        }
    }

    pub(crate) fn render_lines(&self, theme: &Theme, show_steps: bool) -> Vec<Line<'static>> {
        if self.entries.is_empty() {
            return vec![
                Line::from(Span::styled(TITLE, theme.style(ThemeToken::Title))),
                Line::from(Span::styled(
                    "Tanya soal paket data, nelpon, atau SMS IOH. /help lists commands, Ctrl-T toggles database steps.",
                    theme.style(ThemeToken::SystemInfo),
                )),
            ];
        }

        let mut lines = Vec::new();
        for entry in &self.entries {
            match entry {
                TimelineEntry::UserInputCommand(text) => lines.push(Line::from(vec![
                    Span::styled("cmd> ", theme.style(ThemeToken::UserPrompt)),
                    Span::styled(text.clone(), theme.style(ThemeToken::UserInput)),
                ])),
                TimelineEntry::OutputLine { kind, text } => lines.push(Line::from(
                    Span::styled(text.clone(), theme.style(output_token_for(*kind))),
                )),
                TimelineEntry::ChatTurn(turn) => render_chat_turn(turn, theme, show_steps, &mut lines),
            }
        }

        lines
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

fn render_chat_turn(turn: &ChatTurn, theme: &Theme, show_steps: bool, lines: &mut Vec<Line<'static>>) {
    const STEP_PADDING: &str = "  ";

    for (idx, line) in split_output_lines(&turn.prompt).into_iter().enumerate() {
        let prefix = if idx == 0 { USER_PROMPT } else { "      " };
        lines.push(Line::from(vec![
            Span::styled(prefix, theme.style(ThemeToken::UserPrompt)),
            Span::styled(line.to_string(), theme.style(ThemeToken::UserInput)),
        ]));
    }

    if turn.state == ChatTurnState::InFlight || (show_steps && !turn.events.is_empty()) {
        lines.push(Line::from(""));
        lines.push(Line::from(vec![
            Span::raw(STEP_PADDING),
            Span::styled("Robyn lagi cek katalog...", theme.style(ThemeToken::AssistantWaiting)),
        ]));
        if show_steps {
            for event in &turn.events {
                let (text, token) = match event {
                    StepEvent::ToolRequest { text } => (text, ThemeToken::AssistantProgressRequest),
                    StepEvent::ToolResult { text } => (text, ThemeToken::AssistantProgressResult),
                    StepEvent::Retry { text } => (text, ThemeToken::SystemError),
                };
                lines.push(Line::from(Span::styled(
                    format!("{STEP_PADDING}{text}"),
                    theme.style(token),
                )));
            }
        }
        lines.push(Line::from(""));
    }

    match &turn.state {
        ChatTurnState::InFlight => {}
        ChatTurnState::Answered(text) => {
            for (idx, line) in split_output_lines(text).into_iter().enumerate() {
                let mut spans = Vec::with_capacity(2);
                if idx == 0 {
                    spans.push(Span::styled(
                        ASSISTANT_PROMPT,
                        theme.style(ThemeToken::AssistantPrompt),
                    ));
                }
                spans.push(Span::styled(
                    line.to_string(),
                    theme.style(ThemeToken::AssistantText),
                ));
                lines.push(Line::from(spans));
            }
        }
        ChatTurnState::Failed(message) => {
            lines.push(Line::from(vec![
                Span::styled(ASSISTANT_PROMPT, theme.style(ThemeToken::AssistantPrompt)),
                Span::styled(TURN_FAILED_APOLOGY, theme.style(ThemeToken::AssistantText)),
            ]));
            for line in split_output_lines(message) {
                lines.push(Line::from(Span::styled(
                    line.to_string(),
                    theme.style(ThemeToken::SystemError),
                )));
            }
        }
    }
}

fn split_output_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }

    text.lines().collect()
}

fn output_token_for(kind: OutputKind) -> ThemeToken {
    match kind {
        OutputKind::AssistantText => ThemeToken::AssistantText,
        OutputKind::SystemInfo => ThemeToken::SystemInfo,
        OutputKind::SystemError => ThemeToken::SystemError,
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatTurnState, OutputKind, StepEvent, TURN_FAILED_APOLOGY, Timeline, split_output_lines};
    use crate::cli::theme::Theme;

    fn text_lines(lines: Vec<ratatui::text::Line<'static>>) -> Vec<String> {
        lines.into_iter().map(|line| line.to_string()).collect()
    }

    fn answered_turn_fixture() -> Timeline {
        let mut timeline = Timeline::new();
        let idx = timeline.push_chat_turn("paket data termurah apa?".to_string());
        let turn = timeline.chat_turn_mut(idx).expect("chat turn index should exist");
        turn.events = vec![
            StepEvent::ToolRequest {
                text: "-> execute_query".to_string(),
            },
            StepEvent::ToolResult {
                text: "<- execute_query: 1 row".to_string(),
            },
        ];
        turn.state = ChatTurnState::Answered("Freedom Internet 5GB, Rp25.000 kak!".to_string());
        timeline
    }

    #[test]
    fn split_lines_works() {
        assert_eq!(split_output_lines("a\nb\n"), vec!["a", "b"]);
        assert!(split_output_lines("").is_empty());
    }

    #[test]
    fn empty_timeline_renders_title_and_hint() {
        let lines = text_lines(Timeline::new().render_lines(&Theme::new(false), true));
        insta::assert_snapshot!(lines.join("\n"), @r"
        🤖 IOH Virtual Sales Assistant!
        Tanya soal paket data, nelpon, atau SMS IOH. /help lists commands, Ctrl-T toggles database steps.
        ");
    }

    #[test]
    fn answered_turn_hides_steps_when_toggle_off() {
        let lines = text_lines(answered_turn_fixture().render_lines(&Theme::new(false), false));
        assert_eq!(
            lines,
            vec![
                "kamu> paket data termurah apa?",
                "robyn> Freedom Internet 5GB, Rp25.000 kak!",
            ]
        );
    }

    #[test]
    fn answered_turn_shows_steps_when_toggle_on() {
        let lines = text_lines(answered_turn_fixture().render_lines(&Theme::new(false), true));
        insta::assert_snapshot!(lines.join("\n"), @r"
        kamu> paket data termurah apa?

          Robyn lagi cek katalog...
          -> execute_query
          <- execute_query: 1 row

        robyn> Freedom Internet 5GB, Rp25.000 kak!
        ");
    }

    #[test]
    fn inflight_turn_always_shows_waiting_line() {
        let mut timeline = Timeline::new();
        let idx = timeline.push_chat_turn("halo".to_string());
        timeline
            .chat_turn_mut(idx)
            .expect("chat turn")
            .events
            .push(StepEvent::Retry {
                text: "retrying in 1000 ms".to_string(),
            });

        let hidden = text_lines(timeline.render_lines(&Theme::new(false), false));
        assert!(hidden.iter().any(|line| line == "  Robyn lagi cek katalog..."));
        assert!(!hidden.iter().any(|line| line.contains("retrying")));

        let shown = text_lines(timeline.render_lines(&Theme::new(false), true));
        assert!(shown.iter().any(|line| line == "  retrying in 1000 ms"));
    }

    #[test]
    fn failed_turn_renders_apology_and_error() {
        let mut timeline = Timeline::new();
        let idx = timeline.push_chat_turn("halo".to_string());
        timeline.chat_turn_mut(idx).expect("chat turn").state =
            ChatTurnState::Failed("assistant request failed: HTTP 403".to_string());

        let lines = text_lines(timeline.render_lines(&Theme::new(false), false));
        assert_eq!(lines[1], format!("robyn> {TURN_FAILED_APOLOGY}"));
        assert_eq!(lines[2], "assistant request failed: HTTP 403");
    }

    #[test]
    fn mixed_entries_render_in_order() {
        let mut timeline = Timeline::new();
        timeline.push_user_input_command("/tables");
        timeline.push_output(OutputKind::SystemInfo, "paket_ioh\npromo");
        let idx = timeline.push_chat_turn("line one\nline two".to_string());
        timeline.chat_turn_mut(idx).expect("chat turn").state =
            ChatTurnState::Answered("jawab\nlanjut".to_string());

        let lines = text_lines(timeline.render_lines(&Theme::new(false), false));
        assert_eq!(
            lines,
            vec![
                "cmd> /tables",
                "paket_ioh",
                "promo",
                "kamu> line one",
                "      line two",
                "robyn> jawab",
                "lanjut",
            ]
        );
    }

    #[test]
    fn clear_restores_welcome() {
        let mut timeline = answered_turn_fixture();
        timeline.clear();
        let lines = text_lines(timeline.render_lines(&Theme::new(false), false));
        assert_eq!(lines.len(), 2);
    }
}
