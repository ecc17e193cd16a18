#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Command {
    Help,
    Clear,
    Tables,
    Describe { table: String },
    Transcript,
    Trace,
    Steps(Option<bool>),
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParseError {
    message: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }
}

pub(crate) const HELP_TEXT: &str = "Available commands:\n  /help                Show this command list\n  /clear               Clear the timeline output\n  /tables              List catalog tables\n  /describe <table>    Show the columns of a catalog table\n  /transcript          Show the conversation as the model sees it\n  /trace               Show path to the current trace file\n  /steps [on|off]      Show or hide assistant database steps\n  /quit                Leave the chat";

pub(crate) fn parse_command(line: &str) -> Result<Command, ParseError> {
    let Some(command_text) = line.trim_end().strip_prefix('/') else {
        return Err(ParseError::new("not a command"));
    };

    let mut parts = command_text.splitn(2, char::is_whitespace);
    let name = parts.next().unwrap_or("").to_ascii_lowercase();
    if name.is_empty() {
        return Err(ParseError::new("empty command. Try /help"));
    }
    let rest = parts.next().map(str::trim).unwrap_or("");

    match name.as_str() {
        "help" => expect_no_args(rest, Command::Help, "usage: /help"),
        "clear" => expect_no_args(rest, Command::Clear, "usage: /clear"),
        "tables" => expect_no_args(rest, Command::Tables, "usage: /tables"),
        "describe" => parse_describe(rest),
        "transcript" => expect_no_args(rest, Command::Transcript, "usage: /transcript"),
        "trace" => expect_no_args(rest, Command::Trace, "usage: /trace"),
        "steps" => parse_steps(rest),
        "quit" | "exit" => expect_no_args(rest, Command::Quit, "usage: /quit"),
        _ => Err(ParseError::new(format!(
            "unknown command '/{name}'. Try /help"
        ))),
    }
}

pub(crate) fn is_command_line(line: &str) -> bool {
    line.starts_with('/')
}

fn expect_no_args(rest: &str, command: Command, usage: &str) -> Result<Command, ParseError> {
    if rest.is_empty() {
        Ok(command)
    } else {
        Err(ParseError::new(usage))
    }
}

fn parse_describe(rest: &str) -> Result<Command, ParseError> {
    if rest.is_empty() || rest.contains(char::is_whitespace) {
        return Err(ParseError::new("usage: /describe <table>"));
    }

    Ok(Command::Describe {
        table: rest.to_string(),
    })
}

fn parse_steps(rest: &str) -> Result<Command, ParseError> {
    match rest {
        "" => Ok(Command::Steps(None)),
        "on" => Ok(Command::Steps(Some(true))),
        "off" => Ok(Command::Steps(Some(false))),
        _ => Err(ParseError::new("usage: /steps [on|off]")),
    }
}
