//! Console command parsing

use std::str::FromStr;
use thiserror::Error;

/// Help text listing every console command
pub const HELP: &str = "\
Commands:
  start [name]   Start recording (name defaults to the current date and time)
  stop           Stop recording and close the log
  archive        Archive the stopped session (alias: upload)
  discard        Drop the stopped session without archiving
  status         Show the full status
  json           Show the status as JSON
  help           Show this help
  exit           Shut down and quit (alias: quit)";

/// One line of console input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start(Option<String>),
    Stop,
    Archive,
    Discard,
    Status,
    Json,
    Help,
    Exit,
}

/// Why a console line was not understood
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?} (type 'help')")]
    Unknown(String),

    #[error("'{0}' takes no arguments")]
    UnexpectedArgument(&'static str),
}

impl FromStr for ConsoleCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let bare = |command: ConsoleCommand, name: &'static str| {
            if rest.is_empty() {
                Ok(command)
            } else {
                Err(ParseCommandError::UnexpectedArgument(name))
            }
        };

        match word.to_ascii_lowercase().as_str() {
            "" => Err(ParseCommandError::Empty),
            "start" => Ok(ConsoleCommand::Start(
                (!rest.is_empty()).then(|| rest.to_string()),
            )),
            "stop" => bare(ConsoleCommand::Stop, "stop"),
            "archive" | "upload" => bare(ConsoleCommand::Archive, "archive"),
            "discard" => bare(ConsoleCommand::Discard, "discard"),
            "status" => bare(ConsoleCommand::Status, "status"),
            "json" => bare(ConsoleCommand::Json, "json"),
            "help" | "?" => Ok(ConsoleCommand::Help),
            "exit" | "quit" => Ok(ConsoleCommand::Exit),
            other => Err(ParseCommandError::Unknown(other.to_string())),
        }
    }
}
