//! Control-command grammar for `send_command` text.
//!
//! A control command mutates executor state instead of being forwarded to
//! the transport. Parsing is pure; registry lookups and state mutation
//! happen in the executor.

use crate::types::QaMode;

/// A recognized control directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Enable,
    Disable,
    /// `/qa_mode <arg>`. `None` means the argument was missing or not an
    /// exact mode name: the command is consumed but applies nothing.
    SetMode(Option<QaMode>),
    Status,
    /// `/select_bot <name>`. The name is validated against the registry at
    /// execution time; an empty name is rejected there as unknown.
    SelectBot(String),
}

/// Classify command text. `None` means the text is not a control command
/// and should be forwarded verbatim to the transport.
pub fn parse_control_command(text: &str) -> Option<ControlCommand> {
    let trimmed = text.trim();
    match trimmed {
        "/qa_on" => return Some(ControlCommand::Enable),
        "/qa_off" => return Some(ControlCommand::Disable),
        "/qa_status" => return Some(ControlCommand::Status),
        _ => {}
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let head = parts.next().unwrap_or_default();
    let rest = parts.next().map(str::trim).unwrap_or_default();

    match head {
        "/qa_mode" => Some(ControlCommand::SetMode(rest.parse::<QaMode>().ok())),
        "/select_bot" => Some(ControlCommand::SelectBot(rest.to_string())),
        _ => None,
    }
}
