//! Structured log events appended to the day-scoped logbook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::markers::{DebugMarkers, Expectation};
use crate::types::{BotName, QaMode, StateSnapshot};

/// Logbook streams; one JSONL file per stream per day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Actions,
    Errors,
    Messages,
}

impl LogStream {
    pub fn file_name(self) -> &'static str {
        match self {
            LogStream::Actions => "actions.jsonl",
            LogStream::Errors => "errors.jsonl",
            LogStream::Messages => "messages.jsonl",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum LogEventKind {
    /// A control command mutated executor state (or `/qa_status` snapshotted it).
    ControlApplied { command: String },
    /// Non-control text forwarded to the transport.
    CommandSent { text: String, message_id: i64 },
    /// Simulated callback press; no transport call is made.
    CallbackPressed { payload: Value },
    ModeChanged { from: QaMode, to: QaMode },
    StatusSnapshot { state: StateSnapshot },
    /// Validation rejections: malformed mode arguments, unknown bot names,
    /// unforwardable sends.
    CommandRejected { text: String, reason: String },
    /// Action kinds outside the known set; skipped, non-fatal.
    UnsupportedAction { kind: String, payload: Value },
    /// Drained while QA was disabled; dropped, never requeued.
    ActionDiscarded { kind: String },
    /// A transport call failed; the cycle carries on.
    TransportFailure { operation: String, message: String },
    /// One message from the fetched history window, oldest-first.
    MessageObserved {
        message_id: i64,
        text: String,
        buttons: Vec<String>,
        callbacks: Vec<String>,
        markers: DebugMarkers,
        expectation: Option<Expectation>,
    },
}

impl LogEventKind {
    pub fn stream(&self) -> LogStream {
        match self {
            LogEventKind::ControlApplied { .. }
            | LogEventKind::CommandSent { .. }
            | LogEventKind::CallbackPressed { .. }
            | LogEventKind::ModeChanged { .. }
            | LogEventKind::StatusSnapshot { .. } => LogStream::Actions,
            LogEventKind::CommandRejected { .. }
            | LogEventKind::UnsupportedAction { .. }
            | LogEventKind::ActionDiscarded { .. }
            | LogEventKind::TransportFailure { .. } => LogStream::Errors,
            LogEventKind::MessageObserved { .. } => LogStream::Messages,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub at: DateTime<Utc>,
    pub bot: BotName,
    pub mode: QaMode,
    #[serde(flatten)]
    pub kind: LogEventKind,
}

impl LogEvent {
    pub fn new(at: DateTime<Utc>, bot: BotName, mode: QaMode, kind: LogEventKind) -> Self {
        Self { at, bot, mode, kind }
    }

    pub fn stream(&self) -> LogStream {
        self.kind.stream()
    }
}
