//! Core types for the QA driver.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Name of the bot record under test when no explicit selection exists yet.
pub const DEFAULT_BOT_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BotName(pub String);

impl BotName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl std::fmt::Display for BotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BotName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionId(pub String);

impl std::fmt::Display for ActionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Operating mode surfaced with every logged action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum QaMode {
    #[default]
    User,
    Admin,
}

impl QaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            QaMode::User => "user",
            QaMode::Admin => "admin",
        }
    }
}

impl std::str::FromStr for QaMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "user" => Ok(QaMode::User),
            "admin" => Ok(QaMode::Admin),
            other => Err(format!(
                "invalid qa mode '{other}'. valid values: user, admin"
            )),
        }
    }
}

impl std::fmt::Display for QaMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reasoning backends in canonical fallback order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Deepseek,
    Gemini,
    Chatgpt,
}

impl ProviderKind {
    /// Fixed rotation order restored by every periodic reset.
    pub const CANONICAL_ORDER: [ProviderKind; 3] =
        [ProviderKind::Deepseek, ProviderKind::Gemini, ProviderKind::Chatgpt];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Deepseek => "deepseek",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Chatgpt => "chatgpt",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "deepseek" => Ok(ProviderKind::Deepseek),
            "gemini" => Ok(ProviderKind::Gemini),
            "chatgpt" => Ok(ProviderKind::Chatgpt),
            other => Err(format!(
                "invalid provider '{other}'. valid values: deepseek, gemini, chatgpt"
            )),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Known action kinds. Envelopes carry the kind as a raw string so unknown
/// kinds survive to the unsupported-action log instead of failing decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SendCommand,
    PressCallback,
    SetMode,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::SendCommand => "send_command",
            ActionKind::PressCallback => "press_callback",
            ActionKind::SetMode => "set_mode",
        }
    }
}

impl std::str::FromStr for ActionKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "send_command" => Ok(ActionKind::SendCommand),
            "press_callback" => Ok(ActionKind::PressCallback),
            "set_mode" => Ok(ActionKind::SetMode),
            other => Err(format!(
                "invalid action kind '{other}'. valid values: send_command, press_callback, set_mode"
            )),
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued unit of work for the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub at: DateTime<Utc>,
    pub id: ActionId,
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    pub bot: BotName,
}

impl ActionEnvelope {
    /// Command text carried by a `send_command` payload.
    pub fn text(&self) -> Option<&str> {
        self.payload.get("text").and_then(Value::as_str)
    }

    /// Mode string carried by a `set_mode` payload.
    pub fn mode(&self) -> Option<&str> {
        self.payload.get("mode").and_then(Value::as_str)
    }
}

/// Durable executor state; survives restarts in the document store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorState {
    pub qa_enabled: bool,
    pub mode: QaMode,
    #[serde(default = "default_true")]
    pub telegram_default: bool,
    pub selected_bot: BotName,
}

fn default_true() -> bool {
    true
}

impl Default for ExecutorState {
    fn default() -> Self {
        Self {
            qa_enabled: false,
            mode: QaMode::User,
            telegram_default: true,
            selected_bot: BotName::new(DEFAULT_BOT_NAME),
        }
    }
}

/// Executor state merged with the selected bot's registry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub qa_enabled: bool,
    pub mode: QaMode,
    pub telegram_default: bool,
    pub selected_bot: BotName,
    pub bot_username: Option<String>,
    pub repo_info: Value,
    pub capability_sections: Vec<String>,
}
