//! Telegram Bot API client over `curl`.

use qa_core::config::TransportConfig;
use serde_json::{json, Value};
use std::process::Command;

use crate::error::TransportError;
use crate::types::{ChatMessage, ChatTransport, SentMessage};

#[derive(Debug, Clone)]
pub struct BotApiTransport {
    token: String,
    api_base: String,
    timeout_secs: u64,
}

impl BotApiTransport {
    /// Resolve credentials from the environment. A missing token is the
    /// startup-fatal configuration error: callers must not start the poll
    /// loop without one.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let token = std::env::var(&config.token_env)
            .ok()
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| TransportError::MissingCredential {
                var: config.token_env.clone(),
            })?;
        Ok(Self {
            token,
            api_base: config.api_base.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    /// Probe the session with `getMe`; returns the bot username. Failure
    /// here means the session is unreachable and the loop must not start.
    pub fn verify_session(&self) -> Result<String, TransportError> {
        let result = self.call("getMe", &json!({}))?;
        result
            .get("username")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TransportError::Decode {
                message: "getMe result carries no username".to_string(),
            })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    fn call(&self, method: &str, payload: &Value) -> Result<Value, TransportError> {
        let body = serde_json::to_string(payload).map_err(|e| TransportError::Decode {
            message: format!("failed to encode request payload: {e}"),
        })?;

        let output = Command::new("curl")
            .arg("-sS")
            .arg("-m")
            .arg(self.timeout_secs.to_string())
            .arg("-X")
            .arg("POST")
            .arg("-H")
            .arg("Content-Type: application/json")
            .arg("-d")
            .arg(body)
            .arg(self.method_url(method))
            .output()
            .map_err(|e| TransportError::Request {
                message: format!("failed to execute curl for {method}: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(TransportError::Request {
                message: format!(
                    "{method} request failed (status {:?}): {}",
                    output.status.code(),
                    stderr.trim()
                ),
            });
        }

        let envelope: Value =
            serde_json::from_slice(&output.stdout).map_err(|e| TransportError::Decode {
                message: format!("{method} returned invalid JSON: {e}"),
            })?;

        if envelope.get("ok").and_then(Value::as_bool) != Some(true) {
            let description = envelope
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("no description")
                .to_string();
            return Err(TransportError::Api { description });
        }

        Ok(envelope.get("result").cloned().unwrap_or(Value::Null))
    }
}

impl ChatTransport for BotApiTransport {
    fn send_text(&self, target: &str, text: &str) -> Result<SentMessage, TransportError> {
        let result = self.call(
            "sendMessage",
            &json!({ "chat_id": normalize_target(target), "text": text }),
        )?;
        parse_sent_message(&result)
    }

    fn fetch_recent_history(
        &self,
        target: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, TransportError> {
        let result = self.call("getUpdates", &json!({ "timeout": 0 }))?;
        Ok(history_from_updates(&result, target, limit))
    }
}

/// Bot API accepts a numeric chat id or an `@username`.
fn normalize_target(target: &str) -> String {
    if target.chars().all(|ch| ch.is_ascii_digit() || ch == '-') {
        target.to_string()
    } else if let Some(stripped) = target.strip_prefix('@') {
        format!("@{stripped}")
    } else {
        format!("@{target}")
    }
}

fn parse_sent_message(result: &Value) -> Result<SentMessage, TransportError> {
    result
        .get("message_id")
        .and_then(Value::as_i64)
        .map(|message_id| SentMessage { message_id })
        .ok_or_else(|| TransportError::Decode {
            message: "sendMessage result carries no message_id".to_string(),
        })
}

/// Project a `getUpdates` result onto the recent history of one chat.
/// Updates arrive oldest-first; the returned window is newest-first, per
/// the `ChatTransport` contract.
fn history_from_updates(result: &Value, target: &str, limit: usize) -> Vec<ChatMessage> {
    let wanted = target.trim_start_matches('@');
    let mut chronological: Vec<ChatMessage> = result
        .as_array()
        .map(|updates| {
            updates
                .iter()
                .filter_map(|update| update.get("message"))
                .filter(|message| chat_matches(message, wanted))
                .map(message_from_value)
                .collect()
        })
        .unwrap_or_default();

    if chronological.len() > limit {
        chronological.drain(..chronological.len() - limit);
    }
    chronological.reverse();
    chronological
}

fn chat_matches(message: &Value, wanted: &str) -> bool {
    let chat = match message.get("chat") {
        Some(chat) => chat,
        None => return false,
    };
    if chat.get("username").and_then(Value::as_str) == Some(wanted) {
        return true;
    }
    chat.get("id")
        .and_then(Value::as_i64)
        .map(|id| id.to_string() == wanted)
        .unwrap_or(false)
}

fn message_from_value(message: &Value) -> ChatMessage {
    let text = message
        .get("text")
        .or_else(|| message.get("caption"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut button_labels = Vec::new();
    let mut callback_ids = Vec::new();
    if let Some(rows) = message
        .pointer("/reply_markup/inline_keyboard")
        .and_then(Value::as_array)
    {
        for row in rows {
            for button in row.as_array().into_iter().flatten() {
                if let Some(label) = button.get("text").and_then(Value::as_str) {
                    button_labels.push(label.to_string());
                }
                if let Some(callback) = button.get("callback_data").and_then(Value::as_str) {
                    callback_ids.push(callback.to_string());
                }
            }
        }
    }

    ChatMessage {
        id: message
            .get("message_id")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
        text,
        button_labels,
        callback_ids,
    }
}
