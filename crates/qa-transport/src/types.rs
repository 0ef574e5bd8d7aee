use serde::{Deserialize, Serialize};

/// One message observed in the target chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub text: String,
    pub button_labels: Vec<String>,
    pub callback_ids: Vec<String>,
}

/// Receipt for an outbound send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub message_id: i64,
}

/// Capability exposed by the messaging session.
///
/// `fetch_recent_history` returns messages newest-first; the executor
/// re-orders them oldest-first before logging.
pub trait ChatTransport: Send + Sync {
    fn send_text(&self, target: &str, text: &str) -> Result<SentMessage, crate::TransportError>;

    fn fetch_recent_history(
        &self,
        target: &str,
        limit: usize,
    ) -> Result<Vec<ChatMessage>, crate::TransportError>;
}
