//! Session and turn models.
//!
//! Serialized field names (`createdAt`, `ts`, `preview`) match the
//! `session-<id>.json` files written by earlier hosts, so existing session
//! directories stay readable.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Originator of one logged turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Message originated by the host side.
    Host,
    /// Message originated by a worker/server.
    Server,
}

impl TurnRole {
    /// Capitalized label used in summary bullets.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Host => "Host",
            Self::Server => "Server",
        }
    }
}

/// One logged message within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// Originating side.
    pub role: TurnRole,
    /// Unix timestamp in milliseconds.
    pub ts: i64,
    /// Full message text.
    pub text: String,
    /// Short display form; preferred over `text` when building context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl Turn {
    /// Create a turn stamped with the current time.
    #[must_use]
    pub fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            ts: Utc::now().timestamp_millis(),
            text: text.into(),
            preview: None,
        }
    }

    /// Attach a preview to the turn.
    #[must_use]
    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.preview = Some(preview.into());
        self
    }

    /// The text used for context building: preview when present, full text
    /// otherwise.
    #[must_use]
    pub fn content(&self) -> &str {
        self.preview.as_deref().unwrap_or(&self.text)
    }
}

/// Conversation state for one backend id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Owning backend id; not part of the persisted payload historically,
    /// so it defaults to empty on load and is restored by the store.
    #[serde(default)]
    pub server_id: String,
    /// Time-ordered turns; append-only outside the compactor.
    #[serde(default)]
    pub messages: Vec<Turn>,
    /// Session creation time, Unix milliseconds.
    pub created_at: i64,
    /// Rolling summary semantically preceding the retained turns.
    #[serde(default)]
    pub summary: String,
}

impl SessionState {
    /// Create an empty session for `server_id`.
    #[must_use]
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            messages: Vec::new(),
            created_at: Utc::now().timestamp_millis(),
            summary: String::new(),
        }
    }

    /// Append a host-originated turn.
    pub fn record_host(&mut self, text: impl Into<String>, preview: Option<String>) {
        let mut turn = Turn::new(TurnRole::Host, text);
        turn.preview = preview;
        self.messages.push(turn);
    }

    /// Append a server-originated turn.
    pub fn record_server(&mut self, text: impl Into<String>, preview: Option<String>) {
        let mut turn = Turn::new(TurnRole::Server, text);
        turn.preview = preview;
        self.messages.push(turn);
    }

    /// Serialized size of the session in bytes.
    #[must_use]
    pub fn serialized_bytes(&self) -> usize {
        serde_json::to_vec(self).map_or(0, |bytes| bytes.len())
    }
}
