use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The role of the participant that authored an [`AiMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AiRole {
    /// A system-level instruction or prompt.
    System,
    /// The requesting side (an agent acting for the user).
    User,
    /// The model's reply.
    Assistant,
}

/// A single message sent to or received from an AI provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMessage {
    /// The role of the message author.
    pub role: AiRole,
    /// The textual content of the message.
    pub content: String,
    /// UTC timestamp of when the message was created.
    pub timestamp: DateTime<Utc>,
}

impl AiMessage {
    /// Creates a new message with the given role and content.
    pub fn new(role: AiRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    /// Creates a new message with [`AiRole::System`].
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(AiRole::System, content)
    }

    /// Creates a new message with [`AiRole::User`].
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(AiRole::User, content)
    }

    /// Creates a new message with [`AiRole::Assistant`].
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(AiRole::Assistant, content)
    }
}
