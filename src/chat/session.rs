use serde::{Deserialize, Serialize};

use crate::actions::BotMessage;

pub const GREETING: &str = "Hi, I'm **Samarth**, your rainfall intelligence assistant! \
Ask me about rainfall trends, comparisons, or forecasts.";

pub const BACKEND_ERROR: &str = "Error: Unable to fetch data from backend.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn speaker(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Assistant => "Samarth",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Conversation history for one chat session. Messages are only ever
/// appended; the first entry is always the greeting.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::Assistant,
                content: GREETING.to_string(),
            }],
        }
    }

    pub fn push_user(&mut self, content: &str) {
        self.messages.push(ChatMessage {
            role: Role::User,
            content: content.to_string(),
        });
    }

    /// Records the backend's answer for the turn. `None` or an empty reply
    /// list becomes the error bubble.
    pub fn push_replies(&mut self, replies: Option<&[BotMessage]>) -> &ChatMessage {
        let content = match replies {
            Some(replies) if !replies.is_empty() => reply_text(replies),
            _ => BACKEND_ERROR.to_string(),
        };
        self.messages.push(ChatMessage {
            role: Role::Assistant,
            content,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Every text reply, each followed by a blank line.
pub fn reply_text(replies: &[BotMessage]) -> String {
    let mut content = String::new();
    for text in replies.iter().filter_map(|r| r.text.as_deref()) {
        content.push_str(text);
        content.push_str("\n\n");
    }
    content
}
