//! Chat message model and history trimming.

use serde::{Deserialize, Serialize};

/// Number of user turns kept when trimming history for the upstream context.
pub const DEFAULT_HISTORY_TURNS: usize = 6;

/// Role of a message shown in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// Role of a message sent upstream as context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
    System,
}

/// A message in the conversation transcript.
///
/// Owned exclusively by the conversation manager and mutated in place (by id)
/// while a reply streams in. An assistant message with empty content is the
/// pending placeholder; at most one exists at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::User, content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(ChatRole::Assistant, content.into())
    }

    /// Empty assistant message used as the streaming placeholder.
    pub fn pending_assistant() -> Self {
        Self::assistant(String::new())
    }

    fn with_role(role: ChatRole, content: String) -> Self {
        Self {
            id: new_message_id(),
            role,
            content,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.role == ChatRole::Assistant && self.content.is_empty()
    }

    /// Projection of this message into the upstream history format.
    pub fn to_history(&self) -> HistoryMessage {
        let role = match self.role {
            ChatRole::User => HistoryRole::User,
            ChatRole::Assistant => HistoryRole::Assistant,
        };
        HistoryMessage::new(role, self.content.clone())
    }
}

/// A message in the context window sent upstream. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: HistoryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Reduce an unbounded conversation log to a bounded context window.
///
/// Keeps the first system message (if any) in front, followed by the most
/// recent `max_turns` user turns - a user message plus the non-system messages
/// between it and the next user message - in their original order. Idempotent
/// under the same bound.
pub fn trim_chat_history(history: &[HistoryMessage], max_turns: usize) -> Vec<HistoryMessage> {
    if history.is_empty() {
        return Vec::new();
    }

    let mut system_message: Option<&HistoryMessage> = None;
    let mut conversational: Vec<&HistoryMessage> = Vec::new();

    for message in history {
        if system_message.is_none() && message.role == HistoryRole::System {
            system_message = Some(message);
            continue;
        }
        conversational.push(message);
    }

    if conversational.is_empty() {
        return system_message.into_iter().cloned().collect();
    }

    let mut start = 0;
    let mut collected_turns = 0;
    for (index, message) in conversational.iter().enumerate().rev() {
        if message.role == HistoryRole::User {
            collected_turns += 1;
            if collected_turns >= max_turns {
                start = index;
                break;
            }
        }
    }

    let mut trimmed: Vec<HistoryMessage> = Vec::with_capacity(conversational.len() - start + 1);
    if let Some(system) = system_message {
        trimmed.push(system.clone());
    }
    trimmed.extend(conversational[start..].iter().map(|m| (*m).clone()));
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(content: &str) -> HistoryMessage {
        HistoryMessage::new(HistoryRole::User, content)
    }

    fn assistant(content: &str) -> HistoryMessage {
        HistoryMessage::new(HistoryRole::Assistant, content)
    }

    fn system(content: &str) -> HistoryMessage {
        HistoryMessage::new(HistoryRole::System, content)
    }

    #[test]
    fn empty_history_trims_to_empty() {
        assert!(trim_chat_history(&[], DEFAULT_HISTORY_TURNS).is_empty());
    }

    #[test]
    fn system_only_history_is_preserved() {
        let history = vec![system("persona")];
        assert_eq!(trim_chat_history(&history, DEFAULT_HISTORY_TURNS), history);
    }

    #[test]
    fn short_history_passes_through() {
        let history = vec![user("oi"), assistant("olá")];
        assert_eq!(trim_chat_history(&history, DEFAULT_HISTORY_TURNS), history);
    }

    #[test]
    fn keeps_system_message_and_last_six_turns() {
        let mut history = vec![system("persona")];
        for turn in 0..10 {
            history.push(user(&format!("pergunta {turn}")));
            history.push(assistant(&format!("resposta {turn}")));
        }

        let trimmed = trim_chat_history(&history, DEFAULT_HISTORY_TURNS);

        // System message first, then turns 4..10 in original order.
        assert_eq!(trimmed.len(), 1 + 6 * 2);
        assert_eq!(trimmed[0], system("persona"));
        assert_eq!(trimmed[1], user("pergunta 4"));
        assert_eq!(trimmed.last(), Some(&assistant("resposta 9")));
    }

    #[test]
    fn omits_system_message_when_absent() {
        let mut history = Vec::new();
        for turn in 0..8 {
            history.push(user(&format!("q{turn}")));
            history.push(assistant(&format!("a{turn}")));
        }

        let trimmed = trim_chat_history(&history, DEFAULT_HISTORY_TURNS);

        assert_eq!(trimmed.len(), 12);
        assert_eq!(trimmed[0], user("q2"));
        assert!(trimmed.iter().all(|m| m.role != HistoryRole::System));
    }

    #[test]
    fn trailing_assistant_messages_stay_with_their_turn() {
        let mut history = Vec::new();
        for turn in 0..7 {
            history.push(user(&format!("q{turn}")));
            history.push(assistant(&format!("a{turn}")));
            history.push(assistant(&format!("extra{turn}")));
        }

        let trimmed = trim_chat_history(&history, DEFAULT_HISTORY_TURNS);

        assert_eq!(trimmed[0], user("q1"));
        assert_eq!(trimmed.len(), 6 * 3);
    }

    #[test]
    fn trimming_is_idempotent() {
        let mut history = vec![system("persona")];
        for turn in 0..9 {
            history.push(user(&format!("q{turn}")));
            history.push(assistant(&format!("a{turn}")));
        }

        let once = trim_chat_history(&history, DEFAULT_HISTORY_TURNS);
        let twice = trim_chat_history(&once, DEFAULT_HISTORY_TURNS);
        assert_eq!(once, twice);
    }

    #[test]
    fn pending_placeholder_detection() {
        let pending = ChatMessage::pending_assistant();
        assert!(pending.is_pending());
        assert!(!ChatMessage::assistant("done").is_pending());
        assert!(!ChatMessage::user("").is_pending());
    }
}
