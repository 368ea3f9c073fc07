// Support chat session state and system prompt.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::client::ApiMessage;

/// Longest user message accepted, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Most recent messages sent to the model with each request.
const HISTORY_WINDOW: usize = 20;

const FALLBACK_KNOWLEDGE: &str = "\
Tiers run from HT1 (best) down to LT5. Points per tier: HT1 50, LT1 45, HT2 40, \
LT2 35, HT3 30, LT3 25, HT4 20, LT4 15, HT5 10, LT5 5. Retired and Not Ranked \
are worth 0. Global points are the sum across all gamemodes.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("message is longer than {max} characters")]
    TooLong { max: usize },

    #[error("a reply is still being written")]
    ReplyInProgress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    fn api_name(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: u64,
    pub role: ChatRole,
    pub content: String,
    pub timestamp: String,
}

/// One visitor's conversation with the support assistant.
///
/// Each user turn bumps the generation; stream events for any other
/// generation are stale and ignored. Clearing the session also bumps it, so
/// a reply still streaming for the old conversation is discarded.
#[derive(Debug, Default)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    next_id: u64,
    generation: u64,
    pending: Option<u64>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    fn push(&mut self, role: ChatRole, content: String) -> &ChatMessage {
        self.next_id += 1;
        self.messages.push(ChatMessage {
            id: self.next_id,
            role,
            content,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
        &self.messages[self.messages.len() - 1]
    }

    /// Record a user message and start a new reply generation. Returns the
    /// generation the reply's stream events must carry.
    pub fn begin_turn(&mut self, content: &str) -> Result<u64, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if content.chars().count() > MAX_MESSAGE_CHARS {
            return Err(ChatError::TooLong {
                max: MAX_MESSAGE_CHARS,
            });
        }
        if self.pending.is_some() {
            return Err(ChatError::ReplyInProgress);
        }

        self.push(ChatRole::User, content.to_string());
        self.generation += 1;
        self.pending = Some(self.generation);
        Ok(self.generation)
    }

    /// True if events for `generation` belong to the reply in flight.
    pub fn is_current(&self, generation: u64) -> bool {
        self.pending == Some(generation)
    }

    /// Append the finished reply. Returns `None` for stale generations.
    pub fn complete(&mut self, generation: u64, full_text: String) -> Option<&ChatMessage> {
        if !self.is_current(generation) {
            debug!(generation, "dropping stale chat completion");
            return None;
        }
        self.pending = None;
        Some(self.push(ChatRole::Assistant, full_text))
    }

    /// Abandon the reply in flight. Returns `false` for stale generations.
    pub fn fail(&mut self, generation: u64) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        self.pending = None;
        true
    }

    /// Forget the conversation.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.pending = None;
        self.generation += 1;
    }

    /// The recent conversation in Messages API form. The window always
    /// starts on a user turn.
    pub fn api_messages(&self) -> Vec<ApiMessage> {
        let start = self.messages.len().saturating_sub(HISTORY_WINDOW);
        let window = &self.messages[start..];
        let first_user = window
            .iter()
            .position(|m| m.role == ChatRole::User)
            .unwrap_or(window.len());
        window[first_user..]
            .iter()
            .map(|m| ApiMessage {
                role: m.role.api_name(),
                content: m.content.clone(),
            })
            .collect()
    }
}

/// Read the knowledge base text. A missing or unreadable file falls back to
/// a short built-in summary of the point table.
pub fn load_knowledge_base(path: Option<&str>) -> String {
    let Some(path) = path.map(str::trim).filter(|p| !p.is_empty()) else {
        return FALLBACK_KNOWLEDGE.to_string();
    };
    match std::fs::read_to_string(Path::new(path)) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            warn!("knowledge base {path} is empty; using built-in summary");
            FALLBACK_KNOWLEDGE.to_string()
        }
        Err(e) => {
            warn!("could not read knowledge base {path}: {e}; using built-in summary");
            FALLBACK_KNOWLEDGE.to_string()
        }
    }
}

/// System prompt for the support assistant.
pub fn build_system_prompt(knowledge_base: &str) -> String {
    format!(
        "You are the support assistant for a Minecraft Bedrock PvP tier list. \
         Answer questions about tiers, points, combat ranks, gamemodes and how \
         testing works. Keep answers short and friendly. If the answer is not \
         in the reference below, say you don't know and suggest asking staff \
         in Discord. Never invent a player's tier.\n\n\
         <reference>\n{}\n</reference>",
        knowledge_base.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_turn_validates_input() {
        let mut session = ChatSession::new();
        assert_eq!(session.begin_turn("   "), Err(ChatError::EmptyMessage));
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(session.begin_turn(&long), Err(ChatError::TooLong { .. })));
        assert!(session.messages().is_empty());

        let gen = session.begin_turn("how do points work?").unwrap();
        assert_eq!(gen, 1);
        assert!(session.is_waiting());
        assert_eq!(session.begin_turn("hello?"), Err(ChatError::ReplyInProgress));
    }

    #[test]
    fn completion_appends_assistant_message() {
        let mut session = ChatSession::new();
        let gen = session.begin_turn("what is HT1?").unwrap();

        assert!(session.complete(gen + 1, "stale".into()).is_none());
        let reply = session.complete(gen, "High Tier 1.".into()).unwrap();
        assert_eq!(reply.role, ChatRole::Assistant);
        assert_eq!(reply.id, 2);

        assert_eq!(session.messages().len(), 2);
        assert!(!session.is_waiting());
        assert!(session.complete(gen, "again".into()).is_none());
    }

    #[test]
    fn clear_invalidates_reply_in_flight() {
        let mut session = ChatSession::new();
        let gen = session.begin_turn("hi").unwrap();
        session.clear();

        assert!(session.messages().is_empty());
        assert!(!session.is_current(gen));
        assert!(!session.fail(gen));
        let next = session.begin_turn("hi again").unwrap();
        assert!(next > gen);
    }

    #[test]
    fn failed_reply_allows_retry() {
        let mut session = ChatSession::new();
        let gen = session.begin_turn("hi").unwrap();
        assert!(session.fail(gen));
        assert!(session.begin_turn("retry").is_ok());
        assert_eq!(session.messages().len(), 2);
    }

    #[test]
    fn api_messages_window_starts_with_user() {
        let mut session = ChatSession::new();
        for i in 0..15 {
            let gen = session.begin_turn(&format!("q{i}")).unwrap();
            session.complete(gen, format!("a{i}"));
        }
        let msgs = session.api_messages();
        assert_eq!(msgs.len(), 20);
        assert_eq!(msgs[0].role, "user");
        assert_eq!(msgs[0].content, "q5");
        assert_eq!(msgs[19].content, "a14");
    }

    #[test]
    fn knowledge_base_falls_back() {
        assert_eq!(load_knowledge_base(None), FALLBACK_KNOWLEDGE);
        assert_eq!(
            load_knowledge_base(Some("/nonexistent/knowledge.md")),
            FALLBACK_KNOWLEDGE
        );

        let path = std::env::temp_dir().join("tierlist_kb_test.md");
        std::fs::write(&path, "Mace testing opens Fridays.").unwrap();
        let text = load_knowledge_base(path.to_str());
        assert_eq!(text, "Mace testing opens Fridays.");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn system_prompt_embeds_reference() {
        let prompt = build_system_prompt("  HT1 = 50  ");
        assert!(prompt.contains("<reference>\nHT1 = 50\n</reference>"));
    }
}
