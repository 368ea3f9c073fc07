pub mod chat;
pub mod client;

pub use chat::{ChatError, ChatMessage, ChatRole, ChatSession};
pub use client::{ApiMessage, ChatEvent, ClaudeClient, LlmClient};
