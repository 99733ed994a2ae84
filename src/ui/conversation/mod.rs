//! Conversation UI components for the chat interface.

pub mod commands;
pub mod composer;
pub mod history;
pub mod manager;

pub use commands::{ParsedCommand, SlashCommand, get_help_text};
pub use composer::{ComposerEvent, PromptComposer};
pub use history::ConversationView;
pub use manager::{ConversationManager, ManagerAction};
