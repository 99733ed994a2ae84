//! Conversation controller: owns the message list and the single in-flight
//! assistant request.

use crossterm::event::KeyEvent;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    widgets::Widget,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;

use crate::adapter::{AdapterError, AssistantAdapter, AssistantRequest};
use crate::chat::{ChatMessage, HistoryMessage};
use crate::config::Language;
use crate::copy::{UiCopy, ui_copy};
use crate::events::AssistantEvent;
use crate::health::HealthState;
use crate::ui::conversation::commands::{ParsedCommand, SlashCommand, get_help_text};
use crate::ui::conversation::composer::{ComposerEvent, PromptComposer};
use crate::ui::conversation::history::ConversationView;

/// Actions the conversation manager hands back to the application loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerAction {
    None,
    Exit,
    ShowHealth,
}

/// One in-flight assistant request.
///
/// Cancelling a request drops this whole struct: the token stops the adapter
/// task and dropping the receiver guarantees a late event can never reach a
/// newer request's placeholder. The generation is checked before every state
/// write as a second guard.
struct InFlight {
    generation: u64,
    placeholder_id: String,
    cancel: CancellationToken,
    events: mpsc::UnboundedReceiver<AssistantEvent>,
}

/// Drives the submission cycle: submitted → streaming → settled/cancelled.
pub struct ConversationManager {
    messages: Vec<ChatMessage>,
    composer: PromptComposer,
    adapter: AssistantAdapter,
    language: Language,
    generation: u64,
    in_flight: Option<InFlight>,
}

impl ConversationManager {
    pub fn new(adapter: AssistantAdapter, language: Language) -> Self {
        Self {
            messages: Vec::new(),
            composer: PromptComposer::new(),
            adapter,
            language,
            generation: 0,
            in_flight: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_waiting(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn copy(&self) -> &'static UiCopy {
        ui_copy(self.language)
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn toggle_language(&mut self) {
        self.language = self.language.toggled();
    }

    /// Submit a prompt: cancel any prior request, append the user message and
    /// an empty assistant placeholder, and start streaming into it.
    pub fn submit(&mut self, prompt: impl Into<String>) {
        let prompt = prompt.into();
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return;
        }

        self.cancel_in_flight();

        let history: Vec<HistoryMessage> = self
            .messages
            .iter()
            .filter(|message| !message.is_pending())
            .map(ChatMessage::to_history)
            .collect();

        self.messages.push(ChatMessage::user(prompt));
        let placeholder = ChatMessage::pending_assistant();
        let placeholder_id = placeholder.id.clone();
        self.messages.push(placeholder);

        self.generation += 1;
        let cancel = CancellationToken::new();
        let events = self.adapter.spawn_request(
            AssistantRequest {
                prompt: prompt.to_string(),
                language: self.language,
                history,
            },
            cancel.clone(),
        );

        self.in_flight = Some(InFlight {
            generation: self.generation,
            placeholder_id,
            cancel,
            events,
        });
    }

    /// Cancel the in-flight request, removing its placeholder entirely.
    pub fn cancel_current(&mut self) {
        self.cancel_in_flight();
    }

    fn cancel_in_flight(&mut self) {
        if let Some(flight) = self.in_flight.take() {
            flight.cancel.cancel();
            self.remove_message(&flight.placeholder_id);
        }
    }

    /// Drain pending stream events and apply them to the message list.
    /// Called from the UI tick; events are applied in arrival order.
    pub fn process_events(&mut self) {
        loop {
            let event = match self.in_flight.as_mut() {
                Some(flight) => match flight.events.try_recv() {
                    Ok(event) => event,
                    Err(TryRecvError::Empty) => return,
                    // The adapter task always terminates with a Completed or
                    // Failed event, so a disconnect means we already settled.
                    Err(TryRecvError::Disconnected) => {
                        self.in_flight = None;
                        return;
                    }
                },
                None => return,
            };
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: AssistantEvent) {
        let Some(flight) = self.in_flight.as_ref() else {
            return;
        };
        if flight.generation != self.generation {
            // Stale request: never touch state belonging to a newer one.
            self.in_flight = None;
            return;
        }
        let placeholder_id = flight.placeholder_id.clone();

        match event {
            AssistantEvent::Delta(delta) => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.content.push_str(&delta);
                }
            }
            AssistantEvent::Completed(reply) => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.content = reply.content;
                }
                self.in_flight = None;
            }
            AssistantEvent::Failed(error) if error.is_cancelled() => {
                // Unwind silently: the partial reply is discarded.
                self.remove_message(&placeholder_id);
                self.in_flight = None;
            }
            AssistantEvent::Failed(AdapterError::Stream(reason)) => {
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.content = reason;
                }
                self.in_flight = None;
            }
            AssistantEvent::Failed(error) => {
                log::warn!("assistant request failed: {error}");
                let fallback = self.copy().failure_fallback.to_string();
                if let Some(message) = self.message_mut(&placeholder_id) {
                    message.content = fallback;
                }
                self.in_flight = None;
            }
        }
    }

    fn message_mut(&mut self, id: &str) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|message| message.id == id)
    }

    fn remove_message(&mut self, id: &str) {
        self.messages.retain(|message| message.id != id);
    }

    /// Route a key press through the composer.
    pub fn handle_key(&mut self, key: KeyEvent) -> ManagerAction {
        let waiting = self.is_waiting();
        let quick_prompts = self.copy().quick_prompts;
        match self.composer.handle_key(key, waiting, quick_prompts) {
            ComposerEvent::Submitted(prompt) => {
                self.submit(prompt);
                ManagerAction::None
            }
            ComposerEvent::Command(command) => self.handle_command(command),
            ComposerEvent::None => ManagerAction::None,
        }
    }

    fn handle_command(&mut self, command: ParsedCommand) -> ManagerAction {
        match command.command {
            SlashCommand::Lang => {
                match command.language_target() {
                    Some(language) => self.set_language(language),
                    None => self.toggle_language(),
                }
                ManagerAction::None
            }
            SlashCommand::Clear => {
                self.cancel_in_flight();
                self.messages.clear();
                ManagerAction::None
            }
            SlashCommand::Health => ManagerAction::ShowHealth,
            SlashCommand::Help => {
                self.messages.push(ChatMessage::assistant(get_help_text()));
                ManagerAction::None
            }
            SlashCommand::Bye => ManagerAction::Exit,
        }
    }

    /// Append a transcript notice describing the current upstream health.
    pub fn push_health_notice(&mut self, state: &HealthState) {
        let notice = match state {
            HealthState::Unknown => "health: still probing the upstream...".to_string(),
            HealthState::Mock => "health: mock mode, no upstream configured".to_string(),
            HealthState::Online { model: Some(model) } => {
                format!("health: online ({model})")
            }
            HealthState::Online { model: None } => "health: online".to_string(),
            HealthState::Offline => "health: offline".to_string(),
        };
        self.messages.push(ChatMessage::assistant(notice));
    }

    /// Render the transcript above the composer.
    pub fn render(&self, area: Rect, buf: &mut Buffer) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(5), Constraint::Length(3)])
            .split(area);

        let copy = self.copy();
        ConversationView::new(&self.messages, copy).render(chunks[0], buf);

        let placeholder = if self.messages.is_empty() {
            copy.initial_placeholder
        } else {
            copy.conversation_placeholder
        };
        self.composer
            .render(chunks[1], buf, placeholder, copy.submit_label, self.is_waiting());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock_reply;
    use crate::chat::ChatRole;
    use crate::config::Config;
    use std::sync::Arc;
    use std::time::Duration;

    fn manager(mock_delay_ms: u64) -> ConversationManager {
        let config = Arc::new(Config {
            mock_delay: Duration::from_millis(mock_delay_ms),
            ..Config::default()
        });
        let adapter = AssistantAdapter::new(config).unwrap();
        ConversationManager::new(adapter, Language::PtBr)
    }

    async fn settle(manager: &mut ConversationManager) {
        for _ in 0..500 {
            manager.process_events();
            if !manager.is_waiting() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("request did not settle");
    }

    #[tokio::test]
    async fn submit_appends_user_message_and_placeholder() {
        let mut manager = manager(50);
        manager.submit("Olá");

        let messages = manager.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[0].content, "Olá");
        assert!(messages[1].is_pending());
        assert!(manager.is_waiting());
    }

    #[tokio::test]
    async fn blank_submission_is_ignored() {
        let mut manager = manager(5);
        manager.submit("   ");
        assert!(manager.messages().is_empty());
        assert!(!manager.is_waiting());
    }

    #[tokio::test]
    async fn reply_settles_into_the_placeholder() {
        let mut manager = manager(5);
        manager.submit("Olá");
        settle(&mut manager).await;

        let messages = manager.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, mock_reply("Olá", Language::PtBr));
    }

    #[tokio::test]
    async fn cancelling_removes_the_placeholder_entirely() {
        let mut manager = manager(5000);
        manager.submit("Olá");
        manager.cancel_current();

        let messages = manager.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Olá");
        assert!(!manager.is_waiting());
    }

    #[tokio::test]
    async fn resubmitting_cancels_the_prior_request() {
        let mut manager = manager(30);
        manager.submit("primeira");
        manager.submit("segunda");

        // The first placeholder is gone; only the new one remains pending.
        let messages = manager.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "primeira");
        assert_eq!(messages[1].content, "segunda");
        assert!(messages[2].is_pending());

        settle(&mut manager).await;

        let messages = manager.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].content, mock_reply("segunda", Language::PtBr));
        // Nothing from the first request leaked into the transcript.
        assert!(
            !messages
                .iter()
                .any(|m| m.content == mock_reply("primeira", Language::PtBr))
        );
    }

    #[tokio::test]
    async fn second_exchange_reuses_prior_messages_as_history() {
        let mut manager = manager(2);
        manager.submit("Olá");
        settle(&mut manager).await;
        manager.submit("Tudo bem?");
        settle(&mut manager).await;

        let messages = manager.messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[3].content, mock_reply("Tudo bem?", Language::PtBr));
    }

    #[tokio::test]
    async fn clear_command_resets_the_transcript() {
        let mut manager = manager(2);
        manager.submit("Olá");
        settle(&mut manager).await;

        let action = manager.handle_command(ParsedCommand {
            command: SlashCommand::Clear,
            argument: None,
        });
        assert_eq!(action, ManagerAction::None);
        assert!(manager.messages().is_empty());
    }

    #[tokio::test]
    async fn lang_command_toggles_and_sets_language() {
        let mut manager = manager(2);
        manager.handle_command(ParsedCommand {
            command: SlashCommand::Lang,
            argument: None,
        });
        assert_eq!(manager.language(), Language::EnUs);

        manager.handle_command(ParsedCommand {
            command: SlashCommand::Lang,
            argument: Some("pt-BR".to_string()),
        });
        assert_eq!(manager.language(), Language::PtBr);
    }
}
