use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::ui::conversation::commands::{ParsedCommand, parse_slash_command};

/// Result of a key press handled by the composer.
#[derive(Debug, PartialEq)]
pub enum ComposerEvent {
    Submitted(String),
    Command(ParsedCommand),
    None,
}

/// Single-line prompt input with quick-prompt cycling.
///
/// Submission is gated: it is refused while the input is blank or a reply is
/// still pending. Slash commands bypass the pending gate so the conversation
/// stays controllable mid-stream.
#[derive(Debug, Default)]
pub struct PromptComposer {
    content: String,
    cursor: usize,
    quick_prompt_index: Option<usize>,
}

impl PromptComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn has_prompt(&self) -> bool {
        !self.content.trim().is_empty()
    }

    /// Mirrors the submit control state: enabled only with a non-blank
    /// prompt and no reply pending.
    pub fn can_submit(&self, waiting: bool) -> bool {
        self.has_prompt() && !waiting
    }

    pub fn clear(&mut self) {
        self.content.clear();
        self.cursor = 0;
        self.quick_prompt_index = None;
    }

    pub fn handle_key(
        &mut self,
        key: KeyEvent,
        waiting: bool,
        quick_prompts: &[&str],
    ) -> ComposerEvent {
        if key.kind != KeyEventKind::Press {
            return ComposerEvent::None;
        }

        match key.code {
            KeyCode::Enter => {
                if let Some(command) = parse_slash_command(&self.content) {
                    self.clear();
                    return ComposerEvent::Command(command);
                }
                if self.can_submit(waiting) {
                    let content = self.content.trim().to_string();
                    self.clear();
                    return ComposerEvent::Submitted(content);
                }
            }
            KeyCode::Tab => {
                self.cycle_quick_prompt(quick_prompts);
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert_char(c);
                self.quick_prompt_index = None;
            }
            KeyCode::Backspace => {
                self.backspace();
            }
            KeyCode::Delete => {
                if self.cursor < self.content.len() {
                    self.content.remove(self.cursor);
                }
            }
            KeyCode::Left => {
                if let Some(previous) = self.prev_boundary() {
                    self.cursor = previous;
                }
            }
            KeyCode::Right => {
                if let Some(next) = self.next_boundary() {
                    self.cursor = next;
                }
            }
            KeyCode::Home => {
                self.cursor = 0;
            }
            KeyCode::End => {
                self.cursor = self.content.len();
            }
            _ => {}
        }

        ComposerEvent::None
    }

    /// Fill the input with the next quick prompt, wrapping around.
    fn cycle_quick_prompt(&mut self, quick_prompts: &[&str]) {
        if quick_prompts.is_empty() {
            return;
        }
        let next = match self.quick_prompt_index {
            Some(index) => (index + 1) % quick_prompts.len(),
            None => 0,
        };
        self.quick_prompt_index = Some(next);
        self.content = quick_prompts[next].to_string();
        self.cursor = self.content.len();
    }

    fn insert_char(&mut self, c: char) {
        self.content.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn backspace(&mut self) {
        if let Some(previous) = self.prev_boundary() {
            self.content.remove(previous);
            self.cursor = previous;
        }
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.content[..self.cursor]
            .char_indices()
            .last()
            .map(|(index, _)| index)
    }

    fn next_boundary(&self) -> Option<usize> {
        self.content[self.cursor..]
            .chars()
            .next()
            .map(|c| self.cursor + c.len_utf8())
    }

    pub fn render(
        &self,
        area: Rect,
        buf: &mut Buffer,
        placeholder: &str,
        submit_label: &str,
        waiting: bool,
    ) {
        let border_style = if waiting {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::LightYellow)
        };
        let mut block = Block::default().borders(Borders::ALL).style(border_style);
        if self.can_submit(waiting) {
            block = block.title(format!(" ↵ {submit_label} "));
        }
        let inner = block.inner(area);
        block.render(area, buf);

        if self.content.is_empty() {
            let line = Line::from(Span::styled(
                placeholder.to_string(),
                Style::default().fg(Color::DarkGray),
            ));
            buf.set_line(inner.x, inner.y, &line, inner.width);
        } else {
            let mut content = self.content.clone();
            content.insert(self.cursor.min(content.len()), '▌');
            let line = Line::from(Span::raw(content));
            buf.set_line(inner.x, inner.y, &line, inner.width);
        }
    }
}
