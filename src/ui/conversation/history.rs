//! Conversation transcript rendering.

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Widget},
};

use crate::chat::{ChatMessage, ChatRole};
use crate::copy::UiCopy;

/// Stateless view over the conversation manager's message list.
///
/// An empty transcript shows the assistant greeting; a pending placeholder
/// renders as the animated typing indicator.
pub struct ConversationView<'a> {
    messages: &'a [ChatMessage],
    copy: &'a UiCopy,
}

impl<'a> ConversationView<'a> {
    pub fn new(messages: &'a [ChatMessage], copy: &'a UiCopy) -> Self {
        Self { messages, copy }
    }

    fn greeting_lines(&self) -> Vec<Line<'static>> {
        vec![
            Line::from(Span::styled(
                self.copy.heading,
                Style::default().fg(Color::LightYellow),
            )),
            Line::from(Span::styled(
                self.copy.role_label,
                Style::default().fg(Color::DarkGray),
            )),
            Line::default(),
            Line::from(Span::styled(
                self.copy.greeting,
                Style::default().fg(Color::Gray),
            )),
            Line::default(),
            Line::from(Span::styled(
                "Tab ⇄ quick prompts · Enter ↵ send · /help",
                Style::default().fg(Color::DarkGray),
            )),
        ]
    }

    fn message_lines(&self, message: &ChatMessage, width: u16) -> Vec<Line<'static>> {
        let mut lines = Vec::new();

        let (label, label_color, content_color) = match message.role {
            ChatRole::User => ("você", Color::LightYellow, Color::White),
            ChatRole::Assistant => (self.copy.heading, Color::LightGreen, Color::Gray),
        };

        let timestamp = message.timestamp.format("%H:%M").to_string();
        lines.push(Line::from(vec![
            Span::styled(label.to_string(), Style::default().fg(label_color)),
            Span::styled(format!(" · {timestamp}"), Style::default().fg(Color::DarkGray)),
        ]));

        if message.is_pending() {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(typing_dots(), Style::default().fg(Color::DarkGray)),
            ]));
            return lines;
        }

        for content_line in wrap_text(&message.content, width.saturating_sub(2) as usize) {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(content_line, Style::default().fg(content_color)),
            ]));
        }

        lines
    }
}

impl Widget for ConversationView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::ALL);
        let inner = block.inner(area);
        block.render(area, buf);

        let all_lines: Vec<Line> = if self.messages.is_empty() {
            self.greeting_lines()
        } else {
            let mut lines = Vec::new();
            for message in self.messages {
                lines.extend(self.message_lines(message, inner.width));
                lines.push(Line::default());
            }
            lines
        };

        // Keep the newest lines visible, anchored to the bottom.
        let height = inner.height as usize;
        let start = all_lines.len().saturating_sub(height);
        for (row, line) in all_lines[start..].iter().enumerate() {
            buf.set_line(inner.x, inner.y + row as u16, line, inner.width);
        }
    }
}

/// Time-phased typing indicator shown while the reply is still empty.
fn typing_dots() -> &'static str {
    let phase = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        / 300
        % 4;
    match phase {
        0 => "·",
        1 => "··",
        2 => "···",
        _ => " ",
    }
}

/// Word-wrap text to fit within the given width.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if !current.is_empty() && current.chars().count() + 1 + word.chars().count() > width {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_on_word_boundaries() {
        let wrapped = wrap_text("quem é stanley afinal", 10);
        assert_eq!(wrapped, vec!["quem é", "stanley", "afinal"]);
    }

    #[test]
    fn keeps_paragraph_breaks() {
        let wrapped = wrap_text("olá\ntudo bem", 20);
        assert_eq!(wrapped, vec!["olá", "tudo bem"]);
    }

    #[test]
    fn zero_width_passes_through() {
        assert_eq!(wrap_text("texto", 0), vec!["texto"]);
    }
}
