use std::str::FromStr;

use crate::config::Language;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands invoked by starting a message with a leading slash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Toggle or set the interface language
    Lang,
    /// Clear the conversation
    Clear,
    /// Show upstream health
    Health,
    /// Show help
    Help,
    /// Exit the application
    Bye,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl ParsedCommand {
    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    /// Explicit language requested by `/lang <code>`, if any.
    pub fn language_target(&self) -> Option<Language> {
        if self.command != SlashCommand::Lang {
            return None;
        }
        self.argument()?.parse().ok()
    }
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Lang => "toggle the language, or set it with /lang <pt-BR|en-US>",
            SlashCommand::Clear => "clear the conversation",
            SlashCommand::Health => "show whether the assistant is online",
            SlashCommand::Help => "show available commands",
            SlashCommand::Bye => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }
}

/// Parse a slash command from user input.
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let body = input.trim().strip_prefix('/')?;

    let mut parts = body.split_whitespace();
    let head = parts.next()?;
    let rest: Vec<&str> = parts.collect();

    let command =
        SlashCommand::from_str(head)
            .ok()
            .or_else(|| match head.to_lowercase().as_str() {
                "q" | "quit" | "exit" => Some(SlashCommand::Bye),
                "l" | "language" | "idioma" => Some(SlashCommand::Lang),
                "status" => Some(SlashCommand::Health),
                "?" => Some(SlashCommand::Help),
                _ => None,
            })?;

    let argument = if rest.is_empty() {
        None
    } else {
        Some(rest.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Help text for all available commands.
pub fn get_help_text() -> String {
    let mut help = String::from("Available commands:\n\n");
    for command in SlashCommand::iter() {
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }
    help.push_str("\nAliases: /q for /bye, /l for /lang, /status for /health, /? for /help.");
    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_and_aliases() {
        assert_eq!(
            parse_slash_command("/bye"),
            Some(ParsedCommand {
                command: SlashCommand::Bye,
                argument: None
            })
        );
        assert_eq!(
            parse_slash_command("/q").map(|c| c.command),
            Some(SlashCommand::Bye)
        );
        assert_eq!(
            parse_slash_command("/idioma").map(|c| c.command),
            Some(SlashCommand::Lang)
        );
        assert_eq!(parse_slash_command("not a command"), None);
        assert_eq!(parse_slash_command("/nope"), None);
    }

    #[test]
    fn lang_argument_resolves_language() {
        let parsed = parse_slash_command("/lang en-US").unwrap();
        assert_eq!(parsed.language_target(), Some(Language::EnUs));

        let parsed = parse_slash_command("/lang").unwrap();
        assert_eq!(parsed.language_target(), None);
    }

    #[test]
    fn help_lists_every_command() {
        let help = get_help_text();
        for command in SlashCommand::iter() {
            assert!(help.contains(&format!("/{}", command.command())));
        }
    }
}
