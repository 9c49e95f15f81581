//! Command classification for inbound text.
//!
//! A command is `<prefix><name>` at the very start of the trimmed text,
//! followed by nothing, by `@suffix`, or by a space and an argument string.
//! The command name is matched case-insensitively; the argument keeps its case.

use serde::{Deserialize, Serialize};

/// Known command names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandName {
    Protocol,
    Dox,
    Mute,
    Unmute,
    Clean,
    Emoji,
    AiAnswers,
    Calc,
}

impl CommandName {
    pub const ALL: [CommandName; 8] = [
        Self::Protocol,
        Self::Dox,
        Self::Mute,
        Self::Unmute,
        Self::Clean,
        Self::Emoji,
        Self::AiAnswers,
        Self::Calc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Dox => "dox",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::Clean => "clean",
            Self::Emoji => "emoji",
            Self::AiAnswers => "aianswers",
            Self::Calc => "calc",
        }
    }

    /// Look up a lowercase command name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recognized command and its (possibly empty) argument string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: CommandName,
    pub args: String,
}

/// Outcome of classifying one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    NoCommand,
    Command(ParsedCommand),
}

impl Classification {
    pub fn is_command(&self) -> bool {
        matches!(self, Self::Command(_))
    }
}

/// Classifies raw message text against the command vocabulary.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    prefix: char,
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new('.')
    }
}

impl CommandClassifier {
    pub fn new(prefix: char) -> Self {
        Self { prefix }
    }

    pub fn prefix(&self) -> char {
        self.prefix
    }

    /// Classify `text`. Absent or empty text is never a command.
    pub fn classify(&self, text: Option<&str>) -> Classification {
        let Some(text) = text else {
            return Classification::NoCommand;
        };
        let Some(rest) = text.trim().strip_prefix(self.prefix) else {
            return Classification::NoCommand;
        };

        // Head runs until the first whitespace or `@`.
        let head_end = rest
            .find(|c: char| c.is_whitespace() || c == '@')
            .unwrap_or(rest.len());
        let head = rest[..head_end].to_lowercase();
        let Some(name) = CommandName::from_name(&head) else {
            return Classification::NoCommand;
        };

        let tail = &rest[head_end..];
        let args = if let Some(after_at) = tail.strip_prefix('@') {
            // `@botname` followed by optional arguments.
            match after_at.find(char::is_whitespace) {
                Some(idx) => after_at[idx..].trim(),
                None => "",
            }
        } else {
            tail.trim()
        };

        Classification::Command(ParsedCommand {
            name,
            args: args.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(name: CommandName, args: &str) -> Classification {
        Classification::Command(ParsedCommand {
            name,
            args: args.into(),
        })
    }

    #[test]
    fn exact_match() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".protocol")), cmd(CommandName::Protocol, ""));
        assert_eq!(c.classify(Some(".dox")), cmd(CommandName::Dox, ""));
    }

    #[test]
    fn every_name_is_recognized() {
        let c = CommandClassifier::default();
        for name in CommandName::ALL {
            let text = format!(".{}", name.as_str());
            assert_eq!(c.classify(Some(&text)), cmd(name, ""));
        }
    }

    #[test]
    fn at_suffix() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".mute@sdox_bot")), cmd(CommandName::Mute, ""));
        assert_eq!(
            c.classify(Some(".calc@sdox_bot 2 + 2")),
            cmd(CommandName::Calc, "2 + 2")
        );
    }

    #[test]
    fn space_argument() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".clean on")), cmd(CommandName::Clean, "on"));
        assert_eq!(
            c.classify(Some(".calc  (1 + 2) * 3 ")),
            cmd(CommandName::Calc, "(1 + 2) * 3")
        );
    }

    #[test]
    fn surrounding_whitespace_trimmed() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some("   .unmute \n")), cmd(CommandName::Unmute, ""));
    }

    #[test]
    fn case_insensitive_head_keeps_argument_case() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".AIAnswers ON")), cmd(CommandName::AiAnswers, "ON"));
        assert_eq!(c.classify(Some(".PROTOCOL")), cmd(CommandName::Protocol, ""));
    }

    #[test]
    fn mid_text_is_not_a_command() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some("try .protocol now")), Classification::NoCommand);
    }

    #[test]
    fn longer_word_is_not_a_command() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".muted")), Classification::NoCommand);
        assert_eq!(c.classify(Some(".calculate 1")), Classification::NoCommand);
        assert_eq!(c.classify(Some(".doxx")), Classification::NoCommand);
    }

    #[test]
    fn absent_or_empty_text() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(None), Classification::NoCommand);
        assert_eq!(c.classify(Some("")), Classification::NoCommand);
        assert_eq!(c.classify(Some(".")), Classification::NoCommand);
        assert_eq!(c.classify(Some("   ")), Classification::NoCommand);
    }

    #[test]
    fn custom_prefix() {
        let c = CommandClassifier::new('/');
        assert_eq!(c.classify(Some("/protocol")), cmd(CommandName::Protocol, ""));
        assert_eq!(c.classify(Some(".protocol")), Classification::NoCommand);
    }

    #[test]
    fn unknown_command_is_plain_text() {
        let c = CommandClassifier::default();
        assert_eq!(c.classify(Some(".hack")), Classification::NoCommand);
        assert!(!c.classify(Some("hello")).is_command());
    }
}
