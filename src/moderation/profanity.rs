//! Local profanity masker.

use regex::{Captures, Regex};

/// Word stems masked by default. A match extends to the end of the word.
const DEFAULT_STEMS: &[&str] = &[
    "fuck", "shit", "bitch", "cunt", "bastard", "asshole", "motherfuck", "crap", "damn", "бля",
    "хуй", "хуе", "пизд", "сука", "ебан", "ебат", "мудак", "гандон",
];

/// Replaces profane words with asterisks of the same length.
#[derive(Debug, Clone)]
pub struct ProfanityMasker {
    regex: Regex,
}

impl Default for ProfanityMasker {
    fn default() -> Self {
        Self::with_stems(DEFAULT_STEMS).expect("default profanity stems form a valid pattern")
    }
}

impl ProfanityMasker {
    /// Build a masker from word stems. Stems are matched case-insensitively at
    /// the start of a word and cover the rest of that word.
    pub fn with_stems(stems: &[&str]) -> Result<Self, regex::Error> {
        let alternation = stems
            .iter()
            .map(|s| regex::escape(s))
            .collect::<Vec<_>>()
            .join("|");
        let regex = Regex::new(&format!(r"(?i)\b(?:{alternation})\w*"))?;
        Ok(Self { regex })
    }

    /// Mask every match; everything else is preserved byte for byte.
    pub fn mask(&self, text: &str) -> String {
        self.regex
            .replace_all(text, |caps: &Captures| "*".repeat(caps[0].chars().count()))
            .into_owned()
    }
}
