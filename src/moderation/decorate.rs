//! Content rewriting with a pluggable generator and local fallbacks.
//!
//! Every operation here first asks the optional [`TextGenerator`] and checks
//! the answer; on any failure or implausible answer it falls back to the
//! local implementation. Callers never see a generator error.

use std::sync::Arc;

use tracing::debug;

use crate::llm::TextGenerator;
use crate::moderation::policy::ContentPlan;
use crate::moderation::profanity::ProfanityMasker;
use crate::moderation::replies::canned_reply;
use crate::state::Toggle;

const FALLBACK_EMOJI: &[&str] = &["🙂", "👍", "✨", "😎", "👀"];

/// Longest generated reply forwarded to a chat, in characters.
const MAX_REPLY_CHARS: usize = 500;

/// Pick an emoji for `text` without a generator.
pub fn local_emoji(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let trimmed = lower.trim_end();
    let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if any(&["love", "❤", "люблю"]) {
        "❤️"
    } else if any(&["haha", "lol", "хаха", "ахах"]) {
        "😂"
    } else if any(&["thank", "спасибо"]) {
        "🙏"
    } else if trimmed.ends_with('?') {
        "🤔"
    } else if trimmed.ends_with('!') {
        "🔥"
    } else {
        let sum: u32 = text.chars().map(u32::from).sum();
        FALLBACK_EMOJI[sum as usize % FALLBACK_EMOJI.len()]
    }
}

/// Canned toggle confirmation.
pub fn canned_confirmation(toggle: Toggle, enabled: bool) -> String {
    let state = if enabled { "on" } else { "off" };
    format!("✅ {toggle} is {state}")
}

/// Accept a generated mask only if it changes nothing but `*` positions.
fn is_valid_mask(original: &str, masked: &str) -> bool {
    original.chars().count() == masked.chars().count()
        && original
            .chars()
            .zip(masked.chars())
            .all(|(o, m)| o == m || m == '*')
}

/// A generated emoji must be short and contain no letters, digits or spaces.
fn is_valid_emoji(candidate: &str) -> bool {
    let count = candidate.chars().count();
    (1..=8).contains(&count)
        && !candidate
            .chars()
            .any(|c| c.is_alphanumeric() || c.is_whitespace())
}

/// Rewrites owner messages and drafts replies.
pub struct ContentRewriter {
    masker: ProfanityMasker,
    generator: Option<Arc<dyn TextGenerator>>,
}

impl ContentRewriter {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>) -> Self {
        Self {
            masker: ProfanityMasker::default(),
            generator,
        }
    }

    async fn ask(
        &self,
        purpose: &str,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
    ) -> Option<String> {
        let generator = self.generator.as_ref()?;
        match generator.generate(prompt, max_tokens, temperature).await {
            Ok(text) => Some(text),
            Err(e) => {
                debug!(purpose, error = %e, "Generator failed; using local fallback");
                None
            }
        }
    }

    /// Mask profanity in `text`. A generated mask is accepted only when it
    /// touches nothing but masked positions, and the local masker still runs
    /// over it.
    pub async fn clean(&self, text: &str) -> String {
        let prompt = format!(
            "Replace every profane or obscene word in the message below with asterisks, \
             one asterisk per character. Change nothing else. Output only the message.\n\n{text}"
        );
        if let Some(masked) = self.ask("clean", &prompt, 400, 0.0).await {
            if is_valid_mask(text, &masked) {
                return self.masker.mask(&masked);
            }
            debug!("Generated mask altered the message; using local masker");
        }
        self.masker.mask(text)
    }

    /// Pick an emoji for `text`.
    pub async fn emoji_for(&self, text: &str) -> String {
        let prompt = format!(
            "Reply with exactly one emoji that fits the mood of this message. \
             Output only the emoji.\n\n{text}"
        );
        if let Some(candidate) = self.ask("emoji", &prompt, 8, 0.7).await {
            let candidate = candidate.trim();
            if is_valid_emoji(candidate) {
                return candidate.to_string();
            }
        }
        local_emoji(text).to_string()
    }

    /// Apply the owner rewrites in `plan`. Returns `None` when the result
    /// equals the original text.
    pub async fn rewrite(&self, text: &str, plan: ContentPlan) -> Option<String> {
        if !plan.rewrites() {
            return None;
        }
        let mut out = if plan.clean {
            self.clean(text).await
        } else {
            text.to_string()
        };
        if plan.emoji {
            let emoji = self.emoji_for(&out).await;
            out = format!("{} {emoji}", out.trim_end());
        }
        (out != text).then_some(out)
    }

    /// Draft a reply to a non-owner message.
    pub async fn reply_to(&self, text: &str) -> String {
        let prompt = format!(
            "You are answering a chat message on the owner's behalf while they are away. \
             Reply casually in one or two short sentences, in the language of the \
             message.\n\n{text}"
        );
        if let Some(reply) = self.ask("reply", &prompt, 120, 0.8).await {
            return reply.chars().take(MAX_REPLY_CHARS).collect();
        }
        canned_reply(text).to_string()
    }

    /// Confirmation text for a toggle change.
    pub async fn confirmation(&self, toggle: Toggle, enabled: bool) -> String {
        let state = if enabled { "enabled" } else { "disabled" };
        let prompt = format!(
            "Write a very short, playful one-line confirmation that the \"{toggle}\" feature \
             is now {state}. Output only the line."
        );
        match self.ask("confirmation", &prompt, 40, 0.9).await {
            Some(line) if !line.is_empty() => line.chars().take(200).collect(),
            _ => canned_confirmation(toggle, enabled),
        }
    }
}
