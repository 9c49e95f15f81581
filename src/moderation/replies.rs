//! Canned replies used when no generated reply is available.

/// Pick a short reply for `text` by simple keyword matching.
pub fn canned_reply(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let has_word = |candidates: &[&str]| words.iter().any(|w| candidates.contains(w));

    if lower.contains("how are you") || lower.contains("как дела") {
        "doing great, thanks for asking!"
    } else if has_word(&["thanks", "thank", "thx", "спасибо"]) {
        "anytime!"
    } else if has_word(&[
        "hi",
        "hello",
        "hey",
        "yo",
        "привет",
        "здравствуй",
        "здравствуйте",
    ]) {
        "hey! 👋"
    } else if lower.trim_end().ends_with('?') {
        "good question, I'll get back to you on that"
    } else {
        "got it 👍"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting() {
        assert_eq!(canned_reply("Hello there"), "hey! 👋");
        assert_eq!(canned_reply("привет!"), "hey! 👋");
    }

    #[test]
    fn greeting_needs_whole_word() {
        // "this" contains "hi" but is not a greeting.
        assert_eq!(canned_reply("this works"), "got it 👍");
    }

    #[test]
    fn thanks_and_wellbeing() {
        assert_eq!(canned_reply("thanks a lot"), "anytime!");
        assert_eq!(canned_reply("hey, how are you?"), "doing great, thanks for asking!");
    }

    #[test]
    fn question_fallback() {
        assert_eq!(
            canned_reply("when is the release? "),
            "good question, I'll get back to you on that"
        );
    }

    #[test]
    fn default_reply() {
        assert_eq!(canned_reply("ok"), "got it 👍");
        assert_eq!(canned_reply(""), "got it 👍");
    }
}
