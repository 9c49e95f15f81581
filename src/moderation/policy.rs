//! Access policy: who may speak, whose messages get rewritten.

use crate::state::ChatRecord;

/// Gate decision for one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Delete the inbound message and run no handler.
    Suppress,
}

/// Decide whether a message from `sender_id` may stand.
///
/// A muted chat with a bound owner suppresses every other sender, including
/// command-looking text, so a muted sender cannot unmute themselves.
/// `_is_command` is accepted for symmetry with the dispatcher; commands get
/// no exemption.
pub fn decide(chat: &ChatRecord, sender_id: i64, _is_command: bool) -> Decision {
    match chat.owner_id {
        Some(owner) if chat.muted && owner != sender_id => Decision::Suppress,
        _ => Decision::Allow,
    }
}

/// Which rewrites apply to a plain (non-command) message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentPlan {
    /// Mask profanity in place (owner messages).
    pub clean: bool,
    /// Append an emoji in place (owner messages).
    pub emoji: bool,
    /// Answer with a generated reply (non-owner messages).
    pub ai_reply: bool,
}

impl ContentPlan {
    pub fn rewrites(&self) -> bool {
        self.clean || self.emoji
    }

    pub fn is_empty(&self) -> bool {
        !self.clean && !self.emoji && !self.ai_reply
    }
}

/// Work to do for a plain message. Toggles do nothing until an owner is bound.
pub fn plan_content(chat: &ChatRecord, sender_id: i64) -> ContentPlan {
    let Some(owner) = chat.owner_id else {
        return ContentPlan::default();
    };
    if owner == sender_id {
        ContentPlan {
            clean: chat.clean_enabled,
            emoji: chat.emoji_enabled,
            ai_reply: false,
        }
    } else {
        ContentPlan {
            clean: false,
            emoji: false,
            ai_reply: chat.ai_reply_enabled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat(owner: Option<i64>, muted: bool) -> ChatRecord {
        let mut r = ChatRecord::new(1);
        r.owner_id = owner;
        r.muted = muted;
        r
    }

    #[test]
    fn muted_chat_suppresses_non_owner() {
        let c = chat(Some(10), true);
        assert_eq!(decide(&c, 20, false), Decision::Suppress);
        assert_eq!(decide(&c, 20, true), Decision::Suppress);
    }

    #[test]
    fn muted_chat_allows_owner() {
        let c = chat(Some(10), true);
        assert_eq!(decide(&c, 10, false), Decision::Allow);
        assert_eq!(decide(&c, 10, true), Decision::Allow);
    }

    #[test]
    fn muted_without_owner_allows_everyone() {
        let c = chat(None, true);
        assert_eq!(decide(&c, 20, false), Decision::Allow);
    }

    #[test]
    fn unmuted_allows_everyone() {
        let c = chat(Some(10), false);
        for sender in [10, 20, 30] {
            assert_eq!(decide(&c, sender, false), Decision::Allow);
        }
    }

    #[test]
    fn toggles_inert_without_owner() {
        let mut c = chat(None, false);
        c.clean_enabled = true;
        c.emoji_enabled = true;
        c.ai_reply_enabled = true;
        assert!(plan_content(&c, 10).is_empty());
    }

    #[test]
    fn owner_gets_rewrites_others_get_replies() {
        let mut c = chat(Some(10), false);
        c.clean_enabled = true;
        c.ai_reply_enabled = true;

        let owner = plan_content(&c, 10);
        assert!(owner.clean && !owner.emoji && !owner.ai_reply);
        assert!(owner.rewrites());

        let other = plan_content(&c, 20);
        assert!(!other.rewrites());
        assert!(other.ai_reply);
    }
}
