//! Moderation and decoration: the access gate plus the rewrites selected by
//! per-chat toggles.

pub mod decorate;
pub mod policy;
pub mod profanity;
pub mod replies;

pub use decorate::ContentRewriter;
pub use policy::{ContentPlan, Decision, decide, plan_content};
pub use profanity::ProfanityMasker;
