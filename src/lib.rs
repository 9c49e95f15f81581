//! sdox agent: chat choreography and moderation core.

pub mod calc;
pub mod channels;
pub mod choreography;
pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod llm;
pub mod moderation;
pub mod state;
pub mod timing;
