//! Command dispatcher: the control loop.
//!
//! Each inbound event is gated, classified and applied to chat state in
//! arrival order. Anything that talks to the messenger or the generator
//! (trigger deletion, choreography runs, rewrites, replies) is returned as a
//! follow-up future so a several-second `protocol` run never holds up the
//! next event. Follow-ups for one chat that show a choreography queue on that
//! chat's run lock.

use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::calc::calc_reply;
use crate::channels::{ChatTarget, InboundEvent, MessageHandle, Messenger, best_effort};
use crate::choreography::{ChoreographyEngine, Script, scripts};
use crate::classifier::{Classification, CommandClassifier, CommandName, ParsedCommand};
use crate::config::{AgentConfig, TimingConfig};
use crate::error::Error;
use crate::llm::TextGenerator;
use crate::moderation::{ContentPlan, ContentRewriter, Decision, decide, plan_content};
use crate::state::{ChatRecord, ChatStateStore, Toggle};
use crate::timing::TimingModel;

/// What the dispatcher did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing to do.
    Ignored,
    /// Inbound message deleted, no handler ran.
    Suppressed,
    Command(CommandName),
    /// Plain message with rewrites or a reply scheduled.
    Content(ContentPlan),
}

/// Result of [`Dispatcher::dispatch`]: the outcome plus deferred delivery work.
pub struct Dispatched {
    pub outcome: Outcome,
    pub follow_up: Option<BoxFuture<'static, ()>>,
}

impl Dispatched {
    fn done(outcome: Outcome) -> Self {
        Self {
            outcome,
            follow_up: None,
        }
    }

    fn then(outcome: Outcome, work: BoxFuture<'static, ()>) -> Self {
        Self {
            outcome,
            follow_up: Some(work),
        }
    }
}

/// How a toggle command's argument was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToggleArg {
    Set(bool),
    Flip,
    Invalid,
}

fn parse_toggle_arg(args: &str) -> ToggleArg {
    match args.trim().to_lowercase().as_str() {
        "" => ToggleArg::Flip,
        "on" => ToggleArg::Set(true),
        "off" => ToggleArg::Set(false),
        _ => ToggleArg::Invalid,
    }
}

/// Routes inbound events to state changes and choreography runs.
pub struct Dispatcher {
    messenger: Arc<dyn Messenger>,
    store: Arc<ChatStateStore>,
    classifier: CommandClassifier,
    engine: Arc<ChoreographyEngine>,
    rewriter: Arc<ContentRewriter>,
    timing: TimingConfig,
    owner_override: Option<i64>,
    state_path: Option<PathBuf>,
}

impl Dispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, config: &AgentConfig) -> Self {
        let timing = Arc::new(TimingModel::new(&config.timing));
        Self {
            engine: Arc::new(ChoreographyEngine::new(Arc::clone(&messenger), timing)),
            messenger,
            store: Arc::new(ChatStateStore::new()),
            classifier: CommandClassifier::new(config.command_prefix),
            rewriter: Arc::new(ContentRewriter::new(None)),
            timing: config.timing.clone(),
            owner_override: config.owner_override,
            state_path: config.state_path.clone(),
        }
    }

    pub fn with_store(mut self, store: Arc<ChatStateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_generator(mut self, generator: Option<Arc<dyn TextGenerator>>) -> Self {
        self.rewriter = Arc::new(ContentRewriter::new(generator));
        self
    }

    /// Replace the timing model, e.g. with a seeded one.
    pub fn with_timing_model(mut self, timing: Arc<TimingModel>) -> Self {
        self.engine = Arc::new(ChoreographyEngine::new(Arc::clone(&self.messenger), timing));
        self
    }

    pub fn store(&self) -> &Arc<ChatStateStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<ChoreographyEngine> {
        &self.engine
    }

    /// Dispatch one event and wait for its follow-up work.
    pub async fn handle(&self, event: InboundEvent) -> Outcome {
        let dispatched = self.dispatch(event).await;
        if let Some(work) = dispatched.follow_up {
            work.await;
        }
        dispatched.outcome
    }

    /// Gate, classify and apply one event. State changes happen before this
    /// returns; outbound delivery is left in the follow-up.
    pub async fn dispatch(&self, event: InboundEvent) -> Dispatched {
        let chat_id = event.chat_id();
        let mut record = self.store.get_or_create(chat_id).await;

        if let Some(owner) = self.owner_override {
            if record.owner_id != Some(owner) {
                self.store.bind_owner(chat_id, owner).await;
                record.owner_id = Some(owner);
            }
        }

        let mut classification = self.classifier.classify(event.text.as_deref());
        if let Some(owner) = self.owner_override {
            if event.sender_id != owner && classification.is_command() {
                debug!(chat_id, sender_id = event.sender_id, "Ignoring command from non-owner");
                classification = Classification::NoCommand;
            }
        }

        if decide(&record, event.sender_id, classification.is_command()) == Decision::Suppress {
            debug!(chat_id, sender_id = event.sender_id, "Suppressing message in muted chat");
            let work = self.delete_inbound(&event);
            return Dispatched::then(Outcome::Suppressed, work);
        }

        match classification {
            Classification::Command(cmd) => self.dispatch_command(event, cmd).await,
            Classification::NoCommand => self.dispatch_content(event, &record),
        }
    }

    async fn dispatch_command(&self, event: InboundEvent, cmd: ParsedCommand) -> Dispatched {
        let chat_id = event.chat_id();
        let sender_id = event.sender_id;
        info!(chat_id, sender_id, command = %cmd.name, "Command received");

        let previous = self.store.bind_owner(chat_id, sender_id).await;
        if let Some(prev) = previous.filter(|p| *p != sender_id) {
            warn!(chat_id, previous_owner = prev, new_owner = sender_id, "Chat ownership rebound");
        }

        let delete_trigger = self.delete_inbound(&event);
        let chat = event.chat.clone();

        let work: BoxFuture<'static, ()> = match cmd.name {
            CommandName::Protocol => {
                let script = scripts::protocol(self.engine.timing(), &self.timing);
                self.run_script(chat, script)
            }
            CommandName::Dox => {
                let script = scripts::dox(self.engine.timing(), &self.timing);
                self.run_script(chat, script)
            }
            CommandName::Mute | CommandName::Unmute => {
                let muted = cmd.name == CommandName::Mute;
                let changed = self.store.set_muted(chat_id, muted).await;
                debug!(chat_id, muted, changed, "Mute flag set");
                let text = if muted { "🔇 chat muted" } else { "🔊 chat unmuted" };
                self.run_script(chat, scripts::notice(text, &self.timing))
            }
            CommandName::Clean => self.toggle(chat, cmd.name, Toggle::Clean, &cmd.args).await,
            CommandName::Emoji => self.toggle(chat, cmd.name, Toggle::Emoji, &cmd.args).await,
            CommandName::AiAnswers => {
                self.toggle(chat, cmd.name, Toggle::AiReply, &cmd.args).await
            }
            CommandName::Calc => {
                let reply = calc_reply(&cmd.args);
                let messenger = Arc::clone(&self.messenger);
                Box::pin(async move {
                    let sent = messenger.send_message(&chat, &reply).await;
                    best_effort("send", chat.chat_id, sent);
                })
            }
        };

        self.save_snapshot().await;

        Dispatched::then(
            Outcome::Command(cmd.name),
            Box::pin(async move {
                delete_trigger.await;
                work.await;
            }),
        )
    }

    async fn toggle(
        &self,
        chat: ChatTarget,
        name: CommandName,
        toggle: Toggle,
        args: &str,
    ) -> BoxFuture<'static, ()> {
        let chat_id = chat.chat_id;
        let enabled = match parse_toggle_arg(args) {
            ToggleArg::Set(value) => {
                let changed = self.store.set_toggle(chat_id, toggle, value).await;
                debug!(chat_id, %toggle, value, changed, "Toggle set");
                value
            }
            ToggleArg::Flip => {
                let value = self.store.flip_toggle(chat_id, toggle).await;
                debug!(chat_id, %toggle, value, "Toggle flipped");
                value
            }
            ToggleArg::Invalid => {
                let usage = format!("usage: {}{name} on|off", self.classifier.prefix());
                return self.run_script(chat, scripts::notice(usage, &self.timing));
            }
        };

        let rewriter = Arc::clone(&self.rewriter);
        let engine = Arc::clone(&self.engine);
        let timing = self.timing.clone();
        Box::pin(async move {
            let text = rewriter.confirmation(toggle, enabled).await;
            engine.run(&chat, scripts::notice(text, &timing)).await;
        })
    }

    fn dispatch_content(&self, event: InboundEvent, record: &ChatRecord) -> Dispatched {
        let Some(text) = event.text.clone().filter(|t| !t.trim().is_empty()) else {
            return Dispatched::done(Outcome::Ignored);
        };
        let plan = plan_content(record, event.sender_id);
        if plan.is_empty() {
            return Dispatched::done(Outcome::Ignored);
        }

        let messenger = Arc::clone(&self.messenger);
        let rewriter = Arc::clone(&self.rewriter);
        let chat = event.chat.clone();
        let message_id = event.message_id;

        Dispatched::then(
            Outcome::Content(plan),
            Box::pin(async move {
                if plan.rewrites() {
                    if let Some(rewritten) = rewriter.rewrite(&text, plan).await {
                        let handle = MessageHandle {
                            chat: chat.clone(),
                            message_id,
                        };
                        let edited = messenger.edit_message_text(&handle, &rewritten).await;
                        best_effort("rewrite", chat.chat_id, edited);
                    }
                }
                if plan.ai_reply {
                    let reply = rewriter.reply_to(&text).await;
                    let sent = messenger.send_message(&chat, &reply).await;
                    best_effort("reply", chat.chat_id, sent);
                }
            }),
        )
    }

    fn delete_inbound(&self, event: &InboundEvent) -> BoxFuture<'static, ()> {
        let messenger = Arc::clone(&self.messenger);
        let chat = event.chat.clone();
        let message_id = event.message_id;
        Box::pin(async move {
            let deleted = messenger.delete_messages(&chat, &[message_id]).await;
            best_effort("delete_inbound", chat.chat_id, deleted);
        })
    }

    fn run_script(&self, chat: ChatTarget, script: Script) -> BoxFuture<'static, ()> {
        if self.engine.is_running(chat.chat_id) {
            debug!(chat_id = chat.chat_id, "Run queued behind the active run");
        }
        let engine = Arc::clone(&self.engine);
        Box::pin(async move {
            engine.run(&chat, script).await;
        })
    }

    async fn save_snapshot(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        if let Err(e) = self.store.save_snapshot(path).await {
            warn!(path = %path.display(), error = %e, "Failed to save chat state snapshot");
        }
    }

    /// Consume the messenger's event stream until it ends or Ctrl+C.
    ///
    /// Follow-up work runs on spawned tasks; in-flight runs are awaited
    /// before returning when the stream ends.
    pub async fn run(self: Arc<Self>) -> Result<(), Error> {
        let mut events = self.messenger.start().await?;
        let mut tasks = JoinSet::new();

        info!(channel = self.messenger.name(), "Dispatcher ready and listening");

        loop {
            let event = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    info!("Ctrl+C received, shutting down...");
                    tasks.abort_all();
                    break;
                }
                ev = events.next() => match ev {
                    Some(ev) => ev,
                    None => {
                        info!("Event stream ended, waiting for in-flight runs...");
                        break;
                    }
                }
            };

            let dispatched = self.dispatch(event).await;
            if let Some(work) = dispatched.follow_up {
                tasks.spawn(work);
            }
            while tasks.try_join_next().is_some() {}
        }

        while tasks.join_next().await.is_some() {}
        self.messenger.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_args() {
        assert_eq!(parse_toggle_arg("on"), ToggleArg::Set(true));
        assert_eq!(parse_toggle_arg(" OFF "), ToggleArg::Set(false));
        assert_eq!(parse_toggle_arg(""), ToggleArg::Flip);
        assert_eq!(parse_toggle_arg("maybe"), ToggleArg::Invalid);
    }
}
