//! Choreography engine: drives one outbound message through timed frames.
//!
//! A [`Script`] expands into frames, each with a [`Pace`] that decides the
//! wait before it is shown. The engine sends the first frame, edits the same
//! message for every later frame, then deletes it after the script's final
//! delay. Delivery failures never abort a run.
//!
//! At most one run is active per chat. Further runs for the same chat wait on
//! a per-chat FIFO lock and start once the active run has deleted its message.

pub mod scripts;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::channels::{ChatTarget, Messenger, best_effort};
use crate::timing::{DelayCategory, TimingModel};

/// How long to wait before a frame is shown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pace {
    Percent,
    Text,
    /// Fixed delay that bypasses the timing model's jitter.
    Fixed(Duration),
}

/// One unit of a script.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// A literal status line, paced as text.
    Text(String),
    /// A percent block rendered as `"{label} {p}%"` for each value.
    Progress { label: String, percents: Vec<u32> },
    /// A literal frame shown after a fixed delay.
    Hold { text: String, delay: Duration },
}

/// A rendered frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub text: String,
    pub pace: Pace,
}

/// Ordered steps plus the wait before the message is deleted.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub steps: Vec<Step>,
    pub final_delay: Duration,
}

impl Script {
    pub fn new(final_delay: Duration) -> Self {
        Self {
            steps: Vec::new(),
            final_delay,
        }
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.steps.push(Step::Text(text.into()));
        self
    }

    pub fn progress(mut self, label: impl Into<String>, percents: Vec<u32>) -> Self {
        self.steps.push(Step::Progress {
            label: label.into(),
            percents,
        });
        self
    }

    pub fn hold(mut self, text: impl Into<String>, delay: Duration) -> Self {
        self.steps.push(Step::Hold {
            text: text.into(),
            delay,
        });
        self
    }

    /// Expand into frames in display order.
    pub fn frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        for step in &self.steps {
            match step {
                Step::Text(text) => frames.push(Frame {
                    text: text.clone(),
                    pace: Pace::Text,
                }),
                Step::Progress { label, percents } => {
                    frames.extend(percents.iter().map(|p| Frame {
                        text: format!("{label} {p}%"),
                        pace: Pace::Percent,
                    }));
                }
                Step::Hold { text, delay } => frames.push(Frame {
                    text: text.clone(),
                    pace: Pace::Fixed(*delay),
                }),
            }
        }
        frames
    }
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: Uuid,
    /// Frames in the script.
    pub frames: usize,
    /// Whether the first frame was delivered.
    pub sent: bool,
    /// Later frames whose edit was rejected.
    pub failed_edits: usize,
    /// Whether the final delete was accepted.
    pub deleted: bool,
}

/// Executes scripts against a messenger.
pub struct ChoreographyEngine {
    messenger: Arc<dyn Messenger>,
    timing: Arc<TimingModel>,
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl ChoreographyEngine {
    pub fn new(messenger: Arc<dyn Messenger>, timing: Arc<TimingModel>) -> Self {
        Self {
            messenger,
            timing,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn timing(&self) -> &Arc<TimingModel> {
        &self.timing
    }

    fn run_lock(&self, chat_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(locks.entry(chat_id).or_default())
    }

    /// True while a run holds the chat's lock. Never creates a lock entry.
    pub fn is_running(&self, chat_id: i64) -> bool {
        let locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .get(&chat_id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    fn wait_for(&self, pace: Pace) -> Duration {
        match pace {
            Pace::Percent => self.timing.delay(DelayCategory::Percent),
            Pace::Text => self.timing.delay(DelayCategory::Text),
            Pace::Fixed(d) => d,
        }
    }

    /// Run `script` in `chat`, waiting for any active run there to finish.
    pub async fn run(&self, chat: &ChatTarget, script: Script) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = info_span!("choreography", %run_id, chat_id = chat.chat_id);
        self.run_locked(run_id, chat, script).instrument(span).await
    }

    async fn run_locked(&self, run_id: Uuid, chat: &ChatTarget, script: Script) -> RunReport {
        let lock = self.run_lock(chat.chat_id);
        let _guard = lock.lock().await;

        let frames = script.frames();
        let mut report = RunReport {
            run_id,
            frames: frames.len(),
            sent: false,
            failed_edits: 0,
            deleted: false,
        };

        let Some((first, rest)) = frames.split_first() else {
            debug!("Empty script; nothing to send");
            return report;
        };

        let sent = self.messenger.send_message(chat, &first.text).await;
        let Some(handle) = best_effort("send", chat.chat_id, sent) else {
            return report;
        };
        report.sent = true;

        for frame in rest {
            tokio::time::sleep(self.wait_for(frame.pace)).await;
            let edited = self.messenger.edit_message_text(&handle, &frame.text).await;
            if best_effort("edit", chat.chat_id, edited).is_none() {
                report.failed_edits += 1;
            }
        }

        tokio::time::sleep(script.final_delay).await;
        let deleted = self
            .messenger
            .delete_messages(chat, &[handle.message_id])
            .await;
        report.deleted = best_effort("delete", chat.chat_id, deleted).is_some();

        info!(
            frames = report.frames,
            failed_edits = report.failed_edits,
            deleted = report.deleted,
            "Choreography run finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::channels::{EventStream, MessageHandle};
    use crate::config::TimingConfig;
    use crate::error::ChannelError;
    use crate::timing::DelaySpec;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Send(i64, String),
        Edit(i64, String),
        Delete(Vec<i64>),
    }

    #[derive(Default)]
    struct Recorder {
        calls: StdMutex<Vec<(Call, Instant)>>,
        next_id: AtomicI64,
        fail_edits: bool,
        fail_send: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|(c, _)| c.clone())
                .collect()
        }

        fn push(&self, call: Call) {
            self.calls.lock().unwrap().push((call, Instant::now()));
        }
    }

    #[async_trait]
    impl Messenger for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn start(&self) -> Result<EventStream, ChannelError> {
            Ok(Box::pin(futures::stream::empty()))
        }

        async fn send_message(
            &self,
            chat: &ChatTarget,
            text: &str,
        ) -> Result<MessageHandle, ChannelError> {
            if self.fail_send {
                return Err(ChannelError::Http("down".into()));
            }
            let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 100;
            self.push(Call::Send(message_id, text.to_string()));
            Ok(MessageHandle {
                chat: chat.clone(),
                message_id,
            })
        }

        async fn edit_message_text(
            &self,
            handle: &MessageHandle,
            text: &str,
        ) -> Result<(), ChannelError> {
            self.push(Call::Edit(handle.message_id, text.to_string()));
            if self.fail_edits {
                return Err(ChannelError::EditFailed {
                    name: "recorder".into(),
                    reason: "message is not modified".into(),
                });
            }
            Ok(())
        }

        async fn delete_messages(
            &self,
            _chat: &ChatTarget,
            message_ids: &[i64],
        ) -> Result<(), ChannelError> {
            self.push(Call::Delete(message_ids.to_vec()));
            Ok(())
        }
    }

    fn engine(recorder: Arc<Recorder>, timing: TimingConfig) -> ChoreographyEngine {
        ChoreographyEngine::new(recorder, Arc::new(TimingModel::with_seed(&timing, 1)))
    }

    #[test]
    fn frames_expand_progress_blocks() {
        let script = Script::new(Duration::ZERO)
            .progress("load", vec![1, 50, 100])
            .text("done")
            .hold("held", Duration::from_secs(1));
        let frames = script.frames();
        let texts: Vec<&str> = frames.iter().map(|f| f.text.as_str()).collect();
        assert_eq!(texts, ["load 1%", "load 50%", "load 100%", "done", "held"]);
        assert_eq!(frames[0].pace, Pace::Percent);
        assert_eq!(frames[3].pace, Pace::Text);
        assert_eq!(frames[4].pace, Pace::Fixed(Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn run_sends_edits_then_deletes_one_message() {
        let rec = Arc::new(Recorder::default());
        let engine = engine(Arc::clone(&rec), TimingConfig::instant());
        let script = Script::new(Duration::ZERO).text("a").text("b").text("c");

        let report = engine.run(&ChatTarget::new(5), script).await;

        assert_eq!(
            rec.calls(),
            vec![
                Call::Send(100, "a".into()),
                Call::Edit(100, "b".into()),
                Call::Edit(100, "c".into()),
                Call::Delete(vec![100]),
            ]
        );
        assert_eq!(report.frames, 3);
        assert!(report.sent);
        assert!(report.deleted);
        assert_eq!(report.failed_edits, 0);
    }

    #[tokio::test]
    async fn failed_edits_do_not_abort_the_run() {
        let rec = Arc::new(Recorder {
            fail_edits: true,
            ..Default::default()
        });
        let engine = engine(Arc::clone(&rec), TimingConfig::instant());
        let script = Script::new(Duration::ZERO).text("a").text("b").text("c");

        let report = engine.run(&ChatTarget::new(5), script).await;

        assert_eq!(report.failed_edits, 2);
        assert!(report.deleted);
        assert_eq!(rec.calls().last(), Some(&Call::Delete(vec![100])));
    }

    #[tokio::test]
    async fn failed_send_ends_the_run() {
        let rec = Arc::new(Recorder {
            fail_send: true,
            ..Default::default()
        });
        let engine = engine(Arc::clone(&rec), TimingConfig::instant());
        let report = engine
            .run(&ChatTarget::new(5), Script::new(Duration::ZERO).text("a").text("b"))
            .await;
        assert!(!report.sent);
        assert!(rec.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_script_sends_nothing() {
        let rec = Arc::new(Recorder::default());
        let engine = engine(Arc::clone(&rec), TimingConfig::instant());
        let report = engine.run(&ChatTarget::new(5), Script::default()).await;
        assert_eq!(report.frames, 0);
        assert!(rec.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn delays_are_applied_in_order() {
        let rec = Arc::new(Recorder::default());
        let engine = engine(Arc::clone(&rec), TimingConfig::instant());
        let script = Script::new(Duration::from_secs(8))
            .text("a")
            .hold("b", Duration::from_millis(700))
            .hold("c", Duration::from_millis(700));

        let start = Instant::now();
        engine.run(&ChatTarget::new(5), script).await;

        let at: Vec<Duration> = rec
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, t)| t.duration_since(start))
            .collect();
        assert_eq!(
            at,
            vec![
                Duration::ZERO,
                Duration::from_millis(700),
                Duration::from_millis(1400),
                Duration::from_millis(9400),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn percent_and_text_frames_use_their_own_delays() {
        let rec = Arc::new(Recorder::default());
        let timing = TimingConfig {
            percent_step: DelaySpec::new(0.1, 0.1, 0.0, 0.0),
            text_step: DelaySpec::new(1.0, 1.0, 0.0, 0.0),
            ..TimingConfig::instant()
        };
        let engine = engine(Arc::clone(&rec), timing);
        let script = Script::new(Duration::ZERO)
            .progress("p", vec![1, 2, 3])
            .text("t1")
            .text("t2")
            .progress("q", vec![4]);

        let start = Instant::now();
        engine.run(&ChatTarget::new(5), script).await;

        let at: Vec<(Call, Duration)> = rec
            .calls
            .lock()
            .unwrap()
            .iter()
            .map(|(c, t)| (c.clone(), t.duration_since(start)))
            .collect();
        let ms = Duration::from_millis;
        assert_eq!(
            at,
            vec![
                (Call::Send(100, "p 1%".into()), ms(0)),
                (Call::Edit(100, "p 2%".into()), ms(100)),
                (Call::Edit(100, "p 3%".into()), ms(200)),
                (Call::Edit(100, "t1".into()), ms(1200)),
                (Call::Edit(100, "t2".into()), ms(2200)),
                (Call::Edit(100, "q 4%".into()), ms(2300)),
                (Call::Delete(vec![100]), ms(2300)),
            ]
        );
    }

    #[test]
    fn idle_chat_is_not_tracked() {
        let engine = engine(Arc::new(Recorder::default()), TimingConfig::instant());
        assert!(!engine.is_running(42));
        assert!(engine.locks.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn runs_in_the_same_chat_do_not_interleave() {
        let rec = Arc::new(Recorder::default());
        let engine = Arc::new(engine(Arc::clone(&rec), TimingConfig::instant()));
        let chat = ChatTarget::new(5);

        let script = |tag: &str| {
            Script::new(Duration::from_secs(1))
                .hold(format!("{tag}1"), Duration::ZERO)
                .hold(format!("{tag}2"), Duration::from_millis(300))
                .hold(format!("{tag}3"), Duration::from_millis(300))
        };

        let first = {
            let engine = Arc::clone(&engine);
            let chat = chat.clone();
            let s = script("x");
            tokio::spawn(async move { engine.run(&chat, s).await })
        };
        tokio::task::yield_now().await;
        assert!(engine.is_running(5));
        let second = {
            let engine = Arc::clone(&engine);
            let chat = chat.clone();
            let s = script("y");
            tokio::spawn(async move { engine.run(&chat, s).await })
        };
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            rec.calls(),
            vec![
                Call::Send(100, "x1".into()),
                Call::Edit(100, "x2".into()),
                Call::Edit(100, "x3".into()),
                Call::Delete(vec![100]),
                Call::Send(101, "y1".into()),
                Call::Edit(101, "y2".into()),
                Call::Edit(101, "y3".into()),
                Call::Delete(vec![101]),
            ]
        );
        assert!(!engine.is_running(5));
    }

    #[tokio::test(start_paused = true)]
    async fn different_chats_run_concurrently() {
        let rec = Arc::new(Recorder::default());
        let engine = Arc::new(engine(Arc::clone(&rec), TimingConfig::instant()));
        let script = Script::new(Duration::from_secs(5)).text("only");

        let start = Instant::now();
        let a = {
            let engine = Arc::clone(&engine);
            let s = script.clone();
            tokio::spawn(async move { engine.run(&ChatTarget::new(1), s).await })
        };
        let b = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run(&ChatTarget::new(2), script).await })
        };
        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }
}
