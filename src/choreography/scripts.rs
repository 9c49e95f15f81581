//! The scripted animations behind `protocol`, `dox` and confirmation notices.
//!
//! Everything shown here is cosmetic. No value is measured or looked up.

use crate::choreography::Script;
use crate::config::TimingConfig;
use crate::timing::TimingModel;

/// Label prefix used in every animation.
pub const PREFIX: &str = "sdox";

pub const PROTOCOL_DONE: &str = "successful!";

const LOADING: [&str; 3] = ["loading.", "loading..", "loading..."];

const DOX_LOCATIONS: &[&str] = &[
    "somewhere on planet Earth",
    "inside a cardboard box",
    "the third cloud from the left",
];
const DOX_DEVICES: &[&str] = &["a toaster", "a potato with wifi", "calculator (solar)"];
const DOX_HOBBIES: &[&str] = &["touching grass (rarely)", "reading terms of service", "naps"];

/// Multi-phase "encryption" animation.
///
/// An encrypting block from 1 to 93..=95, a status line, two to four
/// `loading` cycles, a second block from about 29 to about 96 and a final
/// `successful!` line.
pub fn protocol(timing: &TimingModel, config: &TimingConfig) -> Script {
    let first_end = timing.roll(93..=95);
    let second_start = timing.roll(27..=31);
    let second_end = timing.roll(95..=97);
    let cycles = timing.roll(2..=4);

    let mut script = Script::new(config.final_delete_delay)
        .progress(format!("{PREFIX} encrypting"), timing.progress(1, first_end))
        .text(format!("{PREFIX}: handshake complete"));
    for _ in 0..cycles {
        for frame in LOADING {
            script = script.text(frame);
        }
    }
    script
        .progress(format!("{PREFIX} uploading"), timing.progress(second_start, second_end))
        .text(PROTOCOL_DONE)
}

/// Fake lookup listing, one line appended per frame at a fixed pace.
pub fn dox(timing: &TimingModel, config: &TimingConfig) -> Script {
    let pick = |options: &[&'static str]| options[timing.pick(options.len())];

    let header = format!("{PREFIX} lookup started\n────────────");
    let lines = [
        format!("ip: 127.0.0.{}", timing.roll(1..=254)),
        format!("location: {}", pick(DOX_LOCATIONS)),
        format!("device: {}", pick(DOX_DEVICES)),
        format!("password strength: {}/10", timing.roll(1..=3)),
        format!("hobbies: {}", pick(DOX_HOBBIES)),
    ];
    let closing = ["────────────", "nothing real was collected 🙂"];

    let mut shown = header.clone();
    let mut script = Script::new(config.dox_final_delay).text(header);
    for line in lines.iter().map(String::as_str).chain(closing) {
        shown.push('\n');
        shown.push_str(line);
        script = script.hold(shown.clone(), config.dox_line_delay);
    }
    script
}

/// Single-frame confirmation, deleted after the final delay.
pub fn notice(text: impl Into<String>, config: &TimingConfig) -> Script {
    Script::new(config.final_delete_delay).text(text)
}
