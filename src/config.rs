//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::LlmConfig;
use crate::timing::DelaySpec;

/// Default model requested from the text-generation endpoint.
pub const DEFAULT_AI_MODEL: &str = "gpt-4o-mini";

/// Largest magnitude accepted for any delay or jitter setting, in seconds.
pub const MAX_DELAY_SECS: f64 = 3600.0;

/// Which messaging transport the binary wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Telegram,
    Cli,
}

/// Delay settings for the timing model and the scripted runs.
#[derive(Debug, Clone)]
pub struct TimingConfig {
    /// Delay between frames of a percent block.
    pub percent_step: DelaySpec,
    /// Delay between literal status frames.
    pub text_step: DelaySpec,
    /// Wait after the last frame before the message is deleted.
    pub final_delete_delay: Duration,
    /// Fixed per-line delay of the `dox` listing.
    pub dox_line_delay: Duration,
    /// Wait after the `dox` listing before it is deleted.
    pub dox_final_delay: Duration,
    /// Chance that a progress frame repeats instead of advancing.
    pub stall_probability: f64,
}

impl TimingConfig {
    /// All delays zero. Used by tests and the CLI rehearsal mode.
    pub fn instant() -> Self {
        Self {
            percent_step: DelaySpec::ZERO,
            text_step: DelaySpec::ZERO,
            final_delete_delay: Duration::ZERO,
            dox_line_delay: Duration::ZERO,
            dox_final_delay: Duration::ZERO,
            stall_probability: 0.04,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            percent_step: DelaySpec::new(0.04, 0.03, -0.01, 0.03),
            text_step: DelaySpec::new(0.6, 0.3, -0.15, 0.35),
            final_delete_delay: Duration::from_secs(2),
            dox_line_delay: Duration::from_millis(700),
            dox_final_delay: Duration::from_secs(8),
            stall_probability: 0.04,
        }
    }
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Transport to connect.
    pub channel: ChannelKind,
    /// Bot API token (required for Telegram).
    pub bot_token: Option<SecretString>,
    /// Single character that starts every command.
    pub command_prefix: char,
    pub timing: TimingConfig,
    /// When set, only this sender may issue commands and ownership always binds to it.
    pub owner_override: Option<i64>,
    /// Optional text-generation collaborator.
    pub llm: Option<LlmConfig>,
    /// Best-effort chat state snapshot file.
    pub state_path: Option<PathBuf>,
    /// Directory for rotating log files.
    pub log_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            channel: ChannelKind::Telegram,
            bot_token: None,
            command_prefix: '.',
            timing: TimingConfig::default(),
            owner_override: None,
            llm: None,
            state_path: None,
            log_dir: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let channel = match get("SDOX_CHANNEL").as_deref() {
            None | Some("telegram") => ChannelKind::Telegram,
            Some("cli") => ChannelKind::Cli,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "SDOX_CHANNEL".into(),
                    message: format!("expected `telegram` or `cli`, got `{other}`"),
                });
            }
        };

        let bot_token = get("TOKEN").map(SecretString::from);
        if channel == ChannelKind::Telegram && bot_token.is_none() {
            return Err(ConfigError::MissingEnvVar("TOKEN".into()));
        }

        let command_prefix = match get("SDOX_PREFIX") {
            None => '.',
            Some(p) => {
                let mut chars = p.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => {
                        return Err(ConfigError::InvalidValue {
                            key: "SDOX_PREFIX".into(),
                            message: format!("expected a single character, got `{p}`"),
                        });
                    }
                }
            }
        };

        let defaults = TimingConfig::default();
        let timing = TimingConfig {
            percent_step: DelaySpec::new(
                secs(&get, "STEP_DELAY_SEC", defaults.percent_step.base)?,
                secs(&get, "SDOX_PERCENT_MIN_SEC", defaults.percent_step.min)?,
                float(&get, "SDOX_PERCENT_JITTER_LOW_SEC", defaults.percent_step.jitter_low)?,
                float(&get, "SDOX_PERCENT_JITTER_HIGH_SEC", defaults.percent_step.jitter_high)?,
            ),
            text_step: DelaySpec::new(
                secs(&get, "SDOX_TEXT_BASE_SEC", defaults.text_step.base)?,
                secs(&get, "SDOX_TEXT_MIN_SEC", defaults.text_step.min)?,
                float(&get, "SDOX_TEXT_JITTER_LOW_SEC", defaults.text_step.jitter_low)?,
                float(&get, "SDOX_TEXT_JITTER_HIGH_SEC", defaults.text_step.jitter_high)?,
            ),
            final_delete_delay: Duration::from_secs_f64(secs(
                &get,
                "FINAL_DELETE_DELAY_SEC",
                defaults.final_delete_delay.as_secs_f64(),
            )?),
            dox_line_delay: Duration::from_secs_f64(secs(
                &get,
                "SDOX_DOX_LINE_DELAY_SEC",
                defaults.dox_line_delay.as_secs_f64(),
            )?),
            dox_final_delay: Duration::from_secs_f64(secs(
                &get,
                "SDOX_DOX_FINAL_DELAY_SEC",
                defaults.dox_final_delay.as_secs_f64(),
            )?),
            stall_probability: probability(
                &get,
                "SDOX_STALL_PROBABILITY",
                defaults.stall_probability,
            )?,
        };

        let owner_override = get("OWNER_ID")
            .map(|raw| {
                raw.parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                    key: "OWNER_ID".into(),
                    message: e.to_string(),
                })
            })
            .transpose()?;

        let llm = match (get("AI_ENDPOINT"), get("AI_API_KEY")) {
            (Some(endpoint), Some(api_key)) => Some(LlmConfig {
                endpoint,
                api_key: SecretString::from(api_key),
                model: get("AI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            }),
            (Some(_), None) => return Err(ConfigError::MissingEnvVar("AI_API_KEY".into())),
            _ => None,
        };

        Ok(Self {
            channel,
            bot_token,
            command_prefix,
            timing,
            owner_override,
            llm,
            state_path: get("SDOX_STATE_PATH").map(PathBuf::from),
            log_dir: get("SDOX_LOG_DIR").map(PathBuf::from),
        })
    }
}

fn float<G>(get: &G, key: &str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let value: f64 = raw.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.into(),
        message: format!("`{raw}` is not a number"),
    })?;
    if !value.is_finite() {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("`{raw}` is not finite"),
        });
    }
    if value.abs() > MAX_DELAY_SECS {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("`{raw}` exceeds {MAX_DELAY_SECS} seconds"),
        });
    }
    Ok(value)
}

/// Non-negative seconds.
fn secs<G>(get: &G, key: &str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = float(get, key, default)?;
    if value < 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("delay must be non-negative, got {value}"),
        });
    }
    Ok(value)
}

fn probability<G>(get: &G, key: &str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value = float(get, key, default)?;
    if !(0.0..1.0).contains(&value) {
        return Err(ConfigError::InvalidValue {
            key: key.into(),
            message: format!("probability must be in [0, 1), got {value}"),
        });
    }
    Ok(value)
}
