use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use sdox_agent::channels::{CliChannel, Messenger, TelegramChannel};
use sdox_agent::config::{AgentConfig, ChannelKind};
use sdox_agent::dispatcher::Dispatcher;
use sdox_agent::error::ConfigError;
use sdox_agent::llm::create_generator;
use sdox_agent::state::ChatStateStore;

/// Stderr logging plus an optional daily-rotated file. The returned guard
/// flushes the file writer on drop and must live as long as the process.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "sdox-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn load_store(path: Option<&Path>) -> ChatStateStore {
    let Some(path) = path.filter(|p| p.exists()) else {
        return ChatStateStore::new();
    };
    match ChatStateStore::load_snapshot(path).await {
        Ok(store) => {
            info!(path = %path.display(), chats = store.len().await, "Restored chat state");
            store
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not load chat state; starting empty");
            ChatStateStore::new()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AgentConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("🕶  sdox agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Channel: {:?}", config.channel);
    eprintln!("   Command prefix: {}", config.command_prefix);
    if config.channel == ChannelKind::Cli {
        eprintln!("   Type messages and press Enter.");
        eprintln!("   Prefix a line with @<id> to speak as another user.\n");
    }

    let messenger: Arc<dyn Messenger> = match config.channel {
        ChannelKind::Telegram => {
            let token = config
                .bot_token
                .clone()
                .ok_or_else(|| ConfigError::MissingEnvVar("TOKEN".into()))?;
            Arc::new(TelegramChannel::new(token))
        }
        ChannelKind::Cli => Arc::new(CliChannel::new()),
    };
    messenger.health_check().await?;

    let generator = match &config.llm {
        Some(llm) => match create_generator(llm) {
            Ok(generator) => Some(generator),
            Err(e) => {
                warn!(error = %e, "Text generation unavailable; using local fallbacks");
                None
            }
        },
        None => {
            info!("No text generation endpoint configured; using local fallbacks");
            None
        }
    };

    let store = load_store(config.state_path.as_deref()).await;

    let dispatcher = Dispatcher::new(messenger, &config)
        .with_store(Arc::new(store))
        .with_generator(generator);

    Arc::new(dispatcher).run().await?;
    Ok(())
}
