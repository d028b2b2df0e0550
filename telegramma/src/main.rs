//! Telegramma bot entry point.

use anyhow::Context;
use std::sync::Arc;
use telegramma::bot::Bot;
use telegramma::chat::{ChatTransport, TelegramClient};
use telegramma::collaborators::{install_crypto_provider, CollaboratorSet};
use telegramma::config::{BotConfig, CiConfig, TwrpdtgenConfig};
use telegramma::module::ModuleRegistry;
use telegramma::modules::{ci, twrpdtgen};
use telegramma::observability::{init_tracing, LogFormat};
use telegramma::tasks::TaskDispatcher;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing(LogFormat::from_env());

    // octocrab and reqwest need a process-wide rustls provider.
    install_crypto_provider();

    let config = BotConfig::from_env().context("Failed to load configuration")?;
    let client = Arc::new(TelegramClient::new(config.telegram()?)?);
    let chat: Arc<dyn ChatTransport> = client.clone();

    let (queue, mut dispatcher) = TaskDispatcher::new();
    let mut registry = ModuleRegistry::new();

    let ci_config: CiConfig = config.namespace(CiConfig::NAMESPACE)?;
    let runner = Arc::new(ci::ProcessCiRunner::new(ci_config.clone()));
    registry.register(ci::register(&ci_config, queue, runner, chat.clone()))?;

    let twrpdtgen_config: TwrpdtgenConfig = config.namespace(TwrpdtgenConfig::NAMESPACE)?;
    registry.register(twrpdtgen::register(
        &twrpdtgen_config,
        chat,
        CollaboratorSet::production,
    )?)?;

    registry.attach_consumers(&mut dispatcher)?;
    info!(modules = ?registry.modules(), "Modules loaded");

    let dispatcher = tokio::spawn(dispatcher.run());
    let bot = Bot::new(client, Arc::new(registry));
    if let Err(err) = bot.publish_commands().await {
        warn!(error = %err, "Failed to publish command list");
    }

    bot.run().await?;
    dispatcher.abort();
    Ok(())
}
