//! fumble-context HTTP server binary

use fumble_context::{
    ChannelSource, ContextManagerConfig, ContextNavigator, DiscordChannelSource, GuildContextStore,
    MessageCacheClient, MessageSearch, ServiceConfig, StaticChannelSource, StoreMessageIndex,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    println!("fumble-context guild context server");
    println!("   Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = ContextManagerConfig::from_env();
    let service = ServiceConfig::from_env();

    let source: Arc<dyn ChannelSource> = match &service.discord_bot_token {
        Some(token) => {
            println!("✓ Channel source: Discord REST API");
            Arc::new(DiscordChannelSource::new(token.clone()))
        }
        None => {
            println!("⚠️  DISCORD_BOT_TOKEN not set, channel structure comes from ingested messages only");
            Arc::new(StaticChannelSource::new())
        }
    };

    if !config.guild_ids.is_empty() {
        println!("✓ Tracking guilds: {}", config.guild_ids.join(", "));
    }

    let store = GuildContextStore::new(config, source);

    let messages: Arc<dyn MessageSearch> = match &service.message_cache_url {
        Some(url) => {
            let client = MessageCacheClient::new(url.clone());
            match client.health_check().await {
                Ok(true) => println!("✓ Message cache is healthy: {}", url),
                Ok(false) => eprintln!("⚠️  Message cache returned an error status: {}", url),
                Err(e) => {
                    eprintln!("❌ Failed to connect to message cache at {}: {}", url, e);
                    return Err(e);
                }
            }
            Arc::new(client)
        }
        None => {
            println!("✓ Message search: in-process ring buffers");
            Arc::new(StoreMessageIndex::new(store.clone()))
        }
    };

    let _poller = fumble_context::poller::spawn_auto_poll(store.clone());

    let navigator = Arc::new(ContextNavigator::new(store, messages));

    println!("✓ Starting HTTP server on port {}...", service.port);
    println!();

    fumble_context::server::run_server(navigator, service.port).await?;

    Ok(())
}
