//! Tunables for the context store and the server binary

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Process-wide settings for the guild context store
#[derive(Debug, Clone)]
pub struct ContextManagerConfig {
    pub poll_interval: Duration,
    pub max_messages_per_channel: usize,
    /// Newest messages per channel allowed to stay hot; older ones drop to warm
    pub max_hot_messages: usize,
    /// Age after which a hot message becomes warm
    pub hot_max_age: Duration,
    /// Age after which a warm message becomes cold
    pub warm_max_age: Duration,
    /// Cold messages per channel kept verbatim before the oldest get summarized
    pub summarize_after_messages: usize,
    pub auto_poll: bool,
    /// Guilds registered before the first poll
    pub guild_ids: Vec<String>,
}

impl Default for ContextManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10 * 60),
            max_messages_per_channel: 50,
            max_hot_messages: 20,
            hot_max_age: Duration::from_secs(60 * 60),
            warm_max_age: Duration::from_secs(24 * 60 * 60),
            summarize_after_messages: 30,
            auto_poll: true,
            guild_ids: vec![],
        }
    }
}

impl ContextManagerConfig {
    /// Defaults overridden by `FUMBLE_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: env_secs("FUMBLE_POLL_INTERVAL_SECS", defaults.poll_interval),
            max_messages_per_channel: env_parse(
                "FUMBLE_MAX_MESSAGES_PER_CHANNEL",
                defaults.max_messages_per_channel,
            ),
            max_hot_messages: env_parse("FUMBLE_MAX_HOT_MESSAGES", defaults.max_hot_messages),
            hot_max_age: env_secs("FUMBLE_HOT_MAX_AGE_SECS", defaults.hot_max_age),
            warm_max_age: env_secs("FUMBLE_WARM_MAX_AGE_SECS", defaults.warm_max_age),
            summarize_after_messages: env_parse(
                "FUMBLE_SUMMARIZE_AFTER",
                defaults.summarize_after_messages,
            ),
            auto_poll: env_parse("FUMBLE_AUTO_POLL", defaults.auto_poll),
            guild_ids: std::env::var("FUMBLE_GUILD_IDS")
                .map(|v| parse_list(&v))
                .unwrap_or(defaults.guild_ids),
        }
    }
}

/// Settings only the server binary needs
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub port: u16,
    pub discord_bot_token: Option<String>,
    pub message_cache_url: Option<String>,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self {
            port: env_parse("FUMBLE_PORT", 8090),
            discord_bot_token: non_empty_var("DISCORD_BOT_TOKEN"),
            message_cache_url: non_empty_var("MESSAGE_CACHE_URL"),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            default
        }),
        Err(_) => default,
    }
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
