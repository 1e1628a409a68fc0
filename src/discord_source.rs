//! Channel source backed by the Discord REST API

use crate::sources::ChannelSource;
use crate::types::*;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

const DISCORD_API: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct DiscordGuild {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DiscordChannel {
    id: String,
    #[serde(rename = "type")]
    channel_type: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    owner_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActiveThreads {
    threads: Vec<DiscordChannel>,
}

/// What a Discord channel type maps to in the context store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapped {
    Category,
    Channel(ChannelKind),
}

fn map_channel_type(channel_type: u8) -> Option<Mapped> {
    match channel_type {
        0 => Some(Mapped::Channel(ChannelKind::Text)),
        2 | 13 => Some(Mapped::Channel(ChannelKind::Voice)),
        4 => Some(Mapped::Category),
        5 => Some(Mapped::Channel(ChannelKind::Announcement)),
        10 | 11 | 12 => Some(Mapped::Channel(ChannelKind::Thread)),
        15 | 16 => Some(Mapped::Channel(ChannelKind::Forum)),
        _ => None,
    }
}

/// Fetches guild structure with a bot token
pub struct DiscordChannelSource {
    api_base: String,
    token: String,
    client: reqwest::Client,
}

impl DiscordChannelSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_base(DISCORD_API, token)
    }

    pub fn with_api_base(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.api_base, path);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .send()
            .await
            .context(format!("Failed to call Discord API at {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Discord API error {} on {}: {}", status, path, body);
        }

        response
            .json()
            .await
            .context(format!("Failed to parse Discord response for {}", path))
    }
}

/// Split raw Discord channels into categories and channels. Threads inherit the
/// category of their parent channel. `threads` is None when the active thread
/// list could not be fetched.
fn build_snapshot(
    guild_name: Option<String>,
    channels: Vec<DiscordChannel>,
    threads: Option<Vec<DiscordChannel>>,
) -> GuildSnapshot {
    let mut snapshot = GuildSnapshot {
        guild_name,
        // Discord only lists active threads
        threads: if threads.is_some() {
            ThreadListing::ActiveOnly
        } else {
            ThreadListing::Unavailable
        },
        ..Default::default()
    };
    let mut parent_category: HashMap<String, Option<String>> = HashMap::new();

    for raw in channels {
        let name = raw.name.clone().unwrap_or_else(|| raw.id.clone());
        match map_channel_type(raw.channel_type) {
            Some(Mapped::Category) => snapshot.categories.push(CategorySnapshot {
                id: raw.id,
                name,
                position: raw.position.unwrap_or_default(),
            }),
            Some(Mapped::Channel(kind)) => {
                parent_category.insert(raw.id.clone(), raw.parent_id.clone());
                snapshot.channels.push(ChannelSnapshot {
                    id: raw.id,
                    name,
                    kind,
                    category_id: raw.parent_id,
                    parent_id: None,
                    position: raw.position.unwrap_or_default(),
                    topic: raw.topic,
                    thread_owner_id: None,
                });
            }
            None => {}
        }
    }

    for raw in threads.unwrap_or_default() {
        if map_channel_type(raw.channel_type) != Some(Mapped::Channel(ChannelKind::Thread)) {
            continue;
        }
        let category_id = raw
            .parent_id
            .as_ref()
            .and_then(|parent| parent_category.get(parent).cloned())
            .flatten();
        snapshot.channels.push(ChannelSnapshot {
            name: raw.name.clone().unwrap_or_else(|| raw.id.clone()),
            id: raw.id,
            kind: ChannelKind::Thread,
            category_id,
            parent_id: raw.parent_id,
            position: raw.position.unwrap_or_default(),
            topic: None,
            thread_owner_id: raw.owner_id,
        });
    }

    snapshot
}

#[async_trait]
impl ChannelSource for DiscordChannelSource {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn fetch_guild(&self, guild_id: &str) -> Result<GuildSnapshot> {
        let guild: DiscordGuild = self.get(&format!("/guilds/{}", guild_id)).await?;
        let channels: Vec<DiscordChannel> =
            self.get(&format!("/guilds/{}/channels", guild_id)).await?;

        // Thread listing needs extra permissions; known threads are kept when it fails
        let threads = match self
            .get::<ActiveThreads>(&format!("/guilds/{}/threads/active", guild_id))
            .await
        {
            Ok(active) => Some(active.threads),
            Err(e) => {
                warn!("Could not list active threads for guild {}: {:#}", guild_id, e);
                None
            }
        };

        let snapshot = build_snapshot(Some(guild.name), channels, threads);
        debug!(
            "Discord guild {}: {} categories, {} channels",
            guild_id,
            snapshot.categories.len(),
            snapshot.channels.len()
        );
        Ok(snapshot)
    }
}
