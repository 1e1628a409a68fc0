//! Collaborator traits the store and navigator depend on, plus in-process implementations

use crate::store::GuildContextStore;
use crate::types::*;
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Hosting-platform accessor used by the poll cycle
#[async_trait]
pub trait ChannelSource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Current categories and channels of a guild
    async fn fetch_guild(&self, guild_id: &str) -> Result<GuildSnapshot>;
}

/// Message cache queried by guild search
#[async_trait]
pub trait MessageSearch: Send + Sync {
    /// Messages of a guild, optionally narrowed to one channel and/or author, newest first
    async fn search_messages(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        author_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageContext>>;

    /// A user's messages in a guild, newest first
    async fn get_user_messages(
        &self,
        user_id: &str,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageContext>>;
}

/// Produces the summary kept for a cold message once its content is dropped
pub trait Summarizer: Send + Sync {
    fn summarize(&self, message: &MessageContext) -> String;
}

/// Channel source serving fixed snapshots. Used in tests and when no platform
/// credentials are configured.
#[derive(Default)]
pub struct StaticChannelSource {
    snapshots: RwLock<HashMap<String, GuildSnapshot>>,
}

impl StaticChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_guild(&self, guild_id: impl Into<String>, snapshot: GuildSnapshot) {
        self.snapshots.write().insert(guild_id.into(), snapshot);
    }

    pub fn remove_guild(&self, guild_id: &str) {
        self.snapshots.write().remove(guild_id);
    }
}

#[async_trait]
impl ChannelSource for StaticChannelSource {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn fetch_guild(&self, guild_id: &str) -> Result<GuildSnapshot> {
        match self.snapshots.read().get(guild_id) {
            Some(snapshot) => Ok(snapshot.clone()),
            None => anyhow::bail!("No snapshot registered for guild {}", guild_id),
        }
    }
}

/// Message search over the store's own ring buffers
pub struct StoreMessageIndex {
    store: Arc<GuildContextStore>,
}

impl StoreMessageIndex {
    pub fn new(store: Arc<GuildContextStore>) -> Self {
        Self { store }
    }

    fn collect(
        &self,
        guild_id: &str,
        limit: usize,
        channel_id: Option<&str>,
        author_id: Option<&str>,
    ) -> Vec<MessageContext> {
        self.store
            .read_guild(guild_id, |guild| {
                let mut messages: Vec<MessageContext> = guild
                    .channels
                    .values()
                    .filter(|c| channel_id.map_or(true, |id| c.id == id))
                    .flat_map(|c| c.recent_messages.iter())
                    .filter(|m| author_id.map_or(true, |id| m.author_id == id))
                    .cloned()
                    .collect();
                messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
                messages.truncate(limit);
                messages
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageSearch for StoreMessageIndex {
    async fn search_messages(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        author_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageContext>> {
        Ok(self.collect(guild_id, limit, channel_id, author_id))
    }

    async fn get_user_messages(
        &self,
        user_id: &str,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageContext>> {
        Ok(self.collect(guild_id, limit, None, Some(user_id)))
    }
}

/// Keeps the author and the first `max_chars` characters of the message
pub struct ExcerptSummarizer {
    pub max_chars: usize,
}

impl Default for ExcerptSummarizer {
    fn default() -> Self {
        Self { max_chars: 120 }
    }
}

impl Summarizer for ExcerptSummarizer {
    fn summarize(&self, message: &MessageContext) -> String {
        let text = message.searchable_text().trim();
        let mut excerpt: String = text.chars().take(self.max_chars).collect();
        if text.chars().count() > self.max_chars {
            excerpt.push('…');
        }

        let mut summary = format!("{}: {}", message.author_username, excerpt);
        match message.attachments.len() {
            0 => {}
            1 => summary.push_str(" [1 attachment]"),
            n => summary.push_str(&format!(" [{} attachments]", n)),
        }
        summary
    }
}
