//! Core type definitions for guild context tracking

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

/// Default number of results returned by a guild search
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Retention tier of a cached message. Ordering follows aging: Hot < Warm < Cold.
#[derive(Debug, Clone, Copy, Default, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Hot,
    Warm,
    Cold,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    #[default]
    Text,
    Voice,
    Thread,
    Forum,
    Announcement,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Text => "text",
            ChannelKind::Voice => "voice",
            ChannelKind::Thread => "thread",
            ChannelKind::Forum => "forum",
            ChannelKind::Announcement => "announcement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub filename: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
}

/// A single message as seen by the context store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContext {
    pub id: String,
    pub guild_id: String,
    pub channel_id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    pub author_id: String,
    pub author_username: String,
    #[serde(default)]
    pub author_display_name: Option<String>,
    #[serde(default)]
    pub author_avatar_url: Option<String>,
    /// Verbatim text. Emptied once the message is compacted into `summary`.
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tier: Tier,
    #[serde(default)]
    pub summary: Option<String>,
}

impl MessageContext {
    /// Text used for matching and display: the content, or the summary once compacted.
    pub fn searchable_text(&self) -> &str {
        if self.content.is_empty() {
            self.summary.as_deref().unwrap_or("")
        } else {
            &self.content
        }
    }

    pub fn is_compacted(&self) -> bool {
        self.summary.is_some() && self.content.is_empty()
    }

    pub fn permalink(&self) -> String {
        permalink(&self.guild_id, &self.channel_id, &self.id)
    }
}

pub fn permalink(guild_id: &str, channel_id: &str, message_id: &str) -> String {
    format!(
        "https://discord.com/channels/{}/{}/{}",
        guild_id, channel_id, message_id
    )
}

/// A channel (text, voice, thread, ...) and its bounded message history
#[derive(Debug, Clone, Serialize)]
pub struct ChannelContext {
    pub id: String,
    pub guild_id: String,
    pub category_id: Option<String>,
    /// Parent channel for threads
    pub parent_id: Option<String>,
    pub name: String,
    pub kind: ChannelKind,
    pub topic: Option<String>,
    pub position: i64,
    pub is_thread: bool,
    pub thread_owner_id: Option<String>,
    /// Oldest first. Never longer than `max_messages_per_channel`.
    pub recent_messages: VecDeque<MessageContext>,
    /// Total messages observed, unaffected by eviction
    pub message_count: u64,
    /// Created from an incoming message before any poll described it
    pub placeholder: bool,
    /// `GuildContext::poll_generation` when the store first saw this channel
    #[serde(skip)]
    pub seen_generation: u64,
}

impl ChannelContext {
    pub fn from_snapshot(guild_id: &str, snapshot: &ChannelSnapshot) -> Self {
        let mut channel = Self::placeholder(guild_id, &snapshot.id);
        channel.apply_snapshot(snapshot);
        channel
    }

    /// Minimal entry for a channel only known through an incoming message
    pub fn placeholder(guild_id: &str, channel_id: &str) -> Self {
        Self {
            id: channel_id.to_string(),
            guild_id: guild_id.to_string(),
            category_id: None,
            parent_id: None,
            name: format!("unknown-{}", channel_id),
            kind: ChannelKind::Text,
            topic: None,
            position: i64::MAX,
            is_thread: false,
            thread_owner_id: None,
            recent_messages: VecDeque::new(),
            message_count: 0,
            placeholder: true,
            seen_generation: 0,
        }
    }

    /// Update metadata in place. History and counters are left untouched.
    pub fn apply_snapshot(&mut self, snapshot: &ChannelSnapshot) {
        self.name = snapshot.name.clone();
        self.kind = snapshot.kind;
        self.category_id = snapshot.category_id.clone();
        self.parent_id = snapshot.parent_id.clone();
        self.topic = snapshot.topic.clone();
        self.position = snapshot.position;
        self.is_thread = snapshot.kind == ChannelKind::Thread;
        self.thread_owner_id = snapshot.thread_owner_id.clone();
        self.placeholder = false;
    }

    /// Append to the ring buffer, returning the evicted message if the cap was hit
    pub(crate) fn push_message(
        &mut self,
        message: MessageContext,
        capacity: usize,
    ) -> Option<MessageContext> {
        self.recent_messages.push_back(message);
        self.message_count += 1;
        if self.recent_messages.len() > capacity {
            self.recent_messages.pop_front()
        } else {
            None
        }
    }

    pub fn tier_count(&self, tier: Tier) -> usize {
        self.recent_messages.iter().filter(|m| m.tier == tier).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryContext {
    pub id: String,
    pub guild_id: String,
    pub name: String,
    pub position: i64,
    /// Member channels, ordered by position. Derived from `ChannelContext::category_id`.
    pub channel_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserContext {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub interaction_count: u64,
    pub last_seen: DateTime<Utc>,
}

/// Root aggregate for one guild.
///
/// `channels` is the authoritative channel arena (every channel, categorized or
/// not). Category membership and the uncategorized list are secondary indexes
/// rebuilt from it after every structural change.
#[derive(Debug, Clone, Serialize)]
pub struct GuildContext {
    pub id: String,
    pub name: String,
    pub categories: HashMap<String, CategoryContext>,
    pub channels: HashMap<String, ChannelContext>,
    pub uncategorized: Vec<String>,
    pub users: HashMap<String, UserContext>,
    pub last_polled: DateTime<Utc>,
    pub is_polling: bool,
    /// Number of polls started for this guild
    #[serde(skip)]
    pub poll_generation: u64,
}

impl GuildContext {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            categories: HashMap::new(),
            channels: HashMap::new(),
            uncategorized: Vec::new(),
            users: HashMap::new(),
            last_polled: DateTime::<Utc>::UNIX_EPOCH,
            is_polling: false,
            poll_generation: 0,
        }
    }

    pub fn channel(&self, channel_id: &str) -> Option<&ChannelContext> {
        self.channels.get(channel_id)
    }

    pub fn category(&self, category_id: &str) -> Option<&CategoryContext> {
        self.categories.get(category_id)
    }

    /// Channels of one category in position order. Empty for an unknown category.
    pub fn category_channels(&self, category_id: &str) -> Vec<&ChannelContext> {
        self.categories
            .get(category_id)
            .map(|cat| self.resolve(&cat.channel_ids))
            .unwrap_or_default()
    }

    pub fn uncategorized_channels(&self) -> Vec<&ChannelContext> {
        self.resolve(&self.uncategorized)
    }

    /// Categories in position order
    pub fn sorted_categories(&self) -> Vec<&CategoryContext> {
        let mut cats: Vec<&CategoryContext> = self.categories.values().collect();
        cats.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.name.cmp(&b.name))
                .then_with(|| a.id.cmp(&b.id))
        });
        cats
    }

    pub fn has_been_polled(&self) -> bool {
        self.last_polled > DateTime::<Utc>::UNIX_EPOCH
    }

    fn resolve(&self, ids: &[String]) -> Vec<&ChannelContext> {
        ids.iter().filter_map(|id| self.channels.get(id)).collect()
    }

    /// Recompute category membership and the uncategorized list from the channel arena.
    /// Channels pointing at a category that no longer exists become uncategorized.
    pub(crate) fn rebuild_membership(&mut self) {
        for cat in self.categories.values_mut() {
            cat.channel_ids.clear();
        }
        self.uncategorized.clear();

        let mut ordered: Vec<(i64, String, String)> = self
            .channels
            .values()
            .map(|c| (c.position, c.name.clone(), c.id.clone()))
            .collect();
        ordered.sort();

        for (_, _, channel_id) in ordered {
            let Some(channel) = self.channels.get_mut(&channel_id) else {
                continue;
            };
            let category = channel
                .category_id
                .as_ref()
                .and_then(|cat_id| self.categories.get_mut(cat_id));
            match category {
                Some(cat) => cat.channel_ids.push(channel_id),
                None => {
                    channel.category_id = None;
                    self.uncategorized.push(channel_id);
                }
            }
        }
    }
}

/// How much of a guild's thread list a snapshot carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadListing {
    /// Every thread of the guild is in `channels`
    #[default]
    Complete,
    /// Only active threads are listed. Archived threads are absent.
    ActiveOnly,
    /// The thread listing could not be fetched. No thread is listed.
    Unavailable,
}

/// Guild structure as reported by the hosting platform
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildSnapshot {
    #[serde(default)]
    pub guild_name: Option<String>,
    #[serde(default)]
    pub categories: Vec<CategorySnapshot>,
    #[serde(default)]
    pub channels: Vec<ChannelSnapshot>,
    #[serde(default)]
    pub threads: ThreadListing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub position: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub kind: ChannelKind,
    #[serde(default)]
    pub category_id: Option<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub thread_owner_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChannelSummary {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub topic: Option<String>,
    pub message_count: u64,
}

impl From<&ChannelContext> for ChannelSummary {
    fn from(channel: &ChannelContext) -> Self {
        Self {
            id: channel.id.clone(),
            name: channel.name.clone(),
            kind: channel.kind,
            topic: channel.topic.clone(),
            message_count: channel.message_count,
        }
    }
}

/// One line of the guild-wide category summary. `id` is None for "Uncategorized".
#[derive(Debug, Clone, Serialize)]
pub struct CategoryOverview {
    pub id: Option<String>,
    pub name: String,
    pub channel_count: usize,
}

/// "Where am I" answer for one channel
#[derive(Debug, Clone, Serialize)]
pub struct NavigationContext {
    pub guild_id: String,
    pub guild_name: String,
    pub current_channel: ChannelSummary,
    pub current_category_id: Option<String>,
    pub current_category_name: Option<String>,
    pub parent_channel_name: Option<String>,
    pub peer_channels: Vec<ChannelSummary>,
    pub categories: Vec<CategoryOverview>,
    /// Most recent messages of the current channel, oldest first
    pub recent_messages: Vec<MessageContext>,
    pub total_channels: usize,
    pub total_users: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub channel_id: Option<String>,
    pub category_id: Option<String>,
    pub author_id: Option<String>,
    pub limit: usize,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            channel_id: None,
            category_id: None,
            author_id: None,
            limit: DEFAULT_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub message: MessageContext,
    pub channel_name: String,
    pub category_name: Option<String>,
    pub permalink: String,
    pub relevance: u32,
}
