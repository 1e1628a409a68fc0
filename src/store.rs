//! GuildContextStore: per-guild channel hierarchy and recent message history

use crate::config::ContextManagerConfig;
use crate::sources::{ChannelSource, ExcerptSummarizer, Summarizer};
use crate::tiering::{age_channel, compact_channel, enforce_hot_cap, TierReport};
use crate::types::*;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one `poll_guild` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PollOutcome {
    Completed { categories: usize, channels: usize },
    /// Another poll of the same guild was still running
    Skipped,
    /// The platform fetch failed; the previous snapshot was kept
    Failed { error: String },
}

struct GuildSlot {
    context: RwLock<GuildContext>,
    polling: AtomicBool,
}

impl GuildSlot {
    fn new(context: GuildContext) -> Self {
        Self {
            context: RwLock::new(context),
            polling: AtomicBool::new(false),
        }
    }
}

/// Holds a guild's poll flag; releases it on every exit path, including a dropped future
struct PollGuard<'a> {
    slot: &'a GuildSlot,
    generation: u64,
}

impl<'a> PollGuard<'a> {
    fn acquire(slot: &'a GuildSlot) -> Option<Self> {
        slot.polling
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        let mut guild = slot.context.write();
        guild.is_polling = true;
        guild.poll_generation += 1;
        Some(Self {
            slot,
            generation: guild.poll_generation,
        })
    }
}

impl Drop for PollGuard<'_> {
    fn drop(&mut self) {
        self.slot.context.write().is_polling = false;
        self.slot.polling.store(false, Ordering::SeqCst);
    }
}

/// In-process cache of guild structure and activity (thread-safe via Arc)
pub struct GuildContextStore {
    config: ContextManagerConfig,
    source: Arc<dyn ChannelSource>,
    summarizer: Arc<dyn Summarizer>,
    guilds: RwLock<HashMap<String, Arc<GuildSlot>>>,
}

pub type SharedGuildContextStore = Arc<GuildContextStore>;

impl GuildContextStore {
    /// Create a store that polls `source` and compacts cold messages with the excerpt summarizer
    pub fn new(
        config: ContextManagerConfig,
        source: Arc<dyn ChannelSource>,
    ) -> SharedGuildContextStore {
        Self::with_summarizer(config, source, Arc::new(ExcerptSummarizer::default()))
    }

    pub fn with_summarizer(
        config: ContextManagerConfig,
        source: Arc<dyn ChannelSource>,
        summarizer: Arc<dyn Summarizer>,
    ) -> SharedGuildContextStore {
        let store = Self {
            config,
            source,
            summarizer,
            guilds: RwLock::new(HashMap::new()),
        };
        for guild_id in &store.config.guild_ids {
            store.ensure_slot(guild_id, guild_id);
        }
        Arc::new(store)
    }

    pub fn config(&self) -> &ContextManagerConfig {
        &self.config
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Snapshot of a guild's context. Never triggers a fetch.
    pub fn get_guild_context(&self, guild_id: &str) -> Option<GuildContext> {
        self.read_guild(guild_id, GuildContext::clone)
    }

    /// Run `f` against a guild's context under a read lock
    pub fn read_guild<R>(&self, guild_id: &str, f: impl FnOnce(&GuildContext) -> R) -> Option<R> {
        let slot = self.slot(guild_id)?;
        let guild = slot.context.read();
        Some(f(&guild))
    }

    /// Existing context, or a new empty one registered under `guild_id`
    pub fn ensure_guild_context(&self, guild_id: &str, guild_name: &str) -> GuildContext {
        let slot = self.ensure_slot(guild_id, guild_name);
        let mut guild = slot.context.write();
        // Contexts created by ingestion or polling carry the id as a stand-in name
        if guild.name == guild.id && guild_name != guild_id {
            guild.name = guild_name.to_string();
        }
        guild.clone()
    }

    pub fn guild_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.guilds.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Drop a guild's whole context. Returns false if it was not tracked.
    pub fn evict_guild(&self, guild_id: &str) -> bool {
        let removed = self.guilds.write().remove(guild_id).is_some();
        if removed {
            info!("Evicted guild context {}", guild_id);
        }
        removed
    }

    fn slot(&self, guild_id: &str) -> Option<Arc<GuildSlot>> {
        self.guilds.read().get(guild_id).cloned()
    }

    fn ensure_slot(&self, guild_id: &str, guild_name: &str) -> Arc<GuildSlot> {
        if let Some(slot) = self.slot(guild_id) {
            return slot;
        }
        self.guilds
            .write()
            .entry(guild_id.to_string())
            .or_insert_with(|| {
                info!("Tracking guild {} ({})", guild_id, guild_name);
                Arc::new(GuildSlot::new(GuildContext::new(guild_id, guild_name)))
            })
            .clone()
    }

    /// Refresh a guild's categories and channels from the platform.
    ///
    /// Concurrent calls for the same guild are skipped, not queued. A failed fetch
    /// leaves the previous snapshot untouched. Channels that appear through
    /// `record_message` while the fetch is in flight survive reconciliation.
    pub async fn poll_guild(&self, guild_id: &str) -> PollOutcome {
        let Some(slot) = self.slot(guild_id) else {
            return self.poll_untracked(guild_id).await;
        };
        let Some(guard) = PollGuard::acquire(&slot) else {
            debug!("Poll already in progress for guild {}, skipping", guild_id);
            return PollOutcome::Skipped;
        };

        let start = Instant::now();
        debug!("Polling guild {} via {}", guild_id, self.source.name());

        match self.source.fetch_guild(guild_id).await {
            Ok(snapshot) => self.apply_poll(guild_id, &guard, snapshot, start),
            Err(e) => poll_failed(guild_id, e),
        }
    }

    /// First poll of a guild nothing has registered yet. The guild is only
    /// tracked once the platform knows it.
    async fn poll_untracked(&self, guild_id: &str) -> PollOutcome {
        let start = Instant::now();
        debug!("Polling untracked guild {} via {}", guild_id, self.source.name());

        let snapshot = match self.source.fetch_guild(guild_id).await {
            Ok(snapshot) => snapshot,
            Err(e) => return poll_failed(guild_id, e),
        };

        let slot = self.ensure_slot(guild_id, guild_id);
        let Some(mut guard) = PollGuard::acquire(&slot) else {
            debug!("Poll already in progress for guild {}, skipping", guild_id);
            return PollOutcome::Skipped;
        };
        // The slot did not exist when the fetch started, so every channel in it arrived since
        guard.generation = 0;
        self.apply_poll(guild_id, &guard, snapshot, start)
    }

    fn apply_poll(
        &self,
        guild_id: &str,
        guard: &PollGuard<'_>,
        snapshot: GuildSnapshot,
        start: Instant,
    ) -> PollOutcome {
        // The write lock must be released before the guard drops
        let (categories, channels, stats) = {
            let mut guild = guard.slot.context.write();
            let stats = reconcile(&mut guild, snapshot, guard.generation);
            guild.last_polled = Utc::now();
            (guild.categories.len(), guild.channels.len(), stats)
        };

        info!(
            "Polled guild {}: {} categories, {} channels (+{} -{} ~{}) in {}ms",
            guild_id,
            categories,
            channels,
            stats.added,
            stats.removed,
            stats.renamed,
            start.elapsed().as_millis()
        );

        PollOutcome::Completed {
            categories,
            channels,
        }
    }

    /// Append an incoming message to its channel's history. Never fails: unknown
    /// guilds and channels get placeholder entries that the next poll fills in.
    pub fn record_message(&self, mut message: MessageContext) {
        message.tier = Tier::Hot;
        message.summary = None;

        let slot = self.ensure_slot(&message.guild_id, &message.guild_id);
        let mut guard = slot.context.write();
        let guild = &mut *guard;

        let user = guild
            .users
            .entry(message.author_id.clone())
            .or_insert_with(|| UserContext {
                id: message.author_id.clone(),
                username: message.author_username.clone(),
                display_name: None,
                avatar_url: None,
                interaction_count: 0,
                last_seen: message.created_at,
            });
        user.username = message.author_username.clone();
        if message.author_display_name.is_some() {
            user.display_name = message.author_display_name.clone();
        }
        if message.author_avatar_url.is_some() {
            user.avatar_url = message.author_avatar_url.clone();
        }
        user.interaction_count += 1;
        user.last_seen = user.last_seen.max(message.created_at);

        let channel_created = !guild.channels.contains_key(&message.channel_id);
        let generation = guild.poll_generation;
        let channel = guild
            .channels
            .entry(message.channel_id.clone())
            .or_insert_with(|| {
                debug!(
                    "Message for unseen channel {} in guild {}, adding placeholder",
                    message.channel_id, message.guild_id
                );
                let mut channel = ChannelContext::placeholder(&message.guild_id, &message.channel_id);
                if message.thread_id.as_deref() == Some(message.channel_id.as_str()) {
                    channel.kind = ChannelKind::Thread;
                    channel.is_thread = true;
                }
                channel.seen_generation = generation;
                channel
            });

        channel.push_message(message, self.config.max_messages_per_channel);
        enforce_hot_cap(channel, self.config.max_hot_messages);

        if channel_created {
            guild.rebuild_membership();
        }
    }

    pub fn run_tier_maintenance(&self, guild_id: &str) -> Option<TierReport> {
        self.run_tier_maintenance_at(guild_id, Utc::now())
    }

    /// Age every message of a guild against `now` and compact the cold tail
    pub fn run_tier_maintenance_at(
        &self,
        guild_id: &str,
        now: DateTime<Utc>,
    ) -> Option<TierReport> {
        let slot = self.slot(guild_id)?;
        let mut guild = slot.context.write();

        let mut report = TierReport::default();
        for channel in guild.channels.values_mut() {
            report.merge(age_channel(channel, now, &self.config));
            report.summarized += compact_channel(channel, &self.config, self.summarizer.as_ref());
        }

        if !report.is_empty() {
            debug!(
                "Tier maintenance for guild {}: {} warmed, {} cooled, {} summarized",
                guild_id, report.warmed, report.cooled, report.summarized
            );
        }
        Some(report)
    }
}

fn poll_failed(guild_id: &str, e: anyhow::Error) -> PollOutcome {
    warn!(
        "Poll of guild {} failed: {:#}. Keeping previous snapshot.",
        guild_id, e
    );
    PollOutcome::Failed {
        error: format!("{:#}", e),
    }
}

#[derive(Debug, Default)]
struct ReconcileStats {
    added: usize,
    removed: usize,
    renamed: usize,
}

/// Whether a channel the snapshot does not list should stay.
///
/// Placeholders seen since `generation` arrived after the snapshot was taken.
/// Threads stay when the snapshot's thread list cannot speak for them.
fn survives_absence(
    channel: &ChannelContext,
    snapshot: &GuildSnapshot,
    live_channels: &HashSet<&str>,
    generation: u64,
) -> bool {
    if channel.placeholder && channel.seen_generation >= generation {
        return true;
    }
    if !channel.is_thread {
        return false;
    }
    match snapshot.threads {
        ThreadListing::Complete => false,
        ThreadListing::Unavailable => true,
        ThreadListing::ActiveOnly => channel
            .parent_id
            .as_deref()
            .map_or(false, |parent| live_channels.contains(parent)),
    }
}

/// Bring a guild's structure in line with a platform snapshot, keeping history of surviving channels
fn reconcile(guild: &mut GuildContext, snapshot: GuildSnapshot, generation: u64) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    let guild_id = guild.id.clone();

    if let Some(name) = &snapshot.guild_name {
        guild.name = name.clone();
    }

    let live_categories: HashSet<&str> = snapshot.categories.iter().map(|c| c.id.as_str()).collect();
    guild
        .categories
        .retain(|id, _| live_categories.contains(id.as_str()));
    for cat in &snapshot.categories {
        guild
            .categories
            .entry(cat.id.clone())
            .and_modify(|existing| {
                existing.name = cat.name.clone();
                existing.position = cat.position;
            })
            .or_insert_with(|| CategoryContext {
                id: cat.id.clone(),
                guild_id: guild_id.clone(),
                name: cat.name.clone(),
                position: cat.position,
                channel_ids: vec![],
            });
    }

    let live_channels: HashSet<&str> = snapshot.channels.iter().map(|c| c.id.as_str()).collect();
    let before = guild.channels.len();
    guild.channels.retain(|id, channel| {
        live_channels.contains(id.as_str())
            || survives_absence(channel, &snapshot, &live_channels, generation)
    });
    stats.removed = before - guild.channels.len();

    for snap in &snapshot.channels {
        match guild.channels.get_mut(&snap.id) {
            Some(existing) => {
                if existing.name != snap.name {
                    debug!("Channel {} renamed {} -> {}", snap.id, existing.name, snap.name);
                    stats.renamed += 1;
                }
                existing.apply_snapshot(snap);
            }
            None => {
                guild
                    .channels
                    .insert(snap.id.clone(), ChannelContext::from_snapshot(&guild_id, snap));
                stats.added += 1;
            }
        }
    }

    guild.rebuild_membership();
    stats
}
