//! Read-only navigation and search over the guild context store

use crate::error::{ContextError, ContextResult};
use crate::scoring::{matches_query, rank_results, relevance_score};
use crate::sources::MessageSearch;
use crate::store::SharedGuildContextStore;
use crate::types::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Messages of the current channel shown in a navigation context
const DISPLAY_MESSAGES: usize = 5;
/// Peer channels listed in the AI context block
const AI_PEER_CHANNELS: usize = 5;
/// Longest message excerpt rendered into the AI context block
const AI_MESSAGE_CHARS: usize = 200;

/// Stateless query layer; safe to share across tasks
pub struct ContextNavigator {
    store: SharedGuildContextStore,
    messages: Arc<dyn MessageSearch>,
}

pub type SharedContextNavigator = Arc<ContextNavigator>;

/// A channel selected for search together with the names results are decorated with
#[derive(Debug, Clone)]
struct SearchTarget {
    channel_id: String,
    channel_name: String,
    category_name: Option<String>,
}

impl ContextNavigator {
    pub fn new(store: SharedGuildContextStore, messages: Arc<dyn MessageSearch>) -> Self {
        Self { store, messages }
    }

    pub fn store(&self) -> &SharedGuildContextStore {
        &self.store
    }

    /// Where a channel sits in its guild. Absent if guild or channel is unknown.
    pub fn get_navigation_context(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Option<NavigationContext> {
        self.store
            .read_guild(guild_id, |guild| build_navigation(guild, channel_id))
            .flatten()
    }

    /// Substring search over recent messages, ranked by relevance.
    ///
    /// Collaborator failures propagate; an unknown guild yields no results.
    pub async fn search_guild(
        &self,
        guild_id: &str,
        query: &str,
        options: &SearchOptions,
    ) -> ContextResult<Vec<SearchResult>> {
        let query = query.trim();
        if query.is_empty() || options.limit == 0 {
            return Ok(Vec::new());
        }

        let Some(targets) = self
            .store
            .read_guild(guild_id, |guild| search_targets(guild, options))
        else {
            debug!("Search in unknown guild {}", guild_id);
            return Ok(Vec::new());
        };

        let fetch_limit = self
            .store
            .config()
            .max_messages_per_channel
            .max(options.limit);
        let author_id = options.author_id.as_deref();

        debug!(
            "Searching {} channels of guild {} for '{}'",
            targets.len(),
            guild_id,
            query
        );

        let fetches = targets.iter().map(|target| {
            self.messages
                .search_messages(guild_id, Some(&target.channel_id), author_id, fetch_limit)
        });
        let fetched = futures::future::join_all(fetches).await;

        let now = Utc::now();
        let mut results = Vec::new();
        for (target, messages) in targets.iter().zip(fetched) {
            let messages = messages.map_err(ContextError::Search)?;
            for message in messages {
                if !matches_query(&message, query) {
                    continue;
                }
                let relevance = relevance_score(&message, query, now);
                let permalink = message.permalink();
                results.push(SearchResult {
                    message,
                    channel_name: target.channel_name.clone(),
                    category_name: target.category_name.clone(),
                    permalink,
                    relevance,
                });
            }
        }

        rank_results(&mut results, options.limit);
        debug!("Search for '{}' returned {} results", query, results.len());
        Ok(results)
    }

    /// A user's recent messages decorated with channel/category names. Unranked.
    pub async fn find_user_messages(
        &self,
        guild_id: &str,
        user_id: &str,
        limit: usize,
    ) -> ContextResult<Vec<SearchResult>> {
        let messages = self
            .messages
            .get_user_messages(user_id, guild_id, limit)
            .await
            .map_err(ContextError::Search)?;

        let names: HashMap<String, (String, Option<String>)> = self
            .store
            .read_guild(guild_id, |guild| {
                guild
                    .channels
                    .values()
                    .map(|c| (c.id.clone(), channel_names(guild, c)))
                    .collect()
            })
            .unwrap_or_default();

        Ok(messages
            .into_iter()
            .map(|message| {
                let (channel_name, category_name) = names
                    .get(&message.channel_id)
                    .cloned()
                    .unwrap_or_else(|| (format!("unknown-{}", message.channel_id), None));
                let permalink = message.permalink();
                SearchResult {
                    message,
                    channel_name,
                    category_name,
                    permalink,
                    relevance: 1,
                }
            })
            .collect())
    }

    /// Navigation context rendered as a text block for an AI prompt. Empty if unknown.
    pub fn build_context_for_ai(&self, guild_id: &str, channel_id: &str) -> String {
        self.get_navigation_context(guild_id, channel_id)
            .map(|nav| render_navigation(&nav))
            .unwrap_or_default()
    }
}

fn channel_names(guild: &GuildContext, channel: &ChannelContext) -> (String, Option<String>) {
    let category_name = channel
        .category_id
        .as_deref()
        .and_then(|id| guild.category(id))
        .map(|cat| cat.name.clone());
    (channel.name.clone(), category_name)
}

/// Channels in hierarchy order (categories by position, then uncategorized), narrowed by options
fn search_targets(guild: &GuildContext, options: &SearchOptions) -> Vec<SearchTarget> {
    let categorized = guild
        .sorted_categories()
        .into_iter()
        .flat_map(|cat| guild.category_channels(&cat.id));
    let ordered = categorized.chain(guild.uncategorized_channels());

    ordered
        .filter(|c| {
            options
                .category_id
                .as_deref()
                .map_or(true, |id| c.category_id.as_deref() == Some(id))
        })
        .filter(|c| options.channel_id.as_deref().map_or(true, |id| c.id == id))
        .map(|c| {
            let (channel_name, category_name) = channel_names(guild, c);
            SearchTarget {
                channel_id: c.id.clone(),
                channel_name,
                category_name,
            }
        })
        .collect()
}

fn build_navigation(guild: &GuildContext, channel_id: &str) -> Option<NavigationContext> {
    let channel = guild.channel(channel_id)?;
    let category = channel
        .category_id
        .as_deref()
        .and_then(|id| guild.category(id));

    let siblings = match category {
        Some(cat) => guild.category_channels(&cat.id),
        None => guild.uncategorized_channels(),
    };
    let peer_channels = siblings
        .into_iter()
        .filter(|c| c.id != channel.id)
        .map(ChannelSummary::from)
        .collect();

    let parent_channel_name = if channel.is_thread {
        channel
            .parent_id
            .as_deref()
            .and_then(|id| guild.channel(id))
            .map(|parent| parent.name.clone())
    } else {
        None
    };

    let mut categories: Vec<CategoryOverview> = guild
        .sorted_categories()
        .into_iter()
        .map(|cat| CategoryOverview {
            id: Some(cat.id.clone()),
            name: cat.name.clone(),
            channel_count: cat.channel_ids.len(),
        })
        .collect();
    if !guild.uncategorized.is_empty() {
        categories.push(CategoryOverview {
            id: None,
            name: "Uncategorized".to_string(),
            channel_count: guild.uncategorized.len(),
        });
    }

    let skip = channel.recent_messages.len().saturating_sub(DISPLAY_MESSAGES);
    let recent_messages = channel.recent_messages.iter().skip(skip).cloned().collect();

    Some(NavigationContext {
        guild_id: guild.id.clone(),
        guild_name: guild.name.clone(),
        current_channel: ChannelSummary::from(channel),
        current_category_id: category.map(|c| c.id.clone()),
        current_category_name: category.map(|c| c.name.clone()),
        parent_channel_name,
        peer_channels,
        categories,
        recent_messages,
        total_channels: guild.channels.len(),
        total_users: guild.users.len(),
    })
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let text = text.trim().replace('\n', " ");
    if text.chars().count() <= max_chars {
        return text;
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

/// Fixed-layout text block describing a channel's surroundings
pub fn render_navigation(nav: &NavigationContext) -> String {
    let mut lines = vec![
        "## Current Location".to_string(),
        format!("Server: {}", nav.guild_name),
        format!(
            "Channel: #{} ({})",
            nav.current_channel.name,
            nav.current_channel.kind.as_str()
        ),
        format!(
            "Category: {}",
            nav.current_category_name.as_deref().unwrap_or("None")
        ),
    ];
    if let Some(parent) = &nav.parent_channel_name {
        lines.push(format!("Thread in: #{}", parent));
    }
    if let Some(topic) = nav.current_channel.topic.as_deref().filter(|t| !t.is_empty()) {
        lines.push(format!("Topic: {}", topic));
    }

    lines.push(String::new());
    lines.push("## Recent Messages".to_string());
    if nav.recent_messages.is_empty() {
        lines.push("No recent messages.".to_string());
    }
    for message in nav.recent_messages.iter().rev().take(DISPLAY_MESSAGES).rev() {
        lines.push(format!(
            "[{}] {}: {}",
            message.created_at.format("%Y-%m-%d"),
            message.author_username,
            excerpt(message.searchable_text(), AI_MESSAGE_CHARS)
        ));
    }

    lines.push(String::new());
    lines.push("## Nearby Channels".to_string());
    if nav.peer_channels.is_empty() {
        lines.push("None".to_string());
    }
    for peer in nav.peer_channels.iter().take(AI_PEER_CHANNELS) {
        lines.push(format!("- #{} ({} messages)", peer.name, peer.message_count));
    }

    lines.push(String::new());
    lines.push("## Server Overview".to_string());
    lines.push(format!(
        "Categories: {}",
        nav.categories.iter().filter(|c| c.id.is_some()).count()
    ));
    lines.push(format!("Channels: {}", nav.total_channels));
    lines.push(format!("Known users: {}", nav.total_users));

    lines.join("\n")
}
