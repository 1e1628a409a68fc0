//! fumble-context - Guild Context Store
//!
//! Keeps an in-memory picture of each guild a bot serves:
//! - Channel/category hierarchy refreshed by a periodic poll
//! - Bounded per-channel message history with hot/warm/cold retention
//! - Navigation ("where am I"), ranked search and AI prompt context on top

pub mod types;
pub mod config;
pub mod error;
pub mod sources;
pub mod store;
pub mod tiering;
pub mod scoring;
pub mod navigator;
pub mod poller;
pub mod discord_source;
pub mod message_cache_client;
pub mod server;

pub use types::*;
pub use config::{ContextManagerConfig, ServiceConfig};
pub use error::{ContextError, ContextResult};
pub use sources::{ChannelSource, MessageSearch, Summarizer, StaticChannelSource, StoreMessageIndex, ExcerptSummarizer};
pub use store::{GuildContextStore, SharedGuildContextStore, PollOutcome};
pub use tiering::TierReport;
pub use navigator::{ContextNavigator, SharedContextNavigator};
pub use discord_source::DiscordChannelSource;
pub use message_cache_client::MessageCacheClient;
