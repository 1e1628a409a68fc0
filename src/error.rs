//! Error types for the context library

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("unknown guild: {0}")]
    UnknownGuild(String),

    #[error("unknown channel {channel_id} in guild {guild_id}")]
    UnknownChannel { guild_id: String, channel_id: String },

    #[error("message search failed: {0}")]
    Search(#[source] anyhow::Error),
}

pub type ContextResult<T> = Result<T, ContextError>;
