//! HTTP client for querying an external message-cache service
use crate::sources::MessageSearch;
use crate::types::MessageContext;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct MessageCacheClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<MessageContext>,
    #[serde(default)]
    pub count: usize,
}

impl MessageCacheClient {
    /// Create a new message cache client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn search_url(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        author_id: Option<&str>,
        limit: usize,
    ) -> String {
        let mut url = format!(
            "{}/guilds/{}/messages?limit={}",
            self.base_url,
            urlencoding::encode(guild_id),
            limit
        );
        if let Some(channel_id) = channel_id {
            url.push_str(&format!("&channel_id={}", urlencoding::encode(channel_id)));
        }
        if let Some(author_id) = author_id {
            url.push_str(&format!("&author_id={}", urlencoding::encode(author_id)));
        }
        url
    }

    async fn fetch(&self, url: &str) -> Result<Vec<MessageContext>> {
        debug!("Fetching messages from {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to call message cache")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Message cache error {}: {}", status, body);
        }

        let messages: MessagesResponse = response
            .json()
            .await
            .context("Failed to parse message cache response")?;
        debug!("Retrieved {} messages", messages.messages.len());

        Ok(messages.messages)
    }

    /// Health check
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);
        let response = self.client.get(&url).send().await?;
        Ok(response.status().is_success())
    }
}

#[async_trait]
impl MessageSearch for MessageCacheClient {
    async fn search_messages(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        author_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageContext>> {
        let url = self.search_url(guild_id, channel_id, author_id, limit);
        self.fetch(&url).await
    }

    async fn get_user_messages(
        &self,
        user_id: &str,
        guild_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageContext>> {
        let url = format!(
            "{}/guilds/{}/users/{}/messages?limit={}",
            self.base_url,
            urlencoding::encode(guild_id),
            urlencoding::encode(user_id),
            limit
        );
        self.fetch(&url).await
    }
}
