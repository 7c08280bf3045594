use anyhow::{Context, Result, anyhow};
use moka::sync::Cache;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use wreq::Client;
use wreq_util::Emulation;

use crate::actions::BotMessage;
use crate::config::ChatSection;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    sender: &'a str,
    message: &'a str,
}

/// Client for the NLU server's REST channel. Successful replies are kept
/// in a bounded cache keyed by the exact message text.
pub struct RasaClient {
    client: Client,
    webhook_url: Url,
    sender: String,
    cache: Cache<String, Vec<BotMessage>>,
}

impl RasaClient {
    pub fn new(chat: &ChatSection) -> Result<Self> {
        let client = Client::builder()
            .emulation(Emulation::Firefox136)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let webhook_url = Url::parse(&chat.webhook_url)
            .with_context(|| format!("Invalid chat.webhook_url: {}", chat.webhook_url))?;

        let sender = chat
            .sender
            .clone()
            .unwrap_or_else(|| format!("samarth-{}", uuid::Uuid::new_v4()));

        let cache = Cache::builder()
            .max_capacity(chat.cache_capacity)
            .time_to_live(Duration::from_secs(chat.cache_ttl_secs))
            .build();

        info!("Chat session {} using {}", sender, webhook_url);

        Ok(Self {
            client,
            webhook_url,
            sender,
            cache,
        })
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Replies for `message`, from the cache when the same text was sent
    /// within the TTL. Failures are returned and never cached.
    pub async fn send(&self, message: &str) -> Result<Vec<BotMessage>> {
        if let Some(replies) = self.cache.get(message) {
            debug!("Cache hit for message: {}", message);
            return Ok(replies);
        }

        let replies = self.post(message).await?;
        self.cache.insert(message.to_string(), replies.clone());
        Ok(replies)
    }

    async fn post(&self, message: &str) -> Result<Vec<BotMessage>> {
        let response = self
            .client
            .post(self.webhook_url.as_str())
            .json(&WebhookRequest {
                sender: &self.sender,
                message,
            })
            .send()
            .await
            .context("Chat backend request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("Chat backend returned HTTP {}", response.status()));
        }

        response
            .json::<Vec<BotMessage>>()
            .await
            .context("Chat backend returned an invalid reply")
    }
}
