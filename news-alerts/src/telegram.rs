use std::time::Duration;

use async_trait::async_trait;
use interfaces::{CommandSource, InboundMessage, Notifier, SubscriberId};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::types::TelegramConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Telegram API error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// HTTP client for Bot API calls. Every call is bounded by the configured
/// request timeout; `getUpdates` overrides it per request for long polling.
pub fn build_bot_client(config: &TelegramConfig) -> reqwest::Result<Client> {
    Client::builder().timeout(config.request_timeout()).build()
}

/// Telegram Bot API client
#[derive(Clone)]
pub struct TelegramClient {
    client: Client,
    api_base: String,
    bot_token: String,
}

impl TelegramClient {
    pub fn new(client: Client, api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, TelegramError> {
        let status = response.status();
        let body: ApiResponse<T> = response.json().await?;

        match body.result {
            Some(result) if body.ok => Ok(result),
            _ => Err(TelegramError::Api(
                body.description
                    .unwrap_or_else(|| format!("request failed with status {status}")),
            )),
        }
    }

    /// The bot's own `@username`, used to recognise commands addressed to it.
    pub async fn bot_username(&self) -> Result<String, TelegramError> {
        let response = self.client.get(self.method_url("getMe")).send().await?;
        let me: User = Self::read_response(response).await?;
        me.username
            .ok_or_else(|| TelegramError::Api("getMe returned no username".to_string()))
    }

    /// Send an HTML-formatted text message to `chat_id`.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "HTML"
            }))
            .send()
            .await?;

        Self::read_response::<serde_json::Value>(response).await?;
        Ok(())
    }

    /// Long-poll for updates after `offset`. Returns `(update_id, message)`
    /// pairs; updates without a text message are returned with `None`.
    async fn get_updates(
        &self,
        offset: i64,
        long_poll: Duration,
    ) -> Result<Vec<(i64, Option<InboundMessage>)>, TelegramError> {
        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&[
                ("offset", offset.to_string()),
                ("timeout", long_poll.as_secs().to_string()),
            ])
            .timeout(long_poll + Duration::from_secs(10))
            .send()
            .await?;

        let updates: Vec<Update> = Self::read_response(response).await?;
        Ok(updates
            .into_iter()
            .map(|update| {
                let message = update.message.and_then(|message| {
                    message.text.map(|text| InboundMessage {
                        sender: SubscriberId(message.chat.id),
                        text,
                    })
                });
                (update.update_id, message)
            })
            .collect())
    }

    pub fn updates(&self, config: &TelegramConfig) -> TelegramUpdates {
        TelegramUpdates {
            client: self.clone(),
            offset: 0,
            long_poll: Duration::from_secs(config.long_poll_seconds),
        }
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, recipient: SubscriberId, text: &str) -> anyhow::Result<()> {
        self.send_message(recipient.0, text).await?;
        Ok(())
    }
}

/// Inbound side of the bot: a `getUpdates` cursor.
pub struct TelegramUpdates {
    client: TelegramClient,
    offset: i64,
    long_poll: Duration,
}

#[async_trait]
impl CommandSource for TelegramUpdates {
    async fn receive(&mut self) -> anyhow::Result<Vec<InboundMessage>> {
        let updates = self.client.get_updates(self.offset, self.long_poll).await?;

        let mut messages = Vec::with_capacity(updates.len());
        for (update_id, message) in updates {
            self.offset = self.offset.max(update_id + 1);
            match message {
                Some(message) => messages.push(message),
                None => debug!("Skipping non-text update {}", update_id),
            }
        }
        Ok(messages)
    }
}
