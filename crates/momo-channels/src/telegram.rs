//! Telegram Bot channel: long polling + message sending via Bot API.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};

use momo_core::config::BotConfig;
use momo_core::error::{MomoError, Result};
use momo_core::{DeliveryOutcome, Messenger, UserId};

/// Error descriptions meaning the chat is gone for good.
const PERMANENT_MARKERS: &[&str] = &[
    "bot was blocked",
    "bot was kicked",
    "user is deactivated",
    "chat not found",
];

/// Text message received from a private chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub user: UserId,
    pub chat_id: i64,
    pub sender_name: Option<String>,
    pub text: String,
}

/// Telegram Bot channel with polling loop.
#[derive(Clone)]
pub struct TelegramChannel {
    bot_token: String,
    client: reqwest::Client,
    poll_interval: u64,
    send_timeout: Duration,
    last_update_id: i64,
}

impl TelegramChannel {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            client: reqwest::Client::new(),
            poll_interval: config.poll_interval,
            send_timeout: Duration::from_secs(config.send_timeout_secs),
            last_update_id: 0,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("https://api.telegram.org/bot{}/{}", self.bot_token, method)
    }

    /// Get updates using long polling.
    pub async fn get_updates(&mut self) -> Result<Vec<TelegramUpdate>> {
        let response = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&[
                ("offset", (self.last_update_id + 1).to_string()),
                ("timeout", "30".into()),
                ("allowed_updates", "[\"message\"]".into()),
            ])
            .timeout(Duration::from_secs(40))
            .send()
            .await
            .map_err(|e| MomoError::Channel(format!("Telegram getUpdates failed: {e}")))?;

        let body: TelegramApiResponse<Vec<TelegramUpdate>> = response
            .json()
            .await
            .map_err(|e| MomoError::Channel(format!("Invalid Telegram response: {e}")))?;

        if !body.ok {
            return Err(MomoError::Channel(format!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            )));
        }

        let updates = body.result.unwrap_or_default();
        if let Some(last) = updates.last() {
            self.last_update_id = last.update_id;
        }
        Ok(updates)
    }

    /// Send a Markdown text message and classify the result.
    pub async fn send_message(&self, chat_id: i64, text: &str) -> DeliveryOutcome {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });

        let response = match self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .timeout(self.send_timeout)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return DeliveryOutcome::TransientFailure(format!("sendMessage failed: {e}")),
        };

        let status = response.status();
        let result: TelegramApiResponse<serde_json::Value> = match response.json().await {
            Ok(r) => r,
            Err(e) => {
                return DeliveryOutcome::TransientFailure(format!(
                    "Invalid send response (HTTP {status}): {e}"
                ));
            }
        };

        if result.ok {
            return DeliveryOutcome::Delivered;
        }
        let code = result.error_code.unwrap_or(i64::from(status.as_u16()));
        classify_failure(code, &result.description.unwrap_or_default())
    }

    /// Reply to an interactive command. Any failure is an error for the caller.
    pub async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text).await.into_result()
    }

    /// Get bot info.
    pub async fn get_me(&self) -> Result<TelegramUser> {
        let response = self
            .client
            .get(self.api_url("getMe"))
            .timeout(self.send_timeout)
            .send()
            .await
            .map_err(|e| MomoError::Channel(format!("getMe failed: {e}")))?;
        let body: TelegramApiResponse<TelegramUser> = response
            .json()
            .await
            .map_err(|e| MomoError::Channel(format!("Invalid getMe response: {e}")))?;
        body.result
            .ok_or_else(|| MomoError::Channel(body.description.unwrap_or_else(|| "No bot info".into())))
    }

    /// Start polling loop; returns a stream of incoming messages.
    pub fn start_polling(self) -> TelegramPollingStream {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut channel = self;
            tracing::info!("📡 Telegram polling loop started");

            loop {
                match channel.get_updates().await {
                    Ok(updates) => {
                        for update in updates {
                            if let Some(msg) = update.to_incoming()
                                && tx.send(msg).is_err()
                            {
                                tracing::info!("Telegram polling stopped (receiver dropped)");
                                return;
                            }
                        }
                    }
                    Err(e) => {
                        tracing::error!("❌ Telegram polling error: {e}");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }

                tokio::time::sleep(Duration::from_secs(channel.poll_interval)).await;
            }
        });

        TelegramPollingStream { rx }
    }
}

/// Map a Bot API error to the delivery tri-state.
pub fn classify_failure(code: i64, description: &str) -> DeliveryOutcome {
    let lower = description.to_lowercase();
    if code == 403 || PERMANENT_MARKERS.iter().any(|m| lower.contains(m)) {
        DeliveryOutcome::PermanentFailure(format!("{code}: {description}"))
    } else {
        DeliveryOutcome::TransientFailure(format!("{code}: {description}"))
    }
}

/// Stream of incoming Telegram messages from polling.
pub struct TelegramPollingStream {
    rx: tokio::sync::mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Stream for TelegramPollingStream {
    type Item = IncomingMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[async_trait]
impl Messenger for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    /// Users talk to the bot in private chats, so the user id is the chat id.
    async fn send(&self, user: &UserId, text: &str) -> DeliveryOutcome {
        match user.as_str().parse::<i64>() {
            Ok(chat_id) => self.send_message(chat_id, text).await,
            Err(_) => DeliveryOutcome::PermanentFailure(format!("'{user}' is not a Telegram chat id")),
        }
    }
}

// --- Telegram API Types ---

#[derive(Debug, Deserialize)]
pub struct TelegramApiResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
    pub error_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    pub text: Option<String>,
    pub date: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl TelegramUpdate {
    /// Text messages from humans in private chats; everything else is dropped.
    pub fn to_incoming(&self) -> Option<IncomingMessage> {
        let msg = self.message.as_ref()?;
        let text = msg.text.as_ref()?;
        let from = msg.from.as_ref()?;

        if from.is_bot || msg.chat.chat_type != "private" {
            return None;
        }

        Some(IncomingMessage {
            user: UserId::from(from.id),
            chat_id: msg.chat.id,
            sender_name: Some(format!(
                "{}{}",
                from.first_name,
                from.last_name
                    .as_deref()
                    .map(|l| format!(" {l}"))
                    .unwrap_or_default()
            )),
            text: text.clone(),
        })
    }
}
