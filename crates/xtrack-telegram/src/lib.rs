//! Telegram notification channel (teloxide).
//!
//! Sends each notice as one HTML message to a fixed chat.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatId, ParseMode},
};

use tokio::time::sleep;

use xtrack_core::{
    errors::Error,
    formatting::render_html,
    notify::{ChangeNotice, NotificationChannel},
    Result,
};

const CHANNEL_NAME: &str = "telegram";

#[derive(Clone)]
pub struct TelegramChannel {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChannel {
    pub fn new(token: &str, chat_id: i64, timeout: Duration) -> Result<Self> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("telegram client build error: {e}")))?;
        Ok(Self::with_bot(Bot::with_client(token, client), chat_id))
    }

    pub fn with_bot(bot: Bot, chat_id: i64) -> Self {
        Self {
            bot,
            chat_id: ChatId(chat_id),
        }
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::notification(CHANNEL_NAME, e.to_string())
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        tracing::warn!(retry_after = ?d, "telegram flood control; retrying once");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, notice: &ChangeNotice) -> Result<()> {
        let html = render_html(notice);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(self.chat_id, html.clone())
                    .parse_mode(ParseMode::Html)
            })
            .await?;

        tracing::debug!(chat_id = self.chat_id.0, message_id = msg.id.0, "telegram message delivered");
        Ok(())
    }
}
