//! Discord webhook notification channel.
//!
//! One embed per notice: green for follows, red for unfollows, one inline
//! field per listed account.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use xtrack_core::{
    errors::Error,
    notify::{ChangeNotice, Direction, NotificationChannel},
    Result,
};

const CHANNEL_NAME: &str = "discord";
const WEBHOOK_USERNAME: &str = "X Follow Tracker";
const FOOTER: &str = "xtrack";
const FOLLOW_COLOR: u32 = 0x00ff00;
const UNFOLLOW_COLOR: u32 = 0xff0000;

#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub username: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub timestamp: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// Build the webhook body for one notice.
pub fn build_payload(notice: &ChangeNotice) -> WebhookPayload {
    let (color, field_prefix) = match notice.direction {
        Direction::Follow => (FOLLOW_COLOR, "New Follow"),
        Direction::Unfollow => (UNFOLLOW_COLOR, "Unfollow"),
    };

    let mut description = notice.summary();
    // Discord caps embeds at 25 fields, so overflow goes in the description.
    if let Some(more) = notice.overflow_line() {
        description.push('\n');
        description.push_str(&more);
    }

    let fields = notice
        .entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let display_name = entry
                .profile
                .as_ref()
                .map(|p| p.display_name.as_str())
                .filter(|n| !n.is_empty());
            EmbedField {
                name: match display_name {
                    Some(n) => format!("{field_prefix} {}: {n}", i + 1),
                    None => format!("{field_prefix} {}", i + 1),
                },
                value: entry.label(),
                inline: true,
            }
        })
        .collect();

    WebhookPayload {
        username: WEBHOOK_USERNAME.to_string(),
        embeds: vec![Embed {
            title: notice.title(),
            description,
            color,
            fields,
            timestamp: Utc::now().to_rfc3339(),
            footer: EmbedFooter {
                text: FOOTER.to_string(),
            },
        }],
    }
}

#[derive(Clone, Debug)]
pub struct DiscordWebhook {
    url: String,
    http: reqwest::Client,
}

impl DiscordWebhook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("discord client build error: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
        })
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhook {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn send(&self, notice: &ChangeNotice) -> Result<()> {
        let payload = build_payload(notice);

        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::notification(CHANNEL_NAME, format!("request error: {e}")))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::NO_CONTENT {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::notification(
                CHANNEL_NAME,
                format!(
                    "webhook returned {status}: {}",
                    body.chars().take(200).collect::<String>()
                ),
            ));
        }

        tracing::debug!(status = status.as_u16(), "discord webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };
    use xtrack_core::{
        domain::{ExternalId, ProfileSummary},
        notify::NoticeEntry,
    };

    fn notice(direction: Direction, total: usize) -> ChangeNotice {
        ChangeNotice {
            account: "jack".to_string(),
            direction,
            total,
            entries: vec![
                NoticeEntry {
                    external_id: "7".into(),
                    profile: Some(ProfileSummary {
                        username: "rustlang".to_string(),
                        display_name: "Rust".to_string(),
                        follower_count: 1200,
                    }),
                },
                NoticeEntry {
                    external_id: ExternalId::from("99"),
                    profile: None,
                },
            ],
        }
    }

    #[test]
    fn follow_embed_layout() {
        let payload = build_payload(&notice(Direction::Follow, 2));
        assert_eq!(payload.username, "X Follow Tracker");

        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "New Follows Detected for @jack");
        assert_eq!(embed.description, "Started following 2 new accounts");
        assert_eq!(embed.color, 0x00ff00);
        assert_eq!(embed.fields.len(), 2);
        assert_eq!(embed.fields[0].name, "New Follow 1: Rust");
        assert_eq!(embed.fields[0].value, "@rustlang (1200 followers)");
        assert!(embed.fields[0].inline);
        assert_eq!(embed.fields[1].value, "ID: 99");
        assert!(chrono::DateTime::parse_from_rfc3339(&embed.timestamp).is_ok());
    }

    #[test]
    fn unfollow_embed_reports_overflow() {
        let payload = build_payload(&notice(Direction::Unfollow, 30));
        let embed = &payload.embeds[0];
        assert_eq!(embed.title, "Unfollows Detected for @jack");
        assert_eq!(embed.color, 0xff0000);
        assert_eq!(embed.fields[1].name, "Unfollow 2");
        assert_eq!(embed.description, "Unfollowed 30 accounts\n…and 28 more");
    }

    #[tokio::test]
    async fn posts_embed_and_accepts_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .and(body_partial_json(json!({
                "username": "X Follow Tracker",
                "embeds": [{ "title": "New Follows Detected for @jack", "color": 65280 }]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let hook = DiscordWebhook::new(
            format!("{}/api/webhooks/1/abc", server.uri()),
            Duration::from_secs(2),
        )
        .unwrap();
        hook.send(&notice(Direction::Follow, 2)).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_is_a_notification_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("Invalid Form Body"))
            .mount(&server)
            .await;

        let hook = DiscordWebhook::new(server.uri(), Duration::from_secs(2)).unwrap();
        let err = hook.send(&notice(Direction::Follow, 2)).await.unwrap_err();
        match err {
            Error::Notification { channel, reason } => {
                assert_eq!(channel, "discord");
                assert!(reason.contains("400"));
                assert!(reason.contains("Invalid Form Body"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_webhook_hits_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let hook = DiscordWebhook::new(server.uri(), Duration::from_millis(200)).unwrap();
        let started = std::time::Instant::now();
        let err = hook.send(&notice(Direction::Follow, 2)).await.unwrap_err();
        assert!(
            matches!(&err, Error::Notification { channel, .. } if channel == "discord"),
            "unexpected error: {err:?}"
        );
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
