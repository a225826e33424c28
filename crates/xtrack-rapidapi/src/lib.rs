//! RapidAPI adapter for the social-graph API.
//!
//! Implements [`UpstreamPort`] over `https://{host}/v2`: user lookup by
//! username and by id, and paged following ids (5000 per page).

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize};

use xtrack_core::{
    config::Config,
    domain::{ExternalId, Profile, ProfileSummary},
    errors::Error,
    upstream::{FollowingPage, QuotaGauge, UpstreamPort},
    Result,
};

const PAGE_SIZE: &str = "5000";
const QUOTA_HEADER: &str = "x-ratelimit-requests-remaining";

#[derive(Debug)]
pub struct RapidApiClient {
    api_key: String,
    host: String,
    base_url: String,
    http: reqwest::Client,
    quota: QuotaGauge,
}

impl RapidApiClient {
    pub fn new(api_key: impl Into<String>, host: impl Into<String>, timeout: Duration) -> Result<Self> {
        let host = host.into();
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("rapidapi client build error: {e}")))?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: format!("https://{host}/v2"),
            host,
            http,
            quota: QuotaGauge::new(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        cfg.require_upstream_credentials()?;
        Self::new(&cfg.rapidapi_key, &cfg.rapidapi_host, cfg.request_timeout)
    }

    /// Point the client somewhere other than `https://{host}/v2`.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn quota(&self) -> &QuotaGauge {
        &self.quota
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        tracing::debug!(%url, ?query, "rapidapi request");

        let resp = self
            .http
            .get(&url)
            .query(query)
            .header("x-rapidapi-key", &self.api_key)
            .header("x-rapidapi-host", &self.host)
            .send()
            .await
            .map_err(|e| Error::External(format!("rapidapi request error: {e}")))?;

        if let Some(v) = resp.headers().get(QUOTA_HEADER).and_then(|v| v.to_str().ok()) {
            self.quota.observe_header(v);
        }

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::upstream(status.as_u16(), &body));
        }

        resp.json::<T>()
            .await
            .map_err(|e| Error::External(format!("rapidapi json error: {e}")))
    }
}

// ============== Wire types ==============

#[derive(Debug, Default, Deserialize)]
struct Legacy {
    #[serde(default)]
    screen_name: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    friends_count: u64,
    #[serde(default)]
    followers_count: u64,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    rest_id: String,
    #[serde(default)]
    legacy: Legacy,
}

#[derive(Debug, Deserialize)]
struct FollowingIdsResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    next_cursor: i64,
    #[serde(default)]
    next_cursor_str: String,
}

impl FollowingIdsResponse {
    fn into_page(self) -> FollowingPage {
        let next_cursor = match (self.next_cursor, self.next_cursor_str) {
            (0, _) => None,
            (n, s) if s.is_empty() => Some(n.to_string()),
            (_, s) => Some(s),
        };
        FollowingPage {
            ids: self.ids.into_iter().map(ExternalId).collect(),
            next_cursor,
        }
    }
}

#[async_trait]
impl UpstreamPort for RapidApiClient {
    async fn fetch_profile(&self, username: &str) -> Result<Profile> {
        let user: UserResponse = self
            .get("/user/by-username", &[("username", username)])
            .await?;
        if user.rest_id.is_empty() {
            return Err(Error::NotFound(format!("no upstream user named @{username}")));
        }
        tracing::info!(
            username,
            user_id = %user.rest_id,
            following = user.legacy.friends_count,
            "user lookup complete"
        );
        Ok(Profile {
            external_id: ExternalId(user.rest_id),
            username: user.legacy.screen_name,
            display_name: user.legacy.name,
            following_count: user.legacy.friends_count,
        })
    }

    async fn fetch_following_page(
        &self,
        external_id: &ExternalId,
        cursor: Option<&str>,
    ) -> Result<FollowingPage> {
        let mut query = vec![("userId", external_id.as_str()), ("count", PAGE_SIZE)];
        if let Some(c) = cursor {
            query.push(("cursor", c));
        }
        let resp: FollowingIdsResponse = self.get("/user/following-ids", &query).await?;
        Ok(resp.into_page())
    }

    async fn fetch_profile_by_id(&self, external_id: &ExternalId) -> Result<ProfileSummary> {
        let user: UserResponse = self
            .get("/user/by-id", &[("userId", external_id.as_str())])
            .await?;
        if user.legacy.screen_name.is_empty() {
            return Err(Error::NotFound(format!("no upstream user with id {external_id}")));
        }
        Ok(ProfileSummary {
            username: user.legacy.screen_name,
            display_name: user.legacy.name,
            follower_count: user.legacy.followers_count,
        })
    }

    fn remaining_quota(&self) -> Option<u32> {
        self.quota.get()
    }
}
