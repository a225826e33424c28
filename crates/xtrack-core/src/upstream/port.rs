use async_trait::async_trait;

use crate::{
    domain::{ExternalId, Profile, ProfileSummary},
    Result,
};

/// One page of following ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FollowingPage {
    pub ids: Vec<ExternalId>,
    /// `None`, empty or `"0"` means this was the last page.
    pub next_cursor: Option<String>,
}

impl FollowingPage {
    pub fn is_last(&self) -> bool {
        match self.next_cursor.as_deref() {
            None | Some("") | Some("0") => true,
            Some(_) => false,
        }
    }
}

/// Social-graph API port.
///
/// Every call is bounded by the adapter's request timeout.
#[async_trait]
pub trait UpstreamPort: Send + Sync {
    /// Resolve a username to its profile (used when adding an account).
    async fn fetch_profile(&self, username: &str) -> Result<Profile>;

    /// Fetch a single page of the ids `external_id` follows.
    async fn fetch_following_page(
        &self,
        external_id: &ExternalId,
        cursor: Option<&str>,
    ) -> Result<FollowingPage>;

    /// Display data for notification enrichment. Callers treat failures as "no data".
    async fn fetch_profile_by_id(&self, external_id: &ExternalId) -> Result<ProfileSummary>;

    /// Last value of the remaining-requests header, if one has been seen.
    fn remaining_quota(&self) -> Option<u32>;
}
