use std::sync::Arc;

use crate::{
    domain::{ExternalId, WatchedAccount},
    notify::{
        port::NotificationChannel,
        types::{ChangeNotice, Direction, NoticeEntry, NOTICE_ENTRY_CAP},
    },
    upstream::UpstreamPort,
};

/// Which directions produce notices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NotifyToggles {
    pub follows: bool,
    pub unfollows: bool,
}

impl Default for NotifyToggles {
    fn default() -> Self {
        Self {
            follows: true,
            unfollows: true,
        }
    }
}

/// Fans change notices out to every configured channel.
///
/// Delivery is best-effort: a failing channel is logged and skipped, the
/// others still receive the notice, and nothing is returned to the caller
/// except a count of successful sends.
pub struct Dispatcher {
    channels: Vec<Arc<dyn NotificationChannel>>,
    toggles: NotifyToggles,
}

impl Dispatcher {
    pub fn new(channels: Vec<Arc<dyn NotificationChannel>>, toggles: NotifyToggles) -> Self {
        Self { channels, toggles }
    }

    /// A dispatcher with no channels (every notify call is a no-op).
    pub fn disabled() -> Self {
        Self::new(Vec::new(), NotifyToggles::default())
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Notify about one account's change. Returns the number of successful sends.
    pub async fn notify_follow_change(
        &self,
        account: &WatchedAccount,
        added: &[ExternalId],
        removed: &[ExternalId],
        enricher: &dyn UpstreamPort,
    ) -> usize {
        if self.channels.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        if self.toggles.follows && !added.is_empty() {
            let notice = build_notice(account, Direction::Follow, added, enricher).await;
            delivered += self.deliver(&notice).await;
        }
        if self.toggles.unfollows && !removed.is_empty() {
            let notice = build_notice(account, Direction::Unfollow, removed, enricher).await;
            delivered += self.deliver(&notice).await;
        }
        delivered
    }

    async fn deliver(&self, notice: &ChangeNotice) -> usize {
        let mut delivered = 0;
        for channel in &self.channels {
            match channel.send(notice).await {
                Ok(()) => {
                    delivered += 1;
                    tracing::info!(
                        channel = channel.name(),
                        account = %notice.account,
                        direction = ?notice.direction,
                        total = notice.total,
                        "notification sent"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        channel = channel.name(),
                        account = %notice.account,
                        error = %e,
                        "notification failed"
                    );
                }
            }
        }
        delivered
    }
}

/// Build one notice, enriching at most [`NOTICE_ENTRY_CAP`] ids.
///
/// Ids are listed in numeric order so repeated runs render identically.
pub async fn build_notice(
    account: &WatchedAccount,
    direction: Direction,
    ids: &[ExternalId],
    enricher: &dyn UpstreamPort,
) -> ChangeNotice {
    let mut sorted: Vec<&ExternalId> = ids.iter().collect();
    sorted.sort_by(|a, b| {
        a.as_str()
            .len()
            .cmp(&b.as_str().len())
            .then_with(|| a.as_str().cmp(b.as_str()))
    });

    let mut entries = Vec::with_capacity(sorted.len().min(NOTICE_ENTRY_CAP));
    for id in sorted.into_iter().take(NOTICE_ENTRY_CAP) {
        let profile = match enricher.fetch_profile_by_id(id).await {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::debug!(user_id = %id, error = %e, "profile lookup failed");
                None
            }
        };
        entries.push(NoticeEntry {
            external_id: id.clone(),
            profile,
        });
    }

    ChangeNotice {
        account: account.username.clone(),
        direction,
        total: ids.len(),
        entries,
    }
}
