use std::{collections::HashSet, time::Duration};

use tokio::time::sleep;

use crate::{domain::ExternalId, errors::Error, upstream::port::UpstreamPort, Result};

/// Fetch the complete following set of `external_id`, walking every page.
///
/// Sleeps `pacing` between pages (not before the first one). Any page error
/// aborts the whole fetch; a partial set is never returned.
pub async fn fetch_following_set(
    port: &dyn UpstreamPort,
    external_id: &ExternalId,
    pacing: Duration,
) -> Result<HashSet<ExternalId>> {
    let mut ids = HashSet::new();
    let mut seen_cursors = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = port
            .fetch_following_page(external_id, cursor.as_deref())
            .await?;
        pages += 1;
        tracing::debug!(
            user_id = %external_id,
            page = pages,
            ids = page.ids.len(),
            "fetched following page"
        );
        let last = page.is_last();
        ids.extend(page.ids);

        if last {
            break;
        }

        let next = page.next_cursor.unwrap_or_default();
        if !seen_cursors.insert(next.clone()) {
            return Err(Error::Upstream {
                status: 0,
                body: format!("pagination cursor {next} repeated for user {external_id}"),
            });
        }
        cursor = Some(next);

        if !pacing.is_zero() {
            sleep(pacing).await;
        }
    }

    tracing::debug!(user_id = %external_id, pages, total = ids.len(), "following set complete");
    Ok(ids)
}
