use async_trait::async_trait;

use crate::{notify::types::ChangeNotice, Result};

/// One notification target (a Discord webhook, a Telegram chat, ...).
///
/// Implementations render the notice in their own format. Errors are
/// reported back to the dispatcher, which logs them and moves on.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &str;

    async fn send(&self, notice: &ChangeNotice) -> Result<()>;
}
