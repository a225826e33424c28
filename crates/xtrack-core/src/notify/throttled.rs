use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    notify::{port::NotificationChannel, types::ChangeNotice},
    Result,
};

/// Telegram allows roughly one message per second per chat.
pub const TELEGRAM_MIN_INTERVAL: Duration = Duration::from_millis(1050);
/// Discord webhooks allow about five requests per two seconds.
pub const DISCORD_MIN_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// NotificationChannel decorator that spaces out sends.
///
/// Bursts (several accounts changing in the same cycle) are queued rather
/// than tripping the target's flood control.
pub struct ThrottledChannel {
    inner: Arc<dyn NotificationChannel>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledChannel {
    pub fn new(inner: Arc<dyn NotificationChannel>, min_interval: Duration) -> Self {
        Self {
            inner,
            limiter: Mutex::new(IntervalLimiter::new(min_interval)),
        }
    }
}

#[async_trait::async_trait]
impl NotificationChannel for ThrottledChannel {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn send(&self, notice: &ChangeNotice) -> Result<()> {
        let wait = { self.limiter.lock().await.reserve() };
        if !wait.is_zero() {
            sleep(wait).await;
        }
        self.inner.send(notice).await
    }
}
