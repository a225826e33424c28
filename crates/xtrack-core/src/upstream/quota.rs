use std::sync::atomic::{AtomicI64, Ordering};

const UNKNOWN: i64 = -1;

/// Advisory remaining-request counter, written by the HTTP adapter and read
/// by status displays. Never used as a gate.
#[derive(Debug)]
pub struct QuotaGauge {
    remaining: AtomicI64,
}

impl Default for QuotaGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl QuotaGauge {
    pub fn new() -> Self {
        Self {
            remaining: AtomicI64::new(UNKNOWN),
        }
    }

    pub fn set(&self, remaining: u32) {
        self.remaining.store(i64::from(remaining), Ordering::Relaxed);
    }

    /// Parse a raw header value; unparsable values leave the gauge untouched.
    pub fn observe_header(&self, raw: &str) {
        if let Ok(v) = raw.trim().parse::<u32>() {
            self.set(v);
        }
    }

    pub fn get(&self) -> Option<u32> {
        match self.remaining.load(Ordering::Relaxed) {
            UNKNOWN => None,
            v => u32::try_from(v).ok(),
        }
    }
}
