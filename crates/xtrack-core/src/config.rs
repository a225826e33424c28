use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, logging::LogSettings, Result};

/// Typed configuration, read from the environment (and `.env` if present).
///
/// Handed to components at construction; nothing reads the environment later.
#[derive(Clone, Debug)]
pub struct Config {
    // Upstream API
    pub rapidapi_key: String,
    pub rapidapi_host: String,
    pub max_requests_per_minute: u32,
    pub request_timeout: Duration,
    pub page_delay: Duration,

    // Scheduling
    pub check_interval: Duration,
    pub max_parallel_accounts: usize,

    // Storage
    pub db_path: PathBuf,

    // Logging
    pub logging_enabled: bool,
    pub log_dir: PathBuf,

    // Notification toggles
    pub notify_follows: bool,
    pub notify_unfollows: bool,
    pub discord_enabled: bool,
    pub telegram_enabled: bool,

    // Channel credentials
    pub discord_webhook_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<i64>,
}

pub const MAX_PARALLEL_ACCOUNTS: usize = 8;

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the process env in `load`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let home = get("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = home.join(".xtrack");

        let rapidapi_key = get("RAPID_API_KEY").unwrap_or_default();
        let rapidapi_host = get("RAPID_API_HOST").unwrap_or_default();
        let max_requests_per_minute = parse_num("MAX_REQUESTS_PER_MINUTE", get("MAX_REQUESTS_PER_MINUTE"))?
            .unwrap_or(30);
        let request_timeout = duration_or("REQUEST_TIMEOUT", get("REQUEST_TIMEOUT"), Duration::from_secs(10))?;
        let page_delay = duration_or("PAGE_DELAY", get("PAGE_DELAY"), Duration::from_secs(1))?;

        let check_interval = duration_or("CHECK_INTERVAL", get("CHECK_INTERVAL"), Duration::from_secs(5 * 60))?;
        if check_interval.is_zero() {
            return Err(Error::Config("CHECK_INTERVAL must be greater than zero".to_string()));
        }
        if request_timeout.is_zero() {
            return Err(Error::Config("REQUEST_TIMEOUT must be greater than zero".to_string()));
        }
        let max_parallel_accounts = parse_num::<usize>("MAX_PARALLEL_ACCOUNTS", get("MAX_PARALLEL_ACCOUNTS"))?
            .unwrap_or(1)
            .clamp(1, MAX_PARALLEL_ACCOUNTS);

        let db_path = get("DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("data.db"));

        let logging_enabled = get("LOGGING_ENABLED").map(|v| parse_bool(&v)).unwrap_or(false);
        let log_dir = get("LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        let flag = |key: &str| get(key).map(|v| parse_bool(&v)).unwrap_or(true);
        let notify_follows = flag("ENABLE_FOLLOW_NOTIFICATIONS");
        let notify_unfollows = flag("ENABLE_UNFOLLOW_NOTIFICATIONS");
        let discord_enabled = flag("ENABLE_DISCORD_NOTIFICATIONS");
        let telegram_enabled = flag("ENABLE_TELEGRAM_NOTIFICATIONS");

        let discord_webhook_url = get("DISCORD_WEBHOOK_URL");
        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN");
        let telegram_chat_id = parse_num::<i64>("TELEGRAM_CHAT_ID", get("TELEGRAM_CHAT_ID"))?;

        Ok(Self {
            rapidapi_key,
            rapidapi_host,
            max_requests_per_minute,
            request_timeout,
            page_delay,
            check_interval,
            max_parallel_accounts,
            db_path,
            logging_enabled,
            log_dir,
            notify_follows,
            notify_unfollows,
            discord_enabled,
            telegram_enabled,
            discord_webhook_url,
            telegram_bot_token,
            telegram_chat_id,
        })
    }

    /// Fails unless the upstream credentials are set. Only commands that hit
    /// the upstream API need them.
    pub fn require_upstream_credentials(&self) -> Result<()> {
        if self.rapidapi_key.is_empty() {
            return Err(Error::Config(
                "RAPID_API_KEY environment variable is required".to_string(),
            ));
        }
        if self.rapidapi_host.is_empty() {
            return Err(Error::Config(
                "RAPID_API_HOST environment variable is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Delay between following-id pages: the configured page delay, but never
    /// faster than the advertised requests-per-minute budget allows.
    pub fn page_pacing(&self) -> Duration {
        if self.max_requests_per_minute == 0 {
            return self.page_delay;
        }
        let floor = Duration::from_secs(60) / self.max_requests_per_minute;
        self.page_delay.max(floor)
    }

    pub fn log_settings(&self) -> LogSettings {
        LogSettings {
            file_enabled: self.logging_enabled,
            dir: self.log_dir.clone(),
        }
    }

    pub fn discord_webhook(&self) -> Option<&str> {
        if !self.discord_enabled {
            return None;
        }
        self.discord_webhook_url.as_deref()
    }

    pub fn telegram_target(&self) -> Option<(&str, i64)> {
        if !self.telegram_enabled {
            return None;
        }
        match (self.telegram_bot_token.as_deref(), self.telegram_chat_id) {
            (Some(token), Some(chat)) => Some((token, chat)),
            _ => None,
        }
    }
}

/// Parse a duration like `500ms`, `30s`, `5m`, `1h30m`, or bare seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let value: u64 = rest[..digits].parse().ok()?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.checked_mul(60)?),
            "h" => Duration::from_secs(value.checked_mul(3600)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
    }
    Some(total)
}

fn duration_or(key: &str, raw: Option<String>, default: Duration) -> Result<Duration> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    parse_duration(&raw).ok_or_else(|| Error::Config(format!("invalid duration for {key}: {raw}")))
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: Option<String>) -> Result<Option<T>> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("invalid number for {key}: {raw}")))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
