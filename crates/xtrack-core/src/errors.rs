/// Core error type.
///
/// Adapter crates map their transport errors into this type so the
/// reconciler can decide what aborts an account, a channel, or nothing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("@{0} is already being watched")]
    DuplicateUsername(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid username: {0:?}")]
    InvalidUsername(String),

    #[error("upstream error: status={status} body={body}")]
    Upstream { status: u16, body: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("notification error ({channel}): {reason}")]
    Notification { channel: String, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external error: {0}")]
    External(String),
}

const MAX_ERROR_BODY: usize = 500;

impl Error {
    /// Build an `Upstream` error, keeping only the head of large bodies.
    pub fn upstream(status: u16, body: &str) -> Self {
        Self::Upstream {
            status,
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        }
    }

    pub fn notification(channel: &str, reason: impl Into<String>) -> Self {
        Self::Notification {
            channel: channel.to_string(),
            reason: reason.into(),
        }
    }

    /// Errors the user can fix by changing their input (vs. infrastructure failures).
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::DuplicateUsername(_) | Self::NotFound(_) | Self::InvalidUsername(_)
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
