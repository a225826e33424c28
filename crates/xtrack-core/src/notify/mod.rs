//! Change notifications: the channel port, the dispatcher that fans a
//! change out to every channel, and a rate-limiting decorator.

pub mod dispatcher;
pub mod port;
pub mod throttled;
pub mod types;

pub use dispatcher::{Dispatcher, NotifyToggles};
pub use port::NotificationChannel;
pub use throttled::ThrottledChannel;
pub use types::{ChangeNotice, Direction, NoticeEntry, NOTICE_ENTRY_CAP};
