//! Upstream social-graph API: the port adapters implement, plus the
//! pagination and quota bookkeeping shared by every adapter.

pub mod pagination;
pub mod port;
pub mod quota;

pub use pagination::fetch_following_set;
pub use port::{FollowingPage, UpstreamPort};
pub use quota::QuotaGauge;
