//! Rate limiting decisions and per-caller record handling.

mod clock;
mod decision;
mod limiter;
mod quota;
mod record;

pub use clock::{format_timestamp, parse_timestamp, Clock, ManualClock, SystemClock};
pub use decision::{AdditionalInfo, Decision, DenyPayload};
pub use limiter::{LimiterOptions, RateLimiter};
pub use quota::Quota;
pub use record::CallerRecord;
