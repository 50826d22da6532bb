//! Rate limiting logic and state management.

mod backend;
mod entry;
mod key;
mod rules;
mod store;
mod sweeper;

pub use backend::RateLimiterBackend;
pub use entry::{Decision, KeyStatus, RateLimitEntry};
pub use key::ClientKey;
pub use rules::LimitRule;
pub use store::LimiterStore;
pub use sweeper::{ExpirySweeper, SweeperHandle, DEFAULT_SWEEP_INTERVAL};
