//! Credential lifecycle: accounts, token pairs, revocation and reset.

pub mod password;
pub mod principal;
pub mod rate_limit;
pub mod reset;
pub mod session;
pub mod state;
pub(crate) mod storage;
pub mod tokens;
pub mod types;
pub(crate) mod utils;

pub use rate_limit::{RateLimitDecision, RateLimitScope, RateLimitSettings, WindowedLimiter};
pub use state::{AuthConfig, AuthState};
pub use tokens::TokenKeys;
