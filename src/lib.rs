//! # Clavis
//!
//! Credential lifecycle and session management service.
//!
//! ## Tokens
//!
//! Authentication issues a short-lived **access token** and a longer-lived
//! **refresh token**, both HS256 JWTs signed with *distinct* secrets so that
//! compromise of one token class cannot forge the other. Refresh tokens are
//! additionally persisted server-side (hashed) with their own expiry, so a
//! token with a valid signature is still rejected once its record is gone.
//!
//! ## Revocation
//!
//! Every user carries a `token_version` counter embedded in issued tokens.
//! Bumping the counter invalidates all outstanding access tokens for that
//! user at once, without enumerating them.
//!
//! ## Abuse control
//!
//! Every request passes an admission check (global window), login/register
//! pass a stricter auth window, and abusive clients are progressively slowed
//! down instead of rejected once they cross a throttle threshold.

pub mod api;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
