//! Route handlers for the credential service.

pub mod admin;
pub mod auth;
pub mod health;
pub mod me;
pub mod root;
