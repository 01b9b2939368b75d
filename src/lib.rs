//! # Pasejo (Password Authentication Service)
//!
//! `pasejo` is a password-based authentication service: registration, login,
//! logout, and the forgot/reset-password lifecycle over a relational user
//! store.
//!
//! ## Credential Lifecycle
//!
//! Passwords are hashed with Argon2id and never stored in clear. Password
//! resets are driven by single-use tokens delivered by email; the database
//! only ever stores a SHA-256 digest of an issued token, and at most one
//! live token exists per email address.
//!
//! ## Abuse Protection
//!
//! All sensitive `POST` endpoints are guarded by a per-session CSRF token and
//! a fixed-window rate limiter keyed by `<action>:<client>`. The limiter
//! prefers a shared Redis counter (required for correctness across server
//! instances) and degrades to an in-process counter when Redis is
//! unreachable.
//!
//! ## Enumeration Safety
//!
//! Login and the password-recovery endpoints collapse "no such account" and
//! "wrong credential/token" into a single response shape so that replies do
//! not reveal whether an email address is registered.

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
