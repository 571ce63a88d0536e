//! # Heiso Shared Library
//!
//! Types, persistence and business flows used by the Heiso API server.
//!
//! ## Module Organization
//!
//! - `db`: connection pool, migrations and tenant-scoped transactions
//! - `models`: database models, one module per table family
//! - `auth`: passwords, JWTs, API keys, request authentication and permissions
//! - `services`: login, OTP, recovery, team, invitation and provisioning flows
//! - `mail`: outgoing mail transports and templates
//! - `ids`, `slug`, `tree`: identifier generation, slugs and parent/child trees

pub mod auth;
pub mod db;
pub mod ids;
pub mod mail;
pub mod models;
pub mod services;
pub mod slug;
pub mod tree;

/// Current version of the Heiso shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
