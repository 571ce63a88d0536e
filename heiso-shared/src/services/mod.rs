//! Domain flows built on the models
//!
//! Each flow opens the transactions it needs, so callers only pass a pool
//! and the tenant of the request. Authorization of the caller is checked by
//! the HTTP layer before a flow runs.

pub mod accounts;
pub mod invites;
pub mod otp;
pub mod provisioning;
pub mod recovery;
pub mod team;
