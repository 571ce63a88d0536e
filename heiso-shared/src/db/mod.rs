//! Database access for Heiso
//!
//! - `pool`: connection pool construction and health checks
//! - `migrations`: schema migrations embedded from `/migrations`
//! - `rls`: tenant-scoped transactions enforcing row-level security
//!
//! Global tables (`tenants`, `users`, `developers`, one-time codes) are queried
//! straight off the pool. Every tenant-owned table must be touched through a
//! transaction opened by [`rls::begin`].

pub mod migrations;
pub mod pool;
pub mod rls;
