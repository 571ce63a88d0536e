/// Middleware modules for the API server
///
/// - `security`: security response headers and request ids
/// - `tenant`: the `X-Tenant-Id` extractor used by public routes

pub mod security;
pub mod tenant;
