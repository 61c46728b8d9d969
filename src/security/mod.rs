//! Request hardening for the admin API: rate limiting, CSRF tokens, input
//! sanitizing and response headers. The axum middleware tying these together
//! lives in `server::http_layers`.

pub mod csrf;
mod headers;
pub mod rate_limit;
mod sanitize;

pub use csrf::{CsrfError, CsrfManager, IssuedCsrfToken};
pub use headers::{apply_security_headers, client_ip, RATE_LIMIT_REMAINING_HEADER, SECURITY_HEADERS};
pub use rate_limit::{evaluate, RateLimitDecision, RateLimitPolicy, RateLimiter};
pub use sanitize::{sanitize_str, sanitize_value};
