mod requests_logging;
mod security;

pub(crate) use requests_logging::metric_path;
pub use requests_logging::{log_requests, RequestsLoggingLevel};
pub use security::{security_headers, security_layer};
