mod auth_routes;
mod backup_routes;
pub mod config;
mod error;
mod http_layers;
mod maintenance_routes;
pub mod metrics;
pub mod server;
pub mod session;
pub mod state;

pub use config::ServerConfig;
pub use error::{ApiError, FieldError};
pub use http_layers::*;
pub use server::{make_app, run_server};
pub use state::ServerState;
