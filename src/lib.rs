//! ChatHub admin maintenance server library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod backup;
pub mod config;
pub mod document_store;
pub mod maintenance;
pub mod security;
pub mod server;
pub mod server_store;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use server::{make_app, run_server, RequestsLoggingLevel, ServerState};
pub use server_store::{ServerStore, SqliteServerStore};
pub use user::{SqliteUserStore, UserStore};
