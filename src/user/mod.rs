pub mod auth;
mod sqlite_user_store;
pub mod user_models;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue};
pub use sqlite_user_store::SqliteUserStore;
pub use user_models::User;
pub use user_store::{UserAuthTokenStore, UserStore};
