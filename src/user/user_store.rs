use super::auth::{AuthToken, AuthTokenValue};
use super::user_models::User;
use anyhow::Result;

pub trait UserAuthTokenStore: Send + Sync {
    /// Issues and stores a new token for the given uid.
    /// The uid does not have to belong to an existing user: tokens model an
    /// external identity provider, the user record is checked separately.
    fn add_auth_token(&self, uid: &str) -> Result<AuthTokenValue>;

    /// Returns Ok(None) if the token does not exist.
    /// Bumps the token's last used timestamp on success.
    fn resolve_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Returns true if the token existed.
    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<bool>;

    fn get_all_auth_tokens(&self, uid: &str) -> Result<Vec<AuthToken>>;
}

pub trait UserStore: UserAuthTokenStore + Send + Sync {
    /// Fails if the uid is already taken.
    fn create_user(&self, uid: &str, email: Option<&str>, is_admin: bool) -> Result<()>;

    /// Returns Ok(None) if the user does not exist.
    fn get_user(&self, uid: &str) -> Result<Option<User>>;

    fn list_users(&self) -> Result<Vec<User>>;

    /// Returns false if the user does not exist.
    fn set_admin(&self, uid: &str, is_admin: bool) -> Result<bool>;
}
