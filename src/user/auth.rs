//! Bearer tokens resolving to a user id.

use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const AUTH_TOKEN_LENGTH: usize = 64;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct AuthTokenValue(pub String);

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AuthToken {
    pub uid: String,
    pub created: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub value: AuthTokenValue,
}

impl AuthTokenValue {
    pub fn generate() -> AuthTokenValue {
        let rng = rand::rng();
        let random_string: String = rng
            .sample_iter(&Alphanumeric)
            .take(AUTH_TOKEN_LENGTH)
            .map(char::from)
            .collect();
        AuthTokenValue(random_string)
    }

    /// Accepts a raw header value with or without the `Bearer ` prefix.
    pub fn from_header_value(value: &str) -> Option<AuthTokenValue> {
        let value = value.trim();
        let token = value
            .strip_prefix("Bearer ")
            .or_else(|| value.strip_prefix("bearer "))
            .unwrap_or(value)
            .trim();
        if token.is_empty() {
            None
        } else {
            Some(AuthTokenValue(token.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_alphanumeric_and_distinct() {
        let a = AuthTokenValue::generate();
        let b = AuthTokenValue::generate();
        assert_eq!(a.0.len(), AUTH_TOKEN_LENGTH);
        assert!(a.0.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn header_value_prefix_is_optional() {
        assert_eq!(
            AuthTokenValue::from_header_value("Bearer abc"),
            Some(AuthTokenValue("abc".to_string()))
        );
        assert_eq!(
            AuthTokenValue::from_header_value("abc"),
            Some(AuthTokenValue("abc".to_string()))
        );
        assert_eq!(AuthTokenValue::from_header_value("Bearer "), None);
        assert_eq!(AuthTokenValue::from_header_value(""), None);
    }
}
