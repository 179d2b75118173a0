// Authentication types

use serde::{Deserialize, Deserializer, Serialize};

/// Opaque encoded credential (JWT-shaped: `header.payload.signature`)
pub type Token = String;

/// Storage keys for everything the session keeps between runs
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_EMAIL_KEY: &str = "user_email";
pub const REDIRECT_INTENT_KEY: &str = "redirect_after_login";

/// Claims carried by a token payload
///
/// Derived on demand from a [`Token`], never stored.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Claims {
    /// Subject (user id). Numeric subjects are kept in their string form.
    #[serde(deserialize_with = "string_or_number")]
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub is_premium: Option<bool>,
    /// Expiry, seconds since the Unix epoch. NumericDate may be fractional.
    #[serde(default)]
    pub exp: Option<f64>,
}

/// User information projected from the current access token
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub id: String,
    pub email: Option<String>,
    pub is_premium: Option<bool>,
}

impl From<Claims> for UserInfo {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
            is_premium: claims.is_premium,
        }
    }
}

/// Refresh endpoint response
#[derive(Debug, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
    /// Present when the server rotates the refresh credential
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Login request body
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Login endpoint response
#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<LoginUser>,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    #[serde(default)]
    pub email: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Subject::deserialize(deserializer)? {
        Subject::Text(s) => s,
        Subject::Number(n) => n.to_string(),
    })
}
