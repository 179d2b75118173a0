// Credential storage on top of a key-value backend

use std::sync::Arc;

use super::storage::Storage;
use super::types::{
    Token, ACCESS_TOKEN_KEY, REDIRECT_INTENT_KEY, REFRESH_TOKEN_KEY, USER_EMAIL_KEY,
};

/// Holds the access / refresh credential pair and the cached user fields.
///
/// Pure pass-through: no validation and no policy. A failing backend reads
/// as "nothing stored" and failed writes are logged and dropped.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn Storage>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub fn access_token(&self) -> Option<Token> {
        self.read(ACCESS_TOKEN_KEY)
    }

    pub fn refresh_token(&self) -> Option<Token> {
        self.read(REFRESH_TOKEN_KEY)
    }

    /// Store a new credential pair.
    /// Passing `None` for `refresh` keeps the refresh token already stored.
    pub fn set_tokens(&self, access: &str, refresh: Option<&str>) {
        self.write(ACCESS_TOKEN_KEY, access);
        if let Some(refresh) = refresh {
            self.write(REFRESH_TOKEN_KEY, refresh);
        }
    }

    /// Remove both tokens and the cached user fields
    pub fn clear(&self) {
        for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_EMAIL_KEY] {
            self.delete(key);
        }
    }

    pub fn user_email(&self) -> Option<String> {
        self.read(USER_EMAIL_KEY)
    }

    pub fn set_user_email(&self, email: &str) {
        self.write(USER_EMAIL_KEY, email);
    }

    pub fn redirect_intent(&self) -> Option<String> {
        self.read(REDIRECT_INTENT_KEY)
    }

    pub fn set_redirect_intent(&self, path: &str) {
        self.write(REDIRECT_INTENT_KEY, path);
    }

    /// Read the redirect intent and clear it
    pub fn take_redirect_intent(&self) -> Option<String> {
        let intent = self.read(REDIRECT_INTENT_KEY);
        self.delete(REDIRECT_INTENT_KEY);
        intent
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Storage read failed, treating as absent");
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.storage.set(key, value) {
            tracing::warn!(key, error = %e, "Storage write failed");
        }
    }

    fn delete(&self, key: &str) {
        if let Err(e) = self.storage.remove(key) {
            tracing::warn!(key, error = %e, "Storage remove failed");
        }
    }
}
