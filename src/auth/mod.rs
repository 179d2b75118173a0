// Authentication module
// Credential storage, token decoding and single-flight refresh

pub mod codec;
mod refresh;
mod storage;
mod store;
mod types;

pub use refresh::RefreshCoordinator;
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use store::CredentialStore;
pub use types::{
    Claims, LoginRequest, LoginResponse, Token, UserInfo, ACCESS_TOKEN_KEY, REDIRECT_INTENT_KEY,
    REFRESH_TOKEN_KEY, USER_EMAIL_KEY,
};
