// Session Keeper - Library root

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod http_client;
pub mod middleware;
pub mod navigation;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use context::SessionContext;
pub use error::SessionError;
