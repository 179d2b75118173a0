// Single-flight token refresh

use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

use super::store::CredentialStore;
use super::types::{RefreshResponse, Token};
use crate::error::{Result, SessionError};
use crate::http_client::Transport;

/// A caller parked behind the refresh in flight
type Waiter = oneshot::Sender<Result<Token>>;

#[derive(Default)]
struct RefreshState {
    refreshing: bool,
    waiters: VecDeque<Waiter>,
}

/// Coordinates access-token renewal so that concurrent demand triggers
/// exactly one refresh call.
///
/// The first caller becomes the leader and talks to the refresh endpoint;
/// everyone arriving while it is outstanding is queued and receives the
/// leader's outcome in arrival order.
pub struct RefreshCoordinator {
    store: CredentialStore,
    transport: Arc<dyn Transport>,
    refresh_path: String,
    state: Mutex<RefreshState>,
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Result<Token>>),
}

impl RefreshCoordinator {
    pub fn new(store: CredentialStore, transport: Arc<dyn Transport>, refresh_path: &str) -> Self {
        Self {
            store,
            transport,
            refresh_path: refresh_path.to_string(),
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Obtain a renewed access token.
    ///
    /// Either performs the refresh or waits for the one already in flight.
    /// On failure the stored credentials are gone and the session is over.
    /// If the leading caller is dropped mid-flight, its waiters contend
    /// again and one of them carries the refresh through.
    pub async fn refresh(&self) -> Result<Token> {
        loop {
            let role = {
                let mut state = self.state.lock();
                if state.refreshing {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push_back(tx);
                    tracing::debug!(
                        waiters = state.waiters.len(),
                        "Refresh already in flight, queueing caller"
                    );
                    Role::Waiter(rx)
                } else {
                    state.refreshing = true;
                    Role::Leader
                }
            };

            match role {
                Role::Waiter(rx) => match rx.await {
                    Ok(result) => return result,
                    // Leader went away without an outcome
                    Err(_) => continue,
                },
                Role::Leader => {
                    let flight = Flight::start(self);
                    let result = self.refresh_access_token().await;
                    flight.settle(result.clone());
                    return result;
                }
            }
        }
    }

    /// Whether a refresh call is outstanding
    pub fn is_refreshing(&self) -> bool {
        self.state.lock().refreshing
    }

    /// Number of callers parked behind the refresh in flight
    pub fn pending_waiters(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Call the refresh endpoint and persist the outcome
    async fn refresh_access_token(&self) -> Result<Token> {
        let result = self.request_new_token().await;

        match &result {
            Ok(token) => {
                let prefix: String = token.chars().take(12).collect();
                tracing::info!("Access token refreshed ({}...)", prefix);
            }
            Err(e) => {
                tracing::error!("Token refresh failed, clearing credentials: {}", e);
                self.store.clear();
            }
        }

        result
    }

    async fn request_new_token(&self) -> Result<Token> {
        let refresh_token = self
            .store
            .refresh_token()
            .ok_or(SessionError::MissingRefreshToken)?;

        tracing::debug!(path = %self.refresh_path, "Refreshing access token...");

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", refresh_token)).map_err(|_| {
            SessionError::InvalidResponse("Stored refresh token is not a valid header value".to_string())
        })?;
        headers.insert(AUTHORIZATION, bearer);

        let response = self
            .transport
            .post(&self.refresh_path, json!({}), headers)
            .await?;

        if !response.is_success() {
            return Err(SessionError::RefreshRejected {
                status: response.status,
                message: response.error_message(),
            });
        }

        let data: RefreshResponse = serde_json::from_value(response.data).map_err(|e| {
            SessionError::InvalidResponse(format!("Failed to parse refresh response: {}", e))
        })?;

        if data.access_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "Refresh response does not contain access_token".to_string(),
            ));
        }

        // The refresh credential is kept unless the server rotated it
        self.store
            .set_tokens(&data.access_token, data.refresh_token.as_deref());

        Ok(data.access_token)
    }
}

/// Settles the refresh in flight exactly once.
///
/// If the leader future is dropped before it settles, `Drop` returns to idle
/// and drops the waiters' senders without a result, so each of them goes
/// back through [`RefreshCoordinator::refresh`].
struct Flight<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl<'a> Flight<'a> {
    fn start(coordinator: &'a RefreshCoordinator) -> Self {
        Self {
            coordinator,
            settled: false,
        }
    }

    fn settle(mut self, result: Result<Token>) {
        self.settled = true;
        let waiters = self.finish();

        if !waiters.is_empty() {
            tracing::debug!(
                waiters = waiters.len(),
                success = result.is_ok(),
                "Releasing queued callers"
            );
        }

        for waiter in waiters {
            // A waiter that went away no longer needs the result
            let _ = waiter.send(result.clone());
        }
    }

    fn finish(&self) -> VecDeque<Waiter> {
        let mut state = self.coordinator.state.lock();
        state.refreshing = false;
        std::mem::take(&mut state.waiters)
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let waiters = self.finish();
            tracing::warn!(
                waiters = waiters.len(),
                "Token refresh dropped before completion, handing over to queued callers"
            );
        }
    }
}
