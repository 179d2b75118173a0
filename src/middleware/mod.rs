// Request/response hooks binding the refresh coordinator to the transport

use std::sync::Arc;

use crate::auth::{CredentialStore, RefreshCoordinator};
use crate::error::Result;
use crate::http_client::{OutgoingRequest, Transport, TransportResponse};
use crate::session::SessionGuard;

/// Authentication interceptor
///
/// Stamps outgoing requests with the current access token and recovers from
/// a 401 by refreshing once and resubmitting the request once.
#[derive(Clone)]
pub struct AuthInterceptor {
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn Transport>,
    guard: SessionGuard,
}

impl AuthInterceptor {
    pub fn new(
        store: CredentialStore,
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<dyn Transport>,
        guard: SessionGuard,
    ) -> Self {
        Self {
            store,
            coordinator,
            transport,
            guard,
        }
    }

    /// Outgoing hook: attach the access token if there is one.
    /// Unauthenticated requests go out untouched.
    pub fn on_request(&self, request: &mut OutgoingRequest) {
        if let Some(token) = self.store.access_token() {
            request.set_bearer(&token);
        }
    }

    /// Incoming hook: on a 401 for a request not yet retried, refresh (or
    /// wait for the refresh in flight) and resubmit once. Everything else
    /// passes through unchanged.
    pub async fn on_response(
        &self,
        request: &mut OutgoingRequest,
        response: TransportResponse,
    ) -> Result<TransportResponse> {
        if !response.is_unauthorized() || request.retried {
            return Ok(response);
        }

        request.retried = true;
        tracing::debug!(path = %request.path, "Received 401, refreshing token and retrying...");

        match self.coordinator.refresh().await {
            Ok(token) => {
                request.set_bearer(&token);
                self.transport.send(request).await
            }
            Err(e) => {
                tracing::warn!(path = %request.path, "Token refresh failed: {}", e);
                self.guard.force_logout();
                Err(e)
            }
        }
    }

    /// Send a request through both hooks
    pub async fn send(&self, mut request: OutgoingRequest) -> Result<TransportResponse> {
        let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();
        tracing::debug!(
            "[{}] {} {}",
            request_id,
            request.method,
            request.path
        );

        self.on_request(&mut request);
        let response = self.transport.send(&request).await?;
        let response = self.on_response(&mut request, response).await?;

        if !response.is_success() {
            tracing::warn!(
                "[{}] {} {} -> {}",
                request_id,
                request.method,
                request.path,
                response.status
            );
        }

        Ok(response)
    }

    pub async fn get(&self, path: &str) -> Result<TransportResponse> {
        self.send(OutgoingRequest::get(path)).await
    }

    pub async fn post(&self, path: &str, body: serde_json::Value) -> Result<TransportResponse> {
        self.send(OutgoingRequest::post(path, body)).await
    }
}
