// Explicit wiring of the session components

use std::sync::Arc;

use crate::auth::{CredentialStore, RefreshCoordinator, Storage};
use crate::config::SessionSettings;
use crate::http_client::Transport;
use crate::middleware::AuthInterceptor;
use crate::navigation::Navigator;
use crate::session::SessionGuard;

/// Everything that owns a request pipeline or page lifecycle needs,
/// built once and handed over explicitly.
///
/// Each context has its own refresh state, so independent contexts never
/// share a refresh in flight.
#[derive(Clone)]
pub struct SessionContext {
    pub store: CredentialStore,
    pub coordinator: Arc<RefreshCoordinator>,
    pub guard: SessionGuard,
    pub interceptor: AuthInterceptor,
    pub settings: Arc<SessionSettings>,
}

impl SessionContext {
    pub fn new(
        settings: SessionSettings,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let settings = Arc::new(settings);
        let store = CredentialStore::new(storage);
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            &settings.refresh_path,
        ));
        let guard = SessionGuard::new(
            store.clone(),
            coordinator.clone(),
            transport.clone(),
            navigator,
            settings.clone(),
        );
        let interceptor =
            AuthInterceptor::new(store.clone(), coordinator.clone(), transport, guard.clone());

        tracing::debug!(
            refresh_path = %settings.refresh_path,
            interval_secs = settings.refresh_interval.as_secs(),
            "Session context initialized"
        );

        Self {
            store,
            coordinator,
            guard,
            interceptor,
            settings,
        }
    }
}
