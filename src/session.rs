// Session policy: page protection, login bookkeeping, logout and proactive refresh

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::json;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::auth::{codec, CredentialStore, LoginRequest, LoginResponse, RefreshCoordinator, UserInfo};
use crate::config::SessionSettings;
use crate::error::{Result, SessionError};
use crate::http_client::Transport;
use crate::navigation::Navigator;

/// Outcome of [`SessionGuard::protect_page`]
#[must_use]
pub struct PageAccess {
    granted: bool,
    background_refresh: Option<JoinHandle<()>>,
}

impl PageAccess {
    fn denied() -> Self {
        Self {
            granted: false,
            background_refresh: None,
        }
    }

    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Whether access was granted while a refresh runs in the background
    pub fn is_refreshing(&self) -> bool {
        self.background_refresh.is_some()
    }

    /// Wait for the background refresh (if any) and return the original verdict
    pub async fn settled(self) -> bool {
        if let Some(handle) = self.background_refresh {
            if let Err(e) = handle.await {
                tracing::warn!("Background refresh task failed: {}", e);
            }
        }
        self.granted
    }
}

/// Public-facing session policy built on the store and the refresh coordinator.
///
/// Cheap to clone: every field is shared.
#[derive(Clone)]
pub struct SessionGuard {
    store: CredentialStore,
    coordinator: Arc<RefreshCoordinator>,
    transport: Arc<dyn Transport>,
    navigator: Arc<dyn Navigator>,
    settings: Arc<SessionSettings>,
}

impl SessionGuard {
    pub fn new(
        store: CredentialStore,
        coordinator: Arc<RefreshCoordinator>,
        transport: Arc<dyn Transport>,
        navigator: Arc<dyn Navigator>,
        settings: Arc<SessionSettings>,
    ) -> Self {
        Self {
            store,
            coordinator,
            transport,
            navigator,
            settings,
        }
    }

    /// True iff an access token is stored. Expiry is not checked.
    pub fn is_authenticated(&self) -> bool {
        self.store.access_token().is_some()
    }

    /// User information carried by the current access token
    pub fn user_from_token(&self) -> Option<UserInfo> {
        let token = self.store.access_token()?;
        codec::decode(&token).map(UserInfo::from)
    }

    /// Gate a protected page.
    ///
    /// Without a session this forces a logout and denies access. With an
    /// expired access token, access is granted right away while a refresh
    /// runs in the background; if that refresh fails the user is logged out.
    pub fn protect_page(&self) -> PageAccess {
        let Some(token) = self.store.access_token() else {
            tracing::info!("No session on protected page, forcing logout");
            self.force_logout();
            return PageAccess::denied();
        };

        if !codec::is_expired(&token) {
            return PageAccess {
                granted: true,
                background_refresh: None,
            };
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("Access token expired but no runtime to refresh it on");
            return PageAccess {
                granted: true,
                background_refresh: None,
            };
        };

        tracing::debug!("Access token expired, refreshing in the background");
        let guard = self.clone();
        let handle = runtime.spawn(async move {
            if let Err(e) = guard.coordinator.refresh().await {
                tracing::warn!("Background refresh failed: {}", e);
                guard.force_logout();
            }
        });

        PageAccess {
            granted: true,
            background_refresh: Some(handle),
        }
    }

    /// Terminal failure path: drop the session and send the user to login,
    /// remembering where they were.
    pub fn force_logout(&self) {
        self.store.clear();

        let current = self.navigator.current_path();
        if current.contains(&self.settings.login_page) {
            return;
        }

        self.store.set_redirect_intent(&current);
        self.navigator.navigate_to(&self.settings.login_page);
    }

    /// Log out: tell the server (best effort), then clear and go to login
    pub async fn logout(&self) {
        let mut headers = HeaderMap::new();
        if let Some(token) = self.store.access_token() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        match self
            .transport
            .post(&self.settings.logout_path, json!({}), headers)
            .await
        {
            Ok(response) if response.is_success() => {
                tracing::debug!("Logout acknowledged by server");
            }
            Ok(response) => {
                tracing::warn!(status = response.status, "Logout endpoint returned an error, continuing");
            }
            Err(e) => {
                tracing::warn!("Logout request failed, continuing: {}", e);
            }
        }

        self.store.clear();
        self.navigator.navigate_to(&self.settings.login_page);
    }

    /// Send the user where they were headed before being forced to log in
    pub fn redirect_after_login(&self) {
        let target = match self.store.take_redirect_intent() {
            Some(path) if path != self.settings.login_page => path,
            _ => self.settings.landing_page.clone(),
        };
        self.navigator.navigate_to(&target);
    }

    /// Record the credentials issued by a successful login
    pub fn establish(&self, access: &str, refresh: Option<&str>, email: Option<&str>) {
        self.store.set_tokens(access, refresh);
        if let Some(email) = email {
            self.store.set_user_email(email);
        }
    }

    /// Authenticate against the login endpoint and continue to the
    /// remembered page.
    pub async fn login(&self, email: &str, password: &str) -> Result<()> {
        let body = serde_json::to_value(LoginRequest { email, password })
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;

        let response = self
            .transport
            .post(&self.settings.login_api_path, body, HeaderMap::new())
            .await?;

        if !response.is_success() {
            tracing::warn!(status = response.status, "Login rejected");
            return Err(SessionError::LoginRejected {
                status: response.status,
                message: response.error_message(),
            });
        }

        let data: LoginResponse = serde_json::from_value(response.data).map_err(|e| {
            SessionError::InvalidResponse(format!("Failed to parse login response: {}", e))
        })?;

        if data.access_token.is_empty() {
            return Err(SessionError::InvalidResponse(
                "Login response does not contain access_token".to_string(),
            ));
        }

        let user_email = data
            .user
            .and_then(|user| user.email)
            .unwrap_or_else(|| email.to_string());
        self.establish(
            &data.access_token,
            data.refresh_token.as_deref(),
            Some(&user_email),
        );
        tracing::info!(email = %user_email, "Logged in");

        self.redirect_after_login();
        Ok(())
    }

    /// Page-load hook: protect pages under the protected prefix, and move an
    /// already authenticated user off the login/register pages.
    pub fn on_page_load(&self) -> Option<PageAccess> {
        let path = self.navigator.current_path();

        if path.starts_with(&self.settings.protected_prefix) {
            return Some(self.protect_page());
        }

        if (path == self.settings.login_page || path == self.settings.register_page)
            && self.is_authenticated()
        {
            self.redirect_after_login();
        }

        None
    }

    /// One beat of the proactive cycle
    pub async fn proactive_refresh(&self) {
        if !self.is_authenticated() {
            return;
        }

        match self.coordinator.refresh().await {
            Ok(_) => tracing::info!("Token renewed automatically"),
            Err(e) => {
                tracing::warn!("Automatic token renewal failed: {}", e);
                self.force_logout();
            }
        }
    }

    /// Run [`Self::proactive_refresh`] every `refresh_interval`, first beat
    /// one full interval from now.
    pub fn spawn_proactive_refresh(&self) -> JoinHandle<()> {
        let guard = self.clone();
        let period = self.settings.refresh_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                guard.proactive_refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::encode_for_test;
    use crate::auth::MemoryStorage;
    use crate::http_client::TransportResponse;
    use crate::navigation::HistoryNavigator;
    use crate::testing::ScriptedTransport;
    use std::time::Duration;

    struct Fixture {
        guard: SessionGuard,
        store: CredentialStore,
        transport: Arc<ScriptedTransport>,
        navigator: Arc<HistoryNavigator>,
    }

    fn fixture(start: &str) -> Fixture {
        let transport = Arc::new(ScriptedTransport::new());
        let navigator = Arc::new(HistoryNavigator::new(start));
        let store = CredentialStore::new(Arc::new(MemoryStorage::new()));
        let settings = Arc::new(SessionSettings {
            refresh_interval: Duration::from_secs(60),
            ..SessionSettings::default()
        });
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            transport.clone(),
            &settings.refresh_path,
        ));
        let guard = SessionGuard::new(
            store.clone(),
            coordinator,
            transport.clone(),
            navigator.clone(),
            settings,
        );
        Fixture {
            guard,
            store,
            transport,
            navigator,
        }
    }

    fn token_expiring_in(secs: i64) -> String {
        encode_for_test(&json!({
            "sub": "42",
            "email": "jane@example.com",
            "is_premium": true,
            "exp": chrono::Utc::now().timestamp() + secs
        }))
    }

    #[test]
    fn test_is_authenticated_is_presence_only() {
        let f = fixture("/dashboard/");
        assert!(!f.guard.is_authenticated());

        f.store.set_tokens("not-even-a-jwt", None);
        assert!(f.guard.is_authenticated());

        f.store.clear();
        assert!(!f.guard.is_authenticated());
    }

    #[test]
    fn test_user_from_token() {
        let f = fixture("/dashboard/");
        assert!(f.guard.user_from_token().is_none());

        f.store.set_tokens(&token_expiring_in(600), Some("R1"));
        let user = f.guard.user_from_token().unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
        assert_eq!(user.is_premium, Some(true));

        f.store.set_tokens("garbage", None);
        assert!(f.guard.user_from_token().is_none());
    }

    #[tokio::test]
    async fn test_protect_page_unauthenticated() {
        let f = fixture("/dashboard/history");
        f.store.set_user_email("stale@example.com");

        let access = f.guard.protect_page();

        assert!(!access.is_granted());
        assert!(f.store.user_email().is_none());
        assert_eq!(f.store.redirect_intent().as_deref(), Some("/dashboard/history"));
        assert_eq!(f.navigator.current_path(), "/login");
        assert_eq!(f.transport.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_protect_page_with_fresh_token() {
        let f = fixture("/dashboard/");
        f.store.set_tokens(&token_expiring_in(600), Some("R1"));

        let access = f.guard.protect_page();

        assert!(access.is_granted());
        assert!(!access.is_refreshing());
        assert!(f.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_protect_page_expired_token_refreshes_in_background() {
        let f = fixture("/dashboard/");
        f.transport.on(
            "/api/auth/refresh",
            Ok(TransportResponse::new(200, json!({"access_token": "T2"}))),
        );
        f.store.set_tokens(&token_expiring_in(-10), Some("R1"));

        let access = f.guard.protect_page();
        assert!(access.is_granted());
        assert!(access.is_refreshing());
        assert!(access.settled().await);

        assert_eq!(f.store.access_token().as_deref(), Some("T2"));
        assert!(f.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_protect_page_failed_background_refresh_forces_logout() {
        let f = fixture("/dashboard/convert");
        f.transport.on(
            "/api/auth/refresh",
            Ok(TransportResponse::new(401, json!({"error": "revoked"}))),
        );
        f.store.set_tokens(&token_expiring_in(-10), Some("R1"));

        let access = f.guard.protect_page();
        // Optimistic verdict stands even though the refresh fails
        assert!(access.settled().await);

        assert!(!f.guard.is_authenticated());
        assert_eq!(f.navigator.current_path(), "/login");
        assert_eq!(f.store.redirect_intent().as_deref(), Some("/dashboard/convert"));
    }

    #[test]
    fn test_force_logout_on_login_page_does_not_loop() {
        let f = fixture("/login");
        f.store.set_tokens("T1", Some("R1"));

        f.guard.force_logout();

        assert!(!f.guard.is_authenticated());
        assert!(f.store.redirect_intent().is_none());
        assert!(f.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_logout_ignores_endpoint_failure() {
        let f = fixture("/dashboard/");
        f.transport.on(
            "/api/auth/logout",
            Err(SessionError::Transport("connection refused".to_string())),
        );
        f.store.set_tokens("T1", Some("R1"));

        f.guard.logout().await;

        assert!(!f.guard.is_authenticated());
        assert!(f.store.refresh_token().is_none());
        assert_eq!(f.navigator.current_path(), "/login");
        assert_eq!(f.transport.calls_to("/api/auth/logout"), 1);
    }

    #[tokio::test]
    async fn test_logout_bears_access_token() {
        let f = fixture("/dashboard/");
        f.transport.on(
            "/api/auth/logout",
            Ok(TransportResponse::new(200, json!({"message": "ok"}))),
        );
        f.store.set_tokens("T1", Some("R1"));

        f.guard.logout().await;

        let requests = f.transport.requests.lock();
        assert_eq!(requests[0].bearer(), Some("T1"));
    }

    #[test]
    fn test_redirect_after_login_without_intent_goes_to_landing() {
        let f = fixture("/login");
        f.guard.redirect_after_login();
        assert_eq!(f.navigator.current_path(), "/dashboard/");
    }

    #[test]
    fn test_redirect_after_login_consumes_intent() {
        let f = fixture("/login");
        f.store.set_redirect_intent("/dashboard/history");

        f.guard.redirect_after_login();
        assert_eq!(f.navigator.current_path(), "/dashboard/history");
        assert!(f.store.redirect_intent().is_none());

        f.guard.redirect_after_login();
        assert_eq!(f.navigator.current_path(), "/dashboard/");
    }

    #[test]
    fn test_redirect_after_login_ignores_login_intent() {
        let f = fixture("/login");
        f.store.set_redirect_intent("/login");

        f.guard.redirect_after_login();
        assert_eq!(f.navigator.current_path(), "/dashboard/");
    }

    #[tokio::test]
    async fn test_login_establishes_session_and_redirects() {
        let f = fixture("/login");
        f.store.set_redirect_intent("/dashboard/favorites");
        f.transport.on(
            "/api/auth/login",
            Ok(TransportResponse::new(
                200,
                json!({
                    "message": "ok",
                    "user": {"email": "jane@example.com"},
                    "access_token": "A1",
                    "refresh_token": "R1",
                    "session_id": 3
                }),
            )),
        );

        f.guard.login("jane@example.com", "pw").await.unwrap();

        assert_eq!(f.store.access_token().as_deref(), Some("A1"));
        assert_eq!(f.store.refresh_token().as_deref(), Some("R1"));
        assert_eq!(f.store.user_email().as_deref(), Some("jane@example.com"));
        assert_eq!(f.navigator.current_path(), "/dashboard/favorites");

        let requests = f.transport.requests.lock();
        assert_eq!(
            requests[0].body,
            Some(json!({"email": "jane@example.com", "password": "pw"}))
        );
    }

    #[tokio::test]
    async fn test_login_rejected_stores_nothing() {
        let f = fixture("/login");
        f.transport.on(
            "/api/auth/login",
            Ok(TransportResponse::new(401, json!({"error": "Invalid credentials"}))),
        );

        let err = f.guard.login("jane@example.com", "bad").await.unwrap_err();

        assert_eq!(
            err,
            SessionError::LoginRejected {
                status: 401,
                message: "Invalid credentials".to_string()
            }
        );
        assert!(!f.guard.is_authenticated());
        assert_eq!(f.navigator.current_path(), "/login");
    }

    #[tokio::test]
    async fn test_on_page_load_protects_dashboard() {
        let f = fixture("/dashboard/history");
        let access = f.guard.on_page_load().unwrap();
        assert!(!access.is_granted());
        assert_eq!(f.navigator.current_path(), "/login");
    }

    #[test]
    fn test_on_page_load_redirects_authenticated_user_off_login() {
        let f = fixture("/register");
        f.store.set_tokens("T1", Some("R1"));

        assert!(f.guard.on_page_load().is_none());
        assert_eq!(f.navigator.current_path(), "/dashboard/");
    }

    #[test]
    fn test_on_page_load_leaves_public_pages_alone() {
        let f = fixture("/about");
        assert!(f.guard.on_page_load().is_none());
        assert!(f.navigator.history().is_empty());
    }

    #[tokio::test]
    async fn test_proactive_refresh_skips_without_session() {
        let f = fixture("/dashboard/");
        f.guard.proactive_refresh().await;
        assert_eq!(f.transport.total_calls(), 0);
        assert!(f.navigator.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_proactive_cycle_runs_on_fixed_interval() {
        let f = fixture("/dashboard/");
        f.transport.on(
            "/api/auth/refresh",
            Ok(TransportResponse::new(200, json!({"access_token": "T2"}))),
        );
        f.store.set_tokens("T1", Some("R1"));

        let handle = f.guard.spawn_proactive_refresh();

        // Nothing before the first full interval
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(f.transport.calls_to("/api/auth/refresh"), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(f.transport.calls_to("/api/auth/refresh"), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.transport.calls_to("/api/auth/refresh"), 2);
        assert_eq!(f.store.access_token().as_deref(), Some("T2"));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_proactive_cycle_failure_forces_logout() {
        let f = fixture("/dashboard/rates");
        f.transport.on(
            "/api/auth/refresh",
            Ok(TransportResponse::new(401, json!({"error": "expired"}))),
        );
        f.store.set_tokens("T1", Some("R1"));

        let handle = f.guard.spawn_proactive_refresh();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert!(!f.guard.is_authenticated());
        assert_eq!(f.navigator.current_path(), "/login");
        assert_eq!(f.store.redirect_intent().as_deref(), Some("/dashboard/rates"));

        // Later beats see no session and stay quiet
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.transport.calls_to("/api/auth/refresh"), 1);

        handle.abort();
    }
}
