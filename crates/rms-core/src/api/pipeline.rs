//! Authenticated request pipeline.
//!
//! Every API call goes through [`AuthPipeline::execute`], which attaches the
//! stored access token, and on a 401 performs a single refresh through
//! `POST /auth/refresh` followed by a single retry of the original request.
//! When the session cannot be recovered, storage is wiped and the injected
//! session-expired callback fires.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use crate::auth::{SessionStorage, StorageKey};
use crate::models::{RefreshRequest, RefreshResponse};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Endpoint that exchanges a refresh token for a new access token
const REFRESH_PATH: &str = "/auth/refresh";

/// Default HTTP request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Callback fired when the session is irrecoverably expired.
/// The CLI uses it to point the user back at `rms login`.
pub type SessionTerminator = Arc<dyn Fn() + Send + Sync>;

// ============================================================================
// Request / response
// ============================================================================

/// Immutable description of an outbound call. Executed at most twice
/// (original + retry after refresh), so it is never consumed by sending.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    params: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body
    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    /// Append a query parameter
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.push((key.to_string(), value.to_string()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Raw outcome of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JSON response: {}", e)))
    }

    /// Non-2xx statuses become `ApiError::Http`, body preserved
    fn into_result(self) -> Result<Self, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::from_status(self.status, &self.body))
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Clone is cheap: the reqwest client and storage are both shared.
#[derive(Clone)]
pub struct AuthPipeline {
    client: Client,
    base_url: String,
    storage: Arc<dyn SessionStorage>,
    on_session_expired: SessionTerminator,
}

impl AuthPipeline {
    pub fn new(base_url: &str, storage: Arc<dyn SessionStorage>) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, storage, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        storage: Arc<dyn SessionStorage>,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, storage))
    }

    /// Build on an existing client, sharing its connection pool
    pub fn with_client(client: Client, base_url: &str, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            storage,
            on_session_expired: Arc::new(|| {}),
        }
    }

    /// Set the callback fired after the session has been wiped
    pub fn on_session_expired(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Arc::new(callback);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage(&self) -> &dyn SessionStorage {
        self.storage.as_ref()
    }

    /// Execute a request with the stored bearer token, refreshing once on 401.
    ///
    /// - Non-401 responses are returned as-is (2xx as `Ok`, others as `ApiError::Http`).
    /// - A 401 with no stored refresh token, or a failed refresh, wipes storage,
    ///   fires the session-expired callback and returns `ApiError::SessionExpired`.
    /// - After a successful refresh the original request is retried exactly once;
    ///   whatever that retry returns is the result, including another 401.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        let token = self
            .storage
            .get(StorageKey::AccessToken)
            .map_err(ApiError::storage)?;

        let response = self.send(request, token.as_deref()).await?;
        if response.status != StatusCode::UNAUTHORIZED {
            return response.into_result();
        }

        debug!(path = %request.path, "Access token rejected, attempting refresh");

        let Some(refresh_token) = self
            .storage
            .get(StorageKey::RefreshToken)
            .map_err(ApiError::storage)?
        else {
            debug!("No refresh token stored");
            return Err(self.expire_session());
        };

        let refreshed = match self.refresh(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(self.expire_session());
            }
        };

        self.storage
            .set(StorageKey::AccessToken, &refreshed.access_token)
            .map_err(ApiError::storage)?;
        if let Some(ref rotated) = refreshed.refresh_token {
            self.storage
                .set(StorageKey::RefreshToken, rotated)
                .map_err(ApiError::storage)?;
        }
        info!(path = %request.path, "Access token refreshed, retrying request");

        self.send(request, Some(&refreshed.access_token))
            .await?
            .into_result()
    }

    /// Execute without credentials and without 401 handling.
    /// Used for login and registration, where a 401 means bad input.
    pub async fn execute_public(&self, request: &RequestDescriptor) -> Result<ApiResponse, ApiError> {
        self.send(request, None).await?.into_result()
    }

    /// Wipe the session and fire the session-expired callback.
    /// Returns the synthesized failure for the caller to surface.
    pub fn expire_session(&self) -> ApiError {
        warn!("Session expired, clearing stored credentials");
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "Failed to clear session storage");
        }
        (self.on_session_expired)();
        ApiError::SessionExpired
    }

    /// End the session on logout. Wipes storage without firing the
    /// session-expired callback.
    pub fn end_session(&self) -> Result<(), ApiError> {
        self.storage.clear().map_err(ApiError::storage)?;
        debug!("Session ended, stored credentials cleared");
        Ok(())
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let request = RequestDescriptor::post(REFRESH_PATH).json(&RefreshRequest { refresh_token })?;
        self.send(&request, None).await?.into_result()?.json()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        request: &RequestDescriptor,
        token: Option<&str>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let mut builder = self.client.request(request.method.clone(), &url);

        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            "API request completed"
        );

        Ok(ApiResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mockito::{Matcher, Mock, Server, ServerGuard};
    use serde_json::json;

    use super::*;
    use crate::auth::MemoryStorage;
    use crate::models::User;

    const USERS_JSON: &str = r#"[{"id": 1, "email": "admin@example.com", "fullName": "Ada Admin", "is_active": true, "role": "admin", "is_superuser": true}]"#;

    /// Memory storage that counts mutations, optionally rejecting writes
    #[derive(Default)]
    struct CountingStorage {
        inner: MemoryStorage,
        writes: AtomicUsize,
        read_only: bool,
    }

    impl CountingStorage {
        fn with(self, key: StorageKey, value: &str) -> Self {
            Self {
                inner: self.inner.with(key, value),
                ..self
            }
        }

        fn read_only(self) -> Self {
            Self {
                read_only: true,
                ..self
            }
        }

        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }
    }

    impl SessionStorage for CountingStorage {
        fn get(&self, key: StorageKey) -> anyhow::Result<Option<String>> {
            self.inner.get(key)
        }

        fn set(&self, key: StorageKey, value: &str) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.read_only {
                anyhow::bail!("storage is read-only");
            }
            self.inner.set(key, value)
        }

        fn remove(&self, key: StorageKey) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.remove(key)
        }

        fn clear(&self) -> anyhow::Result<()> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.clear()
        }
    }

    struct TestSetup {
        server: ServerGuard,
        storage: Arc<CountingStorage>,
        expirations: Arc<AtomicUsize>,
        pipeline: AuthPipeline,
    }

    impl TestSetup {
        async fn new(storage: CountingStorage) -> Self {
            let server = Server::new_async().await;
            let storage = Arc::new(storage);
            let expirations = Arc::new(AtomicUsize::new(0));

            let counter = expirations.clone();
            let pipeline = AuthPipeline::new(&server.url(), storage.clone())
                .expect("Failed to build pipeline")
                .on_session_expired(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });

            Self {
                server,
                storage,
                expirations,
                pipeline,
            }
        }

        fn expirations(&self) -> usize {
            self.expirations.load(Ordering::SeqCst)
        }

        fn stored(&self, key: StorageKey) -> Option<String> {
            self.storage.get(key).unwrap()
        }

        async fn users_endpoint(&mut self, token: &str, status: usize, expected: usize) -> Mock {
            self.server
                .mock("GET", "/auth/users")
                .match_header("authorization", format!("Bearer {}", token).as_str())
                .with_status(status)
                .with_header("content-type", "application/json")
                .with_body(if status == 200 { USERS_JSON } else { r#"{"detail": "Not authenticated"}"# })
                .expect(expected)
                .create_async()
                .await
        }

        async fn refresh_endpoint(
            &mut self,
            refresh_token: &str,
            status: usize,
            body: &str,
            expected: usize,
        ) -> Mock {
            self.server
                .mock("POST", "/auth/refresh")
                .match_header("authorization", Matcher::Missing)
                .match_body(Matcher::Json(json!({ "refresh_token": refresh_token })))
                .with_status(status)
                .with_header("content-type", "application/json")
                .with_body(body)
                .expect(expected)
                .create_async()
                .await
        }
    }

    fn session(access: &str, refresh: Option<&str>) -> CountingStorage {
        let storage = CountingStorage::default().with(StorageKey::AccessToken, access);
        match refresh {
            Some(refresh) => storage.with(StorageKey::RefreshToken, refresh),
            None => storage,
        }
    }

    #[tokio::test]
    async fn test_success_passes_through_without_touching_storage() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let users = setup.users_endpoint("a1", 200, 2).await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 0).await;

        let request = RequestDescriptor::get("/auth/users");
        for _ in 0..2 {
            let response = setup.pipeline.execute(&request).await.unwrap();
            let parsed: Vec<User> = response.json().unwrap();
            assert_eq!(parsed.len(), 1);
            assert_eq!(parsed[0].email, "admin@example.com");
        }

        users.assert_async().await;
        refresh.assert_async().await;
        assert_eq!(setup.storage.writes(), 0);
        assert_eq!(setup.expirations(), 0);
    }

    #[tokio::test]
    async fn test_non_401_errors_pass_through() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let forbidden = setup
            .server
            .mock("DELETE", "/auth/users/5")
            .with_status(403)
            .with_body(r#"{"detail": "Not enough permissions"}"#)
            .expect(1)
            .create_async()
            .await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 0).await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::delete("/auth/users/5"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(403));
        assert_eq!(err.detail(), "Not enough permissions");
        forbidden.assert_async().await;
        refresh.assert_async().await;
        assert_eq!(setup.storage.writes(), 0);
        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a1"));
    }

    #[tokio::test]
    async fn test_no_token_sends_no_authorization_header() {
        let mut setup = TestSetup::new(CountingStorage::default()).await;
        let me = setup
            .server
            .mock("GET", "/auth/me")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(r#"{"id": 2, "email": "e@example.com", "role": "employee"}"#)
            .create_async()
            .await;

        let response = setup.pipeline.execute(&RequestDescriptor::get("/auth/me")).await.unwrap();
        let user: User = response.json().unwrap();
        assert_eq!(user.id, 2);
        me.assert_async().await;
    }

    #[tokio::test]
    async fn test_refresh_then_retry_returns_retry_outcome() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 1).await;
        let retried = setup.users_endpoint("a2", 200, 1).await;

        let response = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap();
        let users: Vec<User> = response.json().unwrap();

        assert_eq!(users[0].id, 1);
        rejected.assert_async().await;
        refresh.assert_async().await;
        retried.assert_async().await;
        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a2"));
        assert_eq!(setup.stored(StorageKey::RefreshToken).as_deref(), Some("r1"));
        assert_eq!(setup.storage.writes(), 1);
        assert_eq!(setup.expirations(), 0);
    }

    #[tokio::test]
    async fn test_second_401_is_returned_not_retried() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 1).await;
        let rejected_again = setup.users_endpoint("a2", 401, 1).await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert!(!err.is_session_expired());
        rejected.assert_async().await;
        refresh.assert_async().await;
        rejected_again.assert_async().await;
        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a2"));
        assert_eq!(setup.expirations(), 0);
    }

    #[tokio::test]
    async fn test_401_without_refresh_token_expires_session() {
        let storage = session("a1", None).with(StorageKey::Theme, "dark");
        let mut setup = TestSetup::new(storage).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        let refresh = setup
            .server
            .mock("POST", "/auth/refresh")
            .expect(0)
            .create_async()
            .await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        assert_eq!(err.status_marker().as_deref(), Some("CUSTOM_ERROR"));
        rejected.assert_async().await;
        refresh.assert_async().await;
        assert!(setup.storage.inner.is_empty());
        assert_eq!(setup.expirations(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_expires_session_without_retry() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        let refresh = setup
            .refresh_endpoint("r1", 401, r#"{"detail": "Invalid refresh token"}"#, 1)
            .await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        rejected.assert_async().await;
        refresh.assert_async().await;
        assert!(setup.storage.inner.is_empty());
        assert_eq!(setup.expirations(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_refresh_response_expires_session() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let _rejected = setup.users_endpoint("a1", 401, 1).await;
        let _refresh = setup.refresh_endpoint("r1", 200, r#"{"token": "a2"}"#, 1).await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        assert_eq!(setup.stored(StorageKey::AccessToken), None);
        assert_eq!(setup.expirations(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_refresh_expires_session_without_retry() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        // Stalls past the client timeout so the refresh fails in transport
        let refresh = setup
            .server
            .mock("POST", "/auth/refresh")
            .with_status(200)
            .with_chunked_body(|w| {
                std::thread::sleep(Duration::from_secs(3));
                w.write_all(br#"{"access_token": "a2"}"#)
            })
            .expect(1)
            .create_async()
            .await;

        let counter = setup.expirations.clone();
        let pipeline = AuthPipeline::with_timeout(
            &setup.server.url(),
            setup.storage.clone(),
            Duration::from_millis(500),
        )
        .unwrap()
        .on_session_expired(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert!(err.is_session_expired());
        rejected.assert_async().await;
        refresh.assert_async().await;
        assert!(setup.storage.inner.is_empty());
        assert_eq!(setup.expirations(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_after_refresh_skips_retry() {
        let mut setup = TestSetup::new(session("a1", Some("r1")).read_only()).await;
        let rejected = setup.users_endpoint("a1", 401, 1).await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 1).await;
        let retried = setup.users_endpoint("a2", 200, 0).await;

        let err = setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Storage(_)));
        rejected.assert_async().await;
        refresh.assert_async().await;
        retried.assert_async().await;
        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a1"));
        assert_eq!(setup.expirations(), 0);
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_is_persisted() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let _rejected = setup.users_endpoint("a1", 401, 1).await;
        let _refresh = setup
            .refresh_endpoint("r1", 200, r#"{"access_token": "a2", "refresh_token": "r2"}"#, 1)
            .await;
        let _retried = setup.users_endpoint("a2", 200, 1).await;

        setup
            .pipeline
            .execute(&RequestDescriptor::get("/auth/users"))
            .await
            .unwrap();

        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a2"));
        assert_eq!(setup.stored(StorageKey::RefreshToken).as_deref(), Some("r2"));
    }

    #[tokio::test]
    async fn test_concurrent_401s_each_refresh() {
        let mut setup = TestSetup::new(session("a1", Some("r1"))).await;
        let rejected = setup.users_endpoint("a1", 401, 2).await;
        let refresh = setup.refresh_endpoint("r1", 200, r#"{"access_token": "a2"}"#, 2).await;
        let retried = setup.users_endpoint("a2", 200, 2).await;

        let request = RequestDescriptor::get("/auth/users");
        let (first, second) = futures::future::join(
            setup.pipeline.execute(&request),
            setup.pipeline.execute(&request),
        )
        .await;

        assert!(first.is_ok());
        assert!(second.is_ok());
        rejected.assert_async().await;
        refresh.assert_async().await;
        retried.assert_async().await;
        assert_eq!(setup.stored(StorageKey::AccessToken).as_deref(), Some("a2"));
    }

    #[tokio::test]
    async fn test_query_params_and_json_body_are_sent() {
        let mut setup = TestSetup::new(session("a1", None)).await;
        let patch = setup
            .server
            .mock("PATCH", "/auth/users/9/role")
            .match_header("authorization", "Bearer a1")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("role".into(), "hr".into()),
                Matcher::UrlEncoded("is_superuser".into(), "false".into()),
            ]))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let request = RequestDescriptor::patch("/auth/users/9/role")
            .param("role", "hr")
            .param("is_superuser", false);
        setup.pipeline.execute(&request).await.unwrap();
        patch.assert_async().await;
    }

    #[tokio::test]
    async fn test_transport_errors_pass_through() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new().with(StorageKey::AccessToken, "a1"));
        let pipeline = AuthPipeline::with_timeout("http://127.0.0.1:1", storage.clone(), Duration::from_secs(2))
            .unwrap();

        let err = pipeline
            .execute(&RequestDescriptor::get("/auth/me"))
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::Network(_)));
        assert_eq!(storage.get(StorageKey::AccessToken).unwrap().as_deref(), Some("a1"));
    }

    #[test]
    fn test_url_joining() {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let pipeline = AuthPipeline::with_client(Client::new(), "http://localhost:8000/", storage);
        assert_eq!(pipeline.base_url(), "http://localhost:8000");
        assert_eq!(pipeline.url("/auth/me"), "http://localhost:8000/auth/me");
        assert_eq!(pipeline.url("auth/me"), "http://localhost:8000/auth/me");
    }
}
