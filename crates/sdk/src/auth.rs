//! Client-credentials token cache.
//!
//! [`TokenManager`] hands out a bearer token for the Marketo REST API and
//! only goes back to the identity service when the cached token is missing or
//! past its (margin-adjusted) expiry.

use crate::config::{ClientConfig, Credentials};
use crate::error::{MarketoError, MarketoResult};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

/// Source of the current time for expiry checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A bearer token together with the instant it stops being handed out.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CachedToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Body of a successful `/oauth/token` exchange.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Caches one bearer token and renews it on demand.
///
/// The check-fetch-store sequence runs under a single async mutex, so
/// concurrent callers that find the cache empty share one exchange.
pub struct TokenManager {
    http: Client,
    token_url: Url,
    credentials: Credentials,
    safety_margin: chrono::Duration,
    clock: Arc<dyn Clock>,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(http: Client, config: &ClientConfig) -> MarketoResult<Self> {
        let safety_margin = chrono::Duration::from_std(config.token_safety_margin)
            .map_err(|_| MarketoError::Config("token safety margin is out of range".to_string()))?;

        Ok(Self {
            http,
            token_url: config.token_url()?,
            credentials: config.credentials.clone(),
            safety_margin,
            clock: Arc::new(SystemClock),
            cached: Mutex::new(None),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Return a currently valid token, fetching a new one if needed.
    pub async fn get_token(&self) -> MarketoResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid_at(self.clock.now()) {
                return Ok(token.value.clone());
            }
            debug!(expires_at = %token.expires_at, "Cached token expired");
        }

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Fetch a new token even if the cached one is still valid.
    ///
    /// On failure the previously cached token is kept.
    pub async fn refresh(&self) -> MarketoResult<String> {
        let mut cached = self.cached.lock().await;

        let token = self.fetch_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token so the next call re-authenticates.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    /// Snapshot of the cached token, if any.
    pub async fn cached_token(&self) -> Option<CachedToken> {
        self.cached.lock().await.clone()
    }

    async fn fetch_token(&self) -> MarketoResult<CachedToken> {
        debug!(url = %self.token_url, "Requesting access token");

        let response = self
            .http
            .get(self.token_url.clone())
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id()),
                ("client_secret", self.credentials.client_secret()),
            ])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Token request failed");
                MarketoError::Authentication {
                    message: e.to_string(),
                    details: None,
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| MarketoError::Authentication {
            message: format!("failed to read token response: {}", e),
            details: None,
        })?;

        if !status.is_success() {
            let err = MarketoError::authentication(Some(status.as_u16()), &body);
            warn!(status = status.as_u16(), error = %err, "Token request rejected");
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            warn!(error = %e, "Malformed token response");
            MarketoError::Authentication {
                message: format!("malformed token response: {}", e),
                details: serde_json::from_str(&body).ok(),
            }
        })?;

        if parsed.access_token.trim().is_empty() {
            return Err(MarketoError::Authentication {
                message: "token response did not contain an access token".to_string(),
                details: serde_json::from_str(&body).ok(),
            });
        }

        let now = self.clock.now();
        let expires_at = chrono::Duration::try_seconds(parsed.expires_in)
            .and_then(|lifetime| lifetime.checked_sub(&self.safety_margin))
            .and_then(|lifetime| {
                if lifetime <= chrono::Duration::zero() {
                    warn!(
                        expires_in = parsed.expires_in,
                        "Token lifetime is shorter than the safety margin"
                    );
                }
                now.checked_add_signed(lifetime)
            })
            .ok_or_else(|| {
                warn!(expires_in = parsed.expires_in, "Token lifetime out of range");
                MarketoError::Authentication {
                    message: "token response has an invalid expires_in".to_string(),
                    details: serde_json::from_str(&body).ok(),
                }
            })?;

        info!(
            expires_at = %expires_at,
            token_type = parsed.token_type.as_deref().unwrap_or("bearer"),
            scope = parsed.scope.as_deref().unwrap_or(""),
            "Obtained Marketo access token"
        );

        Ok(CachedToken {
            value: parsed.access_token,
            expires_at,
        })
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenManager")
            .field("token_url", &self.token_url)
            .field("credentials", &self.credentials)
            .field("safety_margin", &self.safety_margin)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Clock that only moves when told to.
    #[derive(Debug)]
    pub(crate) struct ManualClock {
        now: StdMutex<DateTime<Utc>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: StdMutex::new(Utc::now()),
            })
        }

        pub(crate) fn advance(&self, by: chrono::Duration) {
            let mut now = self.now.lock().unwrap();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap()
        }
    }

    pub(crate) fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
        json!({
            "access_token": token,
            "token_type": "bearer",
            "expires_in": expires_in,
            "scope": "api@example.com"
        })
    }

    fn create_config(server: &MockServer) -> ClientConfig {
        let base_url = Url::parse(&format!("{}/rest", server.uri())).unwrap();
        ClientConfig::new(base_url, Credentials::new("client-id", "client-secret").unwrap())
    }

    fn create_manager(server: &MockServer, clock: Arc<ManualClock>) -> TokenManager {
        TokenManager::new(Client::new(), &create_config(server))
            .unwrap()
            .with_clock(clock)
    }

    #[tokio::test]
    async fn test_fetches_with_client_credentials() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .and(query_param("grant_type", "client_credentials"))
            .and(query_param("client_id", "client-id"))
            .and(query_param("client_secret", "client-secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let manager = create_manager(&server, ManualClock::new());

        assert_eq!(manager.get_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_cache_hit_within_lifetime() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let manager = create_manager(&server, clock.clone());

        for _ in 0..5 {
            assert_eq!(manager.get_token().await.unwrap(), "tok-1");
            clock.advance(chrono::Duration::seconds(600));
        }
    }

    #[tokio::test]
    async fn test_expiry_subtracts_safety_margin() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let fetched_at = clock.now();
        let manager = create_manager(&server, clock.clone());

        manager.get_token().await.unwrap();
        let cached = manager.cached_token().await.unwrap();

        assert_eq!(cached.expires_at, fetched_at + chrono::Duration::seconds(3540));
    }

    #[tokio::test]
    async fn test_no_refetch_just_before_expiry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let manager = create_manager(&server, clock.clone());

        manager.get_token().await.unwrap();
        clock.advance(chrono::Duration::seconds(3539));

        assert_eq!(manager.get_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_refetch_once_after_expiry() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-2", 3600)))
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let manager = create_manager(&server, clock.clone());

        assert_eq!(manager.get_token().await.unwrap(), "tok-1");
        clock.advance(chrono::Duration::seconds(3541));

        assert_eq!(manager.get_token().await.unwrap(), "tok-2");
        assert_eq!(manager.get_token().await.unwrap(), "tok-2");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_valid_token() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(
                ResponseTemplate::new(500).set_body_json(json!({"error": "server_error"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let manager = create_manager(&server, clock.clone());

        manager.get_token().await.unwrap();
        clock.advance(chrono::Duration::seconds(100));

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, MarketoError::Authentication { .. }));

        // Still served from cache, no further exchange.
        assert_eq!(manager.get_token().await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn test_failure_after_expiry_surfaces() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "unauthorized",
                "error_description": "Bad client credentials"
            })))
            .mount(&server)
            .await;

        let clock = ManualClock::new();
        let manager = create_manager(&server, clock.clone());

        manager.get_token().await.unwrap();
        clock.advance(chrono::Duration::seconds(3600));

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to authenticate with Marketo: Bad client credentials"
        );
        // The expired token is not handed out as a fallback.
        let cached = manager.cached_token().await.unwrap();
        assert!(!cached.is_valid_at(clock.now()));
    }

    #[tokio::test]
    async fn test_malformed_token_response() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let manager = create_manager(&server, ManualClock::new());

        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, MarketoError::Authentication { .. }));
        assert!(manager.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_out_of_range_expires_in_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", i64::MAX)))
            .mount(&server)
            .await;

        let manager = create_manager(&server, ManualClock::new());

        let err = manager.get_token().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to authenticate with Marketo: token response has an invalid expires_in"
        );
        assert!(err.details().is_some());
        assert!(manager.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_empty_access_token_is_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("", 3600)))
            .mount(&server)
            .await;

        let manager = create_manager(&server, ManualClock::new());

        assert!(manager.get_token().await.is_err());
        assert!(manager.cached_token().await.is_none());
    }

    #[tokio::test]
    async fn test_invalidate_forces_new_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("tok-1", 3600)))
            .expect(2)
            .mount(&server)
            .await;

        let manager = create_manager(&server, ManualClock::new());

        manager.get_token().await.unwrap();
        manager.invalidate().await;
        assert!(manager.cached_token().await.is_none());
        manager.get_token().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_exchange() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/identity/oauth/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("tok-1", 3600))
                    .set_delay(std::time::Duration::from_millis(50)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let manager = Arc::new(create_manager(&server, ManualClock::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_token().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "tok-1");
        }
    }

    #[tokio::test]
    async fn test_unreachable_identity_endpoint() {
        let config = ClientConfig::new(
            Url::parse("http://127.0.0.1:9/rest").unwrap(),
            Credentials::new("id", "secret").unwrap(),
        );
        let manager = TokenManager::new(Client::new(), &config).unwrap();

        let err = manager.get_token().await.unwrap_err();
        assert!(matches!(err, MarketoError::Authentication { .. }));
    }
}
