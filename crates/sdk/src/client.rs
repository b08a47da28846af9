//! Main client for the Marketo SDK.

use crate::auth::{Clock, TokenManager};
use crate::config::{ClientConfig, Credentials, DEFAULT_TIMEOUT, DEFAULT_TOKEN_SAFETY_MARGIN};
use crate::error::{MarketoError, MarketoResult};
use crate::transport::{ApiRequest, HttpTransport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Authenticated client for the Marketo REST API.
///
/// Cloning is cheap; clones share the HTTP connection pool and the token
/// cache.
#[derive(Debug, Clone)]
pub struct MarketoClient {
    config: Arc<ClientConfig>,
    http: HttpTransport,
}

impl MarketoClient {
    /// Create a new client builder.
    pub fn builder() -> MarketoClientBuilder {
        MarketoClientBuilder::new()
    }

    /// Create a client from configuration.
    pub fn from_config(config: ClientConfig) -> MarketoResult<Self> {
        Self::from_config_with_clock(config, None)
    }

    fn from_config_with_clock(config: ClientConfig, clock: Option<Arc<dyn Clock>>) -> MarketoResult<Self> {
        let config = Arc::new(config);
        let client = HttpTransport::build_client(&config)?;

        let mut tokens = TokenManager::new(client.clone(), &config)?;
        if let Some(clock) = clock {
            tokens = tokens.with_clock(clock);
        }

        let http = HttpTransport::with_parts(client, config.clone(), Arc::new(tokens));
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Token cache shared by every request made through this client.
    pub fn token_manager(&self) -> &Arc<TokenManager> {
        self.http.token_manager()
    }

    /// Perform one authenticated call against `base_url + endpoint`.
    pub async fn request(&self, request: ApiRequest) -> MarketoResult<Value> {
        self.http.request(request).await
    }
}

/// Builder for creating a MarketoClient.
pub struct MarketoClientBuilder {
    base_url: Option<String>,
    identity_url: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    timeout: Duration,
    token_safety_margin: Duration,
    clock: Option<Arc<dyn Clock>>,
}

impl MarketoClientBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            base_url: None,
            identity_url: None,
            client_id: None,
            client_secret: None,
            timeout: DEFAULT_TIMEOUT,
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
            clock: None,
        }
    }

    /// Set the REST base URL, e.g. `https://123-abc-456.mktorest.com/rest`.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Override the identity service URL derived from the base URL.
    pub fn identity_url(mut self, url: impl Into<String>) -> Self {
        self.identity_url = Some(url.into());
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = Some(id.into());
        self
    }

    pub fn client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long before the reported expiry a token stops being used.
    pub fn token_safety_margin(mut self, margin: Duration) -> Self {
        self.token_safety_margin = margin;
        self
    }

    /// Use a custom time source for token expiry.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the client.
    pub fn build(self) -> MarketoResult<MarketoClient> {
        let base_url_str = self
            .base_url
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| MarketoError::Config("base_url is required".to_string()))?;
        let base_url = Url::parse(base_url_str.trim())?;

        let credentials = Credentials::new(
            self.client_id.unwrap_or_default(),
            self.client_secret.unwrap_or_default(),
        )?;

        let mut config = ClientConfig::new(base_url, credentials);
        if let Some(identity_url) = self.identity_url.filter(|s| !s.trim().is_empty()) {
            config.identity_url = Url::parse(identity_url.trim())?;
        }
        config.timeout = self.timeout;
        config.token_safety_margin = self.token_safety_margin;

        MarketoClient::from_config_with_clock(config, self.clock)
    }
}

impl Default for MarketoClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
