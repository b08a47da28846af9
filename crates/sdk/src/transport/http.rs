//! Authenticated HTTP transport for the Marketo REST API.

use crate::auth::TokenManager;
use crate::config::ClientConfig;
use crate::error::{MarketoError, MarketoResult};
use reqwest::{header, Client, RequestBuilder};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP method accepted by the Marketo endpoints this crate relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => f.write_str("GET"),
            Self::Post => f.write_str("POST"),
        }
    }
}

/// Payload encoding of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Json,
    FormUrlEncoded,
    /// Any other media type; the body is still sent as JSON.
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::Other(value) => value.as_str(),
        }
    }
}

impl From<&str> for ContentType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "application/json" => Self::Json,
            "application/x-www-form-urlencoded" => Self::FormUrlEncoded,
            _ => Self::Other(value.to_string()),
        }
    }
}

/// One outbound call: endpoint (with its query string), method, optional
/// body and how to encode it.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub endpoint: String,
    pub method: Method,
    pub body: Option<Value>,
    pub content_type: ContentType,
}

impl ApiRequest {
    pub fn new(method: Method, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            body: None,
            content_type: ContentType::Json,
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self::new(Method::Post, endpoint)
    }

    /// Attach a body sent as JSON.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self.content_type = ContentType::Json;
        self
    }

    /// Attach a flat object sent as `application/x-www-form-urlencoded`.
    pub fn form(mut self, body: Value) -> Self {
        self.body = Some(body);
        self.content_type = ContentType::FormUrlEncoded;
        self
    }

    pub fn content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }
}

/// Encode a flat JSON object as a form-urlencoded string.
///
/// Strings are sent verbatim, other scalars by their JSON text, nested
/// values as compact JSON. `null` entries are skipped.
pub fn encode_form(body: &Value) -> MarketoResult<String> {
    let fields = body.as_object().ok_or_else(|| {
        MarketoError::InvalidInput("form-encoded body must be a JSON object".to_string())
    })?;

    let pairs: Vec<(&str, String)> = fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| {
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.as_str(), value)
        })
        .collect();

    serde_urlencoded::to_string(pairs)
        .map_err(|e| MarketoError::InvalidInput(format!("cannot form-encode body: {}", e)))
}

/// Parse a 2xx response body without interpreting it.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// HTTP transport that signs every call with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
    tokens: Arc<TokenManager>,
}

impl HttpTransport {
    /// Create a transport, building an HTTP client with the configured timeout.
    pub fn new(config: Arc<ClientConfig>) -> MarketoResult<Self> {
        let client = Self::build_client(&config)?;
        let tokens = Arc::new(TokenManager::new(client.clone(), &config)?);
        Ok(Self::with_parts(client, config, tokens))
    }

    /// Create a transport around an existing HTTP client and token manager.
    pub fn with_parts(client: Client, config: Arc<ClientConfig>, tokens: Arc<TokenManager>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    pub(crate) fn build_client(config: &ClientConfig) -> MarketoResult<Client> {
        Client::builder()
            .user_agent(concat!("marketo-mcp/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketoError::Config(format!("failed to create HTTP client: {}", e)))
    }

    pub fn token_manager(&self) -> &Arc<TokenManager> {
        &self.tokens
    }

    /// Build a URL for the given endpoint.
    fn build_url(&self, endpoint: &str) -> MarketoResult<url::Url> {
        self.config.endpoint_url(endpoint)
    }

    fn encode_body(builder: RequestBuilder, request: &ApiRequest) -> MarketoResult<RequestBuilder> {
        let builder = builder.header(header::CONTENT_TYPE, request.content_type.as_str());

        let Some(body) = request.body.as_ref() else {
            return Ok(builder);
        };

        match request.content_type {
            ContentType::FormUrlEncoded => Ok(builder.body(encode_form(body)?)),
            ContentType::Json | ContentType::Other(_) => Ok(builder.body(serde_json::to_vec(body)?)),
        }
    }

    /// Perform one authenticated call and return the decoded body.
    pub async fn request(&self, request: ApiRequest) -> MarketoResult<Value> {
        let token = self.tokens.get_token().await?;
        let url = self.build_url(&request.endpoint)?;
        debug!(method = %request.method, url = %url, "Marketo request");

        let builder = self
            .client
            .request(request.method.as_reqwest(), url)
            .bearer_auth(token);
        let builder = Self::encode_body(builder, &request)?;

        let response = builder.send().await.map_err(|e| {
            warn!(endpoint = %request.endpoint, error = %e, "Marketo request failed");
            MarketoError::transport(e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(MarketoError::transport)?;

        if !status.is_success() {
            let err = MarketoError::from_response(status.as_u16(), &text);
            warn!(
                endpoint = %request.endpoint,
                status = status.as_u16(),
                error = %err,
                "Marketo request returned an error"
            );
            return Err(err);
        }

        Ok(parse_body(&text))
    }
}
