//! Configuration types for the Marketo SDK.

use crate::error::{MarketoError, MarketoResult};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Default request timeout for both the identity exchange and API calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time shaved off a token's reported lifetime before caching it.
pub const DEFAULT_TOKEN_SAFETY_MARGIN: Duration = Duration::from_secs(60);

/// Client-credentials pair for the Marketo identity service.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    client_id: String,
    client_secret: String,
}

impl Credentials {
    /// Create credentials, rejecting empty values.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> MarketoResult<Self> {
        let client_id = client_id.into().trim().to_string();
        let client_secret = client_secret.into().trim().to_string();

        if client_id.is_empty() {
            return Err(MarketoError::Config("client_id is required".to_string()));
        }
        if client_secret.is_empty() {
            return Err(MarketoError::Config("client_secret is required".to_string()));
        }

        Ok(Self {
            client_id,
            client_secret,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for the Marketo client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST base URL, e.g. `https://123-abc-456.mktorest.com/rest`.
    pub base_url: Url,
    /// Identity service base URL; `/oauth/token` is appended to it.
    pub identity_url: Url,
    /// Client-credentials pair.
    pub credentials: Credentials,
    /// Request timeout.
    pub timeout: Duration,
    /// Subtracted from `expires_in` when caching a token.
    pub token_safety_margin: Duration,
}

impl ClientConfig {
    /// Create a configuration with a derived identity URL and default timings.
    pub fn new(base_url: Url, credentials: Credentials) -> Self {
        let identity_url = identity_url_for(&base_url);
        Self {
            base_url,
            identity_url,
            credentials,
            timeout: DEFAULT_TIMEOUT,
            token_safety_margin: DEFAULT_TOKEN_SAFETY_MARGIN,
        }
    }

    /// Full URL of the client-credentials token endpoint.
    pub fn token_url(&self) -> MarketoResult<Url> {
        concat_url(&self.identity_url, "/oauth/token")
    }

    /// `base_url + endpoint`, keeping the base path and the endpoint's query.
    pub fn endpoint_url(&self, endpoint: &str) -> MarketoResult<Url> {
        concat_url(&self.base_url, endpoint)
    }
}

fn concat_url(base: &Url, suffix: &str) -> MarketoResult<Url> {
    let base = base.as_str().trim_end_matches('/');
    let joined = if suffix.starts_with('/') || suffix.starts_with('?') || suffix.is_empty() {
        format!("{}{}", base, suffix)
    } else {
        format!("{}/{}", base, suffix)
    };
    Ok(Url::parse(&joined)?)
}

/// Derive the identity service URL from the REST base URL.
///
/// A trailing `rest` path segment becomes `identity`; otherwise the first
/// `rest` segment is swapped. A base without any `rest` segment gets
/// `identity` appended.
pub fn identity_url_for(base_url: &Url) -> Url {
    let mut segments: Vec<String> = base_url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let position = match segments.last() {
        Some(last) if last == "rest" => Some(segments.len() - 1),
        _ => segments.iter().position(|s| s == "rest"),
    };

    match position {
        Some(index) => segments[index] = "identity".to_string(),
        None => segments.push("identity".to_string()),
    }

    let mut identity = base_url.clone();
    identity.set_query(None);
    identity.set_fragment(None);
    identity.set_path(&format!("/{}", segments.join("/")));
    identity
}
