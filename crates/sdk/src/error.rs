//! Error types for the Marketo SDK.

use serde_json::Value;

/// Result type for SDK operations.
pub type MarketoResult<T> = Result<T, MarketoError>;

/// Error types that can occur when talking to Marketo.
#[derive(Debug, thiserror::Error)]
pub enum MarketoError {
    /// The client-credentials exchange with the identity endpoint failed.
    #[error("Failed to authenticate with Marketo: {message}")]
    Authentication {
        message: String,
        details: Option<Value>,
    },

    /// The authenticated API call failed at the transport level or with a
    /// non-2xx status.
    #[error("{message}")]
    Upstream {
        status: Option<u16>,
        message: String,
        details: Option<Value>,
    },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A request descriptor that cannot be encoded.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MarketoError {
    /// HTTP status reported by the upstream, if the call got that far.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Structured error payload returned by the upstream, if any.
    pub fn details(&self) -> Option<&Value> {
        match self {
            Self::Authentication { details, .. } | Self::Upstream { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }

    /// Build an upstream error from a non-2xx status and its raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let details = parse_details(body);
        let message = details
            .as_ref()
            .and_then(error_message)
            .or_else(|| non_empty(body))
            .unwrap_or_else(|| format!("Request failed with status code {}", status));

        Self::Upstream {
            status: Some(status),
            message,
            details,
        }
    }

    /// Build an upstream error for a request that never produced a response.
    pub fn transport(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            format!("Request timed out: {}", error)
        } else {
            error.to_string()
        };

        Self::Upstream {
            status: error.status().map(|s| s.as_u16()),
            message,
            details: None,
        }
    }

    /// Build an authentication error from the identity endpoint's reply.
    pub fn authentication(status: Option<u16>, body: &str) -> Self {
        let details = parse_details(body);
        let message = details
            .as_ref()
            .and_then(error_message)
            .or_else(|| non_empty(body))
            .unwrap_or_else(|| match status {
                Some(code) => format!("identity endpoint returned status {}", code),
                None => "identity endpoint returned no usable response".to_string(),
            });

        Self::Authentication { message, details }
    }
}

fn parse_details(body: &str) -> Option<Value> {
    serde_json::from_str::<Value>(body)
        .ok()
        .filter(|value| !value.is_null())
}

fn non_empty(body: &str) -> Option<String> {
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Pull a human-readable message out of an error payload.
///
/// Looks at `message`, then the first `errors[].message` (the shape Marketo
/// uses inside its envelopes), then the OAuth2 `error_description` / `error`
/// fields.
pub(crate) fn error_message(payload: &Value) -> Option<String> {
    let text = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    text(payload.get("message"))
        .or_else(|| {
            payload
                .get("errors")
                .and_then(Value::as_array)
                .and_then(|errors| errors.first())
                .and_then(|first| text(first.get("message")))
        })
        .or_else(|| text(payload.get("error_description")))
        .or_else(|| text(payload.get("error")))
}
