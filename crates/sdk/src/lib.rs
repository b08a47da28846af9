//! # Marketo SDK
//!
//! Authenticated access to the Marketo REST API.
//!
//! The client caches a client-credentials bearer token, renews it shortly
//! before it expires, and signs every request with it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketo_sdk::{ApiRequest, MarketoClient, MarketoResult};
//!
//! #[tokio::main]
//! async fn main() -> MarketoResult<()> {
//!     let client = MarketoClient::builder()
//!         .base_url("https://123-abc-456.mktorest.com/rest")
//!         .client_id("client-id")
//!         .client_secret("client-secret")
//!         .build()?;
//!
//!     let forms = client
//!         .request(ApiRequest::get("/asset/v1/forms.json?maxReturn=20&offset=0"))
//!         .await?;
//!     println!("{}", forms);
//!
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod transport;

pub use auth::{CachedToken, Clock, SystemClock, TokenManager};
pub use client::{MarketoClient, MarketoClientBuilder};
pub use config::{identity_url_for, ClientConfig, Credentials};
pub use error::{MarketoError, MarketoResult};
pub use transport::{encode_form, ApiRequest, ContentType, HttpTransport, Method};
