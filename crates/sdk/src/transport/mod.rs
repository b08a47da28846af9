//! Transport layer for the Marketo SDK.

pub mod http;

pub use http::{encode_form, ApiRequest, ContentType, HttpTransport, Method};
