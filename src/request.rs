//! Per-call request parameters.

use crate::{Error, Result};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;

/// The parameters of one logical call.
///
/// A fresh value is built by the caller for every call. The client reads it on
/// every attempt and never changes it.
///
/// # Examples
///
/// ```
/// use platform_client::OutboundRequest;
/// use http::Method;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), platform_client::Error> {
/// let request = OutboundRequest::new(Method::POST, "/v2/payments/abc/complete")
///     .with_json(&serde_json::json!({ "txid": "7a3f" }))?
///     .with_timeout(Duration::from_secs(30));
/// assert!(request.body.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path, relative to the base URL.
    pub path: String,

    /// Headers merged over the client defaults. The credential header is
    /// always overwritten by the client.
    pub headers: HeaderMap,

    /// Query parameters for this request.
    pub query_params: Vec<(String, String)>,

    /// The request payload, sent as-is.
    pub body: Option<Vec<u8>>,

    /// Replaces the configured default timeout as the base for this call.
    pub timeout: Option<Duration>,

    /// Set when this call was already retried by some other mechanism.
    pub retried: bool,
}

impl OutboundRequest {
    /// Creates a new `OutboundRequest` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query_params: Vec::new(),
            body: None,
            timeout: None,
            retried: false,
        }
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter to the request.
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.push((key.into(), value.into()));
        self
    }

    /// Sets a raw request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Serializes `body` as JSON and uses it as the request body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if the value cannot be encoded.
    pub fn with_json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes =
            serde_json::to_vec(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Some(bytes);
        Ok(self)
    }

    /// Overrides the base timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Marks the call as already retried, so the client makes a single attempt.
    pub fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }
}
