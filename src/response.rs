//! Successful call outcomes.
//!
//! [`Response`] carries the body of the attempt that succeeded together with
//! the status, headers, total latency and the number of attempts the call
//! needed. [`Client::call`](crate::Client::call) returns the body as text;
//! [`Response::json`] decodes it into a typed value.

use crate::{Error, Result};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// A successful upstream response.
///
/// # Examples
///
/// ```no_run
/// use platform_client::Client;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct Me {
///     uid: String,
///     username: String,
/// }
///
/// # async fn example() -> Result<(), platform_client::Error> {
/// let client = Client::builder()
///     .base_url("https://api.minepi.com")?
///     .api_key("secret")
///     .build()?;
///
/// let response = client.get::<Me>("/v2/me").await?;
///
/// println!("User: {}", response.data.username);
/// println!("Took {:?} over {} attempts", response.latency, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T = String> {
    /// The response body.
    pub data: T,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the call, including every retry and backoff.
    pub latency: Duration,

    /// The number of attempts the call needed; `1` when the first one succeeded.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type using the provided function.
    ///
    /// # Examples
    ///
    /// ```
    /// # use platform_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     "42".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::from_millis(100),
    ///     1,
    /// );
    ///
    /// let length = response.map(|body| body.len());
    /// assert_eq!(length.data, 2);
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the call needed more than one attempt.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a reference to a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl Response<String> {
    /// Deserializes the body as JSON, keeping the response metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeserializationFailed`] with the raw body and status if
    /// the body does not match `T`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use platform_client::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let response = Response::new(
    ///     "[1, 2, 3]".to_string(),
    ///     StatusCode::OK,
    ///     HeaderMap::new(),
    ///     Duration::ZERO,
    ///     1,
    /// );
    ///
    /// let numbers = response.json::<Vec<u32>>().unwrap();
    /// assert_eq!(numbers.data, vec![1, 2, 3]);
    /// ```
    pub fn json<T: DeserializeOwned>(self) -> Result<Response<T>> {
        match serde_json::from_str::<T>(&self.data) {
            Ok(data) => Ok(Response {
                data,
                status: self.status,
                headers: self.headers,
                latency: self.latency,
                attempts: self.attempts,
            }),
            Err(e) => {
                tracing::error!(
                    error = %e,
                    status = self.status.as_u16(),
                    raw_response = %self.data,
                    "Failed to deserialize response"
                );

                Err(Error::DeserializationFailed {
                    raw_response: self.data,
                    serde_error: e.to_string(),
                    status: self.status,
                })
            }
        }
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
