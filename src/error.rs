//! Error types for upstream platform calls.
//!
//! Every failure a logical call can end with is an [`Error`]. Each variant maps
//! onto an [`ErrorKind`], which is what the retry pipeline classifies on. Errors
//! that carry an upstream response keep the status, headers and raw body so the
//! caller can translate them into its own response.

use http::{HeaderMap, StatusCode};
use std::time::Duration;

/// The classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The attempt exceeded its timeout.
    TransportTimeout,
    /// The upstream answered with a 5xx status.
    UpstreamServerError,
    /// The upstream answered with a 4xx status.
    UpstreamClientError,
    /// A connection-level failure other than a timeout.
    TransportFailure,
    /// The retry budget was spent on retryable failures.
    RetriesExhausted,
    /// Configuration, encoding or unexpected-status failures.
    Other,
}

impl ErrorKind {
    /// Returns `true` for the kinds the client absorbs with a retry.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ErrorKind::TransportTimeout | ErrorKind::UpstreamServerError
        )
    }
}

/// The main error type for upstream platform calls.
///
/// # Examples
///
/// ```no_run
/// use platform_client::{Client, Error, OutboundRequest};
/// use http::Method;
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.minepi.com")?
///     .api_key("secret")
///     .build()?;
///
/// match client.call(OutboundRequest::new(Method::GET, "/v2/me")).await {
///     Ok(response) => println!("{}", response.data),
///     Err(Error::UpstreamClientError { status, raw_response, .. }) => {
///         eprintln!("rejected with {}: {}", status, raw_response);
///     }
///     Err(e) => eprintln!("upstream unavailable: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The attempt did not complete within its timeout.
    #[error("Request timed out after {timeout:?}")]
    TransportTimeout {
        /// The timeout that applied to the failed attempt.
        timeout: Duration,
    },

    /// The upstream returned a 5xx status.
    #[error("Upstream server error {status}: {raw_response}")]
    UpstreamServerError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The upstream returned a 4xx status. The response is kept unmodified.
    #[error("Upstream client error {status}: {raw_response}")]
    UpstreamClientError {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The upstream returned a non-success status below 400.
    #[error("Unexpected upstream status {status}: {raw_response}")]
    UnexpectedStatus {
        /// The HTTP status code
        status: StatusCode,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// A network-level failure that was not a timeout (refused connection,
    /// DNS lookup failure, broken body stream).
    #[error("Transport failure: {0}")]
    TransportFailure(#[source] reqwest::Error),

    /// Retryable failures used up the whole retry budget.
    ///
    /// `last_error` is the failure of the final attempt, untouched.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// The number of attempts made, including the first
        attempts: usize,
        /// The failure of the final attempt
        last_error: Box<Error>,
    },

    /// Failed to deserialize the response body into the expected type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw response body that failed to deserialize
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// Invalid configuration was provided.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    /// Classifies a failed `reqwest` send into a timeout or a transport failure.
    pub(crate) fn from_transport(error: reqwest::Error, timeout: Duration) -> Self {
        if error.is_timeout() {
            Error::TransportTimeout { timeout }
        } else {
            Error::TransportFailure(error)
        }
    }

    /// Classifies a non-success upstream response by its status.
    pub(crate) fn from_status(
        status: StatusCode,
        raw_response: String,
        headers: HeaderMap,
    ) -> Self {
        if status.is_server_error() {
            Error::UpstreamServerError {
                status,
                raw_response,
                headers,
            }
        } else if status.is_client_error() {
            Error::UpstreamClientError {
                status,
                raw_response,
                headers,
            }
        } else {
            Error::UnexpectedStatus {
                status,
                raw_response,
                headers,
            }
        }
    }

    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TransportTimeout { .. } => ErrorKind::TransportTimeout,
            Error::UpstreamServerError { .. } => ErrorKind::UpstreamServerError,
            Error::UpstreamClientError { .. } => ErrorKind::UpstreamClientError,
            Error::TransportFailure(_) => ErrorKind::TransportFailure,
            Error::RetriesExhausted { .. } => ErrorKind::RetriesExhausted,
            Error::UnexpectedStatus { .. }
            | Error::DeserializationFailed { .. }
            | Error::SerializationFailed(_)
            | Error::ConfigurationError(_)
            | Error::InvalidUrl(_) => ErrorKind::Other,
        }
    }

    /// Returns `true` if this error is a transient failure worth another attempt.
    ///
    /// Transport timeouts and 5xx responses are retryable. Everything else,
    /// including an exhausted retry budget, is terminal.
    ///
    /// # Examples
    ///
    /// ```
    /// use platform_client::Error;
    /// use http::{HeaderMap, StatusCode};
    ///
    /// let err = Error::UpstreamServerError {
    ///     status: StatusCode::BAD_GATEWAY,
    ///     raw_response: String::new(),
    ///     headers: HeaderMap::new(),
    /// };
    /// assert!(err.is_retryable());
    ///
    /// let err = Error::UpstreamClientError {
    ///     status: StatusCode::NOT_FOUND,
    ///     raw_response: String::new(),
    ///     headers: HeaderMap::new(),
    /// };
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns the failure of the final attempt.
    ///
    /// For [`Error::RetriesExhausted`] this is the wrapped error; for every other
    /// variant it is `self`.
    pub fn last_failure(&self) -> &Error {
        match self {
            Error::RetriesExhausted { last_error, .. } => last_error.last_failure(),
            other => other,
        }
    }

    /// Returns the HTTP status code if the final attempt received a response.
    pub fn status(&self) -> Option<StatusCode> {
        match self.last_failure() {
            Error::UpstreamServerError { status, .. }
            | Error::UpstreamClientError { status, .. }
            | Error::UnexpectedStatus { status, .. }
            | Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if the final attempt received one.
    pub fn raw_response(&self) -> Option<&str> {
        match self.last_failure() {
            Error::UpstreamServerError { raw_response, .. }
            | Error::UpstreamClientError { raw_response, .. }
            | Error::UnexpectedStatus { raw_response, .. }
            | Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }
}

/// A specialized `Result` type for upstream platform calls.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server_error(code: u16) -> Error {
        Error::UpstreamServerError {
            status: StatusCode::from_u16(code).unwrap(),
            raw_response: "upstream down".to_string(),
            headers: HeaderMap::new(),
        }
    }

    #[test]
    fn test_status_classification() {
        let err = Error::from_status(
            StatusCode::SERVICE_UNAVAILABLE,
            String::new(),
            HeaderMap::new(),
        );
        assert_eq!(err.kind(), ErrorKind::UpstreamServerError);

        let err = Error::from_status(StatusCode::NOT_FOUND, String::new(), HeaderMap::new());
        assert_eq!(err.kind(), ErrorKind::UpstreamClientError);

        let err = Error::from_status(StatusCode::NOT_MODIFIED, String::new(), HeaderMap::new());
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_exhausted_is_terminal_but_keeps_detail() {
        let err = Error::RetriesExhausted {
            attempts: 4,
            last_error: Box::new(server_error(502)),
        };

        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert_eq!(err.last_failure().kind(), ErrorKind::UpstreamServerError);
        assert_eq!(err.status(), Some(StatusCode::BAD_GATEWAY));
        assert_eq!(err.raw_response(), Some("upstream down"));
        assert!(err.to_string().contains("after 4 attempts"));
    }

    #[test]
    fn test_timeout_has_no_response() {
        let err = Error::TransportTimeout {
            timeout: Duration::from_secs(60),
        };
        assert!(err.is_retryable());
        assert_eq!(err.status(), None);
        assert_eq!(err.raw_response(), None);
    }

    #[test]
    fn test_configuration_error_is_terminal() {
        let err = Error::ConfigurationError("missing".to_string());
        assert_eq!(err.kind(), ErrorKind::Other);
        assert!(!err.is_retryable());
    }
}
