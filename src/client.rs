//! HTTP client with retry logic and rich error handling.
//!
//! The [`Client`] type is the main entry point for calling the upstream
//! platform. Use [`ClientBuilder`] or [`Client::new`] to create one.

use crate::{
    config::ClientConfig,
    request::OutboundRequest,
    retry::{with_retry, RetryOnTransient, RetryPredicate, RetryState},
    Error, Response, Result,
};
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// A client for the upstream platform API that absorbs transient failures.
///
/// Every call sends `Authorization: Key <api_key>` and, unless overridden,
/// `Content-Type: application/json`. Timeouts and 5xx responses are retried
/// with exponential backoff while each attempt gets a longer timeout than the
/// one before. The client is cheap to clone and holds no per-call state, so
/// one instance can serve any number of concurrent calls.
///
/// # Examples
///
/// ```no_run
/// use platform_client::{Client, Response};
/// use serde::{Deserialize, Serialize};
/// use std::time::Duration;
///
/// #[derive(Serialize)]
/// struct Approve {}
///
/// #[derive(Deserialize)]
/// struct Payment {
///     identifier: String,
///     amount: f64,
/// }
///
/// # async fn example() -> Result<(), platform_client::Error> {
/// let client = Client::builder()
///     .base_url("https://api.minepi.com")?
///     .api_key("secret")
///     .timeout(Duration::from_secs(60))
///     .max_retries(3)
///     .build()?;
///
/// let payment: Response<Payment> = client.get("/v2/payments/abc").await?;
/// println!("Payment {} for {}", payment.data.identifier, payment.data.amount);
///
/// let approved: Response<Payment> =
///     client.post("/v2/payments/abc/approve", &Approve {}).await?;
/// println!("Approved after {} attempts", approved.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    config: ClientConfig,
    default_headers: HeaderMap,
    credential: HeaderValue,
    retry_predicate: Box<dyn RetryPredicate>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client from an already resolved configuration.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use platform_client::{Client, ClientConfig};
    ///
    /// # fn example() -> Result<(), platform_client::Error> {
    /// let client = Client::new(ClientConfig::from_env()?)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new().config(config).build()
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Executes one logical call against the upstream.
    ///
    /// Attempt `k` runs with a timeout of `default_timeout * k` (or the
    /// request's own timeout times `k`). After a retryable failure the call
    /// sleeps `2^(k + 1)` backoff units before attempt `k + 1`. At most
    /// `max_retries + 1` attempts are made.
    ///
    /// There is no deadline across attempts. With the defaults (60s, 3
    /// retries) an exhausted call can take 600s of timeouts plus 28s of
    /// backoff; wrap the future in `tokio::time::timeout` to bound it, which
    /// also abandons any pending retry.
    ///
    /// # Errors
    ///
    /// * [`Error::UpstreamClientError`], [`Error::TransportFailure`] and other
    ///   terminal failures on their first occurrence.
    /// * [`Error::RetriesExhausted`] wrapping the final failure once the retry
    ///   budget is spent.
    /// * The final failure itself when the request was already marked as
    ///   retried.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use platform_client::{Client, OutboundRequest};
    /// use http::Method;
    ///
    /// # async fn example() -> Result<(), platform_client::Error> {
    /// let client = Client::builder()
    ///     .base_url("https://api.minepi.com")?
    ///     .api_key("secret")
    ///     .build()?;
    ///
    /// let request = OutboundRequest::new(Method::POST, "/v2/payments/abc/complete")
    ///     .with_json(&serde_json::json!({ "txid": "7a3f" }))?;
    /// let response = client.call(request).await?;
    /// println!("{} -> {}", response.status, response.data);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn call(&self, request: OutboundRequest) -> Result<Response> {
        let start_time = Instant::now();
        let policy = self.inner.config.retry_policy().with_base_timeout(request.timeout);
        let url = self.url_for(&request)?;
        let headers = self.headers_for(&request);

        let client = self;
        let (request, url, headers) = (&request, &url, &headers);
        let mut response = with_retry(
            &policy,
            &*self.inner.retry_predicate,
            request.retried,
            move |state| client.attempt(request, url, headers, state),
        )
        .await?;

        response.latency = start_time.elapsed();
        Ok(response)
    }

    /// Runs a single attempt and logs its failure, if any.
    async fn attempt(
        &self,
        request: &OutboundRequest,
        url: &Url,
        headers: &HeaderMap,
        state: RetryState,
    ) -> Result<Response> {
        tracing::info!(
            method = %request.method,
            path = %request.path,
            attempt = state.attempt(),
            timeout_ms = state.timeout().as_millis() as u64,
            "Sending upstream request"
        );

        let result = self.execute_request(request, url, headers, state.timeout()).await;

        if let Err(e) = &result {
            tracing::warn!(
                error = %e,
                method = %request.method,
                path = %request.path,
                attempt = state.attempt(),
                status = e.status().map(|s| s.as_u16()),
                response = e.raw_response(),
                "Upstream request failed"
            );
        }

        result.map(|response| Response {
            attempts: state.attempt(),
            ..response
        })
    }

    /// Sends the request once and classifies the result.
    async fn execute_request(
        &self,
        request: &OutboundRequest,
        url: &Url,
        headers: &HeaderMap,
        timeout: Duration,
    ) -> Result<Response> {
        tracing::debug!(method = %request.method, url = %url, "Executing HTTP request");

        let started = Instant::now();
        let mut builder = self
            .inner
            .http_client
            .request(request.method.clone(), url.clone())
            .headers(headers.clone())
            .timeout(timeout);

        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::from_transport(e, timeout))?;

        let status = response.status();
        let headers = response.headers().clone();
        let raw_body = response
            .text()
            .await
            .map_err(|e| Error::from_transport(e, timeout))?;
        let latency = started.elapsed();

        tracing::debug!(
            status = status.as_u16(),
            latency_ms = latency.as_millis() as u64,
            "Received HTTP response"
        );

        if !status.is_success() {
            return Err(Error::from_status(status, raw_body, headers));
        }

        Ok(Response::new(raw_body, status, headers, latency, 1))
    }

    /// Appends the request path to the base URL's path.
    ///
    /// The scheme, host and port always come from the base URL. Dot segments
    /// are rejected so a request cannot climb out of the base path.
    fn url_for(&self, request: &OutboundRequest) -> Result<Url> {
        let relative = request.path.trim_start_matches('/');
        if relative.split(['/', '\\']).any(is_dot_segment) {
            return Err(Error::ConfigurationError(format!(
                "Request path must not contain dot segments: {:?}",
                request.path
            )));
        }

        let mut url = self.inner.config.base_url().clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), relative);
        url.set_path(&path);
        url.set_query(None);
        url.set_fragment(None);

        if !request.query_params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    /// Merges request headers over the defaults, then pins the credential.
    ///
    /// A request header replaces every default value of the same name and
    /// keeps all of its own values.
    fn headers_for(&self, request: &OutboundRequest) -> HeaderMap {
        let mut headers = self.inner.default_headers.clone();
        for name in request.headers.keys() {
            headers.remove(name);
            for value in request.headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
        headers.insert(AUTHORIZATION, self.inner.credential.clone());
        headers
    }

    /// Makes a GET request and decodes the JSON response.
    pub async fn get<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(OutboundRequest::new(Method::GET, path))
            .await?
            .json()
    }

    /// Makes a POST request with a JSON body and decodes the JSON response.
    pub async fn post<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = OutboundRequest::new(Method::POST, path).with_json(body)?;
        self.call(request).await?.json()
    }

    /// Makes a PUT request with a JSON body and decodes the JSON response.
    pub async fn put<Req, Res>(&self, path: impl Into<String>, body: &Req) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = OutboundRequest::new(Method::PUT, path).with_json(body)?;
        self.call(request).await?.json()
    }

    /// Makes a PATCH request with a JSON body and decodes the JSON response.
    pub async fn patch<Req, Res>(
        &self,
        path: impl Into<String>,
        body: &Req,
    ) -> Result<Response<Res>>
    where
        Req: Serialize,
        Res: DeserializeOwned,
    {
        let request = OutboundRequest::new(Method::PATCH, path).with_json(body)?;
        self.call(request).await?.json()
    }

    /// Makes a DELETE request and decodes the JSON response.
    pub async fn delete<Res>(&self, path: impl Into<String>) -> Result<Response<Res>>
    where
        Res: DeserializeOwned,
    {
        self.call(OutboundRequest::new(Method::DELETE, path))
            .await?
            .json()
    }
}

/// `.` and `..`, including their percent-encoded spellings.
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use platform_client::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), platform_client::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.minepi.com")?
///     .api_key("secret")
///     .timeout(Duration::from_secs(30))
///     .max_retries(2)
///     .default_header("User-Agent", "my-app/1.0")?
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    base_url: Option<Url>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<usize>,
    backoff_unit: Option<Duration>,
    default_headers: HeaderMap,
    retry_predicate: Option<Box<dyn RetryPredicate>>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self {
            base_url: None,
            api_key: None,
            timeout: None,
            max_retries: None,
            backoff_unit: None,
            default_headers: HeaderMap::new(),
            retry_predicate: None,
        }
    }

    /// Starts from an existing configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.base_url = Some(config.base_url().clone());
        self.api_key = Some(config.api_key().to_string());
        self.timeout = Some(config.default_timeout());
        self.max_retries = Some(config.max_retries());
        self.backoff_unit = Some(config.backoff_unit());
        self
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        self.base_url = Some(Url::parse(url.as_ref())?);
        Ok(self)
    }

    /// Sets the static credential sent as `Authorization: Key <api_key>`.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the timeout of the first attempt of every call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the number of retries after the first attempt.
    pub fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets the unit of the exponential backoff.
    pub fn backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = Some(unit);
        self
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// A default `Authorization` header is ignored; the credential always wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let name = HeaderName::try_from(name.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
        let value = HeaderValue::try_from(value.as_ref())
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        self.default_headers.insert(name, value);
        Ok(self)
    }

    /// Sets a custom retry predicate.
    ///
    /// By default, timeouts and 5xx responses are retried.
    pub fn retry_predicate(mut self, predicate: Box<dyn RetryPredicate>) -> Self {
        self.retry_predicate = Some(predicate);
        self
    }

    /// Builds the configured `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if no base URL or API key was provided, or if the
    /// credential cannot be used as a header value.
    pub fn build(self) -> Result<Client> {
        let base_url = self
            .base_url
            .ok_or_else(|| Error::ConfigurationError("Base URL is required".to_string()))?;
        let api_key = self
            .api_key
            .ok_or_else(|| Error::ConfigurationError("API key is required".to_string()))?;

        let mut config = ClientConfig::new(base_url, api_key)?;
        if let Some(timeout) = self.timeout {
            config = config.with_default_timeout(timeout);
        }
        if let Some(max_retries) = self.max_retries {
            config = config.with_max_retries(max_retries);
        }
        if let Some(unit) = self.backoff_unit {
            config = config.with_backoff_unit(unit);
        }

        let mut credential = HeaderValue::try_from(format!("Key {}", config.api_key()))
            .map_err(|e| Error::ConfigurationError(format!("Invalid API key: {}", e)))?;
        credential.set_sensitive(true);

        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        default_headers.extend(self.default_headers);
        default_headers.remove(AUTHORIZATION);

        let http_client = reqwest::Client::builder().build().map_err(|e| {
            Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
        })?;

        let retry_predicate = self
            .retry_predicate
            .unwrap_or_else(|| Box::new(RetryOnTransient));

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                config,
                default_headers,
                credential,
                retry_predicate,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
