//! # platform-client - a resilient upstream platform API client
//!
//! `platform-client` issues authenticated calls to a single upstream platform
//! API and absorbs transient failures on the caller's behalf. It is built on
//! `reqwest` and `tokio`, and logs every attempt and failure with `tracing`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use platform_client::{Client, ClientConfig};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Me {
//!     uid: String,
//!     username: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), platform_client::Error> {
//!     // PLATFORM_API_URL, PI_API_KEY, PLATFORM_API_TIMEOUT_SECS, PLATFORM_API_MAX_RETRIES
//!     let client = Client::new(ClientConfig::from_env()?)?;
//!
//!     let me = client.get::<Me>("/v2/me").await?;
//!     println!("{} ({}) in {:?}", me.data.username, me.data.uid, me.latency);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Retry behavior
//!
//! A logical call is made of one or more attempts:
//!
//! - A transport timeout or a 5xx response is retried, up to `max_retries`
//!   times. Every other failure is returned at once.
//! - Attempt `k` gets a timeout of `default_timeout * k`.
//! - Before attempt `k + 1` the call sleeps `2^(k + 1)` seconds. Only the
//!   calling task is suspended.
//! - The `Authorization: Key <api_key>` header is sent on every attempt and
//!   cannot be overridden per request.
//! - A request marked with [`OutboundRequest::mark_retried`] is never retried.
//!
//! When the budget is spent the call fails with [`Error::RetriesExhausted`],
//! which wraps the last failure so its status and body remain available:
//!
//! ```no_run
//! use platform_client::{Client, Error, OutboundRequest};
//! use http::Method;
//!
//! # async fn example(client: Client) {
//! match client.call(OutboundRequest::new(Method::GET, "/v2/me")).await {
//!     Ok(response) => println!("{}", response.data),
//!     Err(e @ Error::RetriesExhausted { .. }) => {
//!         eprintln!("gave up: status {:?}, body {:?}", e.status(), e.raw_response());
//!     }
//!     Err(e) => eprintln!("terminal failure ({:?}): {}", e.kind(), e),
//! }
//! # }
//! ```
//!
//! The retry loop itself is available as [`retry::with_retry`] for driving
//! any fallible async operation with the same policy.

mod client;
pub mod config;
mod error;
mod request;
mod response;
pub mod retry;

pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, ErrorKind, Result};
pub use request::OutboundRequest;
pub use response::Response;
pub use retry::{RetryOnTransient, RetryPolicy, RetryPredicate, RetryState};
