//! Basic example calling the platform API with retries.
//!
//! This example shows how to:
//! - Load the client configuration from the environment
//! - Fetch the authenticated user
//! - Inspect attempts, latency and classified failures
//!
//! Run with: `PI_API_KEY=... cargo run --example basic_call`

use http::Method;
use platform_client::{Client, ClientConfig, Error, OutboundRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Me {
    uid: String,
    username: String,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("platform_client=debug,basic_call=info")
        .init();

    let config = ClientConfig::from_env()?;
    println!("Using {:?}", config);
    let client = Client::new(config)?;

    println!("=== GET /v2/me ===");
    match client.get::<Me>("/v2/me").await {
        Ok(response) => {
            println!("User: {:?}", response.data);
            println!("Status: {}", response.status);
            println!("Attempts: {}", response.attempts);
            println!("Latency: {:?}", response.latency);
        }
        Err(e) => println!("Failed ({:?}): {}", e.kind(), e),
    }
    println!();

    println!("=== Raw call to an unknown payment ===");
    let request = OutboundRequest::new(Method::GET, "/v2/payments/does-not-exist");
    match client.call(request).await {
        Ok(response) => println!("Body: {}", response.data),
        Err(e) => {
            println!("Kind: {:?}", e.kind());
            println!("Status: {:?}", e.status());
            println!("Body: {:?}", e.raw_response());
        }
    }

    Ok(())
}
