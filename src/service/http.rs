use anyhow::{Context, Result};
use rquest::redirect::Policy;
use rquest::Client;
use rquest_util::Emulation;
use std::time::Duration;

/// Redirect hops followed for both page fetches and link probes.
const MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub enum ClientType {
    Standard,
    HeavyEmulation,
}

/// Factory for creating an HTTP client based on the desired level of stealth/performance.
pub fn create_client(client_type: ClientType, timeout: Duration) -> Result<Client> {
    let builder = Client::builder()
        .timeout(timeout)
        .redirect(Policy::limited(MAX_REDIRECTS));

    match client_type {
        ClientType::HeavyEmulation => {
            // Use rquest_util for heavy browser impersonation
            builder
                .emulation(Emulation::Firefox136)
                .build()
                .context("Failed to build heavy impersonated rquest client")
        }
        ClientType::Standard => builder
            .build()
            .context("Failed to build standard rquest client"),
    }
}

/// Flatten an error and its sources into one line, e.g.
/// `error sending request: client error (Connect): tcp connect error: Connection refused`.
pub fn describe_error(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}
