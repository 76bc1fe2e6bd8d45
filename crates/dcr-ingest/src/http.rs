// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared HTTP client construction.
//!
//! One `reqwest::Client` is built per run and reused for the token request and
//! every ingestion POST, so connections are pooled across batches.

use core::time::Duration;
use std::error::Error;
use tracing::error;

/// Builds a client with rustls TLS, a per-request timeout and an optional
/// HTTPS proxy.
pub fn build_client(
    proxy_url: Option<&str>,
    timeout: Duration,
) -> Result<reqwest::Client, Box<dyn Error + Send + Sync>> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout);
    if let Some(proxy) = proxy_url {
        builder = builder.proxy(reqwest::Proxy::https(proxy)?);
    }
    Ok(builder.build()?)
}

/// Like [`build_client`], but falls back to a client without proxy when the
/// proxy configuration cannot be used.
#[must_use]
pub fn get_client(proxy_url: Option<&str>, timeout: Duration) -> reqwest::Client {
    match build_client(proxy_url, timeout) {
        Ok(client) => client,
        Err(e) => {
            error!("Unable to parse proxy configuration: {e}, no proxy will be used");
            reqwest::Client::builder()
                .use_rustls_tls()
                .timeout(timeout)
                .build()
                .unwrap_or_default()
        }
    }
}
