// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Compression and delivery of batches to the ingestion endpoint.
//!
//! Every attempt is classified into an [`AttemptOutcome`]. Retryable outcomes
//! are retried in place, with exponential backoff, until the attempt budget
//! of the [`RetryPolicy`] is spent. Anything else ends the delivery.

use crate::constants::{BACKOFF_BASE, MAX_BACKOFF, MAX_DELIVERY_ATTEMPTS};
use crate::packer::Batch;
use crate::target::IngestionTarget;
use core::time::Duration;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use std::io::Write;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Longest failure body kept on an error.
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Ingestion endpoint rejected the batch with {status}: {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Batch not accepted after {attempts} attempts (last status: {})", describe_status(.status))]
    RetriesExhausted {
        attempts: u32,
        status: Option<StatusCode>,
    },

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),

    #[error("Bearer token is not a valid header value")]
    InvalidToken(#[from] reqwest::header::InvalidHeaderValue),
}

/// Bounded exponential backoff, without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, the first one included.
    pub max_attempts: u32,
    pub base: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_DELIVERY_ATTEMPTS,
            base: BACKOFF_BASE,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Wait after the failed attempt number `attempt` (counted from 1):
    /// `min(max_backoff, base * 2^attempt)`.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(31));
        self.base.saturating_mul(factor).min(self.max_backoff)
    }
}

/// What a single POST attempt amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable(StatusCode),
    Fatal(StatusCode),
}

/// Maps a response status to the retry taxonomy.
#[must_use]
pub fn classify_status(status: StatusCode) -> AttemptOutcome {
    if status.is_success() {
        return AttemptOutcome::Success;
    }
    match status {
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::INTERNAL_SERVER_ERROR
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => AttemptOutcome::Retryable(status),
        _ => AttemptOutcome::Fatal(status),
    }
}

/// Result of a successful delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub records: usize,
    pub attempts: u32,
    pub uncompressed_len: usize,
    pub compressed_len: usize,
}

/// Gzips `payload` with the smallest-output setting.
pub fn compress(payload: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(payload)?;
    encoder.finish()
}

#[derive(Debug, Clone)]
pub struct Transport {
    client: reqwest::Client,
    target: IngestionTarget,
    retry_policy: RetryPolicy,
}

impl Transport {
    #[must_use]
    pub fn new(client: reqwest::Client, target: IngestionTarget, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            target,
            retry_policy,
        }
    }

    #[must_use]
    pub fn target(&self) -> &IngestionTarget {
        &self.target
    }

    fn headers(token: &str) -> Result<HeaderMap, TransportError> {
        let mut authorization = HeaderValue::from_str(&format!("Bearer {token}"))?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        Ok(headers)
    }

    /// Serializes, compresses and posts `batch`, retrying transient failures.
    pub async fn deliver(&self, batch: Batch, token: &str) -> Result<Delivery, TransportError> {
        let payload = batch.to_json()?;
        let body = compress(&payload)?;
        let headers = Self::headers(token)?;
        let max_attempts = self.retry_policy.max_attempts.max(1);

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let start = Instant::now();
            let response = self
                .client
                .post(self.target.url().clone())
                .headers(headers.clone())
                .body(body.clone())
                .send()
                .await;
            let elapsed = start.elapsed();

            let last_status = match response {
                Ok(response) => {
                    let status = response.status();
                    match classify_status(status) {
                        AttemptOutcome::Success => {
                            debug!(
                                "Delivered {} records ({} bytes, {} gzipped) in {} ms, status {status}",
                                batch.len(),
                                payload.len(),
                                body.len(),
                                elapsed.as_millis()
                            );
                            return Ok(Delivery {
                                records: batch.len(),
                                attempts: attempt,
                                uncompressed_len: payload.len(),
                                compressed_len: body.len(),
                            });
                        }
                        AttemptOutcome::Fatal(status) => {
                            let body = truncate(response.text().await.unwrap_or_default());
                            error!("Batch rejected with status {status}: {body}");
                            return Err(TransportError::Rejected { status, body });
                        }
                        AttemptOutcome::Retryable(status) => {
                            warn!("Attempt {attempt}/{max_attempts} failed with status {status}");
                            Some(status)
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    warn!("Attempt {attempt}/{max_attempts} timed out after {} ms", elapsed.as_millis());
                    None
                }
                Err(e) => {
                    error!("Request to {} failed: {e}", self.target.stream());
                    return Err(TransportError::Http(e));
                }
            };

            if attempt >= max_attempts {
                error!("Giving up on batch of {} records after {attempt} attempts", batch.len());
                return Err(TransportError::RetriesExhausted {
                    attempts: attempt,
                    status: last_status,
                });
            }
            let delay = self.retry_policy.delay(attempt);
            debug!("Retrying in {} ms", delay.as_millis());
            tokio::time::sleep(delay).await;
        }
    }
}

fn describe_status(status: &Option<StatusCode>) -> String {
    status.map_or_else(|| "timeout".to_string(), |s| s.to_string())
}

fn truncate(body: String) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY_CHARS) {
        Some((idx, _)) => {
            let mut preview = body[..idx].to_string();
            preview.push('…');
            preview
        }
        None => body,
    }
}
