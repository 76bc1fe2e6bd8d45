// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! End-to-end driver: source records in, delivered batches out.

use crate::config::{ConfigError, IngestConfig};
use crate::packer::{Batch, BatchPacker};
use crate::record::{assemble, RawRecord};
use crate::source::{InputFormat, SourceError};
use crate::target::IngestionTarget;
use crate::token::{TokenError, TokenFactory};
use crate::transport::{Transport, TransportError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info};

/// Running totals of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub records_read: usize,
    pub records_sent: usize,
    pub batches_sent: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} records sent in {} batches",
            self.records_sent, self.records_read, self.batches_sent
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineErrorKind {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("Failed to measure record: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A fatal error, together with what had already been delivered when it hit.
/// Batches accepted before the failure are not rolled back.
#[derive(Debug, thiserror::Error)]
#[error("{kind} ({summary})")]
pub struct PipelineError {
    pub summary: RunSummary,
    #[source]
    pub kind: PipelineErrorKind,
}

impl PipelineError {
    fn new(summary: RunSummary, kind: impl Into<PipelineErrorKind>) -> Self {
        Self {
            summary,
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Source column whose value becomes `TimeGenerated`.
    pub time_column: Option<String>,
    pub max_post_bytes: usize,
    /// `TimeGenerated` for records without a usable event time.
    pub run_started: DateTime<Utc>,
}

impl PipelineOptions {
    #[must_use]
    pub fn from_config(config: &IngestConfig, run_started: DateTime<Utc>) -> Self {
        Self {
            time_column: config.time_column.clone(),
            max_post_bytes: config.max_post_bytes,
            run_started,
        }
    }
}

#[derive(Debug)]
pub struct Pipeline {
    transport: Transport,
    token_factory: TokenFactory,
    options: PipelineOptions,
}

impl Pipeline {
    #[must_use]
    pub fn new(transport: Transport, token_factory: TokenFactory, options: PipelineOptions) -> Self {
        Self {
            transport,
            token_factory,
            options,
        }
    }

    /// Streams `source` through assembly, packing and delivery.
    ///
    /// The token is resolved before the first record is read. Each flushed
    /// batch is delivered before the next record is pulled from the source.
    pub async fn run<I>(&self, source: I) -> Result<RunSummary, PipelineError>
    where
        I: IntoIterator<Item = Result<RawRecord, SourceError>>,
    {
        let mut summary = RunSummary::default();
        let token = self
            .token_factory
            .get_token()
            .await
            .map_err(|e| PipelineError::new(summary, e))?;

        info!("Sending records to stream {}", self.transport.target().stream());
        let mut packer = BatchPacker::new(self.options.max_post_bytes);
        let time_column = self.options.time_column.as_deref();

        for raw in source {
            let raw = raw.map_err(|e| PipelineError::new(summary, e))?;
            summary.records_read += 1;
            let record = assemble(&raw, time_column, self.options.run_started);
            let flushed = packer
                .push(record)
                .map_err(|e| PipelineError::new(summary, e))?;
            if let Some(batch) = flushed {
                self.send(batch, token, &mut summary).await?;
            }
        }
        if let Some(batch) = packer.finish() {
            self.send(batch, token, &mut summary).await?;
        }

        info!("Run complete: {summary}");
        Ok(summary)
    }

    async fn send(&self, batch: Batch, token: &str, summary: &mut RunSummary) -> Result<(), PipelineError> {
        let delivery = self
            .transport
            .deliver(batch, token)
            .await
            .map_err(|e| PipelineError::new(*summary, e))?;
        summary.records_sent += delivery.records;
        summary.batches_sent += 1;
        debug!(
            "Batch {} accepted after {} attempt(s): {} records, {} bytes ({} gzipped), {} sent so far",
            summary.batches_sent,
            delivery.attempts,
            delivery.records,
            delivery.uncompressed_len,
            delivery.compressed_len,
            summary.records_sent
        );
        Ok(())
    }
}

/// Outcome of a dry run: the resolved target and whether a token could be
/// obtained. Nothing is sent.
#[derive(Debug)]
pub struct Preflight {
    pub target: IngestionTarget,
    pub max_post_bytes: usize,
    pub input: Option<(PathBuf, InputFormat)>,
    pub token: Result<(), TokenError>,
}

impl Preflight {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.token.is_ok()
    }
}

impl fmt::Display for Preflight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "stream:         {}", self.target.stream())?;
        writeln!(f, "uri:            {}", self.target)?;
        writeln!(f, "max post bytes: {}", self.max_post_bytes)?;
        if let Some((path, format)) = &self.input {
            writeln!(f, "input:          {} ({format:?})", path.display())?;
        }
        match &self.token {
            Ok(()) => write!(f, "token:          acquired"),
            Err(e) => write!(f, "token:          FAILED: {e}"),
        }
    }
}

/// Validates `config`, builds the target and tries to acquire a token.
///
/// Configuration problems are returned as errors. A token failure is
/// reported in the returned [`Preflight`] instead.
pub async fn preflight(config: &IngestConfig, token_factory: &TokenFactory) -> Result<Preflight, ConfigError> {
    IngestConfig {
        preflight: true,
        ..config.clone()
    }
    .validate()?;
    let target = config.target()?;
    let input = config
        .input_path
        .clone()
        .map(|path| (path, config.resolved_input_format()));

    let token = token_factory.get_token().await.map(|_| ());
    match &token {
        Ok(()) => info!("Preflight: token acquired for stream {}", target.stream()),
        Err(e) => info!("Preflight: token acquisition failed: {e}"),
    }
    Ok(Preflight {
        target,
        max_post_bytes: config.max_post_bytes,
        input,
        token,
    })
}
