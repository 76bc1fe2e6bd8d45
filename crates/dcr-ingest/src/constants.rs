// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Protocol constants and defaults for the Logs Ingestion API.

use std::time::Duration;

/// Default ceiling for the uncompressed JSON body of a single POST.
///
/// The service rejects bodies above [`MAX_POST_BYTES_HARD_LIMIT`]; the default
/// keeps some headroom below it.
pub const DEFAULT_MAX_POST_BYTES: usize = 900_000;

/// Upper bound accepted by the ingestion endpoint for an uncompressed body.
pub const MAX_POST_BYTES_HARD_LIMIT: usize = 1_000_000;

/// `api-version` query parameter sent on every ingestion request.
pub const INGESTION_API_VERSION: &str = "2023-01-01";

/// Custom streams must start with this prefix.
pub const STREAM_PREFIX: &str = "Custom-";

/// Custom log tables end with this suffix, and so do their streams.
pub const STREAM_SUFFIX: &str = "_CL";

/// Column every assembled record carries.
pub const TIME_GENERATED: &str = "TimeGenerated";

/// Longest column name the destination table accepts.
pub const MAX_FIELD_NAME_LEN: usize = 45;

/// Used when a raw field name sanitizes to nothing.
pub const PLACEHOLDER_FIELD_NAME: &str = "col";

/// Total delivery attempts per batch, first try included.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Base unit of the exponential backoff schedule.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Longest wait between two delivery attempts.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// OAuth scope granting write access to the ingestion endpoint.
pub const MONITOR_SCOPE: &str = "https://monitor.azure.com//.default";

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";

/// Prefix written at the start of every log line.
pub const LOG_PREFIX: &str = "DCR_INGEST";
