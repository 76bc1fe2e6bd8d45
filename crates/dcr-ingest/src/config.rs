// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Run configuration read from environment variables.

use crate::constants::{
    DEFAULT_AUTHORITY_HOST, DEFAULT_MAX_POST_BYTES, DEFAULT_REQUEST_TIMEOUT,
    MAX_POST_BYTES_HARD_LIMIT,
};
use crate::source::InputFormat;
use crate::target::IngestionTarget;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while reading or validating configuration. Always fatal,
/// and always raised before any network call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Entra ID tenant of the app registration
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    /// Data collection endpoint, e.g. `https://my-dce.eastus-1.ingest.monitor.azure.com`
    pub ingestion_endpoint: String,
    /// Immutable id of the data collection rule (`dcr-...`)
    pub dcr_immutable_id: String,
    /// Stream name as supplied; normalized when the target is built
    pub stream_name: String,
    /// File to read records from, required unless `preflight` is set
    pub input_path: Option<PathBuf>,
    pub input_format: Option<InputFormat>,
    /// Source column holding each record's event time
    pub time_column: Option<String>,
    /// Ceiling for the uncompressed body of one POST
    pub max_post_bytes: usize,
    /// Validate, fetch a token and print the target, without sending data
    pub preflight: bool,
    pub request_timeout: Duration,
    pub authority_host: String,
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            ingestion_endpoint: String::new(),
            dcr_immutable_id: String::new(),
            stream_name: String::new(),
            input_path: None,
            input_format: None,
            time_column: None,
            max_post_bytes: DEFAULT_MAX_POST_BYTES,
            preflight: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

/// Reads a variable, treating blank values as unset.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|val| val.trim().to_string())
        .filter(|val| !val.is_empty())
}

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

impl IngestConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let max_post_bytes = match non_empty_var("DCR_MAX_POST_BYTES") {
            Some(val) => val.parse::<usize>().map_err(|_| {
                ConfigError::Invalid(format!("DCR_MAX_POST_BYTES must be a positive integer, got '{val}'"))
            })?,
            None => defaults.max_post_bytes,
        };
        let request_timeout = match non_empty_var("DCR_REQUEST_TIMEOUT_SECS") {
            Some(val) => Duration::from_secs(val.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!(
                    "DCR_REQUEST_TIMEOUT_SECS must be a whole number of seconds, got '{val}'"
                ))
            })?),
            None => defaults.request_timeout,
        };
        let input_format = non_empty_var("DCR_INPUT_FORMAT")
            .map(|val| val.parse::<InputFormat>())
            .transpose()?;

        let config = Self {
            tenant_id: non_empty_var("DCR_TENANT_ID").unwrap_or_default(),
            client_id: non_empty_var("DCR_CLIENT_ID").unwrap_or_default(),
            client_secret: non_empty_var("DCR_CLIENT_SECRET").unwrap_or_default(),
            ingestion_endpoint: non_empty_var("DCR_INGESTION_ENDPOINT").unwrap_or_default(),
            dcr_immutable_id: non_empty_var("DCR_IMMUTABLE_ID").unwrap_or_default(),
            stream_name: non_empty_var("DCR_STREAM_NAME").unwrap_or_default(),
            input_path: non_empty_var("DCR_INPUT_PATH").map(PathBuf::from),
            input_format,
            time_column: non_empty_var("DCR_TIME_COLUMN"),
            max_post_bytes,
            preflight: non_empty_var("DCR_PREFLIGHT").is_some_and(|val| parse_flag(&val)),
            request_timeout,
            authority_host: non_empty_var("DCR_AUTHORITY_HOST").unwrap_or(defaults.authority_host),
            https_proxy: non_empty_var("DCR_PROXY_HTTPS").or_else(|| non_empty_var("HTTPS_PROXY")),
            log_level: non_empty_var("DCR_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("DCR_TENANT_ID", &self.tenant_id),
            ("DCR_CLIENT_ID", &self.client_id),
            ("DCR_CLIENT_SECRET", &self.client_secret),
            ("DCR_INGESTION_ENDPOINT", &self.ingestion_endpoint),
            ("DCR_IMMUTABLE_ID", &self.dcr_immutable_id),
            ("DCR_STREAM_NAME", &self.stream_name),
        ];
        if let Some((key, _)) = required.into_iter().find(|(_, val)| val.trim().is_empty()) {
            return Err(ConfigError::Missing(key));
        }
        if !self.preflight && self.input_path.is_none() {
            return Err(ConfigError::Missing("DCR_INPUT_PATH"));
        }

        if self.max_post_bytes == 0 || self.max_post_bytes > MAX_POST_BYTES_HARD_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "DCR_MAX_POST_BYTES must be between 1 and {MAX_POST_BYTES_HARD_LIMIT}, got {}",
                self.max_post_bytes
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "DCR_REQUEST_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        // Surfaces malformed endpoint / DCR id / stream name up front.
        self.target().map(|_| ())
    }

    /// Builds the ingestion target from the endpoint, DCR id and stream name.
    pub fn target(&self) -> Result<IngestionTarget, ConfigError> {
        IngestionTarget::new(&self.ingestion_endpoint, &self.dcr_immutable_id, &self.stream_name)
    }

    /// Input format, from the explicit setting or else the file extension.
    #[must_use]
    pub fn resolved_input_format(&self) -> InputFormat {
        self.input_format.unwrap_or_else(|| {
            self.input_path
                .as_deref()
                .map(InputFormat::from_path)
                .unwrap_or_default()
        })
    }
}
