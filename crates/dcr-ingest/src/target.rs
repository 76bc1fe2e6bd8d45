// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingestion target addressing: stream name normalization and request URI.
//!
//! ```text
//! {endpoint}/dataCollectionRules/{dcr_immutable_id}/streams/{stream}?api-version=2023-01-01
//! ```

use crate::config::ConfigError;
use crate::constants::{INGESTION_API_VERSION, STREAM_PREFIX, STREAM_SUFFIX};
use reqwest::Url;

/// Applies the `Custom-` prefix and `_CL` suffix, each at most once.
///
/// The checks are ASCII case-insensitive, so `custom-foo_cl` is left as is.
/// Names carrying a query string or path separator are rejected.
///
/// ```
/// use dcr_ingest::target::normalize_stream_name;
///
/// assert_eq!(normalize_stream_name("Foo").unwrap(), "Custom-Foo_CL");
/// assert_eq!(normalize_stream_name("Custom-Foo_CL").unwrap(), "Custom-Foo_CL");
/// ```
pub fn normalize_stream_name(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid("stream name cannot be empty".to_string()));
    }
    if let Some(invalid) = trimmed.chars().find(|ch| matches!(ch, '?' | '&' | '#' | '/')) {
        return Err(ConfigError::Invalid(format!(
            "stream name '{trimmed}' contains '{invalid}'; pass the bare stream name without query string or path"
        )));
    }

    let mut stream = String::with_capacity(trimmed.len() + STREAM_PREFIX.len() + STREAM_SUFFIX.len());
    if !starts_with_ignore_case(trimmed, STREAM_PREFIX) {
        stream.push_str(STREAM_PREFIX);
    }
    stream.push_str(trimmed);
    if !ends_with_ignore_case(trimmed, STREAM_SUFFIX) {
        stream.push_str(STREAM_SUFFIX);
    }
    Ok(stream)
}

fn starts_with_ignore_case(text: &str, prefix: &str) -> bool {
    text.len() >= prefix.len()
        && text.is_char_boundary(prefix.len())
        && text[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn ends_with_ignore_case(text: &str, suffix: &str) -> bool {
    text.len() >= suffix.len()
        && text.is_char_boundary(text.len() - suffix.len())
        && text[text.len() - suffix.len()..].eq_ignore_ascii_case(suffix)
}

/// Immutable, fully built ingestion URI for one DCR stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionTarget {
    stream: String,
    url: Url,
}

impl IngestionTarget {
    /// Builds the target from the configured endpoint, DCR immutable id and
    /// raw stream name.
    pub fn new(endpoint: &str, dcr_immutable_id: &str, stream_name: &str) -> Result<Self, ConfigError> {
        let endpoint = endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ConfigError::Invalid("ingestion endpoint cannot be empty".to_string()));
        }
        let dcr_immutable_id = dcr_immutable_id.trim();
        if dcr_immutable_id.is_empty() || dcr_immutable_id.contains(['/', '?', '#']) {
            return Err(ConfigError::Invalid(format!(
                "invalid DCR immutable id '{dcr_immutable_id}'"
            )));
        }
        let stream = normalize_stream_name(stream_name)?;

        let raw = format!(
            "{endpoint}/dataCollectionRules/{dcr_immutable_id}/streams/{stream}?api-version={INGESTION_API_VERSION}"
        );
        let url = Url::parse(&raw)
            .map_err(|e| ConfigError::Invalid(format!("invalid ingestion endpoint '{endpoint}': {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "ingestion endpoint '{endpoint}' must use http or https"
            )));
        }
        Ok(Self { stream, url })
    }

    /// Effective stream name, prefix and suffix applied.
    #[must_use]
    pub fn stream(&self) -> &str {
        &self.stream
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl std::fmt::Display for IngestionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_adds_prefix_and_suffix() {
        assert_eq!(normalize_stream_name("Foo").unwrap(), "Custom-Foo_CL");
        assert_eq!(normalize_stream_name("Custom-Foo").unwrap(), "Custom-Foo_CL");
        assert_eq!(normalize_stream_name("Foo_CL").unwrap(), "Custom-Foo_CL");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        assert_eq!(normalize_stream_name("Custom-Foo_CL").unwrap(), "Custom-Foo_CL");
        assert_eq!(normalize_stream_name("custom-foo_cl").unwrap(), "custom-foo_cl");
        assert_eq!(normalize_stream_name("  Foo  ").unwrap(), "Custom-Foo_CL");
    }

    #[test]
    fn test_normalize_rejects_query_fragments() {
        assert!(matches!(
            normalize_stream_name("Foo?api-version=2021"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(normalize_stream_name("Foo/bar").is_err());
        assert!(normalize_stream_name("   ").is_err());
    }

    #[test]
    fn test_target_url() {
        let target = IngestionTarget::new(
            "https://my-dce.eastus-1.ingest.monitor.azure.com/",
            "dcr-0123456789abcdef",
            "Inventory",
        )
        .unwrap();
        assert_eq!(target.stream(), "Custom-Inventory_CL");
        assert_eq!(
            target.to_string(),
            "https://my-dce.eastus-1.ingest.monitor.azure.com/dataCollectionRules/dcr-0123456789abcdef/streams/Custom-Inventory_CL?api-version=2023-01-01"
        );
    }

    #[test]
    fn test_target_rejects_bad_endpoint() {
        assert!(IngestionTarget::new("", "dcr-1", "Foo").is_err());
        assert!(IngestionTarget::new("not a url", "dcr-1", "Foo").is_err());
        assert!(IngestionTarget::new("ftp://host", "dcr-1", "Foo").is_err());
        assert!(IngestionTarget::new("https://host", "dcr/1", "Foo").is_err());
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(name in "[A-Za-z0-9_-]{1,30}") {
            let once = normalize_stream_name(&name).unwrap();
            let twice = normalize_stream_name(&once).unwrap();
            prop_assert_eq!(&once, &twice);
            prop_assert!(once.starts_with("Custom-") || once[..7].eq_ignore_ascii_case("custom-"));
        }
    }
}
