// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Field name sanitization and value type inference for a single record.
//!
//! Raw sources hand over every value as text. Before a record can be sent to
//! a custom log table each field name has to be a valid column name and each
//! value has to carry a JSON type the table schema can bind to.
//!
//! Type inference is a strict priority chain, the first rule that matches wins:
//!
//! 1. absent or empty → `null`
//! 2. `true` / `false` (any case) → boolean
//! 3. finite floating point number (invariant culture) → number
//! 4. date/time → UTC timestamp
//! 5. anything else → the original string, untouched

use crate::constants::{MAX_FIELD_NAME_LEN, PLACEHOLDER_FIELD_NAME};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Serialize, Serializer};

/// Naive date/time layouts, interpreted as UTC.
const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %I:%M %p",
];

/// Layouts carrying an explicit offset that RFC 3339 does not accept.
const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"];

/// A typed field value ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Bool(bool),
    /// Always finite.
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TypedValue::Null => serializer.serialize_unit(),
            TypedValue::Bool(value) => serializer.serialize_bool(*value),
            TypedValue::Number(value) => serializer.serialize_f64(*value),
            TypedValue::Timestamp(value) => serializer.serialize_str(&format_timestamp(value)),
            TypedValue::String(value) => serializer.serialize_str(value),
        }
    }
}

/// Maps a raw field name onto a valid column name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, an empty result becomes
/// `col`, a leading digit gets a `_` prepended and the result is cut to 45
/// characters. Distinct raw names may collide; callers do not deduplicate.
///
/// ```
/// use dcr_ingest::normalizer::sanitize_name;
///
/// assert_eq!(sanitize_name("A 1"), "A_1");
/// assert_eq!(sanitize_name("1st"), "_1st");
/// assert_eq!(sanitize_name(""), "col");
/// ```
#[must_use]
pub fn sanitize_name(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() {
        name.push_str(PLACEHOLDER_FIELD_NAME);
    }
    if name.starts_with(|ch: char| ch.is_ascii_digit()) {
        name.insert(0, '_');
    }
    // Only ASCII remains, so byte truncation lands on a char boundary.
    name.truncate(MAX_FIELD_NAME_LEN);
    name
}

/// Infers the JSON type of a raw value. Never fails.
#[must_use]
pub fn infer_type(raw: Option<&str>) -> TypedValue {
    let Some(raw) = raw else {
        return TypedValue::Null;
    };
    if raw.is_empty() {
        return TypedValue::Null;
    }

    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("true") {
        return TypedValue::Bool(true);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return TypedValue::Bool(false);
    }
    if let Some(number) = parse_number(trimmed) {
        return TypedValue::Number(number);
    }
    if let Some(timestamp) = parse_timestamp(trimmed) {
        return TypedValue::Timestamp(timestamp);
    }
    TypedValue::String(raw.to_string())
}

/// Parses an invariant-culture float. Thousands separators are not accepted
/// and non-finite results (`NaN`, `inf`) are rejected since JSON cannot carry them.
fn parse_number(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Parses a date/time in any of the accepted layouts and converts it to UTC.
///
/// Values without an offset are taken as UTC so the result does not depend
/// on the host timezone. The result is truncated to 100 ns ticks and limited
/// to years 0001-9999, so it renders and reparses to the same instant.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let parsed = parse_any_layout(raw.trim())?;
    if !(1..=9999).contains(&parsed.year()) {
        return None;
    }
    parsed.with_nanosecond(parsed.nanosecond() / 100 * 100)
}

fn parse_any_layout(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_DATETIME_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|midnight| midnight.and_utc());
        }
    }
    None
}

/// Renders a UTC instant as round-trippable ISO-8601 with 7 fractional digits
/// and a `Z` suffix, e.g. `2024-01-01T00:00:00.0000000Z`.
#[must_use]
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Leap-second nanos (>= 1e9) are clamped to keep the fraction 7 digits wide.
    let ticks = timestamp.nanosecond().min(999_999_999) / 100;
    format!("{}.{ticks:07}Z", timestamp.format("%Y-%m-%dT%H:%M:%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_name_replaces_invalid_characters() {
        assert_eq!(sanitize_name("A 1"), "A_1");
        assert_eq!(sanitize_name("first-name"), "first_name");
        assert_eq!(sanitize_name("price ($)"), "price____");
        assert_eq!(sanitize_name("already_ok_42"), "already_ok_42");
    }

    #[test]
    fn test_sanitize_name_non_ascii_maps_per_character() {
        assert_eq!(sanitize_name("café"), "caf_");
        assert_eq!(sanitize_name("日本"), "__");
    }

    #[test]
    fn test_sanitize_name_leading_digit() {
        assert_eq!(sanitize_name("1st"), "_1st");
        assert_eq!(sanitize_name("2024 total"), "_2024_total");
    }

    #[test]
    fn test_sanitize_name_empty_uses_placeholder() {
        assert_eq!(sanitize_name(""), "col");
    }

    #[test]
    fn test_sanitize_name_truncates() {
        let long = "a".repeat(80);
        assert_eq!(sanitize_name(&long).len(), MAX_FIELD_NAME_LEN);

        let digits = "9".repeat(60);
        let sanitized = sanitize_name(&digits);
        assert_eq!(sanitized.len(), MAX_FIELD_NAME_LEN);
        assert!(sanitized.starts_with('_'));
    }

    #[test]
    fn test_infer_null() {
        assert_eq!(infer_type(None), TypedValue::Null);
        assert_eq!(infer_type(Some("")), TypedValue::Null);
    }

    #[test]
    fn test_infer_bool_any_case() {
        assert_eq!(infer_type(Some("true")), TypedValue::Bool(true));
        assert_eq!(infer_type(Some("TRUE")), TypedValue::Bool(true));
        assert_eq!(infer_type(Some("False")), TypedValue::Bool(false));
    }

    #[test]
    fn test_infer_number() {
        assert_eq!(infer_type(Some("42")), TypedValue::Number(42.0));
        assert_eq!(infer_type(Some("3.5")), TypedValue::Number(3.5));
        assert_eq!(infer_type(Some("-1e3")), TypedValue::Number(-1000.0));
        assert_eq!(infer_type(Some(" 7 ")), TypedValue::Number(7.0));
    }

    #[test]
    fn test_infer_rejects_thousands_separators_and_non_finite() {
        assert_eq!(
            infer_type(Some("1,000")),
            TypedValue::String("1,000".to_string())
        );
        assert_eq!(infer_type(Some("NaN")), TypedValue::String("NaN".to_string()));
        assert_eq!(infer_type(Some("inf")), TypedValue::String("inf".to_string()));
    }

    #[test]
    fn test_infer_timestamp_with_offset_is_normalized_to_utc() {
        let value = infer_type(Some("2024-03-10T12:00:00+02:00"));
        assert_eq!(
            value,
            TypedValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_infer_timestamp_naive_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            infer_type(Some("2024-01-02 03:04:05")),
            TypedValue::Timestamp(expected)
        );
        assert_eq!(
            infer_type(Some("01/02/2024 03:04:05")),
            TypedValue::Timestamp(expected)
        );
        assert_eq!(
            infer_type(Some("2024-01-02")),
            TypedValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_infer_string_is_untouched() {
        assert_eq!(
            infer_type(Some("  hello world ")),
            TypedValue::String("  hello world ".to_string())
        );
    }

    #[test]
    fn test_format_timestamp_round_trips() {
        let ts = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .unwrap()
            .with_nanosecond(123_456_700)
            .unwrap();
        let rendered = format_timestamp(&ts);
        assert_eq!(rendered, "2024-01-01T00:00:00.1234567Z");
        assert_eq!(parse_timestamp(&rendered), Some(ts));

        let TypedValue::Timestamp(inferred) = infer_type(Some("2024-01-01T00:00:00.123456789Z")) else {
            panic!("expected a timestamp");
        };
        assert_eq!(inferred, ts);
        assert_eq!(parse_timestamp(&format_timestamp(&inferred)), Some(inferred));
    }

    #[test]
    fn test_out_of_range_years_stay_strings() {
        assert_eq!(
            infer_type(Some("+12345-06-07")),
            TypedValue::String("+12345-06-07".to_string())
        );
        assert_eq!(parse_timestamp("0000-01-01"), None);
        assert!(parse_timestamp("9999-12-31T23:59:59Z").is_some());
    }

    #[test]
    fn test_typed_value_serialization() {
        let values = vec![
            TypedValue::Null,
            TypedValue::Bool(true),
            TypedValue::Number(3.5),
            TypedValue::Timestamp(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            TypedValue::String("x".to_string()),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(
            json,
            r#"[null,true,3.5,"2024-01-01T00:00:00.0000000Z","x"]"#
        );
    }

    #[test]
    fn test_number_round_trips_through_json() {
        let value = infer_type(Some("0.1"));
        let json = serde_json::to_string(&value).unwrap();
        let reparsed: f64 = serde_json::from_str(&json).unwrap();
        assert_eq!(TypedValue::Number(reparsed), value);
    }

    proptest! {
        #[test]
        fn prop_sanitize_name_shape(raw in ".*") {
            let name = sanitize_name(&raw);
            prop_assert!(!name.is_empty());
            prop_assert!(name.len() <= MAX_FIELD_NAME_LEN);
            prop_assert!(name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_'));
            prop_assert!(!name.starts_with(|ch: char| ch.is_ascii_digit()));
            prop_assert_eq!(name, sanitize_name(&raw));
        }

        #[test]
        fn prop_infer_type_never_panics(raw in ".*") {
            let _ = infer_type(Some(&raw));
        }
    }
}
