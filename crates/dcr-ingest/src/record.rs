// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Assembly of wire-ready records.
//!
//! A [`RawRecord`] is what a source hands over: field names as written in the
//! input and text values. [`assemble`] turns it into an [`AssembledRecord`]
//! with sanitized names, typed values and a guaranteed `TimeGenerated` column.

use crate::constants::TIME_GENERATED;
use crate::normalizer::{infer_type, parse_timestamp, sanitize_name, TypedValue};
use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Ordered `(field name, value)` pairs exactly as the source supplied them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    fields: Vec<(String, Option<String>)>,
}

impl RawRecord {
    /// Value of the first field whose raw name matches `name` exactly.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_deref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_deref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<N: Into<String>> FromIterator<(N, Option<String>)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (N, Option<String>)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }
}

/// A sanitized, typed record. Serializes as a JSON object in field order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssembledRecord {
    fields: Vec<(String, TypedValue)>,
}

impl AssembledRecord {
    /// Inserts a field. An existing field with the same name keeps its
    /// position and takes the new value.
    fn insert(&mut self, name: String, value: TypedValue) {
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Byte length of the compact JSON object for this record.
    pub fn serialized_len(&self) -> Result<usize, serde_json::Error> {
        serde_json::to_vec(self).map(|bytes| bytes.len())
    }
}

impl Serialize for AssembledRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builds the wire-ready form of `raw`.
///
/// Fields are sanitized and typed in source order. `TimeGenerated` comes from
/// `time_column` when that raw column exists and parses as a date/time, which
/// overrides any inferred `TimeGenerated` field. Otherwise an existing
/// `TimeGenerated` field is kept if it holds a timestamp, and failing that
/// `fallback` is used.
#[must_use]
pub fn assemble(
    raw: &RawRecord,
    time_column: Option<&str>,
    fallback: DateTime<Utc>,
) -> AssembledRecord {
    let mut record = AssembledRecord::default();
    for (name, value) in raw.iter() {
        record.insert(sanitize_name(name), infer_type(value));
    }

    let designated = time_column
        .and_then(|column| raw.get(column))
        .flatten()
        .and_then(parse_timestamp);

    match designated {
        Some(timestamp) => {
            record.insert(TIME_GENERATED.to_string(), TypedValue::Timestamp(timestamp));
        }
        None if !matches!(record.get(TIME_GENERATED), Some(TypedValue::Timestamp(_))) => {
            record.insert(TIME_GENERATED.to_string(), TypedValue::Timestamp(fallback));
        }
        None => {}
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn raw(pairs: &[(&str, &str)]) -> RawRecord {
        pairs
            .iter()
            .map(|(name, value)| (*name, Some((*value).to_string())))
            .collect()
    }

    #[test]
    fn test_assemble_types_fields_in_order() {
        let record = assemble(&raw(&[("A 1", "true"), ("Qty", "42")]), None, run_start());

        let names: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["A_1", "Qty", "TimeGenerated"]);
        assert_eq!(record.get("A_1"), Some(&TypedValue::Bool(true)));
        assert_eq!(record.get("Qty"), Some(&TypedValue::Number(42.0)));
        assert_eq!(
            record.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(run_start()))
        );
    }

    #[test]
    fn test_designated_time_column_wins() {
        let record = assemble(
            &raw(&[("LastUpdated", "2024-01-01T00:00:00Z"), ("Name", "x")]),
            Some("LastUpdated"),
            run_start(),
        );
        assert_eq!(
            record.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            ))
        );
        // The source column is kept as well.
        assert!(record.get("LastUpdated").is_some());
    }

    #[test]
    fn test_designated_time_column_overrides_inferred_time_generated() {
        let record = assemble(
            &raw(&[
                ("TimeGenerated", "2020-05-05T05:05:05Z"),
                ("Seen", "2024-02-02T02:02:02Z"),
            ]),
            Some("Seen"),
            run_start(),
        );
        assert_eq!(
            record.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 2, 2, 2, 2, 2).unwrap()
            ))
        );
        assert_eq!(record.iter().next().map(|(name, _)| name), Some(TIME_GENERATED));
    }

    #[test]
    fn test_existing_time_generated_is_kept_without_designated_column() {
        let record = assemble(
            &raw(&[("TimeGenerated", "2020-05-05T05:05:05Z")]),
            None,
            run_start(),
        );
        assert_eq!(
            record.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(
                Utc.with_ymd_and_hms(2020, 5, 5, 5, 5, 5).unwrap()
            ))
        );
    }

    #[test]
    fn test_untyped_time_generated_is_replaced_by_fallback() {
        for value in ["", "not a date"] {
            let record = assemble(
                &raw(&[("TimeGenerated", value), ("Name", "x")]),
                None,
                run_start(),
            );
            assert_eq!(
                record.get(TIME_GENERATED),
                Some(&TypedValue::Timestamp(run_start()))
            );
            assert_eq!(record.iter().next().map(|(name, _)| name), Some(TIME_GENERATED));
        }
    }

    #[test]
    fn test_unparseable_or_missing_designated_column_falls_back() {
        let unparseable = assemble(
            &raw(&[("LastUpdated", "yesterday-ish")]),
            Some("LastUpdated"),
            run_start(),
        );
        assert_eq!(
            unparseable.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(run_start()))
        );

        let missing = assemble(&raw(&[("Other", "1")]), Some("LastUpdated"), run_start());
        assert_eq!(
            missing.get(TIME_GENERATED),
            Some(&TypedValue::Timestamp(run_start()))
        );
    }

    #[test]
    fn test_colliding_names_last_write_wins() {
        let record = assemble(&raw(&[("a b", "1"), ("a-b", "2")]), None, run_start());
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("a_b"), Some(&TypedValue::Number(2.0)));
        assert_eq!(record.iter().next().map(|(name, _)| name), Some("a_b"));
    }

    #[test]
    fn test_serialization_is_compact_and_ordered() {
        let record = assemble(
            &[("b", Some("x".to_string())), ("a", None)]
                .into_iter()
                .collect(),
            None,
            run_start(),
        );
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"b":"x","a":null,"TimeGenerated":"2025-06-01T12:00:00.0000000Z"}"#
        );
        assert_eq!(record.serialized_len().unwrap(), json.len());
    }
}
