use std::collections::BTreeMap;

use chrono::NaiveDateTime;

/// `NaiveDateTime`'s `Display`/`FromStr` impls are not round-trip
/// compatible with each other (`Display` separates date and time with a
/// space; `FromStr` requires a literal `T`), so the `timestamp` column
/// is written and read with this explicit format instead.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// One parsed CSV row, keyed by column name.
///
/// A `BTreeMap` (rather than `HashMap`) keeps column order stable across
/// runs, which matters for `--include_details` output and for test
/// assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn from_fields(fields: BTreeMap<String, String>) -> Self {
        Self { fields }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(|s| s.as_str())
    }

    pub fn trade_id(&self) -> Option<&str> {
        self.get("trade")
    }

    /// The record's full date-time, as rewritten by `LogdirStream` from the
    /// directory-derived date and the row's intra-day `timestamp` column.
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        self.get("timestamp")
            .and_then(|s| NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok())
    }

    /// Overwrite the `timestamp` column with a fully-qualified date-time.
    pub fn set_timestamp(&mut self, timestamp: NaiveDateTime) {
        self.fields.insert(
            "timestamp".to_string(),
            timestamp.format(TIMESTAMP_FORMAT).to_string(),
        );
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

/// Normalise a field value for comparison: lower-case, then strip a single
/// leading `-`. Per spec.md §4.2 / §9, multi-char signs and whitespace are
/// deliberately left alone — this matches the original's
/// `val.lower(); if val[0] == '-': val = val[1:]` exactly.
pub fn normalize(value: &str) -> String {
    let lower = value.to_lowercase();
    match lower.strip_prefix('-') {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, &str)]) -> Record {
        let fields = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Record::from_fields(fields)
    }

    #[test]
    fn trade_id_and_timestamp_accessors() {
        let r = record(&[("trade", "T1"), ("timestamp", "2026-01-01T10:00:00")]);
        assert_eq!(r.trade_id(), Some("T1"));
        assert!(r.timestamp().is_some());
    }

    #[test]
    fn missing_field_is_none() {
        let r = record(&[("trade", "T1")]);
        assert_eq!(r.get("symbol"), None);
        assert_eq!(r.timestamp(), None);
    }

    #[test]
    fn normalize_lowercases_and_strips_one_leading_minus() {
        assert_eq!(normalize("AAPL"), "aapl");
        assert_eq!(normalize("-10"), "10");
        assert_eq!(normalize("--10"), "-10");
        assert_eq!(normalize("10"), "10");
    }
}
