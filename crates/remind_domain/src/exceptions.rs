use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{ser::SerializeSeq, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Per-item set of local calendar dates (skipped or completed occurrences).
///
/// Persisted as a JSON array of `YYYY-MM-DD` strings. Reading is lenient: the
/// array may itself arrive JSON-encoded inside a string, and anything that
/// cannot be parsed degrades to an empty set instead of failing the item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateSet(BTreeSet<NaiveDate>);

impl DateSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.0.contains(&date)
    }

    pub fn insert(&mut self, date: NaiveDate) -> bool {
        self.0.insert(date)
    }

    pub fn remove(&mut self, date: NaiveDate) -> bool {
        self.0.remove(&date)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.0.iter().copied()
    }

    pub fn with(mut self, date: NaiveDate) -> Self {
        self.insert(date);
        self
    }

    pub fn without(mut self, date: NaiveDate) -> Self {
        self.remove(date);
        self
    }

    pub fn from_json(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::from_value(value),
            Err(err) => {
                tracing::warn!(%err, "discarding malformed exception dates");
                Self::default()
            }
        }
    }

    pub fn to_json(&self) -> String {
        let dates: Vec<String> = self.0.iter().map(|date| format_date(*date)).collect();
        serde_json::Value::from(dates).to_string()
    }

    fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::default(),
            Value::String(encoded) => Self::from_json(&encoded),
            Value::Array(entries) => entries
                .iter()
                .filter_map(|entry| match entry.as_str().and_then(parse_date) {
                    Some(date) => Some(date),
                    None => {
                        tracing::warn!(%entry, "dropping unparseable exception date");
                        None
                    }
                })
                .collect(),
            other => {
                tracing::warn!(value = %other, "exception dates are not an array");
                Self::default()
            }
        }
    }
}

impl FromIterator<NaiveDate> for DateSet {
    fn from_iter<I: IntoIterator<Item = NaiveDate>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Serialize for DateSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for date in &self.0 {
            seq.serialize_element(&format_date(*date))?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for DateSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(value))
    }
}

/// Parses a `YYYY-MM-DD` date, tolerating a trailing time component.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, DATE_FORMAT).ok()
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_plain_and_string_encoded_arrays() {
        let plain = DateSet::from_json(r#"["2025-03-12","2025-03-10"]"#);
        assert!(plain.contains(date(2025, 3, 12)));
        assert_eq!(plain.len(), 2);

        let nested = DateSet::from_json(r#""[\"2025-03-12\"]""#);
        assert!(nested.contains(date(2025, 3, 12)));
    }

    #[test]
    fn malformed_payload_is_empty_not_an_error() {
        assert!(DateSet::from_json("not json").is_empty());
        assert!(DateSet::from_json(r#"{"a":1}"#).is_empty());
        assert!(DateSet::from_json("").is_empty());

        let partial = DateSet::from_json(r#"["2025-03-12", "garbage", 7]"#);
        assert_eq!(partial.len(), 1);
    }

    #[test]
    fn serializes_sorted_and_deduplicated() {
        let set: DateSet = [date(2025, 3, 12), date(2025, 3, 1), date(2025, 3, 12)]
            .into_iter()
            .collect();
        assert_eq!(set.to_json(), r#"["2025-03-01","2025-03-12"]"#);
        assert_eq!(DateSet::from_json(&set.to_json()), set);
    }

    #[test]
    fn timestamp_suffix_keeps_the_calendar_date() {
        assert_eq!(parse_date("2025-03-12T23:30:00Z"), Some(date(2025, 3, 12)));
    }
}
