//! Classification of raw station parameters into an InfluxDB point.
//!
//! Every key/value pair a weather station sends is either a numeric
//! observation (a *field*) or a categorical label (a *tag*). Numeric values
//! always become fields. Non-numeric values become tags only when the key is
//! in [`ALLOWED_TAGS`]; anything else is dropped.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

/// Measurement name shared by every point this service writes.
pub const MEASUREMENT: &str = "weather";

/// Keys allowed to become tags when their value is not numeric.
pub const ALLOWED_TAGS: &[&str] = &["stationtype", "mac"];

// ------------------------------------------------------------------ //
//  Types                                                              //
// ------------------------------------------------------------------ //

/// A single record destined for the time-series backend.
///
/// Fields and tags are kept in sorted maps so the encoded line is stable.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    /// Tag key → value (e.g. stationtype, mac)
    pub tags: BTreeMap<String, String>,
    /// Field key → value (e.g. tempf, humidity)
    pub fields: BTreeMap<String, f64>,
}

impl Point {
    /// An empty point in the [`MEASUREMENT`] series.
    pub fn new() -> Self {
        Self {
            measurement: MEASUREMENT.to_string(),
            tags: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.fields.is_empty()
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new()
    }
}

// ------------------------------------------------------------------ //
//  Classification                                                     //
// ------------------------------------------------------------------ //

/// Parse a raw value as a float, ignoring surrounding whitespace.
///
/// `inf` and `NaN` spellings are accepted and passed through untouched.
/// Underscores are accepted as digit separators (`1_013.25`) but only
/// between two digits.
pub fn parse_float(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if !raw.contains('_') {
        return raw.parse::<f64>().ok();
    }

    let bytes = raw.as_bytes();
    let separators_ok = bytes.iter().enumerate().all(|(i, b)| {
        *b != b'_'
            || (i > 0
                && i + 1 < bytes.len()
                && bytes[i - 1].is_ascii_digit()
                && bytes[i + 1].is_ascii_digit())
    });
    if !separators_ok {
        return None;
    }
    raw.replace('_', "").parse::<f64>().ok()
}

pub fn is_allowed_tag(key: &str) -> bool {
    ALLOWED_TAGS.contains(&key)
}

/// Build a [`Point`] from the raw parameters of one station report.
pub fn build_point(params: &HashMap<String, String>) -> Point {
    let mut point = Point::new();

    for (key, value) in params {
        match parse_float(value) {
            Some(v) => {
                debug!(key, value = v, "added field");
                point.fields.insert(key.clone(), v);
            }
            None if is_allowed_tag(key) => {
                debug!(key, value, "added tag");
                point.tags.insert(key.clone(), value.clone());
            }
            None => {}
        }
    }

    debug!(
        fields = point.fields.len(),
        tags = point.tags.len(),
        "built point"
    );
    point
}

// ------------------------------------------------------------------ //
//  Tests                                                              //
// ------------------------------------------------------------------ //

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn numeric_values_become_fields() {
        let point = build_point(&params(&[("temperature", "23.5"), ("humidity", "65")]));
        assert_eq!(point.measurement, "weather");
        assert_eq!(point.fields.get("temperature"), Some(&23.5));
        assert_eq!(point.fields.get("humidity"), Some(&65.0));
        assert!(point.tags.is_empty());
    }

    #[test]
    fn exponent_and_negative_notation_parse() {
        let point = build_point(&params(&[("a", "-7.2e1"), ("b", "1013.25"), ("c", " 4 ")]));
        assert_eq!(point.fields.get("a"), Some(&-72.0));
        assert_eq!(point.fields.get("b"), Some(&1013.25));
        assert_eq!(point.fields.get("c"), Some(&4.0));
    }

    #[test]
    fn digit_separators_are_accepted_between_digits() {
        assert_eq!(parse_float("1_000"), Some(1000.0));
        assert_eq!(parse_float("1_013.25"), Some(1013.25));
        assert_eq!(parse_float("2.5e1_0"), Some(2.5e10));
        assert_eq!(parse_float("_1"), None);
        assert_eq!(parse_float("1_"), None);
        assert_eq!(parse_float("1__0"), None);
        assert_eq!(parse_float("1_.5"), None);
    }

    #[test]
    fn non_numeric_outside_allowlist_is_dropped() {
        let point = build_point(&params(&[
            ("station_id", "WS001"),
            ("model", "WS-5000"),
            ("invalid_num", "not_a_number"),
        ]));
        assert!(point.fields.is_empty());
        assert!(point.tags.is_empty());
    }

    #[test]
    fn allowlisted_keys_become_tags() {
        let point = build_point(&params(&[
            ("stationtype", "WS-5000_V1.1"),
            ("mac", "AA:BB:CC:DD:EE:FF"),
            ("tempf", "74.3"),
            ("PASSKEY", "test123"),
        ]));
        assert_eq!(point.tags.len(), 2);
        assert_eq!(point.tags["stationtype"], "WS-5000_V1.1");
        assert_eq!(point.tags["mac"], "AA:BB:CC:DD:EE:FF");
        assert_eq!(point.fields.len(), 1);
    }

    #[test]
    fn numeric_allowlisted_key_is_a_field_not_a_tag() {
        let point = build_point(&params(&[("mac", "12345")]));
        assert_eq!(point.fields.get("mac"), Some(&12345.0));
        assert!(point.tags.is_empty());
    }

    #[test]
    fn empty_values_follow_the_allowlist_rule() {
        let point = build_point(&params(&[("", ""), ("mac", ""), ("tempf", "")]));
        assert!(point.fields.is_empty());
        assert_eq!(point.tags.len(), 1);
        assert_eq!(point.tags["mac"], "");
    }

    #[test]
    fn non_finite_values_pass_through() {
        let point = build_point(&params(&[("x", "NaN"), ("y", "inf")]));
        assert!(point.fields["x"].is_nan());
        assert_eq!(point.fields["y"], f64::INFINITY);
    }

    #[test]
    fn empty_input_yields_empty_point() {
        let point = build_point(&HashMap::new());
        assert!(point.is_empty());
        assert_eq!(point.measurement, MEASUREMENT);
    }

    #[test]
    fn tags_never_escape_the_allowlist() {
        let raw = params(&[
            ("dateutc", "2025-06-28 15:30:00"),
            ("model", "WS-5000"),
            ("stationtype", "EasyWeather"),
            ("freq", "868M"),
            ("winddir", "180"),
        ]);
        let point = build_point(&raw);
        for key in point.tags.keys() {
            assert!(is_allowed_tag(key), "unexpected tag {key}");
        }
        for key in point.fields.keys() {
            assert!(!point.tags.contains_key(key));
        }
    }
}
