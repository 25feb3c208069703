//! InfluxDB line-protocol encoding for [`Point`].
//!
//! Values InfluxDB cannot store are left out of the line rather than failing
//! the whole point: non-finite fields and tags with an empty value.

use thiserror::Error;

use crate::point::Point;

#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    #[error("point in measurement '{0}' has no writable fields")]
    NoFields(String),
}

fn escape_lp(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace(' ', "\\ ")
        .replace(',', "\\,")
        .replace('=', "\\=")
}

/// Render a point as a single line, leaving the timestamp to the server.
///
/// measurement,tag1=v1,tag2=v2 field1=1.5,field2=2
pub fn to_line_protocol(pt: &Point) -> Result<String, EncodeError> {
    let fields: Vec<String> = pt
        .fields
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(k, v)| format!("{}={}", escape_lp(k), v))
        .collect();

    if fields.is_empty() {
        return Err(EncodeError::NoFields(pt.measurement.clone()));
    }

    let tags: String = pt
        .tags
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, v)| format!(",{}={}", escape_lp(k), escape_lp(v)))
        .collect();

    Ok(format!(
        "{}{} {}",
        escape_lp(&pt.measurement),
        tags,
        fields.join(",")
    ))
}
