//! Decoder for the source's indicator-values JSON document.
//!
//! ```json
//! {
//!   "indicator": {
//!     "id": 600,
//!     "values": [
//!       {"datetime": "2024-01-01T00:00:00.000+01:00", "value": 63.33,
//!        "geo_id": 3, "geo_name": "España"}
//!     ]
//!   }
//! }
//! ```

use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

use super::{Decoder, FetchError};
use crate::table::{Cell, ColumnKey, DimensionId, Observation, SeriesId};

#[derive(Debug, Deserialize)]
struct Document {
    indicator: IndicatorValues,
}

#[derive(Debug, Deserialize)]
struct IndicatorValues {
    id: SeriesId,
    #[serde(default)]
    values: Vec<Point>,
}

#[derive(Debug, Deserialize)]
struct Point {
    datetime: String,
    #[serde(default)]
    value: Option<f64>,
    #[serde(default)]
    geo_id: Option<DimensionId>,
    #[serde(default)]
    geo_name: Option<String>,
}

/// Decodes `{"indicator": {"id", "values": [...]}}` responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValuesDecoder {
    offset: Option<FixedOffset>,
}

impl ValuesDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-express every timestamp in `offset`.
    pub fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }
}

impl Decoder for ValuesDecoder {
    fn decode(&self, raw: &[u8]) -> Result<Vec<Observation>, FetchError> {
        let document: Document =
            serde_json::from_slice(raw).map_err(|e| FetchError::Decode(e.to_string()))?;
        let series = document.indicator.id;

        document
            .indicator
            .values
            .into_iter()
            .map(|v| {
                let mut timestamp = DateTime::parse_from_rfc3339(&v.datetime).map_err(|e| {
                    FetchError::Decode(format!("invalid datetime '{}': {}", v.datetime, e))
                })?;
                if let Some(offset) = self.offset {
                    timestamp = timestamp.with_timezone(&offset);
                }

                let column = ColumnKey {
                    series,
                    dimension: v.geo_id,
                };
                let observation = Observation::new(timestamp, column, Cell::from(v.value));
                Ok(match v.geo_name {
                    Some(name) => observation.with_dimension_name(name),
                    None => observation,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_decode_values() {
        let raw = r#"{"indicator": {"id": 600, "values": [
            {"datetime": "2024-01-01T00:00:00.000+01:00", "value": 63.33, "geo_id": 3, "geo_name": "España"},
            {"datetime": "2024-01-01T01:00:00.000+01:00", "value": null, "geo_id": 3, "geo_name": "España"}
        ]}}"#;

        let observations = ValuesDecoder::new().decode(raw.as_bytes()).unwrap();

        assert_eq!(observations.len(), 2);
        let first = &observations[0];
        assert_eq!(first.column, ColumnKey::with_dimension(600, 3));
        assert_eq!(first.cell, Cell::Value(63.33));
        assert_eq!(first.dimension_name.as_deref(), Some("España"));
        assert_eq!(
            first.timestamp,
            FixedOffset::east_opt(3600)
                .unwrap()
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .unwrap()
        );
        assert_eq!(observations[1].cell, Cell::Absent);
    }

    #[test]
    fn test_decode_without_geo() {
        let raw = br#"{"indicator": {"id": 10034, "values": [
            {"datetime": "2024-01-01T00:00:00Z", "value": 1.0}
        ]}}"#;

        let observations = ValuesDecoder::new().decode(raw).unwrap();
        assert_eq!(observations[0].column, ColumnKey::series(10034));
        assert_eq!(observations[0].dimension_name, None);
    }

    #[test]
    fn test_with_offset() {
        let madrid = FixedOffset::east_opt(3600).unwrap();
        let raw = br#"{"indicator": {"id": 1, "values": [
            {"datetime": "2024-01-01T00:00:00Z", "value": 1.0}
        ]}}"#;

        let observations = ValuesDecoder::with_offset(madrid).decode(raw).unwrap();
        assert_eq!(observations[0].timestamp.offset(), &madrid);
        assert_eq!(
            observations[0].timestamp.to_rfc3339(),
            "2024-01-01T01:00:00+01:00"
        );
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            ValuesDecoder::new().decode(b"<html>"),
            Err(FetchError::Decode(_))
        ));

        let raw = br#"{"indicator": {"id": 1, "values": [{"datetime": "yesterday", "value": 1.0}]}}"#;
        let err = ValuesDecoder::new().decode(raw).unwrap_err();
        assert!(err.to_string().contains("yesterday"));
    }

    #[test]
    fn test_empty_values() {
        let raw = br#"{"indicator": {"id": 1, "values": []}}"#;
        assert!(ValuesDecoder::new().decode(raw).unwrap().is_empty());
    }
}
