//! Wire encoding for entity payloads
//!
//! Date-valued fields cross the HTTP surface as tagged epoch-millisecond
//! markers, `{"__type": "Date", "value": 1234567890123}`, and are reversed
//! on the client. Fields opt in with `#[serde(with = "wire::date_ms")]`
//! (or `option_date_ms`), so the set of timestamp fields is declared per
//! entity instead of sniffed from runtime shapes. Top-level payloads must
//! be objects; arrays are rejected at both ends.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const DATE_TAG: &str = "Date";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("top-level array payloads are not supported")]
    TopLevelArray,
    #[error("wire payload error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct DateMarkerRef<'a> {
    #[serde(rename = "__type")]
    tag: &'a str,
    value: i64,
}

#[derive(Deserialize)]
struct DateMarker {
    #[serde(rename = "__type")]
    tag: String,
    value: i64,
}

/// Serde with-module for `DateTime<Utc>` fields carried as date markers.
pub mod date_ms {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        DateMarkerRef {
            tag: DATE_TAG,
            value: date.timestamp_millis(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let marker = DateMarker::deserialize(deserializer)?;
        if marker.tag != DATE_TAG {
            return Err(serde::de::Error::custom(format!(
                "unexpected wire tag: {}",
                marker.tag
            )));
        }
        Utc.timestamp_millis_opt(marker.value)
            .single()
            .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
    }
}

/// Serde with-module for optional date-marker fields. `null` stays `null`.
pub mod option_date_ms {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        date: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => DateMarkerRef {
                tag: DATE_TAG,
                value: date.timestamp_millis(),
            }
            .serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let marker = Option::<DateMarker>::deserialize(deserializer)?;
        match marker {
            None => Ok(None),
            Some(marker) => {
                if marker.tag != DATE_TAG {
                    return Err(serde::de::Error::custom(format!(
                        "unexpected wire tag: {}",
                        marker.tag
                    )));
                }
                Utc.timestamp_millis_opt(marker.value)
                    .single()
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom("timestamp out of range"))
            }
        }
    }
}

/// Serialize a payload for the wire. Rejects top-level arrays.
pub fn to_wire<T: Serialize>(payload: &T) -> Result<Value, WireError> {
    let value = serde_json::to_value(payload)?;
    if value.is_array() {
        return Err(WireError::TopLevelArray);
    }
    Ok(value)
}

/// Decode a wire payload back into its typed form. Rejects top-level arrays.
pub fn from_wire<T: DeserializeOwned>(value: Value) -> Result<T, WireError> {
    if value.is_array() {
        return Err(WireError::TopLevelArray);
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Inner {
        #[serde(with = "date_ms")]
        stamp: DateTime<Utc>,
        label: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Outer {
        name: String,
        #[serde(with = "option_date_ms")]
        released: Option<DateTime<Utc>>,
        #[serde(with = "option_date_ms")]
        removed: Option<DateTime<Utc>>,
        children: Vec<Inner>,
    }

    fn ms(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_round_trip_nested_dates_arrays_and_nulls() {
        let outer = Outer {
            name: "The Matrix".to_string(),
            released: Some(ms(922_060_800_000)),
            removed: None,
            children: vec![
                Inner {
                    stamp: ms(1_000),
                    label: Some("a".to_string()),
                },
                Inner {
                    stamp: ms(2_000),
                    label: None,
                },
            ],
        };

        let encoded = to_wire(&outer).unwrap();
        let decoded: Outer = from_wire(encoded).unwrap();
        assert_eq!(decoded, outer);
    }

    #[test]
    fn test_encoded_shape_uses_date_markers() {
        let inner = Inner {
            stamp: ms(42),
            label: None,
        };
        let encoded = to_wire(&inner).unwrap();
        assert_eq!(
            encoded,
            json!({"stamp": {"__type": "Date", "value": 42}, "label": null})
        );
    }

    #[test]
    fn test_top_level_array_rejected_on_encode() {
        let list = vec![1, 2, 3];
        assert!(matches!(to_wire(&list), Err(WireError::TopLevelArray)));
    }

    #[test]
    fn test_top_level_array_rejected_on_decode() {
        let err = from_wire::<Vec<i32>>(json!([1, 2, 3]));
        assert!(matches!(err, Err(WireError::TopLevelArray)));
    }

    #[test]
    fn test_wrong_tag_rejected() {
        let value = json!({"stamp": {"__type": "Instant", "value": 42}, "label": null});
        assert!(from_wire::<Inner>(value).is_err());
    }
}
