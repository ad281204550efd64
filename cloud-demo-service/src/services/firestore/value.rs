//! Firestore REST value encoding.
//!
//! Firestore wraps every field in a single-key object naming its type
//! (`{"stringValue": "..."}`), which maps directly onto an externally tagged
//! serde enum.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    /// `"NULL_VALUE"` or `null` on the wire.
    NullValue(Option<String>),
    BooleanValue(bool),
    /// int64 travels as a decimal string.
    IntegerValue(String),
    /// Non-finite doubles travel as `"NaN"`, `"Infinity"` or `"-Infinity"`.
    DoubleValue(#[serde(with = "wire_double")] f64),
    /// RFC 3339 timestamp.
    TimestampValue(String),
    StringValue(String),
    /// Base64-encoded.
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(LatLng),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::NullValue(None),
            Value::Bool(b) => FieldValue::BooleanValue(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => FieldValue::IntegerValue(i.to_string()),
                None => FieldValue::DoubleValue(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => FieldValue::StringValue(s.clone()),
            Value::Array(items) => FieldValue::ArrayValue(ArrayValue {
                values: items.iter().map(FieldValue::from_json).collect(),
            }),
            Value::Object(map) => FieldValue::MapValue(MapValue {
                fields: encode_fields(map),
            }),
        }
    }

    /// Plain JSON view of the value. Timestamps become ISO-8601 strings.
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::NullValue(_) => Value::Null,
            FieldValue::BooleanValue(b) => Value::Bool(*b),
            FieldValue::IntegerValue(raw) => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(raw.clone())),
            FieldValue::DoubleValue(d) => Number::from_f64(*d)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(wire_double::name(*d).to_string())),
            FieldValue::TimestampValue(raw) => Value::String(format_timestamp(raw)),
            FieldValue::StringValue(s)
            | FieldValue::BytesValue(s)
            | FieldValue::ReferenceValue(s) => Value::String(s.clone()),
            FieldValue::GeoPointValue(point) => serde_json::json!({
                "latitude": point.latitude,
                "longitude": point.longitude,
            }),
            FieldValue::ArrayValue(array) => {
                Value::Array(array.values.iter().map(FieldValue::to_json).collect())
            }
            FieldValue::MapValue(map) => Value::Object(decode_fields(&map.fields)),
        }
    }
}

mod wire_double {
    use serde::{de, Deserialize, Deserializer, Serializer};

    const NAN: &str = "NaN";
    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireDouble {
        Number(f64),
        Text(String),
    }

    /// Wire spelling of a non-finite double.
    pub fn name(value: f64) -> &'static str {
        if value.is_nan() {
            NAN
        } else if value.is_sign_negative() {
            NEG_INFINITY
        } else {
            INFINITY
        }
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else {
            serializer.serialize_str(name(*value))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match WireDouble::deserialize(deserializer)? {
            WireDouble::Number(value) => Ok(value),
            WireDouble::Text(text) => match text.as_str() {
                NAN => Ok(f64::NAN),
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::invalid_value(
                    de::Unexpected::Str(other),
                    &"a number, \"NaN\", \"Infinity\" or \"-Infinity\"",
                )),
            },
        }
    }
}

pub fn encode_fields(fields: &Map<String, Value>) -> BTreeMap<String, FieldValue> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), FieldValue::from_json(value)))
        .collect()
}

pub fn decode_fields(fields: &BTreeMap<String, FieldValue>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), value.to_json()))
        .collect()
}

/// Reformats an RFC 3339 timestamp as ISO-8601 with a `+00:00` offset and
/// microsecond precision (omitted when zero). Unparseable input is returned
/// unchanged.
pub fn format_timestamp(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(parsed) => {
            let utc = parsed.with_timezone(&Utc);
            let precision = if utc.timestamp_subsec_micros() == 0 {
                SecondsFormat::Secs
            } else {
                SecondsFormat::Micros
            };
            utc.to_rfc3339_opts(precision, false)
        }
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_tagged_wire_values() {
        let wire = json!({
            "message": { "stringValue": "Hello" },
            "count": { "integerValue": "42" },
            "ratio": { "doubleValue": 0.5 },
            "ok": { "booleanValue": true },
            "nothing": { "nullValue": "NULL_VALUE" },
            "tags": { "arrayValue": { "values": [{ "stringValue": "a" }] } },
            "empty": { "arrayValue": {} },
            "nested": { "mapValue": { "fields": { "x": { "integerValue": "1" } } } },
            "where": { "geoPointValue": { "latitude": 1.5, "longitude": -2.0 } }
        });
        let fields: BTreeMap<String, FieldValue> = serde_json::from_value(wire).unwrap();

        let decoded = Value::Object(decode_fields(&fields));
        assert_eq!(
            decoded,
            json!({
                "message": "Hello",
                "count": 42,
                "ratio": 0.5,
                "ok": true,
                "nothing": null,
                "tags": ["a"],
                "empty": [],
                "nested": { "x": 1 },
                "where": { "latitude": 1.5, "longitude": -2.0 }
            })
        );
    }

    #[test]
    fn decodes_non_finite_doubles() {
        let wire = json!({
            "message": { "stringValue": "Hello" },
            "ratio": { "doubleValue": "NaN" },
            "high": { "doubleValue": "Infinity" },
            "low": { "doubleValue": "-Infinity" }
        });
        let fields: BTreeMap<String, FieldValue> = serde_json::from_value(wire).unwrap();

        assert!(matches!(fields["ratio"], FieldValue::DoubleValue(d) if d.is_nan()));
        assert_eq!(
            Value::Object(decode_fields(&fields)),
            json!({
                "message": "Hello",
                "ratio": "NaN",
                "high": "Infinity",
                "low": "-Infinity"
            })
        );
    }

    #[test]
    fn rejects_unknown_double_text() {
        let result = serde_json::from_value::<FieldValue>(json!({ "doubleValue": "lots" }));
        assert!(result.is_err());
    }

    #[test]
    fn non_finite_doubles_encode_as_wire_names() {
        assert_eq!(
            serde_json::to_value(FieldValue::DoubleValue(f64::NEG_INFINITY)).unwrap(),
            json!({ "doubleValue": "-Infinity" })
        );
    }

    #[test]
    fn null_value_accepts_json_null() {
        let value: FieldValue = serde_json::from_value(json!({ "nullValue": null })).unwrap();
        assert_eq!(value.to_json(), Value::Null);
    }

    #[test]
    fn encodes_json_into_tagged_values() {
        let encoded = serde_json::to_value(FieldValue::from_json(&json!({
            "message": "Hello",
            "n": 7,
            "f": 1.25
        })))
        .unwrap();

        assert_eq!(
            encoded,
            json!({ "mapValue": { "fields": {
                "f": { "doubleValue": 1.25 },
                "message": { "stringValue": "Hello" },
                "n": { "integerValue": "7" }
            } } })
        );
    }

    #[test]
    fn timestamp_gets_iso_format_with_offset() {
        assert_eq!(
            format_timestamp("2024-05-01T10:00:00.123456Z"),
            "2024-05-01T10:00:00.123456+00:00"
        );
    }

    #[test]
    fn timestamp_without_fraction_drops_micros() {
        assert_eq!(
            format_timestamp("2024-05-01T10:00:00Z"),
            "2024-05-01T10:00:00+00:00"
        );
    }

    #[test]
    fn timestamp_nanos_truncate_to_micros() {
        assert_eq!(
            format_timestamp("2024-05-01T10:00:00.123456789Z"),
            "2024-05-01T10:00:00.123456+00:00"
        );
    }

    #[test]
    fn unparseable_timestamp_is_returned_raw() {
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn timestamp_value_decodes_to_iso_string() {
        let value = FieldValue::TimestampValue("2024-05-01T10:00:00.5Z".to_string());
        assert_eq!(value.to_json(), json!("2024-05-01T10:00:00.500000+00:00"));
    }
}
