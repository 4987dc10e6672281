//! JSON <-> Qdrant payload conversion, shared by the episode and concept
//! stores (both round-trip a `serde`-derived struct through a point's
//! payload map).

use serde::de::DeserializeOwned;
use std::collections::HashMap;

pub fn to_payload_map<T: serde::Serialize>(
    value: &T,
) -> super::Result<HashMap<String, qdrant_client::qdrant::Value>> {
    let json = serde_json::to_value(value)?;
    Ok(match json {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(k, v)| (k, json_to_qdrant(v)))
            .collect(),
        _ => HashMap::new(),
    })
}

pub fn from_payload<T: DeserializeOwned>(
    payload: &HashMap<String, qdrant_client::qdrant::Value>,
) -> super::Result<T> {
    let json = qdrant_payload_to_json(payload);
    Ok(serde_json::from_value(json)?)
}

fn json_to_qdrant(value: serde_json::Value) -> qdrant_client::qdrant::Value {
    use qdrant_client::qdrant::value::Kind;
    let kind = match value {
        serde_json::Value::Null => Kind::NullValue(0),
        serde_json::Value::Bool(b) => Kind::BoolValue(b),
        serde_json::Value::Number(n) => Kind::DoubleValue(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Kind::StringValue(s),
        other => Kind::StringValue(other.to_string()),
    };
    qdrant_client::qdrant::Value { kind: Some(kind) }
}

fn qdrant_payload_to_json(payload: &HashMap<String, qdrant_client::qdrant::Value>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = payload
        .iter()
        .map(|(k, v)| (k.clone(), qdrant_value_to_json(v)))
        .collect();
    serde_json::Value::Object(map)
}

fn qdrant_value_to_json(value: &qdrant_client::qdrant::Value) -> serde_json::Value {
    use qdrant_client::qdrant::value::Kind;
    match &value.kind {
        Some(Kind::NullValue(_)) | None => serde_json::Value::Null,
        Some(Kind::BoolValue(b)) => serde_json::Value::Bool(*b),
        Some(Kind::IntegerValue(i)) => serde_json::json!(i),
        Some(Kind::DoubleValue(d)) => serde_json::json!(d),
        Some(Kind::StringValue(s)) => {
            serde_json::from_str(s).unwrap_or_else(|_| serde_json::Value::String(s.clone()))
        }
        Some(Kind::ListValue(list)) => {
            serde_json::Value::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => qdrant_payload_to_json(&s.fields),
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_a_simple_struct() {
        #[derive(serde::Serialize, serde::Deserialize, PartialEq, Debug)]
        struct Sample {
            name: String,
            count: u32,
        }
        let sample = Sample {
            name: "wine".into(),
            count: 3,
        };
        let payload = to_payload_map(&sample).expect("serializes");
        let back: Sample = from_payload(&payload).expect("deserializes");
        assert_eq!(sample, back);
    }
}
