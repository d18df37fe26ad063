use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{CodecError, CodecResult};
use crate::schema::JsonSchema;

/// How a value is turned into stored bytes.
///
/// Codecs are stateless apart from the compiled schema, cheap to clone, and
/// chosen per call.
#[derive(Clone, Debug)]
pub enum Codec {
    JsonLiteral,
    SchemaJson(Arc<JsonSchema>),
    OpaqueBinary,
}

impl Codec {
    /// Build a schema-validating JSON codec from a schema document.
    pub fn schema(source: Value) -> CodecResult<Self> {
        Ok(Self::SchemaJson(Arc::new(JsonSchema::new(source)?)))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::JsonLiteral => "json",
            Self::SchemaJson(_) => "schema-json",
            Self::OpaqueBinary => "binary",
        }
    }

    /// Encode a value into bytes.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Vec<u8>> {
        match self {
            Self::JsonLiteral => serde_json::to_vec(value).map_err(|e| self.encode_err(e)),
            Self::SchemaJson(schema) => {
                let json = serde_json::to_value(value).map_err(|e| self.encode_err(e))?;
                schema.check(&json).map_err(|e| self.encode_err(e))?;
                serde_json::to_vec(&json).map_err(|e| self.encode_err(e))
            }
            Self::OpaqueBinary => bincode::serialize(value).map_err(|e| self.encode_err(e)),
        }
    }

    /// Decode bytes previously produced by [`Codec::encode`] with the same codec.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> CodecResult<T> {
        match self {
            Self::JsonLiteral => serde_json::from_slice(bytes).map_err(|e| self.decode_err(e)),
            Self::SchemaJson(schema) => {
                let json: Value =
                    serde_json::from_slice(bytes).map_err(|e| self.decode_err(e))?;
                schema.check(&json).map_err(|e| self.decode_err(e))?;
                serde_json::from_value(json).map_err(|e| self.decode_err(e))
            }
            Self::OpaqueBinary => bincode::deserialize(bytes).map_err(|e| self.decode_err(e)),
        }
    }

    fn encode_err(&self, reason: impl ToString) -> CodecError {
        CodecError::Encode {
            codec: self.name(),
            reason: reason.to_string(),
        }
    }

    fn decode_err(&self, reason: impl ToString) -> CodecError {
        CodecError::Decode {
            codec: self.name(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct CachedFrame {
        rows: Vec<(String, f64)>,
        truncated: bool,
    }

    fn state_schema() -> Codec {
        Codec::schema(json!({
            "type": "object",
            "required": ["dashboardId"],
            "properties": {
                "dashboardId": {"type": "string"},
                "state": {"type": "object"}
            }
        }))
        .unwrap()
    }

    // -----------------------------------------------------------------------
    // JSON literal
    // -----------------------------------------------------------------------

    #[test]
    fn json_literal_roundtrip() {
        let value = json!({"a": [1, 2, 3], "b": null});
        let bytes = Codec::JsonLiteral.encode(&value).unwrap();
        let back: Value = Codec::JsonLiteral.decode(&bytes).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn json_literal_rejects_non_string_map_keys() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");
        let err = Codec::JsonLiteral.encode(&map).unwrap_err();
        assert!(matches!(err, CodecError::Encode { codec: "json", .. }));
    }

    #[test]
    fn json_literal_rejects_malformed_bytes() {
        let err = Codec::JsonLiteral.decode::<Value>(b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
        assert_eq!(err.kind(), kvs_types::ErrorKind::CodecDecode);
    }

    // -----------------------------------------------------------------------
    // Schema JSON
    // -----------------------------------------------------------------------

    #[test]
    fn schema_json_accepts_valid_state() {
        let codec = state_schema();
        let state = json!({"dashboardId": "42", "state": {"hash": "x"}});
        let bytes = codec.encode(&state).unwrap();
        let back: Value = codec.decode(&bytes).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn schema_json_rejects_invalid_on_encode() {
        let codec = state_schema();
        let err = codec.encode(&json!({"dashboardId": 42})).unwrap_err();
        assert!(matches!(err, CodecError::Encode { codec: "schema-json", .. }));
    }

    #[test]
    fn schema_json_validates_on_decode() {
        // Written by a different codec, so it bypassed validation.
        let bytes = Codec::JsonLiteral.encode(&json!({"state": {}})).unwrap();
        let err = state_schema().decode::<Value>(&bytes).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    // -----------------------------------------------------------------------
    // Opaque binary
    // -----------------------------------------------------------------------

    #[test]
    fn opaque_binary_roundtrip() {
        let frame = CachedFrame {
            rows: vec![("a".into(), 1.5), ("b".into(), -2.0)],
            truncated: false,
        };
        let bytes = Codec::OpaqueBinary.encode(&frame).unwrap();
        let back: CachedFrame = Codec::OpaqueBinary.decode(&bytes).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn opaque_binary_rejects_truncated_bytes() {
        let bytes = Codec::OpaqueBinary.encode(&"hello".to_string()).unwrap();
        let err = Codec::OpaqueBinary
            .decode::<String>(&bytes[..bytes.len() - 2])
            .unwrap_err();
        assert!(matches!(err, CodecError::Decode { codec: "binary", .. }));
    }

    proptest::proptest! {
        #[test]
        fn json_literal_roundtrips_strings(s in ".*") {
            let bytes = Codec::JsonLiteral.encode(&s).unwrap();
            let back: String = Codec::JsonLiteral.decode(&bytes).unwrap();
            proptest::prop_assert_eq!(back, s);
        }
    }
}
