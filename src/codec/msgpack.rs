//! MsgPack codec using `rmp-serde`.
//!
//! Always use `to_vec_named`: the server reads structs as maps keyed by
//! field name, never as positional arrays.

use crate::error::Result;

/// MessagePack codec for package payloads.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Warning {
        warn_msg: String,
        warn_code: i32,
    }

    #[test]
    fn test_structs_encode_as_maps() {
        let warn = Warning {
            warn_msg: "x".to_string(),
            warn_code: 1,
        };

        let encoded = MsgPackCodec::encode(&warn).unwrap();

        // fixmap with 2 elements, not fixarray (0x92)
        assert_eq!(encoded[0], 0x82, "Expected fixmap with 2 elements");

        let decoded: Warning = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, warn);
    }

    #[test]
    fn test_heterogeneous_sequence() {
        // Request payloads are flat arrays like [scope, code]
        let encoded = MsgPackCodec::encode(&("@:stuff", ".x")).unwrap();
        assert_eq!(encoded[0], 0x92);

        let decoded: (String, String) = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, ("@:stuff".to_string(), ".x".to_string()));
    }

    #[test]
    fn test_dynamic_values() {
        let encoded = MsgPackCodec::encode(&serde_json::json!({"#": 5, "name": "iris"})).unwrap();
        let decoded: serde_json::Value = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded["#"], 5);
        assert_eq!(decoded["name"], "iris");
    }

    #[test]
    fn test_nil() {
        let encoded = MsgPackCodec::encode(&None::<i32>).unwrap();
        assert_eq!(encoded, vec![0xc0]);
        let decoded: Option<i32> = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded, None);
    }

    #[test]
    fn test_binary_encodes_as_bin() {
        let data: Vec<u8> = vec![0x01, 0x02, 0x03];
        let encoded = MsgPackCodec::encode(&serde_bytes::Bytes::new(&data)).unwrap();
        assert_eq!(encoded[0], 0xc4, "Expected bin8 format");

        let decoded: serde_bytes::ByteBuf = MsgPackCodec::decode(&encoded).unwrap();
        assert_eq!(decoded.as_ref(), &data[..]);
    }

    #[test]
    fn test_decode_error_on_invalid_data() {
        let result: Result<Warning> = MsgPackCodec::decode(b"not valid msgpack");
        assert!(result.is_err());
    }
}
