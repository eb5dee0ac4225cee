//! JSON codec using `serde_json`.
//!
//! Control frames (session lifecycle, hello, chat text) carry UTF-8 JSON
//! bodies. An empty body decodes as `{}` so events the server sends without
//! a payload still deserialize into their (all-optional) schema.
//!
//! # Example
//!
//! ```
//! use dialog_client::codec::JsonCodec;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Hello {
//!     content: String,
//! }
//!
//! let msg = Hello { content: "hi".to_string() };
//! let encoded = JsonCodec::encode(&msg).unwrap();
//! assert_eq!(&encoded[..], br#"{"content":"hi"}"#);
//! let decoded: Hello = JsonCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, msg);
//! ```

use bytes::Bytes;
use serde_json::Value;

use crate::error::Result;

/// JSON codec for control payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(value)?))
    }

    /// Decode JSON bytes to a value. Empty input is read as `{}`.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"{}")?);
        }
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode into an untyped JSON value.
    #[inline]
    pub fn decode_value(bytes: &[u8]) -> Result<Value> {
        Self::decode(bytes)
    }
}
