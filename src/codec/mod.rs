//! Codec module - payload serialization.
//!
//! Package payloads are MessagePack. [`MsgPackCodec`] is a marker struct with
//! static methods rather than a trait object, so the codec is picked at
//! compile time.
//!
//! # Example
//!
//! ```
//! use thingsdb_client::codec::MsgPackCodec;
//!
//! let encoded = MsgPackCodec::encode(&["@:stuff", ".greet"]).unwrap();
//! let decoded: Vec<String> = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, ["@:stuff", ".greet"]);
//! ```

mod msgpack;

pub use msgpack::MsgPackCodec;
