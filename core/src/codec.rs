//! Payload codec shared by events, commands and snapshots.
//!
//! The engine never looks inside payloads: it hands them to a [`Codec`] and
//! stores the bytes. `Bincode` is the default for its size and speed; `Json`
//! is available for backends where stored payloads should stay readable.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while encoding or decoding a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The value could not be serialized.
    #[error("failed to encode {type_name}: {reason}")]
    Encode {
        /// Rust type that failed to encode.
        type_name: &'static str,
        /// Underlying serializer message.
        reason: String,
    },

    /// The bytes could not be turned back into the requested type.
    #[error("failed to decode {type_name}: {reason}")]
    Decode {
        /// Rust type that was requested.
        type_name: &'static str,
        /// Underlying deserializer message.
        reason: String,
    },
}

/// Serialization format for stored payloads.
///
/// # Examples
///
/// ```
/// use eventloom_core::codec::Codec;
///
/// let codec = Codec::Json;
/// let bytes = codec.encode(&vec![1_u32, 2, 3]).unwrap();
/// assert_eq!(bytes, b"[1,2,3]");
/// let back: Vec<u32> = codec.decode(&bytes).unwrap();
/// assert_eq!(back, vec![1, 2, 3]);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Codec {
    /// Compact binary encoding via `bincode`.
    #[default]
    Bincode,
    /// Human-readable encoding via `serde_json`.
    Json,
}

impl Codec {
    /// Serialize `value` to bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if the serializer rejects the value.
    pub fn encode<T: Serialize + ?Sized>(self, value: &T) -> Result<Vec<u8>, CodecError> {
        let result = match self {
            Self::Bincode => bincode::serialize(value).map_err(|e| e.to_string()),
            Self::Json => serde_json::to_vec(value).map_err(|e| e.to_string()),
        };
        result.map_err(|reason| CodecError::Encode {
            type_name: std::any::type_name::<T>(),
            reason,
        })
    }

    /// Deserialize bytes produced by [`Codec::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Decode`] if the bytes are corrupt or describe a
    /// different type.
    pub fn decode<T: DeserializeOwned>(self, bytes: &[u8]) -> Result<T, CodecError> {
        let result = match self {
            Self::Bincode => bincode::deserialize(bytes).map_err(|e| e.to_string()),
            Self::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
        };
        result.map_err(|reason| CodecError::Decode {
            type_name: std::any::type_name::<T>(),
            reason,
        })
    }

    /// Short name stored alongside payloads.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bincode => "bincode",
            Self::Json => "json",
        }
    }
}
