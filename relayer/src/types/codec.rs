//! Fixed field-order binary codec for persisted and wire entities.
//!
//! All records are encoded with bincode 2 (standard configuration) through
//! its serde integration, so the field order is the declaration order of
//! each type. Decoding is strict: a buffer that is truncated, malformed, or
//! carries trailing bytes is rejected instead of producing a zero-valued
//! record.

use bincode::config::{self, Configuration, Limit, LittleEndian, Varint};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Upper bound on the size of a single decoded record.
pub const MAX_RECORD_BYTES: usize = 64 * 1024 * 1024;

type StrictConfig = Configuration<LittleEndian, Varint, Limit<MAX_RECORD_BYTES>>;

fn strict() -> StrictConfig {
    config::standard().with_limit::<MAX_RECORD_BYTES>()
}

/// Errors raised while encoding or decoding a record.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(String),
    #[error("record followed by {trailing} unexpected trailing bytes")]
    TrailingBytes { trailing: usize },
}

/// Encodes `value` with the canonical record configuration.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    bincode::serde::encode_to_vec(value, strict()).map_err(|e| EncodingError::Encode(e.to_string()))
}

/// Decodes a single record that must span the whole of `bytes`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodingError> {
    let (value, read): (T, usize) = bincode::serde::decode_from_slice(bytes, strict())
        .map_err(|e| EncodingError::Decode(e.to_string()))?;
    if read != bytes.len() {
        return Err(EncodingError::TrailingBytes {
            trailing: bytes.len() - read,
        });
    }
    Ok(value)
}

/// Binary encoding shared by every persisted entity.
///
/// The default methods delegate to [`encode`] / [`decode`]; types with a
/// special wire form (such as an empty [`crate::types::Calls`]) override
/// them.
pub trait Codec: Serialize + DeserializeOwned + Sized {
    fn encode(&self) -> Result<Vec<u8>, EncodingError> {
        encode(self)
    }

    fn decode(bytes: &[u8]) -> Result<Self, EncodingError> {
        decode(bytes)
    }
}
