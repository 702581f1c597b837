//! Key and value serializers for checkpoint images.
//!
//! The engine itself never looks inside keys or values. Only checkpoint
//! persistence needs bytes, so a store that persists checkpoints is given a
//! [`StateSerializer`] for its key type and one for its value type.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Converts `T` to and from bytes.
pub trait StateSerializer<T>: Send + Sync {
    /// Appends the encoding of `value` to `out`.
    fn write(&self, value: &T, out: &mut Vec<u8>) -> CoreResult<()>;

    /// Decodes a value from exactly `bytes`.
    fn read(&self, bytes: &[u8]) -> CoreResult<T>;
}

/// Raw bytes, stored as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesSerializer;

impl StateSerializer<Vec<u8>> for BytesSerializer {
    fn write(&self, value: &Vec<u8>, out: &mut Vec<u8>) -> CoreResult<()> {
        out.extend_from_slice(value);
        Ok(())
    }

    fn read(&self, bytes: &[u8]) -> CoreResult<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// `u32` as four little-endian bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct U32Serializer;

impl StateSerializer<u32> for U32Serializer {
    fn write(&self, value: &u32, out: &mut Vec<u8>) -> CoreResult<()> {
        out.extend_from_slice(&value.to_le_bytes());
        Ok(())
    }

    fn read(&self, bytes: &[u8]) -> CoreResult<u32> {
        let raw: [u8; 4] = bytes
            .try_into()
            .map_err(|_| {
                CoreError::codec(format!("expected 4 bytes for u32, got {}", bytes.len()))
            })?;
        Ok(u32::from_le_bytes(raw))
    }
}

/// UTF-8 strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringSerializer;

impl StateSerializer<String> for StringSerializer {
    fn write(&self, value: &String, out: &mut Vec<u8>) -> CoreResult<()> {
        out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn read(&self, bytes: &[u8]) -> CoreResult<String> {
        String::from_utf8(bytes.to_vec()).map_err(|e| CoreError::codec(e.to_string()))
    }
}

/// Any serde type, encoded as CBOR.
pub struct CborSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> CborSerializer<T> {
    /// Creates a CBOR serializer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for CborSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CborSerializer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CborSerializer")
    }
}

impl<T: Serialize + DeserializeOwned> StateSerializer<T> for CborSerializer<T> {
    fn write(&self, value: &T, out: &mut Vec<u8>) -> CoreResult<()> {
        ciborium::ser::into_writer(value, out)
            .map_err(|e| CoreError::codec(format!("cbor encode: {e:?}")))
    }

    fn read(&self, bytes: &[u8]) -> CoreResult<T> {
        ciborium::de::from_reader(bytes)
            .map_err(|e| CoreError::codec(format!("cbor decode: {e:?}")))
    }
}
