//! Checkpoint image encoding.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! | magic "VCKP" | version u16 | epoch u64 | sequence u64 | count u64 |
//! | entry * count | crc32 u32 |
//!
//! entry: | key_len u32 | key | sequence u64 | creator u64 | value_len u32 | value |
//! ```
//!
//! The trailing CRC covers every preceding byte.

use crate::error::{CoreError, CoreResult};
use crate::serializer::StateSerializer;
use crate::state::{ConsolidatedState, VersionedValue};
use crate::types::{CheckpointEpoch, SequenceNumber, TransactionId};

/// Magic bytes identifying a checkpoint image.
pub const IMAGE_MAGIC: [u8; 4] = *b"VCKP";

/// Current image format version.
pub const IMAGE_VERSION: u16 = 1;

const HEADER_LEN: usize = 4 + 2 + 8 + 8 + 8;
const CRC_LEN: usize = 4;

/// Encodes a consolidated state into a checkpoint image.
///
/// # Errors
///
/// Fails if a serializer fails or an encoded key or value exceeds
/// `u32::MAX` bytes.
pub fn encode<K: Ord, V>(
    state: &ConsolidatedState<K, V>,
    keys: &dyn StateSerializer<K>,
    values: &dyn StateSerializer<V>,
) -> CoreResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + CRC_LEN + state.len() * 32);
    buf.extend_from_slice(&IMAGE_MAGIC);
    buf.extend_from_slice(&IMAGE_VERSION.to_le_bytes());
    buf.extend_from_slice(&state.epoch().as_u64().to_le_bytes());
    buf.extend_from_slice(&state.sequence().as_u64().to_le_bytes());
    buf.extend_from_slice(&(state.len() as u64).to_le_bytes());

    let mut scratch = Vec::new();
    for (key, version) in state.iter() {
        let Some(value) = version.value() else {
            // Consolidated states never hold tombstones.
            continue;
        };

        scratch.clear();
        keys.write(key, &mut scratch)?;
        put_chunk(&mut buf, &scratch)?;

        buf.extend_from_slice(&version.sequence().as_u64().to_le_bytes());
        buf.extend_from_slice(&version.creator().as_u64().to_le_bytes());

        scratch.clear();
        values.write(value, &mut scratch)?;
        put_chunk(&mut buf, &scratch)?;
    }

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

fn put_chunk(buf: &mut Vec<u8>, chunk: &[u8]) -> CoreResult<()> {
    let len = u32::try_from(chunk.len())
        .map_err(|_| CoreError::codec(format!("encoded item too large: {} bytes", chunk.len())))?;
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(chunk);
    Ok(())
}

/// Decodes a checkpoint image into a consolidated state.
///
/// # Errors
///
/// Returns `ChecksumMismatch` if the CRC does not match, and
/// `CheckpointCorruption` for a bad header, truncation, trailing bytes, or
/// keys out of order.
pub fn decode<K: Ord + Clone, V: Clone>(
    image: &[u8],
    keys: &dyn StateSerializer<K>,
    values: &dyn StateSerializer<V>,
) -> CoreResult<ConsolidatedState<K, V>> {
    if image.len() < HEADER_LEN + CRC_LEN {
        return Err(CoreError::checkpoint_corruption(format!(
            "image too short: {} bytes",
            image.len()
        )));
    }

    let (body, trailer) = image.split_at(image.len() - CRC_LEN);
    let mut crc_bytes = [0u8; CRC_LEN];
    crc_bytes.copy_from_slice(trailer);
    let expected = u32::from_le_bytes(crc_bytes);
    let actual = crc32fast::hash(body);
    if expected != actual {
        return Err(CoreError::ChecksumMismatch { expected, actual });
    }

    let mut reader = Reader::new(body);
    if reader.take(4)? != IMAGE_MAGIC {
        return Err(CoreError::checkpoint_corruption("bad magic"));
    }
    let version = reader.u16()?;
    if version != IMAGE_VERSION {
        return Err(CoreError::checkpoint_corruption(format!(
            "unsupported image version {version}"
        )));
    }
    let epoch = CheckpointEpoch::new(reader.u64()?);
    let sequence = SequenceNumber::new(reader.u64()?);
    let count = reader.u64()?;

    let mut entries: Vec<(K, VersionedValue<V>)> = Vec::new();
    for _ in 0..count {
        let key = keys.read(reader.chunk()?)?;
        let entry_sequence = SequenceNumber::new(reader.u64()?);
        let creator = TransactionId::new(reader.u64()?);
        let value = values.read(reader.chunk()?)?;

        if entry_sequence > sequence {
            return Err(CoreError::checkpoint_corruption(format!(
                "entry at {entry_sequence} is newer than image {sequence}"
            )));
        }
        if entries.last().is_some_and(|(prev, _)| *prev >= key) {
            return Err(CoreError::checkpoint_corruption("keys out of order"));
        }
        entries.push((key, VersionedValue::put(value, entry_sequence, creator)));
    }

    if !reader.is_empty() {
        return Err(CoreError::checkpoint_corruption(format!(
            "{} trailing bytes after {count} entries",
            reader.remaining()
        )));
    }

    Ok(ConsolidatedState::from_entries(epoch, sequence, entries))
}

struct Reader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    fn take(&mut self, len: usize) -> CoreResult<&'a [u8]> {
        let end = self
            .cursor
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| CoreError::checkpoint_corruption("unexpected end of image"))?;
        let bytes = &self.data[self.cursor..end];
        self.cursor = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> CoreResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u16(&mut self) -> CoreResult<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> CoreResult<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> CoreResult<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn chunk(&mut self) -> CoreResult<&'a [u8]> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}
