//! Application of REF_DELTA instruction streams.
//!
//! A delta starts with two varint lengths (expected source and target
//! sizes) followed by copy/insert commands: MSB-clear commands insert
//! literal bytes, MSB-set commands copy a bitfield-selected range out of
//! the base object.

use crate::{GitError, Result};
use mygit_storage::{LooseStore, ObjectId, ObjectType};

const COPY_FLAG: u8 = 0x80;
// A copy size of zero means 64 KiB.
const COPY_ZERO_SIZE: usize = 0x10000;

/// Resolves a delta's base through the loose store and applies the delta.
///
/// The reconstructed object carries the base's type.
pub fn resolve(
    store: &LooseStore,
    base: &ObjectId,
    delta: &[u8],
) -> Result<(ObjectType, Vec<u8>)> {
    let reader = store.open(&base.to_hex())?;
    let kind = reader.kind;
    let source = reader.read_payload()?;
    let target = apply(&source, delta)?;
    Ok((kind, target))
}

/// Reconstructs a target payload from a base payload and a delta stream.
pub fn apply(source: &[u8], delta: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let source_len = read_varint(delta, &mut pos)?;
    let target_len = read_varint(delta, &mut pos)?;
    if source.len() != source_len {
        return Err(GitError::InvalidDelta(format!(
            "base object is {} bytes, delta expects {source_len}",
            source.len()
        )));
    }

    let mut target = Vec::with_capacity(target_len);
    while pos < delta.len() {
        let command = delta[pos];
        pos += 1;
        if command & COPY_FLAG == 0 {
            // Insert: the command byte is the literal count. Zero is reserved.
            let count = (command & 0x7f) as usize;
            if count == 0 {
                return Err(GitError::InvalidDelta(
                    "zero-length insert instruction".to_string(),
                ));
            }
            let literal = delta
                .get(pos..pos + count)
                .ok_or_else(|| GitError::InvalidDelta("truncated insert".to_string()))?;
            target.extend_from_slice(literal);
            pos += count;
        } else {
            // Copy: bits 0-3 select offset bytes, bits 4-6 size bytes,
            // little-endian in order of presence.
            let mut offset = 0usize;
            for i in 0..4 {
                if command & (1 << i) != 0 {
                    let byte = next_byte(delta, &mut pos)?;
                    offset |= (byte as usize) << (8 * i);
                }
            }
            let mut size = 0usize;
            for i in 0..3 {
                if command & (0x10 << i) != 0 {
                    let byte = next_byte(delta, &mut pos)?;
                    size |= (byte as usize) << (8 * i);
                }
            }
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            let range = source.get(offset..offset + size).ok_or_else(|| {
                GitError::InvalidDelta(format!(
                    "copy of {size} bytes at offset {offset} overruns the base"
                ))
            })?;
            target.extend_from_slice(range);
        }
    }

    if target.len() != target_len {
        return Err(GitError::InvalidDelta(format!(
            "reconstructed {} bytes, delta declares {target_len}",
            target.len()
        )));
    }
    Ok(target)
}

fn next_byte(delta: &[u8], pos: &mut usize) -> Result<u8> {
    let byte = *delta
        .get(*pos)
        .ok_or_else(|| GitError::InvalidDelta("truncated copy instruction".to_string()))?;
    *pos += 1;
    Ok(byte)
}

/// Little-endian base-128 varint, 7 bits per byte, MSB as continuation.
fn read_varint(delta: &[u8], pos: &mut usize) -> Result<usize> {
    let mut value = 0usize;
    let mut shift = 0;
    loop {
        let byte = next_byte(delta, pos)?;
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
    }
}
