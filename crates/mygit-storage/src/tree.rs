//! Tree entry parsing and serialisation.

use crate::reader::{read_exact_bytes, read_until_nul};
use crate::{ObjectId, ObjectType, Result, StorageError};
use std::io::Read;

/// Mode for subtree entries.
pub const MODE_DIR: u32 = 40000;
/// Mode for regular file entries.
pub const MODE_FILE: u32 = 100644;

/// A single `(mode, name, digest)` entry of a tree object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// Decimal mode as stored (40000, 100644, 100755, 120000).
    pub mode: u32,
    /// Entry name, without `/` or NUL.
    pub name: String,
    /// Digest of the referenced object.
    pub id: ObjectId,
}

impl TreeEntry {
    /// The kind of object this entry points at.
    pub fn kind(&self) -> ObjectType {
        if self.mode == MODE_DIR {
            ObjectType::Tree
        } else {
            ObjectType::Blob
        }
    }

    /// Key used for tree ordering: directories sort as if their name had a
    /// trailing `/`.
    fn sort_key(&self) -> Vec<u8> {
        let mut key = self.name.clone().into_bytes();
        if self.mode == MODE_DIR {
            key.push(b'/');
        }
        key
    }
}

/// Parses `size` bytes of tree payload into entries.
///
/// Entries are returned in input order; readers tolerate unsorted trees.
pub fn parse_tree<R: Read>(size: usize, reader: &mut R) -> Result<Vec<TreeEntry>> {
    let mut entries = Vec::new();
    let mut remaining = size;
    while remaining > 0 {
        let header = read_until_nul(reader)?;
        let header_len = header.len();
        let header = String::from_utf8(header)
            .map_err(|_| StorageError::Corrupt("non-utf8 tree entry".to_string()))?;
        let (mode, name) = header
            .split_once(' ')
            .ok_or_else(|| StorageError::Corrupt(format!("invalid tree entry: {header}")))?;
        let mode = mode
            .parse()
            .map_err(|_| StorageError::Corrupt(format!("invalid tree entry mode: {mode}")))?;
        let digest = read_exact_bytes(reader, 20)?;
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);

        entries.push(TreeEntry {
            mode,
            name: name.to_string(),
            id: ObjectId::from_bytes(bytes),
        });

        let consumed = header_len + 1 + 20;
        remaining = remaining
            .checked_sub(consumed)
            .ok_or_else(|| StorageError::Corrupt("tree length mismatch".to_string()))?;
    }
    Ok(entries)
}

/// Serialises entries as a tree payload, sorted per git's tree ordering.
pub fn serialize_tree(mut entries: Vec<TreeEntry>) -> Vec<u8> {
    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

    let mut payload = Vec::new();
    for entry in &entries {
        payload.extend_from_slice(format!("{} {}\0", entry.mode, entry.name).as_bytes());
        payload.extend_from_slice(entry.id.as_bytes());
    }
    payload
}
