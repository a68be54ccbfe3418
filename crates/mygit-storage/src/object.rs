//! Git object types and the framing codec.

use crate::reader::read_until_nul;
use crate::{Result, StorageError};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::fmt;
use std::io::Read;

/// A 20-byte SHA-1 object identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 20]);

impl ObjectId {
    /// Creates an ObjectId from raw bytes.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Creates an ObjectId from a full 40-character hex string.
    pub fn from_hex(hex: &str) -> Result<Self> {
        if hex.len() != 40 {
            return Err(StorageError::Corrupt(format!(
                "invalid object id length: {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(hex, &mut bytes)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Self(bytes))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Returns the hex representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Computes the SHA-1 of data framed with a git object header.
    pub fn hash_object(object_type: ObjectType, data: &[u8]) -> Self {
        let header = format!("{} {}\0", object_type.as_str(), data.len());
        let mut hasher = Sha1::new();
        hasher.update(header.as_bytes());
        hasher.update(data);
        let result = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&result);
        Self(bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Git object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// File content.
    Blob,
    /// Directory listing.
    Tree,
    /// Commit object.
    Commit,
    /// Annotated tag.
    Tag,
}

impl ObjectType {
    /// Returns the string representation used in git.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
            Self::Commit => "commit",
            Self::Tag => "tag",
        }
    }

    /// Parses an object type from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "blob" => Ok(Self::Blob),
            "tree" => Ok(Self::Tree),
            "commit" => Ok(Self::Commit),
            "tag" => Ok(Self::Tag),
            _ => Err(StorageError::Unsupported(format!(
                "unknown object type: {s}"
            ))),
        }
    }

    /// Returns the type code used in pack files.
    pub fn pack_type(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Parses an object type from a pack file type code.
    pub fn from_pack_type(code: u8) -> Result<Self> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            _ => Err(StorageError::Unsupported(format!(
                "unknown pack type: {code}"
            ))),
        }
    }
}

/// A git object (blob, tree, commit, or tag).
#[derive(Debug, Clone)]
pub struct GitObject {
    /// The object's unique identifier (SHA-1 over the framed bytes).
    pub id: ObjectId,
    /// The type of object.
    pub object_type: ObjectType,
    /// The raw object payload (unframed, uncompressed).
    pub data: Bytes,
}

impl GitObject {
    /// Creates a new git object, computing its ID from the data.
    pub fn new(object_type: ObjectType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let id = ObjectId::hash_object(object_type, &data);
        Self {
            id,
            object_type,
            data,
        }
    }

    /// Creates a blob object from file content.
    pub fn blob(content: impl Into<Bytes>) -> Self {
        Self::new(ObjectType::Blob, content)
    }

    /// Creates a commit object. The message gets a trailing newline.
    pub fn commit(
        tree_id: &ObjectId,
        parents: &[ObjectId],
        author: &str,
        committer: &str,
        message: &str,
    ) -> Self {
        let mut content = format!("tree {tree_id}\n");
        for parent in parents {
            content.push_str(&format!("parent {parent}\n"));
        }
        content.push_str(&format!("author {author}\n"));
        content.push_str(&format!("committer {committer}\n"));
        content.push_str(&format!("\n{message}\n"));
        Self::new(ObjectType::Commit, content.into_bytes())
    }

    /// Returns the framed representation: `<type> <len>\0<payload>`.
    pub fn framed(&self) -> Vec<u8> {
        frame(self.object_type, &self.data)
    }

    /// Returns the size of the object payload.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Frames a payload as `<type> <len>\0<payload>`.
pub fn frame(object_type: ObjectType, data: &[u8]) -> Vec<u8> {
    let header = format!("{} {}\0", object_type.as_str(), data.len());
    let mut framed = Vec::with_capacity(header.len() + data.len());
    framed.extend_from_slice(header.as_bytes());
    framed.extend_from_slice(data);
    framed
}

/// Consumes a `<type> <len>\0` header from the reader.
///
/// The reader is left positioned at the first payload byte; exactly the
/// returned length remains to be read.
pub fn decode_header<R: Read>(reader: &mut R) -> Result<(ObjectType, usize)> {
    let header = read_until_nul(reader)?;
    let header = std::str::from_utf8(&header)
        .map_err(|_| StorageError::Corrupt("non-ascii object header".to_string()))?;
    let (kind, size) = header
        .split_once(' ')
        .ok_or_else(|| StorageError::Corrupt(format!("invalid object header: {header}")))?;
    let object_type = ObjectType::parse(kind)?;
    let size = size
        .parse()
        .map_err(|_| StorageError::Corrupt(format!("invalid object size: {size}")))?;
    Ok((object_type, size))
}
