//! Loose object store: one zlib-compressed file per object under
//! `.git/objects/<xx>/<38-hex>`.

use crate::object::{decode_header, frame};
use crate::{GitObject, ObjectId, ObjectType, Result, StorageError};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Content-addressed store rooted at a `.git/objects` directory.
#[derive(Debug, Clone)]
pub struct LooseStore {
    objects_dir: PathBuf,
}

/// A decompressing reader positioned at the start of an object's payload.
///
/// Owns the underlying file handle; dropping it releases both the handle
/// and the decompressor.
pub struct ObjectReader {
    /// The object's type.
    pub kind: ObjectType,
    /// Payload length in bytes.
    pub size: usize,
    inner: ZlibDecoder<File>,
}

impl Read for ObjectReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl ObjectReader {
    /// Drains the payload, verifying it has exactly the declared length.
    pub fn read_payload(mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(self.size);
        self.inner.read_to_end(&mut payload)?;
        if payload.len() != self.size {
            return Err(StorageError::Corrupt(format!(
                "object payload is {} bytes, header says {}",
                payload.len(),
                self.size
            )));
        }
        Ok(payload)
    }
}

impl LooseStore {
    /// Creates a store handle over `<git_dir>/objects`.
    pub fn new(git_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: git_dir.as_ref().join("objects"),
        }
    }

    /// Resolves a partial hex digest to the unique matching object file.
    pub fn locate(&self, partial: &str) -> Result<PathBuf> {
        if partial.len() < 2 {
            return Err(StorageError::TooShort);
        }
        let (prefix, rest) = partial.split_at(2);
        let fan_out = self.objects_dir.join(prefix);

        let mut matches = Vec::new();
        let entries = match fs::read_dir(&fan_out) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(partial.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_name().to_string_lossy().starts_with(rest) {
                matches.push(entry.path());
            }
        }

        match matches.len() {
            0 => Err(StorageError::NotFound(partial.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(StorageError::Ambiguous(partial.to_string())),
        }
    }

    /// Opens an object for reading, consuming its header.
    pub fn open(&self, partial: &str) -> Result<ObjectReader> {
        let path = self.locate(partial)?;
        let file = File::open(path)?;
        let mut inner = ZlibDecoder::new(file);
        let (kind, size) = decode_header(&mut inner)?;
        Ok(ObjectReader { kind, size, inner })
    }

    /// Returns the type of the object without reading its payload.
    pub fn type_of(&self, partial: &str) -> Result<ObjectType> {
        Ok(self.open(partial)?.kind)
    }

    /// Reconstitutes the full digest of a partially-named object from its
    /// fan-out directory and file name.
    pub fn full_hash(&self, partial: &str) -> Result<ObjectId> {
        let path = self.locate(partial)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::Corrupt("bad object path".to_string()))?;
        let dir_name = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .ok_or_else(|| StorageError::Corrupt("bad object path".to_string()))?;
        ObjectId::from_hex(&format!("{dir_name}{file_name}"))
    }

    /// Reads a whole object into memory.
    pub fn read(&self, partial: &str) -> Result<GitObject> {
        let reader = self.open(partial)?;
        let kind = reader.kind;
        let payload = reader.read_payload()?;
        Ok(GitObject::new(kind, payload))
    }

    /// Writes an object, returning its digest.
    ///
    /// Content addressing makes writes idempotent: if the file already
    /// exists its content is identical by construction and the write is
    /// skipped.
    pub fn write(&self, object_type: ObjectType, data: &[u8]) -> Result<ObjectId> {
        let framed = frame(object_type, data);
        let id = ObjectId::hash_object(object_type, data);

        let hex = id.to_hex();
        let (prefix, rest) = hex.split_at(2);
        let fan_out = self.objects_dir.join(prefix);
        let path = fan_out.join(rest);
        if path.exists() {
            return Ok(id);
        }

        fs::create_dir_all(&fan_out)?;
        let file = File::create(&path)?;
        let mut encoder = ZlibEncoder::new(file, Compression::default());
        encoder.write_all(&framed)?;
        encoder.finish()?;

        tracing::trace!(id = %id, kind = object_type.as_str(), "wrote loose object");
        Ok(id)
    }

    /// Stores an already-constructed object.
    pub fn write_object(&self, object: &GitObject) -> Result<ObjectId> {
        self.write(object.object_type, &object.data)
    }
}
