//! Pack file decoding.
//!
//! A pack is `"PACK"`, a big-endian version, a big-endian object count, a
//! sequence of objects, and a trailing SHA-1 over everything before it.
//! Decoded objects are persisted straight into the loose store; REF_DELTA
//! entries are resolved against bases that are already loose (which, in a
//! well-formed pack, includes every base appearing earlier in the stream).

use crate::{delta, GitError, Result};
use flate2::read::ZlibDecoder;
use mygit_storage::{LooseStore, ObjectId, ObjectType};
use sha1::{Digest, Sha1};
use std::io::Read;

/// Magic bytes at the start of a pack file.
const PACK_SIGNATURE: &[u8; 4] = b"PACK";
const OFS_DELTA: u8 = 6;
const REF_DELTA: u8 = 7;

/// Decodes a fully-buffered pack file into a loose store.
pub struct PackParser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PackParser<'a> {
    /// Creates a new pack parser over a complete pack byte sequence.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decodes every object in the pack, persisting each through the
    /// store. Returns the stored digests in stream order (skipped tags
    /// excluded).
    pub fn unpack(&mut self, store: &LooseStore) -> Result<Vec<ObjectId>> {
        if self.data.len() < 32 {
            return Err(GitError::InvalidPack("pack too small".to_string()));
        }

        if &self.data[0..4] != PACK_SIGNATURE {
            return Err(GitError::InvalidPack("invalid signature".to_string()));
        }

        let version = u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]);
        if version != 2 && version != 3 {
            return Err(GitError::InvalidPack(format!(
                "unsupported version: {version}"
            )));
        }

        // The trailer is the SHA-1 of everything before it; verify before
        // trusting any of the object headers.
        let trailer_start = self.data.len() - 20;
        let mut hasher = Sha1::new();
        hasher.update(&self.data[..trailer_start]);
        if hasher.finalize().as_slice() != &self.data[trailer_start..] {
            return Err(GitError::InvalidPack("checksum mismatch".to_string()));
        }

        let object_count =
            u32::from_be_bytes([self.data[8], self.data[9], self.data[10], self.data[11]]);
        self.pos = 12;

        let mut ids = Vec::with_capacity(object_count as usize);
        for _ in 0..object_count {
            let (type_code, size) = self.read_type_and_size()?;
            match type_code {
                1..=3 => {
                    let kind = ObjectType::from_pack_type(type_code)?;
                    let payload = self.inflate(size)?;
                    ids.push(store.write(kind, &payload)?);
                }
                4 => {
                    // Tags are decoded for framing but not stored.
                    self.inflate(size)?;
                }
                OFS_DELTA => {
                    return Err(GitError::Unsupported(
                        "offset deltas aren't supported".to_string(),
                    ));
                }
                REF_DELTA => {
                    let base = self.read_base_id()?;
                    let delta_bytes = self.inflate(size)?;
                    let (kind, payload) = delta::resolve(store, &base, &delta_bytes)?;
                    ids.push(store.write(kind, &payload)?);
                }
                _ => {
                    return Err(GitError::InvalidPack(format!(
                        "invalid object type: {type_code}"
                    )));
                }
            }
        }

        if self.pos != trailer_start {
            return Err(GitError::InvalidPack(format!(
                "{} undecoded bytes before trailer",
                trailer_start - self.pos
            )));
        }

        tracing::debug!(objects = ids.len(), "unpacked");
        Ok(ids)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or_else(|| GitError::InvalidPack("unexpected end of pack".to_string()))?;
        self.pos += 1;
        Ok(byte)
    }

    /// Type in bits 4-6 of the first byte, size in its low 4 bits plus
    /// 7-bit continuation groups.
    fn read_type_and_size(&mut self) -> Result<(u8, usize)> {
        let first = self.read_byte()?;
        let type_code = (first >> 4) & 0x07;
        let mut size = (first & 0x0f) as usize;
        let mut shift = 4;

        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.read_byte()?;
            size |= ((byte & 0x7f) as usize) << shift;
            shift += 7;
            more = byte & 0x80 != 0;
        }
        Ok((type_code, size))
    }

    fn read_base_id(&mut self) -> Result<ObjectId> {
        let end = self.pos + 20;
        let bytes = self
            .data
            .get(self.pos..end)
            .ok_or_else(|| GitError::InvalidPack("truncated base digest".to_string()))?;
        self.pos = end;
        let mut id = [0u8; 20];
        id.copy_from_slice(bytes);
        Ok(ObjectId::from_bytes(id))
    }

    /// Inflates one zlib stream that must decompress to exactly `size`
    /// bytes, advancing past the compressed bytes it consumed.
    fn inflate(&mut self, size: usize) -> Result<Vec<u8>> {
        let trailer_start = self.data.len() - 20;
        let remaining = &self.data[self.pos..trailer_start];
        let mut decoder = ZlibDecoder::new(remaining);
        let mut payload = Vec::with_capacity(size);
        decoder
            .read_to_end(&mut payload)
            .map_err(|e| GitError::InvalidPack(format!("decompression failed: {e}")))?;
        if payload.len() != size {
            return Err(GitError::InvalidPack(format!(
                "object is {} bytes, header says {size}",
                payload.len()
            )));
        }
        self.pos += decoder.total_in() as usize;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    fn store() -> (TempDir, LooseStore) {
        let temp = TempDir::new().unwrap();
        let git_dir = temp.path().join(".git");
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        (temp, LooseStore::new(git_dir))
    }

    fn deflate(payload: &[u8]) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(payload).unwrap();
        encoder.finish().unwrap()
    }

    fn push_header(pack: &mut Vec<u8>, type_code: u8, size: usize) {
        let mut first = (type_code << 4) | (size & 0x0f) as u8;
        let mut remaining = size >> 4;
        if remaining > 0 {
            first |= 0x80;
        }
        pack.push(first);
        while remaining > 0 {
            let mut byte = (remaining & 0x7f) as u8;
            remaining >>= 7;
            if remaining > 0 {
                byte |= 0x80;
            }
            pack.push(byte);
        }
    }

    enum Entry<'a> {
        Plain(u8, &'a [u8]),
        RefDelta(ObjectId, &'a [u8]),
    }

    fn build_pack(entries: &[Entry]) -> Vec<u8> {
        let mut pack = PACK_SIGNATURE.to_vec();
        pack.extend(2u32.to_be_bytes());
        pack.extend((entries.len() as u32).to_be_bytes());
        for entry in entries {
            match entry {
                Entry::Plain(code, payload) => {
                    push_header(&mut pack, *code, payload.len());
                    pack.extend(deflate(payload));
                }
                Entry::RefDelta(base, delta) => {
                    push_header(&mut pack, REF_DELTA, delta.len());
                    pack.extend_from_slice(base.as_bytes());
                    pack.extend(deflate(delta));
                }
            }
        }
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let digest = hasher.finalize();
        pack.extend_from_slice(&digest);
        pack
    }

    #[test]
    fn unpacks_plain_objects() {
        let (_temp, store) = store();
        let pack = build_pack(&[
            Entry::Plain(3, b"hello world\n"),
            Entry::Plain(3, b"second\n"),
        ]);

        let ids = PackParser::new(&pack).unpack(&store).unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0].to_hex(), "3b18e512dba79e4c8300dd08aeb37f8e728b8dad");
        assert_eq!(store.read(&ids[1].to_hex()).unwrap().data.as_ref(), b"second\n");
    }

    #[test]
    fn unpacks_large_object_with_continuation_size() {
        let (_temp, store) = store();
        let payload = vec![b'x'; 5000];
        let pack = build_pack(&[Entry::Plain(3, &payload)]);

        let ids = PackParser::new(&pack).unpack(&store).unwrap();
        assert_eq!(
            store.read(&ids[0].to_hex()).unwrap().data.as_ref(),
            &payload[..]
        );
    }

    #[test]
    fn resolves_ref_delta_against_earlier_object() {
        let (_temp, store) = store();
        let base_id = ObjectId::hash_object(ObjectType::Blob, b"abcdefghij");
        // Copy "abcde", insert "XYZ".
        let delta = [0x0a, 0x08, 0x91, 0x00, 0x05, 0x03, b'X', b'Y', b'Z'];
        let pack = build_pack(&[
            Entry::Plain(3, b"abcdefghij"),
            Entry::RefDelta(base_id, &delta),
        ]);

        let ids = PackParser::new(&pack).unpack(&store).unwrap();
        assert_eq!(ids.len(), 2);
        let reconstructed = store.read(&ids[1].to_hex()).unwrap();
        assert_eq!(reconstructed.object_type, ObjectType::Blob);
        assert_eq!(reconstructed.data.as_ref(), b"abcdeXYZ");
    }

    #[test]
    fn ref_delta_without_base_fails() {
        let (_temp, store) = store();
        let missing = ObjectId::from_bytes([9u8; 20]);
        let delta = [0x0a, 0x01, 0x01, b'x'];
        let pack = build_pack(&[Entry::RefDelta(missing, &delta)]);

        assert!(PackParser::new(&pack).unpack(&store).is_err());
    }

    #[test]
    fn tags_are_skipped() {
        let (_temp, store) = store();
        let pack = build_pack(&[
            Entry::Plain(4, b"object deadbeef\ntype commit\n"),
            Entry::Plain(3, b"kept\n"),
        ]);

        let ids = PackParser::new(&pack).unpack(&store).unwrap();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.read(&ids[0].to_hex()).unwrap().data.as_ref(), b"kept\n");
    }

    #[test]
    fn offset_delta_is_unsupported() {
        let (_temp, store) = store();
        let mut pack = PACK_SIGNATURE.to_vec();
        pack.extend(2u32.to_be_bytes());
        pack.extend(1u32.to_be_bytes());
        push_header(&mut pack, OFS_DELTA, 1);
        pack.push(0x01); // negative-offset varint, never reached
        pack.extend(deflate(b"x"));
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let digest = hasher.finalize();
        pack.extend_from_slice(&digest);

        assert!(matches!(
            PackParser::new(&pack).unpack(&store),
            Err(GitError::Unsupported(_))
        ));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let (_temp, store) = store();
        let mut pack = build_pack(&[Entry::Plain(3, b"x")]);
        pack[0] = b'J';
        assert!(matches!(
            PackParser::new(&pack).unpack(&store),
            Err(GitError::InvalidPack(_))
        ));
    }

    #[test]
    fn corrupted_trailer_is_rejected() {
        let (_temp, store) = store();
        let mut pack = build_pack(&[Entry::Plain(3, b"x")]);
        let last = pack.len() - 1;
        pack[last] ^= 0xff;
        assert!(matches!(
            PackParser::new(&pack).unpack(&store),
            Err(GitError::InvalidPack(_))
        ));
    }

    #[test]
    fn undeclared_trailing_bytes_are_rejected() {
        let (_temp, store) = store();
        // Two objects in the stream but a declared count of one.
        let mut pack = PACK_SIGNATURE.to_vec();
        pack.extend(2u32.to_be_bytes());
        pack.extend(1u32.to_be_bytes());
        for payload in [&b"first\n"[..], b"extra\n"] {
            push_header(&mut pack, 3, payload.len());
            pack.extend(deflate(payload));
        }
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let digest = hasher.finalize();
        pack.extend_from_slice(&digest);

        assert!(matches!(
            PackParser::new(&pack).unpack(&store),
            Err(GitError::InvalidPack(_))
        ));
    }

    #[test]
    fn declared_size_mismatch_is_rejected() {
        let (_temp, store) = store();
        let mut pack = PACK_SIGNATURE.to_vec();
        pack.extend(2u32.to_be_bytes());
        pack.extend(1u32.to_be_bytes());
        push_header(&mut pack, 3, 3); // header claims 3 bytes
        pack.extend(deflate(b"four")); // stream holds 4
        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let digest = hasher.finalize();
        pack.extend_from_slice(&digest);

        assert!(matches!(
            PackParser::new(&pack).unpack(&store),
            Err(GitError::InvalidPack(_))
        ));
    }
}
