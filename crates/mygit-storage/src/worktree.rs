//! Projection between the working directory and tree objects.

use crate::tree::{parse_tree, serialize_tree, TreeEntry, MODE_DIR, MODE_FILE};
use crate::{LooseStore, ObjectId, ObjectType, Result, StorageError};
use std::fs;
use std::path::Path;

/// Recursively builds a tree object from a directory, storing blobs and
/// subtrees along the way. `.git` entries are skipped.
pub fn write_tree_from_dir(store: &LooseStore, dir: &Path) -> Result<ObjectId> {
    let mut entries = Vec::new();
    for dir_entry in fs::read_dir(dir)? {
        let dir_entry = dir_entry?;
        let name = dir_entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if name == ".git" {
            continue;
        }

        let (mode, id) = if dir_entry.file_type()?.is_dir() {
            (MODE_DIR, write_tree_from_dir(store, &dir_entry.path())?)
        } else {
            let content = fs::read(dir_entry.path())?;
            (MODE_FILE, store.write(ObjectType::Blob, &content)?)
        };
        entries.push(TreeEntry { mode, name, id });
    }

    let payload = serialize_tree(entries);
    store.write(ObjectType::Tree, &payload)
}

/// Materialises a tree object (and everything below it) into `dir`.
///
/// Subdirectories must not already exist. Executable and symlink modes are
/// written as regular files.
pub fn checkout_tree(store: &LooseStore, tree: &ObjectId, dir: &Path) -> Result<()> {
    let reader = store.open(&tree.to_hex())?;
    if reader.kind != ObjectType::Tree {
        return Err(StorageError::Corrupt(format!(
            "{tree} is not a tree object"
        )));
    }
    let size = reader.size;
    let mut reader = reader;
    let entries = parse_tree(size, &mut reader)?;

    for entry in entries {
        let target = dir.join(&entry.name);
        if entry.mode == MODE_DIR {
            fs::create_dir(&target)?;
            checkout_tree(store, &entry.id, &target)?;
        } else {
            let blob = store.open(&entry.id.to_hex())?;
            if blob.kind != ObjectType::Blob {
                return Err(StorageError::Unsupported(format!(
                    "tree entry {} points at a {}",
                    entry.name,
                    blob.kind.as_str()
                )));
            }
            fs::write(&target, blob.read_payload()?)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::frame;
    use sha1::{Digest, Sha1};
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> LooseStore {
        let git_dir = temp.path().join(".git");
        fs::create_dir_all(git_dir.join("objects")).unwrap();
        LooseStore::new(git_dir)
    }

    #[test]
    fn single_file_tree_digest() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::write(temp.path().join("a"), b"A\n").unwrap();

        let tree_id = write_tree_from_dir(&store, temp.path()).unwrap();

        // Compute the expected digest by hand: one entry (100644, "a", blob).
        let blob_id = ObjectId::hash_object(ObjectType::Blob, b"A\n");
        let mut payload = b"100644 a\0".to_vec();
        payload.extend_from_slice(blob_id.as_bytes());
        let mut hasher = Sha1::new();
        hasher.update(frame(ObjectType::Tree, &payload));
        assert_eq!(hasher.finalize().as_slice(), tree_id.as_bytes());
    }

    #[test]
    fn nested_directories_roundtrip() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("top.txt"), b"top\n").unwrap();
        fs::write(src.join("sub/inner.txt"), b"inner\n").unwrap();

        let tree_id = write_tree_from_dir(&store, &src).unwrap();

        let dst = temp.path().join("dst");
        fs::create_dir(&dst).unwrap();
        checkout_tree(&store, &tree_id, &dst).unwrap();

        assert_eq!(fs::read(dst.join("top.txt")).unwrap(), b"top\n");
        assert_eq!(fs::read(dst.join("sub/inner.txt")).unwrap(), b"inner\n");
    }

    #[test]
    fn git_directory_is_skipped() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        fs::write(temp.path().join("tracked"), b"yes\n").unwrap();

        let with_git = write_tree_from_dir(&store, temp.path()).unwrap();

        // The same directory without .git hashes identically.
        let clean = TempDir::new().unwrap();
        let clean_store = store_in(&clean);
        fs::write(clean.path().join("tracked"), b"yes\n").unwrap();
        // Remove the .git dir from the hashed view by pointing at a fresh dir
        // containing only the tracked file.
        let plain = clean.path().join("plain");
        fs::create_dir(&plain).unwrap();
        fs::write(plain.join("tracked"), b"yes\n").unwrap();
        let without_git = write_tree_from_dir(&clean_store, &plain).unwrap();

        assert_eq!(with_git, without_git);
    }

    #[test]
    fn deterministic_regardless_of_creation_order() {
        let temp_a = TempDir::new().unwrap();
        let store_a = store_in(&temp_a);
        fs::write(temp_a.path().join("z"), b"1").unwrap();
        fs::write(temp_a.path().join("a"), b"2").unwrap();

        let temp_b = TempDir::new().unwrap();
        let store_b = store_in(&temp_b);
        fs::write(temp_b.path().join("a"), b"2").unwrap();
        fs::write(temp_b.path().join("z"), b"1").unwrap();

        assert_eq!(
            write_tree_from_dir(&store_a, temp_a.path()).unwrap(),
            write_tree_from_dir(&store_b, temp_b.path()).unwrap()
        );
    }

    #[test]
    fn checkout_refuses_existing_subdirectory() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub/f"), b"x").unwrap();
        let tree_id = write_tree_from_dir(&store, &src).unwrap();

        let dst = temp.path().join("dst");
        fs::create_dir_all(dst.join("sub")).unwrap();
        assert!(checkout_tree(&store, &tree_id, &dst).is_err());
    }

    #[test]
    fn checkout_of_a_blob_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let blob_id = store.write(ObjectType::Blob, b"not a tree").unwrap();
        let dst = temp.path().join("dst");
        fs::create_dir(&dst).unwrap();
        assert!(matches!(
            checkout_tree(&store, &blob_id, &dst),
            Err(StorageError::Corrupt(_))
        ));
    }
}
