//! Repository handle: `.git` layout, HEAD and branch refs.

use crate::reader::read_exact_bytes;
use crate::worktree::checkout_tree;
use crate::{LooseStore, ObjectId, ObjectType, Result, StorageError};
use std::fs;
use std::path::{Path, PathBuf};

/// A repository rooted at a working directory containing `.git`.
///
/// All operations take the repository as an explicit handle; the CLI binds
/// one to the current working directory.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    git_dir: PathBuf,
    /// The loose object store under `.git/objects`.
    pub objects: LooseStore,
}

impl Repository {
    /// Creates the `.git` skeleton, idempotently.
    ///
    /// When `create_main` is set, HEAD is pointed at `refs/heads/main`
    /// (a clone initialises without it and sets HEAD during checkout).
    pub fn init(root: impl AsRef<Path>, create_main: bool) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let git_dir = root.join(".git");
        for dir in ["", "objects", "refs"] {
            fs::create_dir_all(git_dir.join(dir))?;
        }

        if create_main {
            fs::write(git_dir.join("HEAD"), "ref: refs/heads/main\n")?;
        }

        let objects = LooseStore::new(&git_dir);
        Ok(Self {
            root,
            git_dir,
            objects,
        })
    }

    /// Opens a handle over an existing repository.
    pub fn open(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let git_dir = root.join(".git");
        let objects = LooseStore::new(&git_dir);
        Self {
            root,
            git_dir,
            objects,
        }
    }

    /// The working directory this repository is rooted at.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates `refs/heads/<name>` pointing at a commit.
    pub fn make_branch(&self, name: &str, id: &ObjectId) -> Result<()> {
        let kind = self.objects.type_of(&id.to_hex())?;
        if kind != ObjectType::Commit {
            return Err(StorageError::Corrupt(format!(
                "{id} isn't a commit and so can't be made a branch"
            )));
        }

        let heads = self.git_dir.join("refs/heads");
        fs::create_dir_all(&heads)?;
        fs::write(heads.join(name), format!("{id}\n"))?;
        Ok(())
    }

    /// Reads the commit a branch points at.
    pub fn read_branch(&self, name: &str) -> Result<ObjectId> {
        let content = fs::read_to_string(self.git_dir.join("refs/heads").join(name))?;
        ObjectId::from_hex(content.trim_end())
    }

    /// Points HEAD at a branch and materialises its commit's tree into the
    /// working directory.
    pub fn checkout(&self, name: &str) -> Result<()> {
        let commit_id = self.read_branch(name)?;
        fs::write(
            self.git_dir.join("HEAD"),
            format!("ref: refs/heads/{name}\n"),
        )?;

        let tree_id = self.commit_tree_id(&commit_id)?;
        tracing::debug!(branch = name, commit = %commit_id, tree = %tree_id, "checking out");
        checkout_tree(&self.objects, &tree_id, &self.root)
    }

    /// Extracts the tree digest from a commit's first payload line.
    fn commit_tree_id(&self, commit: &ObjectId) -> Result<ObjectId> {
        let mut reader = self.objects.open(&commit.to_hex())?;
        if reader.kind != ObjectType::Commit {
            return Err(StorageError::Corrupt(format!(
                "{commit} is not a commit object"
            )));
        }
        let literal = read_exact_bytes(&mut reader, 5)?;
        if literal != b"tree " {
            return Err(StorageError::Corrupt(
                "commit does not start with a tree line".to_string(),
            ));
        }
        let hex = read_exact_bytes(&mut reader, 40)?;
        let hex = std::str::from_utf8(&hex)
            .map_err(|_| StorageError::Corrupt("invalid tree digest in commit".to_string()))?;
        let tree_id = ObjectId::from_hex(hex)?;
        let newline = read_exact_bytes(&mut reader, 1)?;
        if newline != b"\n" {
            return Err(StorageError::Corrupt(
                "malformed tree line in commit".to_string(),
            ));
        }
        Ok(tree_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worktree::write_tree_from_dir;
    use crate::GitObject;
    use tempfile::TempDir;

    const AUTHOR: &str = "123abc <123abc@example.com> 1700000000 +0000";

    #[test]
    fn init_creates_layout() {
        let temp = TempDir::new().unwrap();
        Repository::init(temp.path(), true).unwrap();

        assert!(temp.path().join(".git/objects").is_dir());
        assert!(temp.path().join(".git/refs").is_dir());
        assert_eq!(
            fs::read_to_string(temp.path().join(".git/HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
    }

    #[test]
    fn init_without_main_leaves_head_absent() {
        let temp = TempDir::new().unwrap();
        Repository::init(temp.path(), false).unwrap();
        assert!(!temp.path().join(".git/HEAD").exists());
    }

    #[test]
    fn init_is_idempotent() {
        let temp = TempDir::new().unwrap();
        Repository::init(temp.path(), true).unwrap();
        Repository::init(temp.path(), true).unwrap();
        assert!(temp.path().join(".git/objects").is_dir());
    }

    fn commit_in(repo: &Repository, src: &Path) -> ObjectId {
        let tree_id = write_tree_from_dir(&repo.objects, src).unwrap();
        let commit = GitObject::commit(&tree_id, &[], AUTHOR, AUTHOR, "hi");
        repo.objects.write_object(&commit).unwrap()
    }

    #[test]
    fn make_branch_requires_a_commit() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path(), true).unwrap();
        let blob = repo.objects.write(ObjectType::Blob, b"data").unwrap();
        assert!(repo.make_branch("main", &blob).is_err());
    }

    #[test]
    fn branch_roundtrip() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path(), true).unwrap();
        let src = temp.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("f"), b"content\n").unwrap();
        let commit_id = commit_in(&repo, &src);

        repo.make_branch("main", &commit_id).unwrap();
        assert_eq!(repo.read_branch("main").unwrap(), commit_id);
        assert_eq!(
            fs::read_to_string(temp.path().join(".git/refs/heads/main")).unwrap(),
            format!("{commit_id}\n")
        );
    }

    #[test]
    fn checkout_materialises_the_tree_and_moves_head() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("docs")).unwrap();
        fs::write(src.join("readme.md"), b"# hi\n").unwrap();
        fs::write(src.join("docs/guide.md"), b"guide\n").unwrap();

        let out = temp.path().join("out");
        fs::create_dir(&out).unwrap();
        let repo = Repository::init(&out, false).unwrap();
        let tree_id = write_tree_from_dir(&repo.objects, &src).unwrap();
        let commit = GitObject::commit(&tree_id, &[], AUTHOR, AUTHOR, "import");
        let commit_id = repo.objects.write_object(&commit).unwrap();

        repo.make_branch("trunk", &commit_id).unwrap();
        repo.checkout("trunk").unwrap();

        assert_eq!(
            fs::read_to_string(out.join(".git/HEAD")).unwrap(),
            "ref: refs/heads/trunk\n"
        );
        assert_eq!(fs::read(out.join("readme.md")).unwrap(), b"# hi\n");
        assert_eq!(fs::read(out.join("docs/guide.md")).unwrap(), b"guide\n");
    }

    #[test]
    fn checkout_of_missing_branch_fails() {
        let temp = TempDir::new().unwrap();
        let repo = Repository::init(temp.path(), true).unwrap();
        assert!(repo.checkout("nope").is_err());
    }
}
