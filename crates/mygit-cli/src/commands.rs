//! CLI command implementations.
//!
//! Each command takes the repository root explicitly and returns its
//! stdout payload; main binds the root to the current directory.

use mygit_storage::{
    parse_tree, write_tree_from_dir, GitObject, ObjectId, ObjectType, Repository, StorageError,
};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Identity used for fabricated commits.
const AUTHOR_IDENTITY: &str = "123abc <123abc@example.com>";

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Usage(String),

    #[error("{0} is not a tree object")]
    NotATree(String),

    #[error("no files found with pattern: {0}")]
    NoMatch(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Git(#[from] mygit_git::GitError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Initialize a repository in `root`.
pub fn init(root: &Path) -> Result<String> {
    Repository::init(root, true)?;
    tracing::info!(path = %root.display(), "initialized repository");
    Ok("Initialized git directory\n".to_string())
}

/// Pretty-print an object: raw payload for blobs and commits, a formatted
/// listing for trees.
pub fn cat_file(root: &Path, pretty: bool, hash: &str) -> Result<Vec<u8>> {
    if !pretty {
        return Err(CliError::Usage(
            "usage: mygit cat-file -p <object>".to_string(),
        ));
    }

    let repo = Repository::open(root);
    let mut reader = repo.objects.open(hash)?;
    match reader.kind {
        ObjectType::Tree => {
            let entries = parse_tree(reader.size, &mut reader)?;
            let mut out = String::new();
            for entry in entries {
                out.push_str(&format_entry(&entry));
            }
            Ok(out.into_bytes())
        }
        ObjectType::Blob | ObjectType::Commit | ObjectType::Tag => Ok(reader.read_payload()?),
    }
}

fn format_entry(entry: &mygit_storage::TreeEntry) -> String {
    format!(
        "{:06} {} {}    {}\n",
        entry.mode,
        entry.kind().as_str(),
        entry.id,
        entry.name
    )
}

/// List a tree's entries, optionally names only.
pub fn ls_tree(root: &Path, name_only: bool, hash: &str) -> Result<String> {
    let repo = Repository::open(root);
    let mut reader = repo.objects.open(hash)?;
    if reader.kind != ObjectType::Tree {
        return Err(CliError::NotATree(hash.to_string()));
    }

    let entries = parse_tree(reader.size, &mut reader)?;
    let mut out = String::new();
    for entry in entries {
        if name_only {
            out.push_str(&entry.name);
            out.push('\n');
        } else {
            out.push_str(&format_entry(&entry));
        }
    }
    Ok(out)
}

/// Hash every file matching the pattern as a blob, writing when asked.
pub fn hash_object(root: &Path, write: bool, pattern: &str) -> Result<String> {
    let repo = Repository::open(root);
    let full_pattern = root.join(pattern);
    let full_pattern = full_pattern.to_string_lossy();

    let paths: Vec<_> = glob::glob(&full_pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .collect();
    if paths.is_empty() {
        return Err(CliError::NoMatch(pattern.to_string()));
    }

    let mut out = String::new();
    for path in paths {
        let content = fs::read(&path)?;
        let id = if write {
            repo.objects.write(ObjectType::Blob, &content)?
        } else {
            ObjectId::hash_object(ObjectType::Blob, &content)
        };
        out.push_str(&format!("{id}\n"));
    }
    Ok(out)
}

/// Build a tree object from the working directory.
pub fn write_tree(root: &Path) -> Result<String> {
    let repo = Repository::open(root);
    let id = write_tree_from_dir(&repo.objects, root)?;
    Ok(format!("{id}\n"))
}

/// Fabricate a commit for an existing tree.
pub fn commit_tree(
    root: &Path,
    tree: &str,
    parent: Option<&str>,
    message: &str,
) -> Result<String> {
    if message.is_empty() {
        return Err(CliError::Usage("commit message can't be empty".to_string()));
    }

    let repo = Repository::open(root);
    if repo.objects.type_of(tree)? != ObjectType::Tree {
        return Err(CliError::Usage("provided hash isn't a tree".to_string()));
    }
    let tree_id = repo.objects.full_hash(tree)?;

    let mut parents = Vec::new();
    if let Some(parent) = parent {
        if repo.objects.type_of(parent)? != ObjectType::Commit {
            return Err(CliError::Usage(
                "provided parent isn't a commit".to_string(),
            ));
        }
        parents.push(repo.objects.full_hash(parent)?);
    }

    let now = chrono::Local::now();
    let author = format!("{AUTHOR_IDENTITY} {} {}", now.timestamp(), now.format("%z"));
    let commit = GitObject::commit(&tree_id, &parents, &author, &author, message);
    let id = repo.objects.write_object(&commit)?;
    Ok(format!("{id}\n"))
}

/// Clone a remote repository over smart HTTP.
pub fn clone(url: &str, dir: &str) -> Result<String> {
    mygit_git::clone(url, Path::new(dir))?;
    Ok(format!("cloned remote {url} to {dir}\n"))
}
