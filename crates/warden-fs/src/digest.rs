//! SHA-256 digest engine
//!
//! Hashes single files by streaming them in fixed-size chunks, and whole
//! directories into a [`HashNode`] tree whose directory hashes depend only on
//! the sorted `(name, hash)` pairs of their children. Two trees with the same
//! content therefore hash identically regardless of the order in which the
//! filesystem lists entries or the degree of parallelism used.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::filter::CompiledFilter;
use crate::{Error, NormalizedPath, Result};

/// Bytes read per step when hashing a file
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Digest of a single file's bytes.
///
/// `size` counts the bytes that went into `hash`, so both always describe
/// the same read of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDigest {
    /// Lowercase hex SHA-256
    pub hash: String,
    pub size: u64,
}

/// Compute the SHA-256 digest of a file using the default chunk size.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn hash_file(path: &Path) -> Result<FileDigest> {
    hash_file_with(path, DEFAULT_CHUNK_SIZE)
}

/// Compute the SHA-256 digest of a file, reading `chunk_size` bytes at a time.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn hash_file_with(path: &Path, chunk_size: usize) -> Result<FileDigest> {
    let mut file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut size = 0u64;

    loop {
        let read = file.read(&mut buffer).map_err(|e| Error::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        size += read as u64;
    }

    Ok(FileDigest {
        hash: format!("{:x}", hasher.finalize()),
        size,
    })
}

/// Node of an in-memory hash tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HashNode {
    File {
        hash: String,
        size: u64,
    },
    Directory {
        hash: String,
        children: BTreeMap<String, HashNode>,
    },
}

impl HashNode {
    /// Build a directory node, deriving its hash from the children.
    pub fn directory(children: BTreeMap<String, HashNode>) -> Self {
        let hash = directory_hash(&children);
        Self::Directory { hash, children }
    }

    pub fn file(digest: FileDigest) -> Self {
        Self::File {
            hash: digest.hash,
            size: digest.size,
        }
    }

    pub fn hash(&self) -> &str {
        match self {
            Self::File { hash, .. } | Self::Directory { hash, .. } => hash,
        }
    }

    /// File size, or the total size of all files below a directory.
    pub fn size(&self) -> u64 {
        match self {
            Self::File { size, .. } => *size,
            Self::Directory { children, .. } => children.values().map(HashNode::size).sum(),
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory { .. })
    }

    pub fn children(&self) -> Option<&BTreeMap<String, HashNode>> {
        match self {
            Self::Directory { children, .. } => Some(children),
            Self::File { .. } => None,
        }
    }

    /// Look up a descendant by its `/`-separated relative path.
    pub fn get(&self, rel: &str) -> Option<&HashNode> {
        NormalizedPath::new(rel)
            .segments()
            .try_fold(self, |node, segment| node.children()?.get(segment))
    }

    /// Number of file nodes in this tree.
    pub fn file_count(&self) -> usize {
        match self {
            Self::File { .. } => 1,
            Self::Directory { children, .. } => children.values().map(HashNode::file_count).sum(),
        }
    }

    /// Assemble a tree from already-known file digests keyed by relative path.
    ///
    /// Used to describe a scope from its file index instead of from disk.
    pub fn from_files<I>(files: I) -> Self
    where
        I: IntoIterator<Item = (NormalizedPath, FileDigest)>,
    {
        #[derive(Default)]
        struct Pending {
            dirs: BTreeMap<String, Pending>,
            files: BTreeMap<String, FileDigest>,
        }

        fn seal(pending: Pending) -> HashNode {
            let mut children: BTreeMap<String, HashNode> = pending
                .dirs
                .into_iter()
                .map(|(name, dir)| (name, seal(dir)))
                .collect();
            for (name, digest) in pending.files {
                children.insert(name, HashNode::file(digest));
            }
            HashNode::directory(children)
        }

        let mut root = Pending::default();
        for (path, digest) in files {
            let segments: Vec<&str> = path.segments().collect();
            let Some((name, parents)) = segments.split_last() else {
                continue;
            };
            let dir = parents
                .iter()
                .fold(&mut root, |dir, segment| dir.dirs.entry(segment.to_string()).or_default());
            dir.files.insert(name.to_string(), digest);
        }
        seal(root)
    }
}

/// Hash of a directory given its children.
///
/// The children are serialized as a JSON object of `name -> hash` with keys
/// in lexicographic order, then hashed with SHA-256.
pub fn directory_hash(children: &BTreeMap<String, HashNode>) -> String {
    let listing: serde_json::Map<String, serde_json::Value> = children
        .iter()
        .map(|(name, node)| (name.clone(), serde_json::Value::String(node.hash().to_string())))
        .collect();
    let serialized = serde_json::Value::Object(listing).to_string();

    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// An entry that could not be hashed and was left out of its parent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestFailure {
    pub path: NormalizedPath,
    pub message: String,
}

/// Result of hashing a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryDigest {
    pub root: HashNode,
    /// Entries excluded because they could not be read, sorted by path
    pub failures: Vec<DigestFailure>,
}

impl DirectoryDigest {
    /// Whether every selected entry was hashed.
    ///
    /// A tree with failures must not be signed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Options for [`hash_directory`].
#[derive(Debug, Clone)]
pub struct DigestOptions {
    pub chunk_size: usize,
    /// Hash sibling entries on the rayon pool
    pub parallel: bool,
    pub filter: CompiledFilter,
}

impl Default for DigestOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            parallel: true,
            filter: CompiledFilter::allow_all(),
        }
    }
}

impl DigestOptions {
    pub fn with_filter(mut self, filter: CompiledFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

/// Hash a directory tree depth-first.
///
/// Unreadable entries are reported in [`DirectoryDigest::failures`] and left
/// out of their parent's hash instead of aborting the walk. Symbolic links
/// are followed unless they resolve to a directory that is already on the
/// current path.
///
/// # Errors
///
/// Returns an error only if `root` itself is not a readable directory.
pub fn hash_directory(root: &Path, options: &DigestOptions) -> Result<DirectoryDigest> {
    let canonical = dunce::canonicalize(root).map_err(|e| Error::io(root, e))?;
    if !canonical.is_dir() {
        return Err(Error::NotADirectory {
            path: root.to_path_buf(),
        });
    }
    // Surface an unreadable root as a hard error rather than an empty tree.
    fs::read_dir(&canonical).map_err(|e| Error::io(root, e))?;

    let mut failures = Vec::new();
    let children = hash_children(&canonical, "", options, &[canonical.clone()], &mut failures)
        .unwrap_or_default();
    failures.sort_by(|a, b| a.path.cmp(&b.path));

    debug!(
        root = %root.display(),
        failures = failures.len(),
        "hashed directory tree"
    );

    Ok(DirectoryDigest {
        root: HashNode::directory(children),
        failures,
    })
}

enum Entry {
    Dir { name: String, abs: PathBuf, canonical: PathBuf },
    File { name: String, abs: PathBuf },
}

fn hash_children(
    dir: &Path,
    rel: &str,
    options: &DigestOptions,
    ancestors: &[PathBuf],
    failures: &mut Vec<DigestFailure>,
) -> Option<BTreeMap<String, HashNode>> {
    let entries = match list_entries(dir, rel, options, ancestors) {
        Ok(entries) => entries,
        Err(failure) => {
            warn!(path = %failure.path, error = %failure.message, "skipping unreadable directory");
            failures.push(failure);
            return None;
        }
    };

    let hash_one = |entry: &Entry| -> (String, Option<HashNode>, Vec<DigestFailure>) {
        match entry {
            Entry::File { name, abs } => {
                let child_rel = join_rel(rel, name);
                match hash_file_with(abs, options.chunk_size) {
                    Ok(digest) => (name.clone(), Some(HashNode::file(digest)), Vec::new()),
                    Err(e) => {
                        warn!(path = %child_rel, error = %e, "skipping unreadable file");
                        let failure = DigestFailure {
                            path: NormalizedPath::new(&child_rel),
                            message: e.to_string(),
                        };
                        (name.clone(), None, vec![failure])
                    }
                }
            }
            Entry::Dir {
                name,
                abs,
                canonical,
            } => {
                let child_rel = join_rel(rel, name);
                let mut chain = ancestors.to_vec();
                chain.push(canonical.clone());
                let mut nested = Vec::new();
                let node = hash_children(abs, &child_rel, options, &chain, &mut nested)
                    .filter(|children| !children.is_empty() || !options.filter.has_includes())
                    .map(HashNode::directory);
                (name.clone(), node, nested)
            }
        }
    };

    let results: Vec<_> = if options.parallel {
        entries.par_iter().map(hash_one).collect()
    } else {
        entries.iter().map(hash_one).collect()
    };

    let mut children = BTreeMap::new();
    for (name, node, nested) in results {
        failures.extend(nested);
        if let Some(node) = node {
            children.insert(name, node);
        }
    }
    Some(children)
}

fn list_entries(
    dir: &Path,
    rel: &str,
    options: &DigestOptions,
    ancestors: &[PathBuf],
) -> std::result::Result<Vec<Entry>, DigestFailure> {
    let read_dir = fs::read_dir(dir).map_err(|e| DigestFailure {
        path: NormalizedPath::new(rel),
        message: Error::io(dir, e).to_string(),
    })?;

    let mut entries = Vec::new();
    for item in read_dir {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "failed to read directory entry");
                continue;
            }
        };
        let name = item.file_name().to_string_lossy().into_owned();
        let child_rel = join_rel(rel, &name);
        let abs = item.path();

        // Follows symlinks; a dangling link is classified as a file and
        // reported when it fails to open.
        let is_dir = fs::metadata(&abs).map(|m| m.is_dir()).unwrap_or(false);

        if is_dir {
            if !options.filter.descends_into(&child_rel) {
                continue;
            }
            let canonical = match dunce::canonicalize(&abs) {
                Ok(c) => c,
                Err(e) => {
                    warn!(path = %child_rel, error = %e, "cannot resolve directory");
                    continue;
                }
            };
            if ancestors.contains(&canonical) {
                warn!(path = %child_rel, target = %canonical.display(), "skipping symlink loop");
                continue;
            }
            entries.push(Entry::Dir {
                name,
                abs,
                canonical,
            });
        } else if options.filter.keeps_file(&child_rel) {
            entries.push(Entry::File { name, abs });
        }
    }
    Ok(entries)
}

fn join_rel(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}
