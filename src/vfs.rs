//! In-memory virtual filesystem manipulated exclusively by tools.
//!
//! The VFS is a single mapping `path -> VirtualFile`; there is no directory
//! tree type. Directories are inferred from path prefixes, which keeps every
//! operation O(n) in the entry count and sidesteps empty-directory corner
//! cases. Sessions hold well under 10k entries, so no index is needed.
//!
//! # Semantics
//!
//! - All paths are absolute, case-sensitive POSIX-style strings. Relative
//!   input is rejected with [`Error::InvalidPath`].
//! - `write` creates or replaces; the original `created_at` of an existing
//!   entry is preserved.
//! - `edit` requires its target string to occur exactly once. Uniqueness
//!   rather than occurrence-index keeps LLM-generated patches deterministic.
//! - `glob` supports `*`, `**`, `?`, and `[...]` against full absolute
//!   paths, with results sorted lexicographically.
//! - `mkdir` stores a `.directory` sentinel file; sentinels are invisible to
//!   `glob` and to [`VirtualFileSystem::documents`].
//!
//! # Example
//!
//! ```
//! use bmad_runtime::VirtualFileSystem;
//!
//! let mut vfs = VirtualFileSystem::new();
//! vfs.write("/docs/prd.md", "# PRD").unwrap();
//! assert_eq!(vfs.read("/docs/prd.md").unwrap(), "# PRD");
//!
//! vfs.edit("/docs/prd.md", "# PRD", "# Product Requirements").unwrap();
//! let matches = vfs.glob("/docs/*.md", None).unwrap();
//! assert_eq!(matches, vec!["/docs/prd.md".to_string()]);
//! ```

use crate::error::{Error, Result};
use crate::types::Document;
use chrono::{DateTime, Utc};
use globset::GlobBuilder;
use std::collections::BTreeMap;

/// File name of the marker entry `mkdir` stores for a nominal directory.
pub const DIRECTORY_SENTINEL: &str = ".directory";

/// A single file in the virtual filesystem.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualFile {
    /// UTF-8 file content.
    pub content: String,

    /// When the entry was first written.
    pub created_at: DateTime<Utc>,

    /// When the entry was last written or edited.
    pub modified_at: DateTime<Utc>,

    /// UTF-8 byte length of the content.
    pub size_bytes: u64,
}

/// Kind of a directory listing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfsEntryKind {
    /// A file directly inside the listed directory.
    File,
    /// An inferred subdirectory.
    Directory,
}

/// One entry returned by [`VirtualFileSystem::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct VfsEntry {
    /// Name relative to the listed directory (no slashes).
    pub name: String,

    /// Whether this is a file or an inferred subdirectory.
    pub kind: VfsEntryKind,

    /// Byte size for files; `None` for directories.
    pub size_bytes: Option<u64>,
}

/// The in-memory content-addressed directory a session's tools operate on.
///
/// Each session owns its VFS exclusively; parent and child sessions share
/// content only through the explicit merge at sub-agent completion.
#[derive(Debug, Clone, Default)]
pub struct VirtualFileSystem {
    files: BTreeMap<String, VirtualFile>,
}

/// Validates and normalizes a path: must be absolute; a trailing `/` is
/// stripped (except for the root itself).
fn normalize_path(path: &str) -> Result<String> {
    if !path.starts_with('/') {
        return Err(Error::InvalidPath(format!(
            "'{path}' (paths must be absolute)"
        )));
    }
    if path == "/" {
        return Ok(path.to_string());
    }
    Ok(path.trim_end_matches('/').to_string())
}

/// True when the path names a `.directory` sentinel at any depth.
fn is_sentinel(path: &str) -> bool {
    path.rsplit('/').next() == Some(DIRECTORY_SENTINEL)
}

/// True for paths under `/.bmad-<seg>/agents/` with a non-empty `<seg>`.
///
/// These entries are agent definitions loaded into the VFS for the model's
/// discovery, not user-visible artifacts, and are filtered out of
/// [`VirtualFileSystem::documents`].
pub(crate) fn is_agent_definition_path(path: &str) -> bool {
    let Some(rest) = path.strip_prefix("/.bmad-") else {
        return false;
    };
    let Some(slash) = rest.find('/') else {
        return false;
    };
    slash > 0 && rest[slash..].starts_with("/agents/")
}

impl VirtualFileSystem {
    /// Creates an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconstructs a filesystem from a serialized path -> content map.
    ///
    /// Timestamps are not part of the serialized form; restored entries get
    /// the restoration time.
    pub fn from_snapshot(files: BTreeMap<String, String>) -> Self {
        let now = Utc::now();
        let files = files
            .into_iter()
            .map(|(path, content)| {
                let size_bytes = content.len() as u64;
                (
                    path,
                    VirtualFile {
                        content,
                        created_at: now,
                        modified_at: now,
                        size_bytes,
                    },
                )
            })
            .collect();
        Self { files }
    }

    /// Writes a file, creating or replacing it.
    ///
    /// `created_at` of a pre-existing entry is preserved; `modified_at` and
    /// `size_bytes` are updated.
    pub fn write(&mut self, path: &str, content: &str) -> Result<()> {
        let path = normalize_path(path)?;
        let now = Utc::now();
        let created_at = self
            .files
            .get(&path)
            .map(|f| f.created_at)
            .unwrap_or(now);
        self.files.insert(
            path,
            VirtualFile {
                content: content.to_string(),
                created_at,
                modified_at: now,
                size_bytes: content.len() as u64,
            },
        );
        Ok(())
    }

    /// Returns the content of a file.
    pub fn read(&self, path: &str) -> Result<&str> {
        let path = normalize_path(path)?;
        self.files
            .get(&path)
            .map(|f| f.content.as_str())
            .ok_or(Error::FileNotFound(path))
    }

    /// Returns the full entry for a path, if present.
    pub fn file(&self, path: &str) -> Option<&VirtualFile> {
        let path = normalize_path(path).ok()?;
        self.files.get(&path)
    }

    /// True when the path exists.
    pub fn contains(&self, path: &str) -> bool {
        self.file(path).is_some()
    }

    /// Replaces a unique occurrence of `old_string` with `new_string`.
    ///
    /// # Errors
    ///
    /// - [`Error::FileNotFound`] when the file does not exist
    /// - [`Error::StringNotFound`] when `old_string` never occurs
    /// - [`Error::AmbiguousEdit`] when it occurs more than once; the file is
    ///   left unchanged
    pub fn edit(&mut self, path: &str, old_string: &str, new_string: &str) -> Result<()> {
        let path = normalize_path(path)?;
        if old_string.is_empty() {
            return Err(Error::invalid_input("old_string cannot be empty"));
        }
        let file = self
            .files
            .get_mut(&path)
            .ok_or_else(|| Error::FileNotFound(path.clone()))?;

        let occurrences = file.content.matches(old_string).count();
        match occurrences {
            0 => Err(Error::StringNotFound { path }),
            1 => {
                file.content = file.content.replacen(old_string, new_string, 1);
                file.size_bytes = file.content.len() as u64;
                file.modified_at = Utc::now();
                Ok(())
            }
            n => Err(Error::AmbiguousEdit {
                path,
                occurrences: n,
            }),
        }
    }

    /// Lists the direct children of a directory (no recursion).
    ///
    /// A trailing `/` on the input is normalized. An empty result is not an
    /// error. Entries are sorted by name; subdirectories are inferred from
    /// path prefixes.
    pub fn list(&self, dir_path: &str) -> Result<Vec<VfsEntry>> {
        let dir = normalize_path(dir_path)?;
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };

        let mut entries: BTreeMap<String, VfsEntry> = BTreeMap::new();
        for (path, file) in &self.files {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    entries.entry(child.to_string()).or_insert(VfsEntry {
                        name: child.to_string(),
                        kind: VfsEntryKind::Directory,
                        size_bytes: None,
                    });
                }
                None => {
                    if rest == DIRECTORY_SENTINEL {
                        continue;
                    }
                    entries.insert(
                        rest.to_string(),
                        VfsEntry {
                            name: rest.to_string(),
                            kind: VfsEntryKind::File,
                            size_bytes: Some(file.size_bytes),
                        },
                    );
                }
            }
        }
        Ok(entries.into_values().collect())
    }

    /// Matches files against a POSIX glob pattern.
    ///
    /// A relative pattern is joined onto `base_path` (default `/`); matching
    /// is always against full absolute paths. `.directory` sentinels are
    /// excluded. Results are sorted lexicographically.
    pub fn glob(&self, pattern: &str, base_path: Option<&str>) -> Result<Vec<String>> {
        let full_pattern = if pattern.starts_with('/') {
            pattern.to_string()
        } else {
            let base = normalize_path(base_path.unwrap_or("/"))?;
            if base == "/" {
                format!("/{pattern}")
            } else {
                format!("{base}/{pattern}")
            }
        };

        let matcher = GlobBuilder::new(&full_pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::invalid_input(format!("Invalid glob pattern '{pattern}': {e}")))?
            .compile_matcher();

        let matches: Vec<String> = self
            .files
            .keys()
            .filter(|path| !is_sentinel(path))
            .filter(|path| matcher.is_match(path.as_str()))
            .cloned()
            .collect();
        // BTreeMap keys iterate in lexicographic order already.
        Ok(matches)
    }

    /// Records a nominal directory by storing a `.directory` sentinel file.
    ///
    /// Provided for `bash_command` compatibility; no other operation
    /// requires directories to be declared.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let dir = normalize_path(path)?;
        if dir == "/" {
            return Ok(());
        }
        self.write(&format!("{dir}/{DIRECTORY_SENTINEL}"), "")
    }

    /// Number of entries, sentinels included.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// True when no entries exist.
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates over all entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &VirtualFile)> {
        self.files.iter()
    }

    /// Serializes the filesystem as a path -> content map.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.files
            .iter()
            .map(|(path, file)| (path.clone(), file.content.clone()))
            .collect()
    }

    /// Emits the user-visible artifacts of the filesystem.
    ///
    /// `.directory` sentinels and agent-definition entries (paths under
    /// `/.bmad-*/agents/`) are excluded.
    pub fn documents(&self) -> Vec<Document> {
        self.files
            .iter()
            .filter(|(path, _)| !is_sentinel(path) && !is_agent_definition_path(path))
            .map(|(path, file)| Document::new(path.clone(), file.content.clone()))
            .collect()
    }
}
