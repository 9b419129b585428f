//! Transfer payloads and their enumeration into wire entries.
//!
//! A file-set payload is flattened into an ordered list of
//! `(relative path, size)` entries before the header is finalized; folders
//! are walked recursively, children sorted by name so the entry order is
//! deterministic. The aggregate total is the sum of all entry sizes and is
//! fixed before any byte is sent.
//!
//! A screenshot is just a file-set with a single JPEG entry; the engine has
//! no screenshot concept, and the temporary encoded file is owned and
//! removed by the caller that made it.

use crate::error::{EngineError, Result};
use lancast_wire::{FileEntry, TransferHeader};
use std::fs;
use std::path::{Path, PathBuf};

/// What a send carries.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Files and/or folders; folders are enumerated recursively
    Files(Vec<PathBuf>),
    /// A UTF-8 text snippet
    Text(String),
}

/// One flattened file entry with its on-disk source.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    /// `/`-separated path relative to the destination folder
    pub rel_path: String,
    /// Byte size, read from metadata at enumeration time
    pub size: u64,
    /// Absolute (or caller-relative) source path to stream from
    pub source: PathBuf,
}

/// A payload resolved to its wire header plus streaming plan.
#[derive(Debug)]
pub enum ResolvedPayload {
    /// Header and per-entry sources, in header order
    Files {
        /// The FILES header to write
        header: TransferHeader,
        /// Sources matching the header entries one to one
        entries: Vec<SourceEntry>,
    },
    /// Header and snippet bytes
    Text {
        /// The TEXT header to write
        header: TransferHeader,
        /// UTF-8 bytes of the snippet
        bytes: Vec<u8>,
    },
}

impl ResolvedPayload {
    /// Aggregate byte count this payload will stream.
    pub fn total_size(&self) -> u64 {
        match self {
            Self::Files { header, .. } | Self::Text { header, .. } => header.total_size(),
        }
    }
}

impl Payload {
    /// Resolve into a header and streaming plan.
    ///
    /// # Errors
    ///
    /// [`EngineError::TransferIo`] if a source path cannot be read, or
    /// [`EngineError::InvalidState`] for an empty file set.
    pub fn resolve(self) -> Result<ResolvedPayload> {
        match self {
            Payload::Text(text) => {
                let bytes = text.into_bytes();
                let header = TransferHeader::text(bytes.len() as u64);
                Ok(ResolvedPayload::Text { header, bytes })
            }
            Payload::Files(roots) => {
                if roots.is_empty() {
                    return Err(EngineError::InvalidState("empty file set"));
                }
                let mut entries = Vec::new();
                for root in &roots {
                    enumerate_root(root, &mut entries)?;
                }
                let header = TransferHeader::files(
                    entries
                        .iter()
                        .map(|e| FileEntry::new(e.rel_path.clone(), e.size))
                        .collect(),
                );
                Ok(ResolvedPayload::Files { header, entries })
            }
        }
    }
}

/// Flatten one root (file or folder) into entries.
fn enumerate_root(root: &Path, entries: &mut Vec<SourceEntry>) -> Result<()> {
    let meta = fs::metadata(root).map_err(EngineError::TransferIo)?;
    let base_name = root
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or(EngineError::InvalidState("path has no usable file name"))?
        .to_string();

    if meta.is_dir() {
        walk_dir(root, &base_name, entries)
    } else {
        entries.push(SourceEntry {
            rel_path: base_name,
            size: meta.len(),
            source: root.to_path_buf(),
        });
        Ok(())
    }
}

fn walk_dir(dir: &Path, prefix: &str, entries: &mut Vec<SourceEntry>) -> Result<()> {
    let mut children: Vec<_> = fs::read_dir(dir)
        .map_err(EngineError::TransferIo)?
        .collect::<std::io::Result<_>>()
        .map_err(EngineError::TransferIo)?;
    children.sort_by_key(|e| e.file_name());

    for child in children {
        let name = match child.file_name().into_string() {
            Ok(name) => name,
            Err(_) => {
                tracing::warn!(path = %child.path().display(), "skipping non-UTF-8 file name");
                continue;
            }
        };
        let rel = format!("{prefix}/{name}");
        let meta = child.metadata().map_err(EngineError::TransferIo)?;
        if meta.is_dir() {
            walk_dir(&child.path(), &rel, entries)?;
        } else if meta.is_file() {
            entries.push(SourceEntry {
                rel_path: rel,
                size: meta.len(),
                source: child.path(),
            });
        }
        // Symlinks and special files are skipped
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;

    #[test]
    fn text_resolves_to_byte_length() {
        let resolved = Payload::Text("héllo".into()).resolve().unwrap();
        match resolved {
            ResolvedPayload::Text { header, bytes } => {
                assert_eq!(bytes.len(), 6);
                assert_eq!(header.total_size(), 6);
            }
            ResolvedPayload::Files { .. } => panic!("expected text"),
        }
    }

    #[test]
    fn single_file_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        File::create(&path).unwrap().write_all(b"12345").unwrap();

        let resolved = Payload::Files(vec![path.clone()]).resolve().unwrap();
        match resolved {
            ResolvedPayload::Files { entries, header } => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].rel_path, "notes.txt");
                assert_eq!(entries[0].size, 5);
                assert_eq!(header.total_size(), 5);
            }
            ResolvedPayload::Text { .. } => panic!("expected files"),
        }
    }

    #[test]
    fn folder_walk_is_recursive_sorted_and_prefixed() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("album");
        fs::create_dir_all(root.join("sub")).unwrap();
        File::create(root.join("b.jpg")).unwrap().write_all(b"bb").unwrap();
        File::create(root.join("a.jpg")).unwrap().write_all(b"a").unwrap();
        File::create(root.join("sub/c.jpg"))
            .unwrap()
            .write_all(b"ccc")
            .unwrap();

        let resolved = Payload::Files(vec![root]).resolve().unwrap();
        let ResolvedPayload::Files { entries, header } = resolved else {
            panic!("expected files");
        };
        let rels: Vec<_> = entries.iter().map(|e| e.rel_path.as_str()).collect();
        assert_eq!(rels, vec!["album/a.jpg", "album/b.jpg", "album/sub/c.jpg"]);
        assert_eq!(header.total_size(), 6);
    }

    #[test]
    fn total_is_fixed_at_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        File::create(&path).unwrap().write_all(&[0u8; 1000]).unwrap();

        let resolved = Payload::Files(vec![path]).resolve().unwrap();
        assert_eq!(resolved.total_size(), 1000);
    }

    #[test]
    fn empty_file_set_rejected() {
        assert!(matches!(
            Payload::Files(vec![]).resolve(),
            Err(EngineError::InvalidState(_))
        ));
    }

    #[test]
    fn missing_source_is_io_error() {
        let err = Payload::Files(vec![PathBuf::from("/no/such/file")])
            .resolve()
            .unwrap_err();
        assert!(matches!(err, EngineError::TransferIo(_)));
    }
}
