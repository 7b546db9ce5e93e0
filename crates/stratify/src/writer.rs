//! Write-side collaborator: materialize new files at template-built paths.

use crate::layout::error::{LayoutError, Result};
use crate::layout::Layout;
use crate::template::build_path;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// What to do when the destination path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Raise an error.
    #[default]
    Fail,
    /// Log and return without writing.
    Skip,
    /// Remove the existing file, then write.
    Overwrite,
    /// Probe `_1`, `_2`, ... suffixes before the extension chain until an
    /// unused path is found.
    Append,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fail" => Some(Self::Fail),
            "skip" => Some(Self::Skip),
            "overwrite" => Some(Self::Overwrite),
            "append" => Some(Self::Append),
            _ => None,
        }
    }
}

/// Contents for a new file: raw bytes or a symlink target.
#[derive(Debug, Clone)]
pub enum WriteSource<'a> {
    Text(&'a str),
    Bytes(&'a [u8]),
    /// Create a symbolic link to this path instead of writing contents.
    Link(&'a Path),
}

/// Split a filename into `(stem, extension chain)` where the chain starts at
/// the first dot, so `a.nii.gz` yields `("a", "nii.gz")`.
fn split_extension_chain(name: &str) -> (&str, Option<&str>) {
    match name.find('.') {
        Some(0) | None => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

fn appended_path(path: &Path, index: usize) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let (stem, ext) = split_extension_chain(&name);
    let new_name = match ext {
        Some(ext) => format!("{}_{}.{}", stem, index, ext),
        None => format!("{}_{}", stem, index),
    };
    path.with_file_name(new_name)
}

fn exists_or_link(path: &Path) -> bool {
    path.exists() || path.symlink_metadata().is_ok()
}

/// Write contents (or a symlink) to `path`, resolving conflicts per policy.
///
/// Returns the path actually written, or `None` when the skip policy
/// applied. Missing parent directories are created.
pub fn write_contents_to_file(
    path: &Path,
    source: WriteSource<'_>,
    root: Option<&Path>,
    policy: ConflictPolicy,
) -> Result<Option<PathBuf>> {
    let mut path = match root {
        Some(root) if !path.is_absolute() => root.join(path),
        _ => path.to_path_buf(),
    };

    if exists_or_link(&path) {
        match policy {
            ConflictPolicy::Fail => {
                return Err(LayoutError::Conflict(path.display().to_string()))
            }
            ConflictPolicy::Skip => {
                warn!(path = %path.display(), "Destination exists; skipping write");
                return Ok(None);
            }
            ConflictPolicy::Overwrite => {
                if path.is_dir() {
                    warn!(path = %path.display(), "Destination is a directory; not overwriting");
                    return Ok(None);
                }
                fs::remove_file(&path)?;
            }
            ConflictPolicy::Append => {
                let mut index = 1usize;
                loop {
                    let candidate = appended_path(&path, index);
                    if !exists_or_link(&candidate) {
                        path = candidate;
                        break;
                    }
                    index += 1;
                }
            }
        }
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    match source {
        WriteSource::Text(text) => fs::write(&path, text)?,
        WriteSource::Bytes(bytes) => fs::write(&path, bytes)?,
        WriteSource::Link(target) => {
            #[cfg(unix)]
            std::os::unix::fs::symlink(target, &path)?;
            #[cfg(windows)]
            std::os::windows::fs::symlink_file(target, &path)?;
        }
    }
    Ok(Some(path))
}

impl Layout {
    /// Expand the layout's default path patterns (or `patterns`, when given)
    /// against an entity-value map. Soft-fails to `None` when no pattern
    /// resolves.
    pub fn build_path(
        &self,
        entities: &BTreeMap<String, String>,
        patterns: Option<&[String]>,
        strict: bool,
    ) -> Option<String> {
        let defaults;
        let patterns = match patterns {
            Some(p) => p,
            None => {
                defaults = self.default_path_patterns();
                &defaults
            }
        };
        build_path(entities, patterns, strict)
    }

    /// Build a destination from the entity map, write contents there under
    /// the layout's first root, and index the new file.
    pub fn write_contents(
        &mut self,
        entities: &BTreeMap<String, String>,
        patterns: Option<&[String]>,
        source: WriteSource<'_>,
        policy: ConflictPolicy,
    ) -> Result<Option<PathBuf>> {
        let Some(rel) = self.build_path(entities, patterns, false) else {
            warn!("No path pattern resolved for the supplied entities; nothing written");
            return Ok(None);
        };
        let root = self.roots[0].clone();
        let written =
            write_contents_to_file(Path::new(&rel), source, Some(Path::new(&root)), policy)?;
        if let Some(written) = &written {
            let normalized = written.to_string_lossy().replace('\\', "/");
            self.index_file(&normalized)?;
        }
        Ok(written)
    }
}
