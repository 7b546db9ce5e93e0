//! File-listing seam for the indexer.
//!
//! The indexer never touches the filesystem directly; it walks through a
//! [`FileSource`], which yields one `(directory, subdirectories, filenames)`
//! tuple per directory, depth-first and top-down. The visitor may remove
//! entries from the subdirectory list to prune traversal, in which case the
//! pruned subtrees are never read. Remote backends can substitute their own
//! implementation as long as this contract holds.

use super::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Visitor invoked once per directory.
///
/// Arguments: the directory path, its subdirectory names (mutable; remove
/// entries to prune), and its plain file names.
pub type WalkVisitor<'a> = dyn FnMut(&Path, &mut Vec<String>, &[String]) -> Result<()> + 'a;

/// A source of directory listings.
pub trait FileSource {
    /// Walk `root` depth-first, top-down, calling `visit` for every
    /// directory before descending into its (possibly pruned) subdirectories.
    fn walk(&self, root: &Path, visit: &mut WalkVisitor<'_>) -> Result<()>;
}

/// The local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

impl LocalFileSource {
    fn walk_dir(&self, dir: &Path, visit: &mut WalkVisitor<'_>) -> Result<()> {
        let mut subdirs = Vec::new();
        let mut files = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type() {
                Ok(ft) if ft.is_dir() => subdirs.push(name),
                Ok(_) => files.push(name),
                // Entries that vanish mid-walk are skipped, not fatal.
                Err(_) => continue,
            }
        }

        // Deterministic traversal order regardless of readdir order.
        subdirs.sort();
        files.sort();

        visit(dir, &mut subdirs, &files)?;

        for sub in subdirs {
            let child: PathBuf = dir.join(sub);
            self.walk_dir(&child, visit)?;
        }
        Ok(())
    }
}

impl FileSource for LocalFileSource {
    fn walk(&self, root: &Path, visit: &mut WalkVisitor<'_>) -> Result<()> {
        self.walk_dir(root, visit)
    }
}
