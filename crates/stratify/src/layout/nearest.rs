//! Nearest-file resolution: upward directory-tree search for the best
//! entity-matching sibling files.

use super::error::Result;
use super::file::FileRecord;
use super::query::Query;
use super::Layout;
use crate::natural::natural_cmp;
use std::collections::BTreeMap;

/// Options for [`Layout::get_nearest`].
#[derive(Debug, Clone)]
pub struct NearestOptions {
    /// Target query; candidates must satisfy it.
    pub query: Query,
    /// Strict mode (default): a candidate is eligible only when every entity
    /// it shares with the starting path agrees in value.
    pub strict: bool,
    /// Entities excluded from strict agreement checking (e.g. ignore `type`
    /// to find the `.tsv` sibling of a `.nii.gz` file).
    pub ignore_strict_entities: Vec<String>,
    /// Collect one winning match per directory level up to the root instead
    /// of stopping at the first level with a match.
    pub all: bool,
}

impl Default for NearestOptions {
    fn default() -> Self {
        Self {
            query: Query::new(),
            strict: true,
            ignore_strict_entities: Vec::new(),
            all: false,
        }
    }
}

impl NearestOptions {
    pub fn new(query: Query) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }
}

impl Layout {
    /// Walk upward from `path` through its ancestor directories and return
    /// the nearest file(s) satisfying the target query, ranked by how many
    /// entity values they share with the values parsed from `path`.
    ///
    /// Reaching the filesystem root without a match is a soft outcome: the
    /// returned list is empty.
    pub fn get_nearest(&self, path: &str, options: &NearestOptions) -> Result<Vec<String>> {
        // Entity values carried by the starting path itself.
        let mut path_entities: BTreeMap<String, String> = self
            .parse_entities(path)
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect();
        if options.strict {
            for name in &options.ignore_strict_entities {
                path_entities.remove(name);
            }
        }

        // Candidates grouped by residing directory.
        let candidates = self.get_objects(&options.query)?;
        let mut folders: BTreeMap<&str, Vec<&FileRecord>> = BTreeMap::new();
        for file in candidates {
            folders.entry(file.dirname.as_str()).or_default().push(file);
        }

        let count_matches = |file: &FileRecord| -> (usize, usize) {
            let mut shared = 0;
            let mut agree = 0;
            for (name, value) in &path_entities {
                if let Some(tag_value) = file.value(name) {
                    shared += 1;
                    if &tag_value.to_string() == value {
                        agree += 1;
                    }
                }
            }
            (shared, agree)
        };

        let mut matches = Vec::new();
        let mut current = path;
        loop {
            if let Some(files) = folders.get(current) {
                let mut ranked: Vec<(&FileRecord, usize, usize)> = files
                    .iter()
                    .map(|f| {
                        let (shared, agree) = count_matches(f);
                        (*f, shared, agree)
                    })
                    .collect();
                if options.strict {
                    ranked.retain(|(_, shared, agree)| shared == agree);
                }
                // Best agreement first; natural path order breaks ties.
                ranked.sort_by(|a, b| {
                    b.2.cmp(&a.2).then_with(|| natural_cmp(&a.0.path, &b.0.path))
                });

                if let Some((winner, _, _)) = ranked.first() {
                    matches.push(winner.path.clone());
                    if !options.all {
                        break;
                    }
                }
            }
            match parent_dir(current) {
                Some(parent) if parent != current => current = parent,
                _ => break,
            }
        }
        Ok(matches)
    }
}

fn parent_dir(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return Some("/");
    }
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}
