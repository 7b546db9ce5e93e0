//! Indexed file records and their tags.

use super::entity::TagValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An (entity, value) binding attached to a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Qualified entity id, `domain.name`.
    pub entity_id: String,
    /// Owning domain of the entity.
    pub domain: String,
    pub value: TagValue,
}

/// One indexed file: its path plus the tags assigned by matching entities.
///
/// Identity is the full path. Records are immutable once indexing finishes;
/// `index()` and `load_index()` rebuild them from scratch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Full path, forward-slash separated.
    pub path: String,
    /// Final path component.
    pub filename: String,
    /// Parent directory.
    pub dirname: String,
    /// Local entity name -> tag. When two domains define the same local
    /// name for one file, the later-applied domain wins the key.
    tags: BTreeMap<String, Tag>,
}

impl FileRecord {
    pub fn new(path: &str) -> Self {
        let (dirname, filename) = match path.rfind('/') {
            Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
            None => (String::new(), path.to_string()),
        };
        Self {
            path: path.to_string(),
            filename,
            dirname,
            tags: BTreeMap::new(),
        }
    }

    pub fn add_tag(&mut self, local_name: &str, tag: Tag) {
        self.tags.insert(local_name.to_string(), tag);
    }

    pub fn tags(&self) -> &BTreeMap<String, Tag> {
        &self.tags
    }

    /// Local entity name -> value view.
    pub fn entities(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().map(|(k, t)| (k.as_str(), &t.value))
    }

    pub fn value(&self, local_name: &str) -> Option<&TagValue> {
        self.tags.get(local_name).map(|t| &t.value)
    }

    pub fn has_entity(&self, local_name: &str) -> bool {
        self.tags.contains_key(local_name)
    }

    /// Names of the domains that tagged this file.
    pub fn domains(&self) -> BTreeSet<&str> {
        self.tags.values().map(|t| t.domain.as_str()).collect()
    }
}
