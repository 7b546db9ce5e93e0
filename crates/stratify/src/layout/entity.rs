//! Entities: named, pattern-extracted attributes of files.
//!
//! An entity owns its extraction rule (a regex with exactly one capture
//! group, or a named function resolved against an [`EntityMapper`]), an
//! optional value type, an optional directory template, and its half of the
//! bipartite entity/file relation (`path -> value`).

use super::error::{LayoutError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Declared value type of an entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    /// Raw string, no coercion.
    #[default]
    Str,
    Int,
    Float,
    Bool,
}

impl Dtype {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "str" | "string" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

/// A tag value after optional dtype coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Str(s) => f.write_str(s),
            TagValue::Int(n) => write!(f, "{}", n),
            TagValue::Float(x) => write!(f, "{}", x),
            TagValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// Custom extraction capability.
///
/// Registered explicitly when building a layout; entities whose config names
/// a `map_func` are resolved against it at registration time. Resolution
/// failure is a configuration error, never a match-time error.
pub trait EntityMapper: Send + Sync {
    /// Whether this mapper provides the named extraction function.
    fn supports(&self, func: &str) -> bool;

    /// Run the named extraction function against a file path. `None` means
    /// the entity does not apply to the file.
    fn extract(&self, func: &str, path: &Path) -> Option<String>;
}

/// How an entity extracts its value from a path.
#[derive(Clone)]
pub enum Extraction {
    /// Regex search; capture group 1 is the value.
    Pattern(Regex),
    /// Named function on a registered mapper.
    Mapper {
        func: String,
        mapper: Arc<dyn EntityMapper>,
    },
}

impl fmt::Debug for Extraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extraction::Pattern(re) => f.debug_tuple("Pattern").field(&re.as_str()).finish(),
            Extraction::Mapper { func, .. } => f.debug_tuple("Mapper").field(func).finish(),
        }
    }
}

/// A named entity scoped to a domain.
#[derive(Debug, Clone)]
pub struct Entity {
    /// Local name, e.g. `subject`.
    pub name: String,
    /// Owning domain name.
    pub domain: String,
    pub extraction: Extraction,
    /// Files indexed under a domain must match all of its mandatory entities.
    pub mandatory: bool,
    /// Optional directory template used by the `dir` projection.
    pub directory: Option<String>,
    pub dtype: Dtype,
    pub aliases: Vec<String>,
    /// path -> extracted value, for every indexed file that matched.
    files: HashMap<String, TagValue>,
}

impl Entity {
    /// Create an entity with a regex extraction rule.
    ///
    /// The pattern must contain exactly one capture group; the first group's
    /// value is the extracted value.
    pub fn from_pattern(domain: &str, name: &str, pattern: &str) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| LayoutError::Pattern(format!("{}: {}", pattern, e)))?;
        // captures_len() counts the implicit whole-match group.
        if regex.captures_len() != 2 {
            return Err(LayoutError::Config(format!(
                "pattern for entity '{}' must contain exactly one capture group, found {}: {}",
                name,
                regex.captures_len() - 1,
                pattern
            )));
        }
        Ok(Self {
            name: name.to_string(),
            domain: domain.to_string(),
            extraction: Extraction::Pattern(regex),
            mandatory: false,
            directory: None,
            dtype: Dtype::Str,
            aliases: Vec::new(),
            files: HashMap::new(),
        })
    }

    /// Create an entity backed by a named mapper function.
    pub fn from_mapper(
        domain: &str,
        name: &str,
        func: &str,
        mapper: Arc<dyn EntityMapper>,
    ) -> Result<Self> {
        if !mapper.supports(func) {
            return Err(LayoutError::Config(format!(
                "mapping function '{}' declared for entity '{}' is not provided by the registered entity mapper",
                func, name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            domain: domain.to_string(),
            extraction: Extraction::Mapper {
                func: func.to_string(),
                mapper,
            },
            mandatory: false,
            directory: None,
            dtype: Dtype::Str,
            aliases: Vec::new(),
            files: HashMap::new(),
        })
    }

    /// Globally unique id: `domain.name`.
    pub fn qualified_id(&self) -> String {
        format!("{}.{}", self.domain, self.name)
    }

    /// The raw regex pattern, if this entity uses one.
    pub fn pattern(&self) -> Option<&str> {
        match &self.extraction {
            Extraction::Pattern(re) => Some(re.as_str()),
            Extraction::Mapper { .. } => None,
        }
    }

    /// Extract this entity's value from a path, without touching the index.
    ///
    /// A non-matching path is a soft outcome (`Ok(None)`); only dtype
    /// coercion failures are errors.
    pub fn extract(&self, path: &str) -> Result<Option<TagValue>> {
        let raw = match &self.extraction {
            Extraction::Pattern(re) => re
                .captures(path)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string()),
            Extraction::Mapper { func, mapper } => mapper.extract(func, Path::new(path)),
        };
        match raw {
            Some(raw) => Ok(Some(self.coerce(&raw)?)),
            None => Ok(None),
        }
    }

    /// Coerce a raw string value to the declared dtype.
    pub fn coerce(&self, raw: &str) -> Result<TagValue> {
        let fail = |dtype: &'static str| LayoutError::Coercion {
            entity: self.qualified_id(),
            value: raw.to_string(),
            dtype,
        };
        match self.dtype {
            Dtype::Str => Ok(TagValue::Str(raw.to_string())),
            Dtype::Int => raw
                .parse::<i64>()
                .map(TagValue::Int)
                .map_err(|_| fail("int")),
            Dtype::Float => raw
                .parse::<f64>()
                .map(TagValue::Float)
                .map_err(|_| fail("float")),
            Dtype::Bool => match raw.to_lowercase().as_str() {
                "true" | "1" => Ok(TagValue::Bool(true)),
                "false" | "0" => Ok(TagValue::Bool(false)),
                _ => Err(fail("bool")),
            },
        }
    }

    /// Record that `path` carries `value` for this entity.
    pub fn add_file(&mut self, path: &str, value: TagValue) {
        self.files.insert(path.to_string(), value);
    }

    /// Drop all file associations. Called on every index rebuild.
    pub fn reset(&mut self) {
        self.files.clear();
    }

    /// Absorb another entity's file associations; incoming values win.
    /// Used when merging per-root partial indexes.
    pub(crate) fn absorb(&mut self, other: Entity) {
        self.files.extend(other.files);
    }

    /// All distinct values this entity has matched.
    pub fn unique(&self) -> Vec<String> {
        let set: BTreeSet<String> = self.files.values().map(|v| v.to_string()).collect();
        set.into_iter().collect()
    }

    /// Count distinct values, or matched files when `by_files` is true.
    pub fn count(&self, by_files: bool) -> usize {
        if by_files {
            self.files.len()
        } else {
            self.unique().len()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_extracts_first_group() {
        let ent = Entity::from_pattern("main", "subject", r"sub-([a-zA-Z0-9]+)").unwrap();
        let val = ent.extract("/data/sub-01/run-2.txt").unwrap().unwrap();
        assert_eq!(val, TagValue::Str("01".to_string()));
    }

    #[test]
    fn no_match_is_not_an_error() {
        let ent = Entity::from_pattern("main", "subject", r"sub-([0-9]+)").unwrap();
        assert!(ent.extract("/data/other.txt").unwrap().is_none());
    }

    #[test]
    fn pattern_without_group_is_rejected() {
        let err = Entity::from_pattern("main", "subject", r"sub-[0-9]+").unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
    }

    #[test]
    fn pattern_with_two_groups_is_rejected() {
        assert!(Entity::from_pattern("main", "x", r"(a)-(b)").is_err());
    }

    #[test]
    fn dtype_coercion() {
        let mut ent = Entity::from_pattern("main", "run", r"run-([0-9]+)").unwrap();
        ent.dtype = Dtype::Int;
        let val = ent.extract("/data/run-07.txt").unwrap().unwrap();
        assert_eq!(val, TagValue::Int(7));
    }

    #[test]
    fn coercion_failure_propagates() {
        let mut ent = Entity::from_pattern("main", "run", r"run-(\w+)").unwrap();
        ent.dtype = Dtype::Int;
        assert!(matches!(
            ent.extract("/data/run-abc.txt"),
            Err(LayoutError::Coercion { .. })
        ));
    }

    #[test]
    fn unique_and_count() {
        let mut ent = Entity::from_pattern("main", "subject", r"sub-([0-9]+)").unwrap();
        ent.add_file("/a/sub-01/f1.txt", TagValue::Str("01".into()));
        ent.add_file("/a/sub-01/f2.txt", TagValue::Str("01".into()));
        ent.add_file("/a/sub-02/f3.txt", TagValue::Str("02".into()));
        assert_eq!(ent.unique(), vec!["01".to_string(), "02".to_string()]);
        assert_eq!(ent.count(false), 2);
        assert_eq!(ent.count(true), 3);
    }

    struct UpperMapper;
    impl EntityMapper for UpperMapper {
        fn supports(&self, func: &str) -> bool {
            func == "extract_stem"
        }
        fn extract(&self, _func: &str, path: &Path) -> Option<String> {
            path.file_stem().map(|s| s.to_string_lossy().to_uppercase())
        }
    }

    #[test]
    fn mapper_extraction() {
        let ent =
            Entity::from_mapper("main", "stem", "extract_stem", Arc::new(UpperMapper)).unwrap();
        let val = ent.extract("/data/bold.nii").unwrap().unwrap();
        assert_eq!(val, TagValue::Str("BOLD".to_string()));
    }

    #[test]
    fn unresolvable_mapper_func_is_config_error() {
        let err = Entity::from_mapper("main", "x", "missing_func", Arc::new(UpperMapper))
            .unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
    }
}
