//! Query evaluation: filter predicates and result projections.

use super::entity::Extraction;
use super::error::{LayoutError, Result};
use super::file::FileRecord;
use super::Layout;
use crate::natural::{natural_sort, natural_sort_by_key};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

/// One filter value. Numeric values tolerate zero-padded path
/// representations: filtering `run` by `1` matches a file tagged `"01"`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl FilterValue {
    /// The regex fragment this value matches with. Numbers get a leading
    /// `0*` before any anchoring.
    fn fragment(&self) -> String {
        match self {
            FilterValue::Text(s) => s.clone(),
            FilterValue::Int(n) => format!("0*{}", n),
            FilterValue::Float(x) => format!("0*{}", x),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Text(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Text(s)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Int(n)
    }
}

impl From<f64> for FilterValue {
    fn from(x: f64) -> Self {
        FilterValue::Float(x)
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Text(s) => f.write_str(s),
            FilterValue::Int(n) => write!(f, "{}", n),
            FilterValue::Float(x) => write!(f, "{}", x),
        }
    }
}

/// A filter set over the index.
///
/// Filter keys AND together; a key's value list ORs. A key absent from a
/// file's tags unconditionally excludes the file.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: BTreeMap<String, Vec<FilterValue>>,
    /// Extension allow-list, matched as a suffix regex on the full path.
    pub extensions: Vec<String>,
    /// Domain allow-list; empty means all domains.
    pub domains: Vec<String>,
    /// `true` = regex substring search, `false` = exact (`^...$`) match.
    /// `None` falls back to the layout's instance default.
    pub regex_search: Option<bool>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single-value filter for one entity.
    pub fn filter(mut self, key: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.filters.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Add an any-of filter for one entity.
    pub fn filter_any<V: Into<FilterValue>>(
        mut self,
        key: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.filters
            .entry(key.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.extensions.push(ext.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domains.push(domain.into());
        self
    }

    pub fn regex_search(mut self, regex_search: bool) -> Self {
        self.regex_search = Some(regex_search);
        self
    }
}

/// The shape of a query result.
#[derive(Debug, Clone)]
pub enum Projection {
    /// Natural-sorted list of paths.
    File,
    /// Structured records: path plus all entity/value fields.
    Tuple,
    /// Raw file records.
    Obj,
    /// Sorted distinct values of the target entity.
    Id(String),
    /// Distinct directories resolved through the target entity's directory
    /// template.
    Dir(String),
}

/// One `tuple`-projection record.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    pub path: String,
    /// Entity name -> value, as display strings. Reserved identifiers are
    /// disambiguated with a trailing underscore.
    pub fields: Vec<(String, String)>,
}

/// Query result, shaped by the requested [`Projection`].
#[derive(Debug, Clone)]
pub enum QueryResult {
    Files(Vec<String>),
    Tuples(Vec<QueryRecord>),
    Objects(Vec<FileRecord>),
    Ids(Vec<String>),
    Dirs(Vec<String>),
}

/// Field names that collide with the fixed record fields.
const RESERVED_FIELDS: &[&str] = &["path"];

/// A filter key resolved against the entity table.
enum ResolvedKey {
    /// Match the tag stored under this local name.
    Local(String),
    /// Match only tags produced by this exact entity.
    Qualified(String),
}

struct CompiledFilter {
    key: ResolvedKey,
    patterns: Vec<Regex>,
}

fn dir_placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{(\w+)\}").unwrap())
}

impl Layout {
    /// Evaluate `query` and project the result.
    pub fn get(&self, query: &Query, projection: Projection) -> Result<QueryResult> {
        let matched = self.get_objects(query)?;

        match projection {
            Projection::File => {
                let mut paths: Vec<String> =
                    matched.iter().map(|f| f.path.clone()).collect();
                natural_sort(&mut paths);
                Ok(QueryResult::Files(paths))
            }
            Projection::Tuple => {
                let mut records: Vec<QueryRecord> =
                    matched.iter().map(|f| as_record(f)).collect();
                natural_sort_by_key(&mut records, |r| r.path.as_str());
                Ok(QueryResult::Tuples(records))
            }
            Projection::Obj => Ok(QueryResult::Objects(
                matched.into_iter().cloned().collect(),
            )),
            Projection::Id(target) => {
                let entity = self.resolve_entity(&target)?;
                let qid = entity.qualified_id();
                let local = entity.name.clone();
                let values: BTreeSet<String> = matched
                    .iter()
                    .filter_map(|f| {
                        f.tags()
                            .get(&local)
                            .filter(|t| t.entity_id == qid)
                            .map(|t| t.value.to_string())
                    })
                    .collect();
                let mut values: Vec<String> = values.into_iter().collect();
                natural_sort(&mut values);
                Ok(QueryResult::Ids(values))
            }
            Projection::Dir(target) => {
                let dirs = self.resolve_directories(&target)?;
                Ok(QueryResult::Dirs(dirs))
            }
        }
    }

    /// Evaluate `query` and return matching file records, unsorted.
    pub fn get_objects(&self, query: &Query) -> Result<Vec<&FileRecord>> {
        let regex_search = query
            .regex_search
            .unwrap_or_else(|| self.default_regex_search());
        let filters = self.compile_filters(query, regex_search)?;

        let extension_re = if query.extensions.is_empty() {
            None
        } else {
            let pattern = format!("({})$", query.extensions.join("|"));
            Some(
                Regex::new(&pattern)
                    .map_err(|e| LayoutError::Pattern(format!("{}: {}", pattern, e)))?,
            )
        };

        let mut matched = Vec::new();
        'files: for file in self.files() {
            if let Some(re) = &extension_re {
                if !re.is_match(&file.path) {
                    continue;
                }
            }
            if !query.domains.is_empty() {
                let file_domains = file.domains();
                if !query.domains.iter().any(|d| file_domains.contains(d.as_str())) {
                    continue;
                }
            }
            for filter in &filters {
                let value = match &filter.key {
                    ResolvedKey::Local(name) => file.value(name),
                    ResolvedKey::Qualified(qid) => file
                        .tags()
                        .values()
                        .find(|t| &t.entity_id == qid)
                        .map(|t| &t.value),
                };
                let Some(value) = value else { continue 'files };
                let text = value.to_string();
                if !filter.patterns.iter().any(|re| re.is_match(&text)) {
                    continue 'files;
                }
            }
            matched.push(file);
        }
        Ok(matched)
    }

    fn compile_filters(&self, query: &Query, regex_search: bool) -> Result<Vec<CompiledFilter>> {
        let mut compiled = Vec::with_capacity(query.filters.len());
        for (key, values) in &query.filters {
            // Aliases and qualified ids pin the filter to one entity; plain
            // names match whatever tag holds that local name.
            let resolved = if let Ok(entity) = self.resolve_entity(key) {
                if key.contains('.') || self.is_alias(key) {
                    ResolvedKey::Qualified(entity.qualified_id())
                } else {
                    ResolvedKey::Local(key.clone())
                }
            } else {
                ResolvedKey::Local(key.clone())
            };

            let mut patterns = Vec::with_capacity(values.len());
            for value in values {
                let fragment = value.fragment();
                let pattern = if regex_search {
                    fragment
                } else {
                    format!("^{}$", fragment)
                };
                patterns.push(
                    Regex::new(&pattern)
                        .map_err(|e| LayoutError::Pattern(format!("{}: {}", pattern, e)))?,
                );
            }
            compiled.push(CompiledFilter {
                key: resolved,
                patterns,
            });
        }
        Ok(compiled)
    }

    /// Expand the target entity's directory template into a regex (every
    /// `{entity}` placeholder becomes that entity's raw pattern) and return
    /// the distinct directories of indexed files matching it.
    fn resolve_directories(&self, target: &str) -> Result<Vec<String>> {
        let entity = self.resolve_entity(target)?;
        let template = entity
            .directory
            .clone()
            .ok_or_else(|| LayoutError::MissingDirectoryTemplate(entity.qualified_id()))?;
        let domain = entity.domain.clone();

        let mut pattern = String::new();
        let mut last = 0;
        for caps in dir_placeholder_re().captures_iter(&template) {
            let whole = caps.get(0).unwrap();
            pattern.push_str(&template[last..whole.start()]);
            let referenced = self.resolve_entity_in(&caps[1], &domain)?;
            match &referenced.extraction {
                Extraction::Pattern(re) => pattern.push_str(re.as_str()),
                Extraction::Mapper { .. } => {
                    return Err(LayoutError::Config(format!(
                        "directory template references mapper-backed entity '{}', which has no pattern",
                        referenced.qualified_id()
                    )))
                }
            }
            last = whole.end();
        }
        pattern.push_str(&template[last..]);
        // No further path separators after the matched portion.
        pattern.push_str("[^/]*$");

        let re = Regex::new(&pattern)
            .map_err(|e| LayoutError::Pattern(format!("{}: {}", pattern, e)))?;
        let dirs: BTreeSet<String> = self
            .files()
            .filter(|f| re.is_match(&f.dirname))
            .map(|f| f.dirname.clone())
            .collect();
        let mut dirs: Vec<String> = dirs.into_iter().collect();
        natural_sort(&mut dirs);
        Ok(dirs)
    }

    fn is_alias(&self, name: &str) -> bool {
        self.resolve_entity(name)
            .map(|e| e.name != name && e.qualified_id() != name)
            .unwrap_or(false)
    }
}

fn as_record(file: &FileRecord) -> QueryRecord {
    let fields = file
        .entities()
        .map(|(name, value)| {
            let field = if RESERVED_FIELDS.contains(&name) {
                let renamed = format!("{}_", name);
                warn!(
                    entity = %name,
                    field = %renamed,
                    path = %file.path,
                    "Entity name collides with a reserved record field; renamed"
                );
                renamed
            } else {
                name.to_string()
            };
            (field, value.to_string())
        })
        .collect();
    QueryRecord {
        path: file.path.clone(),
        fields,
    }
}
