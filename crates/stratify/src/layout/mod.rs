//! Layout - file-tree indexing and querying
//!
//! A [`Layout`] owns the full set of indexed files, entities and domains for
//! one or more root directories. Construction loads domain configs, then
//! `index()` walks the tree and tags every file whose path matches the
//! registered entities.

pub mod config;
pub mod domain;
pub mod entity;
pub mod error;
pub mod file;
pub mod nearest;
pub mod query;
pub mod source;

use self::config::DomainConfig;
use self::domain::Domain;
use self::entity::{Entity, EntityMapper, TagValue};
use self::error::{LayoutError, Result};
use self::file::{FileRecord, Tag};
use self::source::{FileSource, LocalFileSource};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default filename that triggers directory-scoped domain discovery.
pub const DEFAULT_CONFIG_FILENAME: &str = "layout.json";

/// Normalize a path to forward slashes for platform-independent keys.
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn parent_of(path: &str) -> Option<&str> {
    path.rfind('/').map(|idx| &path[..idx.max(1)])
}

/// Builder for [`Layout`].
///
/// With multiple roots, `build()` constructs one partial index per root and
/// merges them; on key collision (file path, entity id, domain name) the
/// later root wins.
pub struct LayoutBuilder {
    roots: Vec<String>,
    configs: Vec<DomainConfig>,
    config_filename: String,
    regex_search: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    mapper: Option<Arc<dyn EntityMapper>>,
    source: Arc<dyn FileSource>,
}

impl LayoutBuilder {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            roots: vec![root.into()],
            configs: Vec::new(),
            config_filename: DEFAULT_CONFIG_FILENAME.to_string(),
            regex_search: false,
            include: Vec::new(),
            exclude: Vec::new(),
            mapper: None,
            source: Arc::new(LocalFileSource),
        }
    }

    /// Add another root; partial indexes merge with last-wins precedence.
    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.roots.push(root.into());
        self
    }

    /// Register a construction-time domain config.
    pub fn config(mut self, config: DomainConfig) -> Self {
        self.configs.push(config);
        self
    }

    /// Load and register a domain config from a JSON file.
    pub fn config_file(self, path: impl AsRef<Path>) -> Result<Self> {
        let config = DomainConfig::from_file(path.as_ref())?;
        Ok(self.config(config))
    }

    /// Filename that triggers domain discovery during the walk.
    pub fn config_filename(mut self, name: impl Into<String>) -> Self {
        self.config_filename = name.into();
        self
    }

    /// Instance default for the query matching mode: `true` for regex
    /// search, `false` (default) for exact matching.
    pub fn regex_search(mut self, regex_search: bool) -> Self {
        self.regex_search = regex_search;
        self
    }

    /// Layout-global include rules, applied to every directory and file in
    /// addition to per-domain rules. Mutually exclusive with `exclude`.
    pub fn include(mut self, patterns: Vec<String>) -> Self {
        self.include = patterns;
        self
    }

    /// Layout-global exclude rules. Mutually exclusive with `include`.
    pub fn exclude(mut self, patterns: Vec<String>) -> Self {
        self.exclude = patterns;
        self
    }

    /// Register the entity-mapper capability for `map_func` entities.
    pub fn mapper(mut self, mapper: Arc<dyn EntityMapper>) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Substitute the file-listing backend (defaults to the local
    /// filesystem).
    pub fn source(mut self, source: Arc<dyn FileSource>) -> Self {
        self.source = source;
        self
    }

    /// Build the layout and run a full index pass.
    pub fn build(self) -> Result<Layout> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(LayoutError::Config(
                "layout-global include and exclude rules are mutually exclusive".to_string(),
            ));
        }

        let roots: Vec<String> = self
            .roots
            .iter()
            .map(|r| {
                let p = Path::new(r);
                let abs = fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
                normalize_path(&abs)
            })
            .collect();

        if roots.len() == 1 {
            let mut layout = Layout::empty(
                roots[0].clone(),
                self.config_filename,
                self.regex_search,
                self.include,
                self.exclude,
                self.mapper,
                self.source,
            )?;
            for config in &self.configs {
                layout.register_domain(config, None)?;
            }
            layout.index()?;
            return Ok(layout);
        }

        // Explicit multi-root factory: one partial index per root, merged
        // with last-wins precedence.
        let mut merged: Option<Layout> = None;
        for root in &roots {
            let mut partial = Layout::empty(
                root.clone(),
                self.config_filename.clone(),
                self.regex_search,
                self.include.clone(),
                self.exclude.clone(),
                self.mapper.clone(),
                self.source.clone(),
            )?;
            for config in &self.configs {
                partial.register_domain(config, None)?;
            }
            partial.index()?;
            merged = Some(match merged {
                None => partial,
                Some(mut acc) => {
                    acc.merge_from(partial);
                    acc
                }
            });
        }
        Ok(merged.expect("at least one root"))
    }
}

/// Serialized form of one indexed file.
#[derive(Debug, Serialize, Deserialize)]
struct IndexEntry {
    domains: Vec<String>,
    entities: BTreeMap<String, TagValue>,
}

/// The top-level index aggregate.
pub struct Layout {
    /// Primary root(s) of this layout.
    pub roots: Vec<String>,
    config_filename: String,
    regex_search: bool,
    include: Vec<regex::Regex>,
    exclude: Vec<regex::Regex>,
    mapper: Option<Arc<dyn EntityMapper>>,
    source: Arc<dyn FileSource>,
    /// Registration order matters: entities apply in domain order.
    domains: Vec<Domain>,
    /// Qualified id -> entity.
    entities: BTreeMap<String, Entity>,
    /// Alias -> qualified id.
    aliases: BTreeMap<String, String>,
    /// Path -> record.
    files: BTreeMap<String, FileRecord>,
    /// Config file path -> domain name, for domains discovered mid-walk.
    discovered: BTreeMap<String, String>,
}

// The mapper and source trait objects carry no useful Debug surface.
impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("roots", &self.roots)
            .field("config_filename", &self.config_filename)
            .field("regex_search", &self.regex_search)
            .field("domains", &self.domain_names())
            .field("entities", &self.entities.keys().collect::<Vec<_>>())
            .field("files", &self.files.len())
            .finish_non_exhaustive()
    }
}

impl Layout {
    /// Start building a layout rooted at `root`.
    pub fn builder(root: impl Into<String>) -> LayoutBuilder {
        LayoutBuilder::new(root)
    }

    /// Start building a layout over several roots. Each root is indexed
    /// separately and merged; later roots win on collisions.
    pub fn from_roots<I, S>(roots: I) -> Result<LayoutBuilder>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = roots.into_iter();
        let first = iter.next().ok_or_else(|| {
            LayoutError::Config("at least one root is required".to_string())
        })?;
        let mut builder = LayoutBuilder::new(first);
        for root in iter {
            builder = builder.root(root);
        }
        Ok(builder)
    }

    #[allow(clippy::too_many_arguments)]
    fn empty(
        root: String,
        config_filename: String,
        regex_search: bool,
        include: Vec<String>,
        exclude: Vec<String>,
        mapper: Option<Arc<dyn EntityMapper>>,
        source: Arc<dyn FileSource>,
    ) -> Result<Self> {
        let compile = |patterns: Vec<String>| -> Result<Vec<regex::Regex>> {
            patterns
                .iter()
                .map(|p| {
                    regex::Regex::new(p)
                        .map_err(|e| LayoutError::Pattern(format!("{}: {}", p, e)))
                })
                .collect()
        };
        Ok(Self {
            roots: vec![root],
            config_filename,
            regex_search,
            include: compile(include)?,
            exclude: compile(exclude)?,
            mapper,
            source,
            domains: Vec::new(),
            entities: BTreeMap::new(),
            aliases: BTreeMap::new(),
            files: BTreeMap::new(),
            discovered: BTreeMap::new(),
        })
    }

    // ------------------------------------------------------------------
    // Domain and entity registration
    // ------------------------------------------------------------------

    /// Register a domain. `discovered_at` carries the config file path when
    /// the domain was found mid-walk; its directory becomes the root base.
    ///
    /// Validation happens before any mutation, so a failed registration
    /// leaves no partial domain behind.
    fn register_domain(
        &mut self,
        config: &DomainConfig,
        discovered_at: Option<&str>,
    ) -> Result<()> {
        if self.domains.iter().any(|d| d.name == config.name) {
            return Err(LayoutError::DuplicateDomain(config.name.clone()));
        }

        let base = match discovered_at {
            Some(config_path) => parent_of(config_path)
                .unwrap_or(&self.roots[0])
                .to_string(),
            None => self.roots[0].clone(),
        };
        let mut domain = Domain::from_config(config, &base)?;

        // Build every entity before committing any of them.
        let mut staged: Vec<Entity> = Vec::new();
        for ent_cfg in &config.entities {
            let mut entity = match (&ent_cfg.pattern, &ent_cfg.map_func) {
                (Some(pattern), None) => {
                    Entity::from_pattern(&config.name, &ent_cfg.name, pattern)?
                }
                (None, Some(func)) => {
                    let mapper = self.mapper.clone().ok_or_else(|| {
                        LayoutError::Config(format!(
                            "entity '{}' declares mapping function '{}' but no entity mapper is registered",
                            ent_cfg.name, func
                        ))
                    })?;
                    Entity::from_mapper(&config.name, &ent_cfg.name, func, mapper)?
                }
                // validate() already rejected the other combinations
                _ => unreachable!("config validated"),
            };
            entity.mandatory = ent_cfg.mandatory;
            entity.dtype = ent_cfg.dtype()?;
            entity.aliases = ent_cfg.aliases.clone();
            entity.directory = ent_cfg
                .directory
                .as_ref()
                .map(|t| t.replace("{{root}}", &domain.roots[0]));

            let qid = entity.qualified_id();
            if self.entities.contains_key(&qid) || staged.iter().any(|e| e.qualified_id() == qid)
            {
                return Err(LayoutError::Config(format!(
                    "entity id '{}' is already registered",
                    qid
                )));
            }
            for alias in &entity.aliases {
                if self.entities.contains_key(alias) || self.aliases.contains_key(alias) {
                    return Err(LayoutError::Config(format!(
                        "alias '{}' collides with an existing entity id or alias",
                        alias
                    )));
                }
            }
            staged.push(entity);
        }

        for entity in staged {
            if entity.mandatory {
                domain.mandatory.insert(entity.name.clone());
            }
            let qid = entity.qualified_id();
            domain.entity_ids.push(qid.clone());
            for alias in &entity.aliases {
                self.aliases.insert(alias.clone(), qid.clone());
            }
            self.entities.insert(qid, entity);
        }

        if let Some(config_path) = discovered_at {
            self.discovered
                .insert(config_path.to_string(), config.name.clone());
        }
        self.domains.push(domain);
        Ok(())
    }

    /// Load a directory-scoped config found during a walk. Re-discovering a
    /// config file already registered in a previous `index()` pass is a
    /// no-op; a fresh config reusing an existing domain name is fatal.
    fn register_discovered(&mut self, config_path: &str) -> Result<()> {
        if self.discovered.contains_key(config_path) {
            return Ok(());
        }
        let config = DomainConfig::from_file(Path::new(config_path))?;
        info!(domain = %config.name, path = %config_path, "Discovered directory-scoped domain config");
        self.register_domain(&config, Some(config_path))
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    fn reset_index(&mut self) {
        self.files.clear();
        for ent in self.entities.values_mut() {
            ent.reset();
        }
    }

    fn passes_global_filters(&self, path: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|re| re.is_match(path));
        }
        !self.exclude.iter().any(|re| re.is_match(path))
    }

    /// Names of the domains whose roots cover `path`, with directory-config
    /// restrictions applied.
    fn covering_domains(&self, path: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .domains
            .iter()
            .filter(|d| d.covers(path))
            .map(|d| d.name.clone())
            .collect();
        for d in &self.domains {
            if let Some(allowed) = &d.restrict {
                if d.covers(path) {
                    names.retain(|n| n == &d.name || allowed.contains(n));
                }
            }
        }
        names
    }

    /// Fully rebuild the index from the file tree. Idempotent: derived state
    /// is reset first, so two consecutive calls produce identical mappings.
    pub fn index(&mut self) -> Result<()> {
        self.reset_index();

        // Each construction-time domain walks its own roots; discovered
        // domains apply within the walk that found them.
        let walk_specs: Vec<(String, String)> = self
            .domains
            .iter()
            .filter(|d| !self.discovered.values().any(|n| n == &d.name))
            .flat_map(|d| d.roots.iter().map(move |r| (d.name.clone(), r.clone())))
            .collect();

        let source = self.source.clone();
        let mut indexed = 0usize;
        let mut visited_dirs = 0usize;

        for (domain_name, root) in walk_specs {
            let root_path = PathBuf::from(&root);
            source.walk(&root_path, &mut |dir, subdirs, files| {
                visited_dirs += 1;
                let dir_str = normalize_path(dir);

                // Directory-scoped config discovery happens before this
                // directory's files are indexed, so its entities apply to
                // everything discovered from here on.
                if files.iter().any(|f| f == &self.config_filename) {
                    let config_path = format!("{}/{}", dir_str, self.config_filename);
                    self.register_discovered(&config_path)?;
                }

                // Prune excluded subtrees before descending. Only the
                // walking domain's own rules prune here; other domains
                // sharing the tree filter per file at tagging time.
                let walking = self.domains.iter().find(|d| d.name == domain_name);
                subdirs.retain(|sub| {
                    let full = format!("{}/{}", dir_str, sub);
                    if !self.passes_global_filters(&full) {
                        debug!(dir = %full, "Pruned by global filter rules");
                        return false;
                    }
                    let keep = walking
                        .map_or(true, |d| !d.has_filters() || d.passes_filters(&full));
                    if !keep {
                        debug!(dir = %full, "Pruned by domain filter rules");
                    }
                    keep
                });

                for name in files {
                    if name == &self.config_filename {
                        continue;
                    }
                    let path = format!("{}/{}", dir_str, name);
                    if !self.passes_global_filters(&path) {
                        continue;
                    }
                    if self.index_file(&path)? {
                        indexed += 1;
                    }
                }
                Ok(())
            })?;
        }

        info!(
            files = self.files.len(),
            tagged = indexed,
            dirs = visited_dirs,
            domains = self.domains.len(),
            "Index pass complete"
        );
        Ok(())
    }

    /// Apply every covering domain's entities to one file and retain it if
    /// the mandatory-set rule is satisfied. Returns whether the file was
    /// kept. Per-file extraction failures are absorbed, never fatal.
    pub(crate) fn index_file(&mut self, path: &str) -> Result<bool> {
        let covering = self.covering_domains(path);

        // (local name, tag) pairs in domain registration order.
        let mut pending: Vec<(String, Tag)> = Vec::new();
        for domain in &self.domains {
            if !covering.contains(&domain.name) {
                continue;
            }
            if domain.has_filters() && !domain.passes_filters(path) {
                continue;
            }
            for qid in &domain.entity_ids {
                let entity = &self.entities[qid];
                match entity.extract(path) {
                    Ok(Some(value)) => pending.push((
                        entity.name.clone(),
                        Tag {
                            entity_id: qid.clone(),
                            domain: domain.name.clone(),
                            value,
                        },
                    )),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(path = %path, entity = %qid, error = %e, "Entity extraction failed; skipping");
                    }
                }
            }
        }

        if pending.is_empty() {
            return Ok(false);
        }

        let existing = self.files.remove(path);
        let already_retained = existing.is_some();
        let mut record = existing.unwrap_or_else(|| FileRecord::new(path));
        for (local, tag) in &pending {
            record.add_tag(local, tag.clone());
        }

        // Keep the file only if at least one tagging domain's mandatory set
        // is fully satisfied. A record retained by an earlier walk stays.
        let tagging: BTreeSet<String> =
            record.domains().into_iter().map(String::from).collect();
        let satisfied = self
            .domains
            .iter()
            .filter(|d| tagging.contains(&d.name))
            .any(|d| d.mandatory.iter().all(|m| record.has_entity(m)));
        if !satisfied && !already_retained {
            return Ok(false);
        }

        for (_, tag) in &pending {
            if let Some(entity) = self.entities.get_mut(&tag.entity_id) {
                entity.add_file(path, tag.value.clone());
            }
        }
        self.files.insert(path.to_string(), record);
        Ok(true)
    }

    /// Parse entity values out of an arbitrary path without touching the
    /// index. Mapper-backed entities participate; extraction failures are
    /// soft.
    pub fn parse_entities(&self, path: &str) -> BTreeMap<String, TagValue> {
        let mut out = BTreeMap::new();
        for domain in &self.domains {
            for qid in &domain.entity_ids {
                let entity = &self.entities[qid];
                if let Ok(Some(value)) = entity.extract(path) {
                    out.insert(entity.name.clone(), value);
                }
            }
        }
        out
    }

    /// Merge another layout into this one. Later (incoming) values win on
    /// file-path and entity-id collisions; domains with known names are
    /// replaced.
    fn merge_from(&mut self, other: Layout) {
        for root in other.roots {
            if !self.roots.contains(&root) {
                self.roots.push(root);
            }
        }
        for domain in other.domains {
            self.domains.retain(|d| d.name != domain.name);
            self.domains.push(domain);
        }
        for (qid, entity) in other.entities {
            match self.entities.entry(qid) {
                std::collections::btree_map::Entry::Occupied(mut e) => e.get_mut().absorb(entity),
                std::collections::btree_map::Entry::Vacant(v) => {
                    v.insert(entity);
                }
            }
        }
        self.aliases.extend(other.aliases);
        self.files.extend(other.files);
        self.discovered.extend(other.discovered);
    }

    // ------------------------------------------------------------------
    // Entity lookup
    // ------------------------------------------------------------------

    /// Resolve an entity by qualified id, alias, or unqualified local name.
    /// An unqualified name matching entities in several domains is an error;
    /// the caller must qualify.
    pub fn resolve_entity(&self, name: &str) -> Result<&Entity> {
        if let Some(ent) = self.entities.get(name) {
            return Ok(ent);
        }
        if let Some(qid) = self.aliases.get(name) {
            return Ok(&self.entities[qid]);
        }
        let matches: Vec<&Entity> = self
            .entities
            .values()
            .filter(|e| e.name == name)
            .collect();
        match matches.len() {
            0 => Err(LayoutError::UnknownEntity(name.to_string())),
            1 => Ok(matches[0]),
            _ => Err(LayoutError::AmbiguousEntity {
                name: name.to_string(),
                candidates: matches
                    .iter()
                    .map(|e| e.qualified_id())
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Resolve an entity preferring `domain` when an unqualified name is
    /// ambiguous.
    pub(crate) fn resolve_entity_in(&self, name: &str, domain: &str) -> Result<&Entity> {
        let qualified = format!("{}.{}", domain, name);
        if let Some(ent) = self.entities.get(&qualified) {
            return Ok(ent);
        }
        self.resolve_entity(name)
    }

    /// Distinct values for the named entity.
    pub fn unique(&self, entity: &str) -> Result<Vec<String>> {
        Ok(self.resolve_entity(entity)?.unique())
    }

    /// Count of distinct values, or matched files when `by_files` is true.
    pub fn count(&self, entity: &str, by_files: bool) -> Result<usize> {
        Ok(self.resolve_entity(entity)?.count(by_files))
    }

    /// All indexed file records.
    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.values()
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// All registered entities, in qualified-id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn domain_names(&self) -> Vec<&str> {
        self.domains.iter().map(|d| d.name.as_str()).collect()
    }

    pub(crate) fn default_regex_search(&self) -> bool {
        self.regex_search
    }

    /// Default path patterns across all domains, in registration order.
    pub fn default_path_patterns(&self) -> Vec<String> {
        self.domains
            .iter()
            .flat_map(|d| d.path_patterns.iter().cloned())
            .collect()
    }

    // ------------------------------------------------------------------
    // Snapshot persistence
    // ------------------------------------------------------------------

    /// Dump the index as flat JSON:
    /// `{path: {domains: [...], entities: {qualified_id: value}}}`.
    pub fn save_index(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut data: BTreeMap<&str, IndexEntry> = BTreeMap::new();
        for record in self.files.values() {
            data.insert(
                &record.path,
                IndexEntry {
                    domains: record.domains().into_iter().map(String::from).collect(),
                    entities: record
                        .tags()
                        .values()
                        .map(|t| (t.entity_id.clone(), t.value.clone()))
                        .collect(),
                },
            );
        }
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(path.as_ref(), json)?;
        info!(files = data.len(), path = %path.as_ref().display(), "Saved index snapshot");
        Ok(())
    }

    /// Restore the index from a snapshot produced by [`Layout::save_index`].
    ///
    /// With `reindex = false` the stored entity values are trusted as-is;
    /// tags referencing entities unknown to the current config are skipped
    /// with a warning. With `reindex = true` the stored values are discarded
    /// and each stored path is re-matched from scratch; paths that no longer
    /// match anything are silently dropped, exactly as in a normal pass.
    pub fn load_index(&mut self, path: impl AsRef<Path>, reindex: bool) -> Result<()> {
        let content = fs::read_to_string(path.as_ref())?;
        let data: BTreeMap<String, IndexEntry> = serde_json::from_str(&content)?;
        self.reset_index();

        for (file_path, entry) in data {
            if reindex {
                self.index_file(&file_path)?;
                continue;
            }
            let mut record = FileRecord::new(&file_path);
            for (qid, value) in entry.entities {
                let Some(entity) = self.entities.get_mut(&qid) else {
                    warn!(path = %file_path, entity = %qid, "Snapshot references unknown entity; tag skipped");
                    continue;
                };
                entity.add_file(&file_path, value.clone());
                let local = entity.name.clone();
                let domain = entity.domain.clone();
                record.add_tag(
                    &local,
                    Tag {
                        entity_id: qid,
                        domain,
                        value,
                    },
                );
            }
            self.files.insert(file_path, record);
        }
        info!(files = self.files.len(), reindex, "Loaded index snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_keeps_leading_slash() {
        assert_eq!(parent_of("/data/sub-01/f.txt"), Some("/data/sub-01"));
        assert_eq!(parent_of("/data"), Some("/"));
        assert_eq!(parent_of("plain.txt"), None);
    }

    #[test]
    fn backslashes_are_normalized() {
        assert_eq!(normalize_path(Path::new(r"a\b\c.txt")), "a/b/c.txt");
    }
}
