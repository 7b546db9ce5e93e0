//! Runtime domains: compiled filter rules scoped to root directories.

use super::config::DomainConfig;
use super::error::{LayoutError, Result};
use regex::Regex;
use std::collections::BTreeSet;
use std::path::Path;

/// A registered domain.
///
/// Domains are created once (from a construction-time config or a config
/// file discovered mid-walk) and never redefined; a duplicate name is a hard
/// configuration error.
#[derive(Debug, Clone)]
pub struct Domain {
    pub name: String,
    /// Absolute, forward-slash roots this domain covers.
    pub roots: Vec<String>,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    pub path_patterns: Vec<String>,
    /// Directory-config restriction: only these domains apply under the
    /// config's directory.
    pub restrict: Option<Vec<String>>,
    /// Local names of mandatory entities.
    pub mandatory: BTreeSet<String>,
    /// Qualified entity ids in registration order.
    pub entity_ids: Vec<String>,
}

impl Domain {
    /// Build a domain from a validated config. Relative roots resolve
    /// against `base`; a config without roots covers `base` itself.
    pub fn from_config(config: &DomainConfig, base: &str) -> Result<Self> {
        config.validate()?;

        let mut roots = Vec::new();
        match config.root.clone() {
            None => roots.push(base.to_string()),
            Some(spec) => {
                for r in spec.into_vec() {
                    if r == "<parent>" {
                        roots.push(base.to_string());
                    } else if Path::new(&r).is_absolute() {
                        roots.push(r);
                    } else {
                        roots.push(format!("{}/{}", base.trim_end_matches('/'), r));
                    }
                }
            }
        }

        let compile = |patterns: &[String]| -> Result<Vec<Regex>> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| LayoutError::Pattern(format!("{}: {}", p, e)))
                })
                .collect()
        };

        Ok(Self {
            name: config.name.clone(),
            roots,
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            path_patterns: config.default_path_patterns.clone(),
            restrict: config.domains.clone(),
            mandatory: BTreeSet::new(),
            entity_ids: Vec::new(),
        })
    }

    /// Whether any of this domain's roots is an ancestor of (or equal to)
    /// `path`.
    pub fn covers(&self, path: &str) -> bool {
        self.roots.iter().any(|root| {
            let root = root.trim_end_matches('/');
            path == root || path.starts_with(root) && path[root.len()..].starts_with('/')
        })
    }

    /// Apply include/exclude rules to a path (search semantics).
    ///
    /// With include rules, the path passes only if at least one matches.
    /// Otherwise it passes unless an exclude rule matches.
    pub fn passes_filters(&self, path: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|re| re.is_match(path));
        }
        !self.exclude.iter().any(|re| re.is_match(path))
    }

    pub fn has_filters(&self) -> bool {
        !self.include.is_empty() || !self.exclude.is_empty()
    }
}
