//! Domain configuration: the JSON shape consumed at layout construction and
//! during directory-scoped config discovery.

use super::entity::Dtype;
use super::error::{LayoutError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One entity declaration inside a domain config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityConfig {
    pub name: String,
    /// Regex with exactly one capture group.
    #[serde(default)]
    pub pattern: Option<String>,
    /// Name of a function on the registered entity mapper.
    #[serde(default)]
    pub map_func: Option<String>,
    #[serde(default)]
    pub mandatory: bool,
    /// Directory template for the `dir` projection. May reference the
    /// domain root as `{{root}}`.
    #[serde(default)]
    pub directory: Option<String>,
    /// One of `str`, `int`, `float`, `bool`. Defaults to `str`.
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl EntityConfig {
    pub fn dtype(&self) -> Result<Dtype> {
        match &self.dtype {
            None => Ok(Dtype::Str),
            Some(s) => Dtype::parse(s).ok_or_else(|| {
                LayoutError::Config(format!(
                    "invalid dtype '{}' for entity '{}'",
                    s, self.name
                ))
            }),
        }
    }
}

/// A root path or list of root paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RootSpec {
    One(String),
    Many(Vec<String>),
}

impl RootSpec {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            RootSpec::One(r) => vec![r],
            RootSpec::Many(rs) => rs,
        }
    }
}

/// A named bundle of entities, filter rules and path templates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    /// Root path(s). Relative entries are resolved against the directory the
    /// config was discovered in (or the layout root at construction time).
    #[serde(default)]
    pub root: Option<RootSpec>,
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub default_path_patterns: Vec<String>,
    /// Optional restriction: names of the only domains applying under this
    /// config's directory.
    #[serde(default)]
    pub domains: Option<Vec<String>>,
}

impl DomainConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: DomainConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: DomainConfig = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if !self.include.is_empty() && !self.exclude.is_empty() {
            return Err(LayoutError::Config(format!(
                "domain '{}' defines both include and exclude rules; only one is allowed",
                self.name
            )));
        }
        for ent in &self.entities {
            match (&ent.pattern, &ent.map_func) {
                (None, None) => {
                    return Err(LayoutError::Config(format!(
                        "entity '{}' in domain '{}' declares neither a pattern nor a map_func",
                        ent.name, self.name
                    )))
                }
                (Some(_), Some(_)) => {
                    return Err(LayoutError::Config(format!(
                        "entity '{}' in domain '{}' declares both a pattern and a map_func",
                        ent.name, self.name
                    )))
                }
                _ => {}
            }
            ent.dtype()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_config_parses() {
        let cfg = DomainConfig::from_value(json!({
            "name": "main",
            "entities": [{"name": "subject", "pattern": "sub-([0-9]+)"}]
        }))
        .unwrap();
        assert_eq!(cfg.name, "main");
        assert_eq!(cfg.entities.len(), 1);
        assert!(!cfg.entities[0].mandatory);
    }

    #[test]
    fn include_and_exclude_together_is_rejected() {
        let err = DomainConfig::from_value(json!({
            "name": "main",
            "entities": [{"name": "x", "pattern": "(a)"}],
            "include": ["data"],
            "exclude": ["derivatives"]
        }))
        .unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
    }

    #[test]
    fn entity_without_rule_is_rejected() {
        let err = DomainConfig::from_value(json!({
            "name": "main",
            "entities": [{"name": "x"}]
        }))
        .unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
    }

    #[test]
    fn invalid_dtype_is_rejected() {
        let err = DomainConfig::from_value(json!({
            "name": "main",
            "entities": [{"name": "x", "pattern": "(a)", "dtype": "decimal"}]
        }))
        .unwrap_err();
        assert!(matches!(err, LayoutError::Config(_)));
    }

    #[test]
    fn root_accepts_one_or_many() {
        let cfg = DomainConfig::from_value(json!({
            "name": "main",
            "root": ["/a", "/b"],
            "entities": [{"name": "x", "pattern": "(a)"}]
        }))
        .unwrap();
        assert_eq!(cfg.root.unwrap().into_vec(), vec!["/a", "/b"]);
    }
}
