//! CLI command implementations.

pub mod build_path;
pub mod index;
pub mod nearest;
pub mod output;
pub mod query;

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::path::PathBuf;
use stratify::{FilterValue, Layout, Query, DEFAULT_CONFIG_FILENAME};

/// Arguments shared by every command that constructs a layout.
#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Root directory to index (repeatable; later roots win on collisions)
    #[arg(short = 'r', long = "root", required = true)]
    pub roots: Vec<String>,

    /// Domain config file to register at construction (repeatable)
    #[arg(short = 'c', long = "config")]
    pub configs: Vec<PathBuf>,

    /// Filename that triggers domain discovery during the walk
    #[arg(long, default_value = DEFAULT_CONFIG_FILENAME)]
    pub config_filename: String,

    /// Global include pattern (repeatable; mutually exclusive with --exclude)
    #[arg(long = "include")]
    pub include: Vec<String>,

    /// Global exclude pattern (repeatable)
    #[arg(long = "exclude")]
    pub exclude: Vec<String>,

    /// Match query filters as regex substrings instead of exact values
    #[arg(long)]
    pub regex_search: bool,
}

/// Construct and index a layout from the shared arguments.
pub fn build_layout(args: &LayoutArgs) -> Result<Layout> {
    let mut builder = Layout::builder(args.roots[0].clone())
        .config_filename(args.config_filename.clone())
        .regex_search(args.regex_search)
        .include(args.include.clone())
        .exclude(args.exclude.clone());
    for root in &args.roots[1..] {
        builder = builder.root(root.clone());
    }
    for config in &args.configs {
        builder = builder
            .config_file(config)
            .with_context(|| format!("Failed to load config {}", config.display()))?;
    }
    builder.build().context("Failed to build layout")
}

/// Parse a `key=value` filter. A comma in the value makes it an any-of
/// filter; values that parse as numbers match zero-padded forms too.
pub fn parse_filter(raw: &str) -> Result<(String, Vec<FilterValue>)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid filter '{}': expected key=value", raw))?;
    if key.is_empty() || value.is_empty() {
        return Err(anyhow!("Invalid filter '{}': empty key or value", raw));
    }
    let values = value.split(',').map(parse_filter_value).collect();
    Ok((key.to_string(), values))
}

fn parse_filter_value(raw: &str) -> FilterValue {
    if let Ok(n) = raw.parse::<i64>() {
        return FilterValue::Int(n);
    }
    if let Ok(x) = raw.parse::<f64>() {
        return FilterValue::Float(x);
    }
    FilterValue::Text(raw.to_string())
}

/// Assemble a query from filter strings plus extension/domain restrictions.
pub fn build_query(
    filters: &[String],
    extensions: &[String],
    domains: &[String],
) -> Result<Query> {
    let mut query = Query::new();
    for raw in filters {
        let (key, values) = parse_filter(raw)?;
        query = query.filter_any(key, values);
    }
    for ext in extensions {
        query = query.extension(ext.clone());
    }
    for domain in domains {
        query = query.domain(domain.clone());
    }
    Ok(query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_parses_numeric_values() {
        let (key, values) = parse_filter("run=1").unwrap();
        assert_eq!(key, "run");
        assert_eq!(values, vec![FilterValue::Int(1)]);
    }

    #[test]
    fn filter_parses_any_of_lists() {
        let (_, values) = parse_filter("subject=01,02").unwrap();
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn filter_without_equals_is_rejected() {
        assert!(parse_filter("subject").is_err());
        assert!(parse_filter("=x").is_err());
    }
}
