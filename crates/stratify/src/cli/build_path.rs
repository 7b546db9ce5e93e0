//! `stratify build-path` - expand a path template from entity values.

use anyhow::{anyhow, Context, Result};
use clap::Args;
use std::collections::BTreeMap;
use std::path::PathBuf;
use stratify::{build_path, Layout};

#[derive(Args, Debug)]
pub struct BuildPathArgs {
    /// Entity value as key=value (repeatable)
    #[arg(short = 'E', long = "entity", required = true)]
    pub entities: Vec<String>,

    /// Path template (repeatable; first resolving template wins). When
    /// omitted, the default patterns of the configured domains are used.
    #[arg(short = 'p', long = "pattern")]
    pub patterns: Vec<String>,

    /// Skip templates that do not reference every supplied entity
    #[arg(long)]
    pub strict: bool,

    /// Root directory, used to load default patterns when no --pattern given
    #[arg(short = 'r', long)]
    pub root: Option<String>,

    /// Domain config file (repeatable)
    #[arg(short = 'c', long = "config")]
    pub configs: Vec<PathBuf>,
}

pub fn run(args: BuildPathArgs) -> Result<()> {
    let mut entities = BTreeMap::new();
    for raw in &args.entities {
        let (key, value) = raw
            .split_once('=')
            .ok_or_else(|| anyhow!("Invalid entity '{}': expected key=value", raw))?;
        entities.insert(key.to_string(), value.to_string());
    }

    let built = if args.patterns.is_empty() {
        let root = args
            .root
            .clone()
            .ok_or_else(|| anyhow!("Either --pattern or --root is required"))?;
        let mut builder = Layout::builder(root);
        for config in &args.configs {
            builder = builder
                .config_file(config)
                .with_context(|| format!("Failed to load config {}", config.display()))?;
        }
        let layout = builder.build().context("Failed to build layout")?;
        layout.build_path(&entities, None, args.strict)
    } else {
        build_path(&entities, &args.patterns, args.strict)
    };

    match built {
        Some(path) => {
            println!("{}", path);
            Ok(())
        }
        None => Err(anyhow!("No template resolved for the supplied entities")),
    }
}
