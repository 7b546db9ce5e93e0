//! `stratify index` - build the index and report what was found.

use super::{build_layout, output, LayoutArgs};
use anyhow::{Context, Result};
use clap::Args;
use serde_json::json;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct IndexArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Save the index snapshot to this JSON file
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: IndexArgs) -> Result<()> {
    let layout = build_layout(&args.layout)?;

    if let Some(path) = &args.save {
        layout
            .save_index(path)
            .with_context(|| format!("Failed to save index to {}", path.display()))?;
    }

    let file_count = layout.files().count();

    if args.json {
        let entities: Vec<_> = layout
            .entities()
            .map(|e| {
                json!({
                    "id": e.qualified_id(),
                    "domain": e.domain,
                    "mandatory": e.mandatory,
                    "dtype": e.dtype.as_str(),
                    "values": e.count(false),
                    "files": e.count(true),
                })
            })
            .collect();
        let out = json!({
            "roots": &layout.roots,
            "domains": layout.domain_names(),
            "files": file_count,
            "entities": entities,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!(
        "Indexed {} file{} across {} domain{}",
        file_count,
        if file_count == 1 { "" } else { "s" },
        layout.domain_names().len(),
        if layout.domain_names().len() == 1 { "" } else { "s" },
    );

    let rows: Vec<Vec<String>> = layout
        .entities()
        .map(|e| {
            vec![
                e.qualified_id(),
                e.dtype.as_str().to_string(),
                if e.mandatory { "yes" } else { "" }.to_string(),
                e.count(false).to_string(),
                e.count(true).to_string(),
            ]
        })
        .collect();
    output::print_table(&["Entity", "Type", "Mandatory", "Values", "Files"], rows);
    Ok(())
}
