//! `stratify nearest` - walk up from a path to the best-matching file.

use super::{build_layout, build_query, LayoutArgs};
use anyhow::Result;
use clap::Args;
use stratify::NearestOptions;

#[derive(Args, Debug)]
pub struct NearestArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Starting path to resolve from
    pub path: String,

    /// Target filter as key=value (repeatable)
    #[arg(short = 'f', long = "filter")]
    pub filters: Vec<String>,

    /// Restrict candidates to this extension (repeatable)
    #[arg(short = 'e', long = "extension")]
    pub extensions: Vec<String>,

    /// Disable strict matching (candidates may disagree on shared entities)
    #[arg(long)]
    pub no_strict: bool,

    /// Entity to exclude from strict agreement checking (repeatable)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,

    /// Report one match per directory level instead of the first
    #[arg(long)]
    pub all: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: NearestArgs) -> Result<()> {
    let layout = build_layout(&args.layout)?;
    let query = build_query(&args.filters, &args.extensions, &[])?;

    let mut options = NearestOptions::new(query);
    options.strict = !args.no_strict;
    options.ignore_strict_entities = args.ignore.clone();
    options.all = args.all;

    let matches = layout.get_nearest(&args.path, &options)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        eprintln!("No match found for {}", args.path);
        return Ok(());
    }
    for path in matches {
        println!("{}", path);
    }
    Ok(())
}
