//! `stratify query` - evaluate filters against the index.

use super::{build_layout, build_query, output, LayoutArgs};
use anyhow::{anyhow, Result};
use clap::{Args, ValueEnum};
use serde_json::json;
use stratify::{Projection, QueryResult};

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ReturnShape {
    /// Natural-sorted file paths
    #[default]
    File,
    /// Path plus all entity fields, as a table
    Tuple,
    /// Distinct values of the target entity
    Id,
    /// Distinct directories matching the target entity's directory template
    Dir,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Entity filter as key=value (repeatable; comma for any-of values)
    #[arg(short = 'f', long = "filter")]
    pub filters: Vec<String>,

    /// Restrict to paths ending with this extension (repeatable)
    #[arg(short = 'e', long = "extension")]
    pub extensions: Vec<String>,

    /// Restrict to files tagged by this domain (repeatable)
    #[arg(short = 'd', long = "domain")]
    pub domains: Vec<String>,

    /// Result shape
    #[arg(long = "return", value_enum, default_value_t = ReturnShape::File)]
    pub shape: ReturnShape,

    /// Target entity for id/dir shapes
    #[arg(short = 't', long)]
    pub target: Option<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let layout = build_layout(&args.layout)?;
    let query = build_query(&args.filters, &args.extensions, &args.domains)?;

    let target = || {
        args.target
            .clone()
            .ok_or_else(|| anyhow!("--target is required for id and dir queries"))
    };
    let projection = match args.shape {
        ReturnShape::File => Projection::File,
        ReturnShape::Tuple => Projection::Tuple,
        ReturnShape::Id => Projection::Id(target()?),
        ReturnShape::Dir => Projection::Dir(target()?),
    };

    match layout.get(&query, projection)? {
        QueryResult::Files(paths) | QueryResult::Ids(paths) | QueryResult::Dirs(paths) => {
            if args.json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else {
                for path in paths {
                    println!("{}", path);
                }
            }
        }
        QueryResult::Tuples(records) => {
            if args.json {
                let out: Vec<_> = records
                    .iter()
                    .map(|r| {
                        let fields: serde_json::Map<String, serde_json::Value> = r
                            .fields
                            .iter()
                            .map(|(k, v)| (k.clone(), json!(v)))
                            .collect();
                        json!({ "path": r.path, "entities": fields })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&out)?);
                return Ok(());
            }
            // Union of field names across records, in first-seen order.
            let mut columns: Vec<String> = Vec::new();
            for record in &records {
                for (name, _) in &record.fields {
                    if !columns.contains(name) {
                        columns.push(name.clone());
                    }
                }
            }
            let mut headers = vec!["Path".to_string()];
            headers.extend(columns.iter().cloned());
            let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();
            let rows: Vec<Vec<String>> = records
                .iter()
                .map(|r| {
                    let mut row = vec![r.path.clone()];
                    for col in &columns {
                        let value = r
                            .fields
                            .iter()
                            .find(|(k, _)| k == col)
                            .map(|(_, v)| v.clone())
                            .unwrap_or_default();
                        row.push(value);
                    }
                    row
                })
                .collect();
            output::print_table(&header_refs, rows);
        }
        QueryResult::Objects(_) => unreachable!("obj projection is not exposed on the CLI"),
    }
    Ok(())
}
