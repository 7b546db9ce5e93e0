//! Error types for layout construction, indexing and queries.

use std::io;
use thiserror::Error;

/// Layout error type.
///
/// Configuration and query-usage variants indicate programmer or config
/// mistakes and surface directly to the caller. Per-file match failures are
/// never represented here; they are absorbed during indexing.
#[derive(Error, Debug)]
pub enum LayoutError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Domain '{0}' is already registered")]
    DuplicateDomain(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Entity name '{name}' is ambiguous; qualify it with a domain ({candidates})")]
    AmbiguousEntity { name: String, candidates: String },

    #[error("No directory template is defined for entity '{0}'")]
    MissingDirectoryTemplate(String),

    #[error("Cannot coerce value '{value}' of entity '{entity}' to {dtype}")]
    Coercion {
        entity: String,
        value: String,
        dtype: &'static str,
    },

    #[error("A file at path '{0}' already exists")]
    Conflict(String),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, LayoutError>;
